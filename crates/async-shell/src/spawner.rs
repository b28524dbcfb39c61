//! Caller-owned executor handles
//!
//! The crate never starts or assumes a global runtime. Work that has to run
//! in the background, such as a [`BackgroundRun`](crate::BackgroundRun), is
//! handed to a [`Spawner`] supplied by the caller.
//!
//! ```no_run
//! use async_shell::{CommandSpec, Runner, Spawner};
//! use std::future::Future;
//! use std::pin::Pin;
//!
//! struct Detach;
//!
//! impl Spawner for Detach {
//!     fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {
//!         std::thread::spawn(move || futures::executor::block_on(future));
//!     }
//! }
//!
//! let spec = CommandSpec::builder("echo").arg("hi").build().unwrap();
//! let run = Runner::new().spawn(&spec, &Detach).unwrap();
//! let result = futures::executor::block_on(run.outcome()).unwrap();
//! assert_eq!(result.stdout, b"hi\n");
//! ```

use std::future::Future;
use std::pin::Pin;

/// A spawner that can spawn futures on an async runtime
pub trait Spawner: Send + Sync {
    /// Spawn a future on the runtime
    ///
    /// The future will run to completion in the background.
    fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>);
}

/// Spawner for the Smol runtime
#[cfg(feature = "smol")]
#[derive(Debug, Clone, Copy)]
pub struct SmolSpawner;

#[cfg(feature = "smol")]
impl Spawner for SmolSpawner {
    fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {
        smol::spawn(future).detach();
    }
}
