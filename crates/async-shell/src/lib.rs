//! Runtime-agnostic subprocess runner
//!
//! This crate spawns external processes, drains their stdout and stderr
//! concurrently so large outputs never deadlock on a full pipe, and returns
//! a structured [`ExecutionResult`]. Timeouts and caller cancellation
//! terminate and reap the child before the call returns.
//!
//! ```no_run
//! use async_shell::{CommandSpec, Runner};
//!
//! # futures::executor::block_on(async {
//! let spec = CommandSpec::builder("echo").arg("hello").build()?;
//! let result = Runner::new().run(&spec).await?;
//! assert_eq!(result.stdout, b"hello\n");
//! # Ok::<(), async_shell::Error>(())
//! # }).unwrap();
//! ```

#![warn(missing_docs)]

pub mod background;
pub mod cancel;
pub mod chunk;
pub mod error;
pub mod execution;
pub mod multiplex;
pub mod process;
pub mod result;
pub mod runner;
pub mod spawner;
pub mod spec;
pub mod stdin;

pub use background::BackgroundRun;
pub use cancel::CancelToken;
pub use chunk::{StreamChunk, StreamKind};
pub use error::{Error, Result};
pub use execution::Execution;
pub use multiplex::Multiplexer;
pub use process::ProcessHandle;
pub use result::{ExecutionResult, ExitStatus};
pub use runner::{check_output, run, Runner};
#[cfg(feature = "smol")]
pub use spawner::SmolSpawner;
pub use spawner::Spawner;
pub use spec::{CommandSpec, CommandSpecBuilder, Invocation};
pub use stdin::StdinHandle;
