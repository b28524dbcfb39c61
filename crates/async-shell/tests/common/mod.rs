//! Common test utilities

#![allow(dead_code)]

use async_shell::{CommandSpec, Spawner};
use std::future::Future;
use std::pin::Pin;

/// Spawner backed by the smol global executor
pub struct TestSpawner;

impl Spawner for TestSpawner {
    fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {
        smol::spawn(future).detach();
    }
}

/// Build a `sh -c` spec
pub fn sh(line: &str) -> anyhow::Result<CommandSpec> {
    Ok(CommandSpec::shell(line).build()?)
}

/// Check whether a process with `pid` still exists (signal 0)
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    use nix::sys::signal;
    use nix::unistd::Pid;

    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Produce `len` bytes of `byte` on stdout
pub fn repeat_cmd(byte: char, len: usize) -> String {
    format!("head -c {len} /dev/zero | tr '\\0' '{byte}'")
}
