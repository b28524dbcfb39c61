//! Ownership of a live child process

use std::time::Duration;

use async_io::Timer;
use async_process::{Child, ChildStderr, ChildStdin, ChildStdout};
use futures_lite::future;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::result::ExitStatus;
use crate::spec::CommandSpec;

#[cfg(unix)]
const SIGKILL: i32 = nix::sys::signal::Signal::SIGKILL as i32;
#[cfg(not(unix))]
const SIGKILL: i32 = 9;

/// A spawned OS process and its three standard pipes.
///
/// The child is spawned with kill-on-drop, so dropping the handle on any path
/// (error, cancellation, a dropped future) kills the process and leaves it to
/// the `async-process` reaper. Pipes are owned values and close when dropped.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: u32,
    reaped: Option<ExitStatus>,
}

/// The pipes taken out of a freshly spawned child
#[derive(Debug)]
pub(crate) struct Pipes {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

impl ProcessHandle {
    /// Spawn the process described by `spec` and take ownership of its pipes
    pub(crate) fn spawn(spec: &CommandSpec) -> Result<(Self, Pipes)> {
        let mut child = spec.prepare().spawn().map_err(|source| Error::SpawnFailed {
            command: spec.to_string(),
            source,
        })?;
        let pid = child.id();

        // All three are piped by `prepare`; a missing one means the child is
        // unusable and is killed when `child` drops here.
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(Error::SpawnFailed {
                command: spec.to_string(),
                source: std::io::Error::other("child is missing a standard pipe"),
            });
        };

        debug!("Spawned `{}` with PID {}", spec, pid);

        let handle = Self {
            child,
            pid,
            reaped: None,
        };
        Ok((
            handle,
            Pipes {
                stdin,
                stdout,
                stderr,
            },
        ))
    }

    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit status, once the process has been reaped
    pub fn reaped(&self) -> Option<ExitStatus> {
        self.reaped
    }

    /// Wait for the process to exit and reap it
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.reaped {
            return Ok(status);
        }
        let status = ExitStatus::from(self.child.status().await?);
        debug!("Process {} exited with {}", self.pid, status);
        self.reaped = Some(status);
        Ok(status)
    }

    /// Reap the process if it has already exited, without blocking
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.reaped {
            return Ok(Some(status));
        }
        let Some(status) = self.child.try_status()? else {
            return Ok(None);
        };
        let status = ExitStatus::from(status);
        debug!("Process {} exited with {}", self.pid, status);
        self.reaped = Some(status);
        Ok(Some(status))
    }

    /// Send SIGTERM (or equivalent) for graceful shutdown
    pub fn terminate(&mut self) -> Result<()> {
        if self.reaped.is_some() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.pid as i32);
            match signal::kill(pid, Signal::SIGTERM) {
                // Already gone but not yet reaped
                Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => return Err(e.into()),
            }
        }

        #[cfg(not(unix))]
        {
            self.kill()?;
        }

        Ok(())
    }

    /// Forcefully stop the process
    pub fn kill(&mut self) -> Result<()> {
        if self.reaped.is_some() {
            return Ok(());
        }
        match self.child.kill() {
            Ok(()) => Ok(()),
            // The process already exited
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(Error::signal_failed(SIGKILL, e.to_string())),
        }
    }

    /// Terminate, escalate to a kill after `grace`, and reap
    pub async fn shutdown(&mut self, grace: Duration) -> Result<ExitStatus> {
        if let Some(status) = self.reaped {
            return Ok(status);
        }

        self.terminate()?;

        let pid = self.pid;
        let exited = future::or(async { Some(self.wait().await) }, async {
            Timer::after(grace).await;
            None
        })
        .await;

        match exited {
            Some(status) => status,
            None => {
                warn!("Process {} ignored SIGTERM for {:?}, killing", pid, grace);
                self.kill()?;
                self.wait().await
            }
        }
    }
}
