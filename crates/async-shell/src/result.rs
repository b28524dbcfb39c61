//! Structured outcome of a finished execution

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunk::{StreamChunk, StreamKind};
use crate::error::{Error, Result};

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    #[cfg(unix)]
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Status of a process that exited on its own with `code`
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            #[cfg(unix)]
            signal: None,
        }
    }

    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Returns true if the process was terminated by a signal
    pub fn terminated_by_signal(&self) -> bool {
        #[cfg(unix)]
        {
            self.signal.is_some()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            return write!(f, "exit code {code}");
        }
        #[cfg(unix)]
        {
            if let Some(signal) = self.signal {
                return write!(f, "killed by signal {signal}");
            }
        }
        write!(f, "unknown exit status")
    }
}

/// Final structured outcome of a reaped process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// How the process ended
    pub status: ExitStatus,
    /// Everything the process wrote to stdout
    pub stdout: Vec<u8>,
    /// Everything the process wrote to stderr
    pub stderr: Vec<u8>,
    /// Wall-clock time from spawn until the process was reaped
    pub elapsed: Duration,
    /// Set when the process was stopped because of a timeout or cancellation
    pub terminated: bool,
}

impl ExecutionResult {
    /// Build a result from delivered chunks.
    ///
    /// Chunks are concatenated per stream in sequence order, so the order they
    /// are passed in does not matter.
    pub fn assemble(
        status: ExitStatus,
        mut chunks: Vec<StreamChunk>,
        elapsed: Duration,
        terminated: bool,
    ) -> Self {
        chunks.sort_by_key(|chunk| chunk.seq);

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        for chunk in chunks {
            match chunk.stream {
                StreamKind::Stdout => stdout.extend_from_slice(&chunk.data),
                StreamKind::Stderr => stderr.extend_from_slice(&chunk.data),
            }
        }

        Self {
            status,
            stdout,
            stderr,
            elapsed,
            terminated,
        }
    }

    /// The exit code, surfaced verbatim. `None` when a signal ended the process.
    pub fn exit_code(&self) -> Option<i32> {
        self.status.code
    }

    /// Returns true if the process exited with code 0
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Stdout decoded as UTF-8, replacing invalid sequences
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded as UTF-8, replacing invalid sequences
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Stdout split into lines with the line separators stripped
    pub fn stdout_lines(&self) -> Vec<String> {
        self.stdout_str().lines().map(str::to_owned).collect()
    }

    /// Turn a non-zero exit into [`Error::NonZeroExit`]
    pub fn validate(self, command: impl Into<String>) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::NonZeroExit {
                command: command.into(),
                result: Box::new(self),
            })
        }
    }
}
