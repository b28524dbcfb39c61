//! Error types for command execution

use std::time::Duration;

use thiserror::Error;

use crate::result::ExecutionResult;

const SECTION_INDENT: &str = "    ";

/// Unified error type for command execution
#[derive(Error, Debug)]
pub enum Error {
    /// The command description was rejected before anything was spawned
    #[error("invalid command: {reason}")]
    InvalidCommand {
        /// Why the command was rejected
        reason: String,
    },

    /// Failed to spawn a process
    #[error("failed to spawn `{command}`: {source}")]
    SpawnFailed {
        /// The command line that could not be started
        command: String,
        /// The underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The process outlived its timeout and was terminated
    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut {
        /// The command line that timed out
        command: String,
        /// The configured timeout
        timeout: Duration,
        /// Output captured before the process was terminated
        partial: Box<ExecutionResult>,
    },

    /// The caller cancelled the execution before the process exited
    #[error("`{command}` was cancelled")]
    Cancelled {
        /// The command line that was cancelled
        command: String,
    },

    /// The process exited with a non-zero status and the caller asked for checking
    #[error("{}", non_zero_exit_message(.command, .result))]
    NonZeroExit {
        /// The command line that failed
        command: String,
        /// The complete result of the run
        result: Box<ExecutionResult>,
    },

    /// Failed to send signal to process
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Nix error (Unix signal handling)
    #[cfg(unix)]
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

impl Error {
    /// Create an invalid command error
    pub fn invalid_command(reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            reason: reason.into(),
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }

    /// Whatever output was captured, if this error carries any
    pub fn partial_result(&self) -> Option<&ExecutionResult> {
        match self {
            Error::TimedOut { partial, .. } => Some(partial),
            Error::NonZeroExit { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Returns true for [`Error::TimedOut`]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TimedOut { .. })
    }

    /// Returns true for [`Error::Cancelled`]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}

fn non_zero_exit_message(command: &str, result: &ExecutionResult) -> String {
    let mut msg = match result.exit_code() {
        Some(code) => format!("`{command}` failed with code: {code}"),
        None => format!("`{command}` failed: {}", result.status),
    };
    for (title, content) in [("STDOUT", &result.stdout), ("STDERR", &result.stderr)] {
        if content.is_empty() {
            continue;
        }
        msg.push_str(&format!("\n{SECTION_INDENT}PROCESS {title}:"));
        for line in String::from_utf8_lossy(content).lines() {
            msg.push_str(&format!("\n{SECTION_INDENT}{SECTION_INDENT}{line}"));
        }
    }
    msg
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
