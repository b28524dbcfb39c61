//! Entry points for running commands

use std::time::Duration;

use crate::background::BackgroundRun;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::execution::Execution;
use crate::multiplex::DEFAULT_MAX_CHUNK_LEN;
use crate::result::ExecutionResult;
use crate::spawner::Spawner;
use crate::spec::CommandSpec;

/// Default time between SIGTERM and SIGKILL
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Default bound on collecting output after a process was terminated
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default capacity of the chunk channel of a [`BackgroundRun`]
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Runs [`CommandSpec`]s.
///
/// A runner only holds configuration, so one can be shared by any number of
/// concurrent runs. Futures returned by it are runtime-agnostic and make
/// progress on whatever executor polls them.
#[derive(Debug, Clone)]
pub struct Runner {
    grace_period: Duration,
    drain_timeout: Duration,
    max_chunk_len: usize,
    channel_capacity: usize,
}

impl Runner {
    /// Create a runner with default settings
    pub fn new() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            max_chunk_len: DEFAULT_MAX_CHUNK_LEN,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// How long a terminated process may take to exit before it is killed
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// How long to keep collecting output after termination
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Largest chunk delivered; longer lines are split
    pub fn with_max_chunk_len(mut self, max_chunk_len: usize) -> Self {
        self.max_chunk_len = max_chunk_len.max(1);
        self
    }

    /// Number of chunks a background run buffers before applying backpressure
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Grace period between SIGTERM and SIGKILL
    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Output drain bound after termination
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Largest chunk delivered
    pub fn max_chunk_len(&self) -> usize {
        self.max_chunk_len
    }

    /// Chunk channel capacity of background runs
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Spawn the process and return the live execution for streaming
    pub fn start(&self, spec: &CommandSpec) -> Result<Execution> {
        Execution::start(self, spec)
    }

    /// Run to completion, capturing all output.
    ///
    /// A non-zero exit is a normal result unless the spec is checked.
    /// Dropping the returned future kills the process.
    pub async fn run(&self, spec: &CommandSpec) -> Result<ExecutionResult> {
        self.start(spec)?.finish().await
    }

    /// Like [`run`](Runner::run), stopping the process when `token` is cancelled
    pub async fn run_cancellable(
        &self,
        spec: &CommandSpec,
        token: &CancelToken,
    ) -> Result<ExecutionResult> {
        if token.is_cancelled() {
            return Err(Error::Cancelled {
                command: spec.to_string(),
            });
        }
        self.start(spec)?.cancel_on(token).finish().await
    }

    /// Run with exit checking and return stdout decoded as UTF-8
    pub async fn check_output(&self, spec: &CommandSpec) -> Result<String> {
        let result = self.run(&spec.checked()).await?;
        Ok(result.stdout_str())
    }

    /// Run on `spawner`, delivering chunks over a bounded channel
    pub fn spawn<S>(&self, spec: &CommandSpec, spawner: &S) -> Result<BackgroundRun>
    where
        S: Spawner + ?Sized,
    {
        let execution = self.start(spec)?;
        Ok(BackgroundRun::launch(execution, spawner, self.channel_capacity))
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `spec` with a default [`Runner`]
pub async fn run(spec: &CommandSpec) -> Result<ExecutionResult> {
    Runner::new().run(spec).await
}

/// Run `spec` with a default [`Runner`], failing on a non-zero exit, and
/// return its stdout
pub async fn check_output(spec: &CommandSpec) -> Result<String> {
    Runner::new().check_output(spec).await
}
