//! Executions driven on a caller-supplied spawner

use async_channel::{Receiver, Sender};
use async_io::Timer;
use futures::channel::oneshot;
use futures::StreamExt;
use futures_lite::future;
use std::time::Instant;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::chunk::StreamChunk;
use crate::error::{Error, Result};
use crate::execution::Execution;
use crate::result::ExecutionResult;
use crate::spawner::Spawner;
use crate::stdin::StdinHandle;

/// Handle to an execution running in the background.
///
/// Chunks arrive on a bounded channel: a consumer that stops reading
/// eventually stalls the child on a full pipe, which is the intended
/// backpressure. Cancellation and the timeout still apply while stalled.
///
/// Dropping the handle cancels the run.
pub struct BackgroundRun {
    pid: u32,
    command: String,
    chunks: Receiver<StreamChunk>,
    outcome: oneshot::Receiver<Result<ExecutionResult>>,
    cancel: CancelToken,
    stdin: Option<StdinHandle>,
}

impl BackgroundRun {
    pub(crate) fn launch<S>(execution: Execution, spawner: &S, capacity: usize) -> Self
    where
        S: Spawner + ?Sized,
    {
        let cancel = CancelToken::new();
        let mut execution = execution.cancel_on(&cancel);
        let stdin = execution.stdin();
        let pid = execution.pid();
        let command = execution.command().to_string();

        let (chunk_tx, chunks) = async_channel::bounded(capacity);
        let (outcome_tx, outcome) = oneshot::channel();

        spawner.spawn(Box::pin(drive(execution, chunk_tx, outcome_tx, cancel.clone())));

        Self {
            pid,
            command,
            chunks,
            outcome,
            cancel,
            stdin,
        }
    }

    /// The process ID
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Chunks in arrival order. The channel closes when both pipes are done.
    pub fn chunks(&self) -> &Receiver<StreamChunk> {
        &self.chunks
    }

    /// Take the stdin writer, see [`Execution::stdin`]. An untaken writer is
    /// dropped by [`outcome`](BackgroundRun::outcome).
    pub fn stdin(&mut self) -> Option<StdinHandle> {
        self.stdin.take()
    }

    /// Stop the process; [`outcome`](BackgroundRun::outcome) then reports
    /// [`Error::Cancelled`]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the final result.
    ///
    /// Closes the chunk channel first so the run cannot stall on a reader that
    /// is gone. Chunks that were never sent are still part of the result.
    pub async fn outcome(mut self) -> Result<ExecutionResult> {
        self.chunks.close();
        self.stdin = None;
        match (&mut self.outcome).await {
            Ok(result) => result,
            // The spawner dropped the task, which killed the process
            Err(oneshot::Canceled) => Err(Error::Cancelled {
                command: self.command.clone(),
            }),
        }
    }
}

impl Drop for BackgroundRun {
    fn drop(&mut self) {
        // No effect once the run has finished
        self.cancel.cancel();
    }
}

async fn drive(
    mut execution: Execution,
    chunk_tx: Sender<StreamChunk>,
    outcome_tx: oneshot::Sender<Result<ExecutionResult>>,
    cancel: CancelToken,
) {
    let deadline = execution.deadline();
    let mut forwarding = true;

    while let Some(chunk) = execution.next().await {
        if forwarding {
            forwarding = future::or(async { chunk_tx.send(chunk).await.is_ok() }, async {
                stop_signal(&cancel, deadline).await;
                false
            })
            .await;
        }
    }
    drop(chunk_tx);

    let outcome = execution.finish().await;
    if outcome_tx.send(outcome).is_err() {
        debug!("Background run finished after its handle was dropped");
    }
}

/// Resolves once the run must stop regardless of a stalled chunk consumer
async fn stop_signal(cancel: &CancelToken, deadline: Option<Instant>) {
    match deadline {
        Some(at) => {
            future::or(cancel.cancelled(), async {
                Timer::at(at).await;
            })
            .await
        }
        None => cancel.cancelled().await,
    }
}
