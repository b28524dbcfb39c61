//! A live execution: output streaming, timeout and cancellation

use std::future::{poll_fn, Future};
use std::pin::{pin, Pin};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_io::Timer;
use async_process::ChildStdin;
use futures::future::BoxFuture;
use futures::stream::{Stream, StreamExt};
use futures_lite::future;
use futures_lite::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::chunk::StreamChunk;
use crate::error::{Error, Result};
use crate::multiplex::Multiplexer;
use crate::process::ProcessHandle;
use crate::result::{ExecutionResult, ExitStatus};
use crate::runner::Runner;
use crate::spec::CommandSpec;
use crate::stdin::StdinHandle;

/// Why an execution stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    TimedOut,
    Cancelled,
    /// The process exited, but a pipe it shared is still held open
    OutputHeld,
}

impl Interrupt {
    /// Whether the process has to be stopped by the runner
    fn stops_process(self) -> bool {
        matches!(self, Interrupt::TimedOut | Interrupt::Cancelled)
    }
}

/// Activities polled alongside the output: the stdin writer, the deadline
/// and the cancellation signal.
struct Watch {
    stdin: Option<BoxFuture<'static, ()>>,
    deadline: Option<(Timer, Interrupt)>,
    cancel: Option<BoxFuture<'static, ()>>,
    interrupted: Option<Interrupt>,
}

impl Watch {
    fn poll_stdin(&mut self, cx: &mut Context<'_>) {
        if let Some(writer) = &mut self.stdin {
            if writer.as_mut().poll(cx).is_ready() {
                self.stdin = None;
            }
        }
    }

    fn poll_interrupt(&mut self, cx: &mut Context<'_>) -> Option<Interrupt> {
        if self.interrupted.is_some() {
            return self.interrupted;
        }
        if let Some(cancel) = &mut self.cancel {
            if cancel.as_mut().poll(cx).is_ready() {
                self.interrupted = Some(Interrupt::Cancelled);
                return self.interrupted;
            }
        }
        if let Some((timer, interrupt)) = &mut self.deadline {
            if Pin::new(timer).poll(cx).is_ready() {
                self.interrupted = Some(*interrupt);
                self.deadline = None;
            }
        }
        self.interrupted
    }
}

/// A spawned process whose output is being drained.
///
/// `Execution` is a [`Stream`] of [`StreamChunk`]s in arrival order. Every
/// chunk it yields is also recorded, so [`finish`](Execution::finish) can
/// assemble the complete result whether or not the caller consumed the
/// stream. The stream ends when both pipes reach end of file, or early when
/// the timeout elapses or the execution is cancelled.
///
/// Dropping an `Execution` kills the process.
pub struct Execution {
    command: String,
    handle: ProcessHandle,
    output: Multiplexer,
    output_done: bool,
    watch: Watch,
    stdin: Option<StdinHandle>,
    chunks: Vec<StreamChunk>,
    started: Instant,
    timeout: Option<Duration>,
    deadline_at: Option<Instant>,
    check: bool,
    grace_period: Duration,
    drain_timeout: Duration,
}

impl Execution {
    pub(crate) fn start(runner: &Runner, spec: &CommandSpec) -> Result<Self> {
        let started = Instant::now();
        let (handle, pipes) = ProcessHandle::spawn(spec)?;

        let (writer, stdin) = if spec.is_stdin_interactive() {
            (None, Some(StdinHandle::new(pipes.stdin, handle.pid())))
        } else {
            (input_writer(pipes.stdin, spec.get_input(), handle.pid()), None)
        };
        let output = Multiplexer::new(pipes.stdout, pipes.stderr, runner.max_chunk_len());
        let deadline_at = spec.get_timeout().map(|timeout| started + timeout);

        Ok(Self {
            command: spec.to_string(),
            handle,
            output,
            output_done: false,
            stdin,
            watch: Watch {
                stdin: writer,
                deadline: deadline_at.map(|at| (Timer::at(at), Interrupt::TimedOut)),
                cancel: None,
                interrupted: None,
            },
            chunks: Vec::new(),
            started,
            timeout: spec.get_timeout(),
            deadline_at,
            check: spec.is_checked(),
            grace_period: runner.grace_period(),
            drain_timeout: runner.drain_timeout(),
        })
    }

    /// Stop the execution when `token` is cancelled
    pub fn cancel_on(mut self, token: &CancelToken) -> Self {
        let token = token.clone();
        self.watch.cancel = Some(Box::pin(async move { token.cancelled().await }));
        self
    }

    /// The process ID
    pub fn pid(&self) -> u32 {
        self.handle.pid()
    }

    /// The command line being run
    pub fn command(&self) -> &str {
        &self.command
    }

    /// When the timeout elapses, if one was set
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline_at
    }

    /// Take the stdin writer of a spec built with
    /// [`interactive_stdin`](crate::CommandSpecBuilder::interactive_stdin).
    ///
    /// Returns `None` for other specs and after the first call. The child's
    /// stdin stays open until the handle is closed or dropped. A handle that
    /// was never taken is dropped by [`finish`](Execution::finish).
    pub fn stdin(&mut self) -> Option<StdinHandle> {
        self.stdin.take()
    }

    /// The exit status if the process has already exited, without waiting
    pub fn try_status(&mut self) -> Result<Option<ExitStatus>> {
        self.handle.try_wait()
    }

    /// Drain the remaining output, wait for the process and build the result.
    ///
    /// On timeout or cancellation the process is sent SIGTERM, killed if it
    /// is still alive after the grace period, and reaped before this returns
    /// [`Error::TimedOut`] or [`Error::Cancelled`].
    pub async fn finish(mut self) -> Result<ExecutionResult> {
        // An untaken stdin handle would keep the child waiting for input
        self.stdin = None;

        loop {
            let next = poll_fn(|cx| self.poll_chunk(cx)).await;
            match next {
                Some(chunk) => self.chunks.push(chunk),
                None => break,
            }
        }

        let exited = match self.watch.interrupted {
            Some(Interrupt::OutputHeld) => {
                warn!(
                    "Output of `{}` still open {:?} after it exited, giving up",
                    self.command, self.drain_timeout
                );
                Some(self.handle.wait().await?)
            }
            Some(_) => None,
            None => self.wait_or_interrupt().await?,
        };

        let status = match exited {
            Some(status) => status,
            None => {
                debug!(
                    "Stopping `{}` (PID {}): {:?}",
                    self.command,
                    self.handle.pid(),
                    self.watch.interrupted
                );
                let status = self.handle.shutdown(self.grace_period).await?;
                self.drain_after_termination().await;
                status
            }
        };

        self.watch.stdin = None;
        let interrupted = self.watch.interrupted.filter(|i| i.stops_process());
        let result = ExecutionResult::assemble(
            status,
            std::mem::take(&mut self.chunks),
            self.started.elapsed(),
            interrupted.is_some(),
        );
        let command = std::mem::take(&mut self.command);

        match interrupted {
            Some(Interrupt::TimedOut) => Err(Error::TimedOut {
                command,
                timeout: self.timeout.unwrap_or_default(),
                partial: Box::new(result),
            }),
            Some(Interrupt::Cancelled) => Err(Error::Cancelled { command }),
            Some(Interrupt::OutputHeld) | None if self.check => result.validate(command),
            Some(Interrupt::OutputHeld) | None => Ok(result),
        }
    }

    fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<StreamChunk>> {
        self.watch.poll_stdin(cx);
        if self.output_done || self.poll_interrupt(cx) {
            return Poll::Ready(None);
        }
        match self.output.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                self.output_done = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }

    fn poll_interrupt(&mut self, cx: &mut Context<'_>) -> bool {
        let before = self.watch.interrupted;
        let now = self.watch.poll_interrupt(cx);
        if before.is_none() && now == Some(Interrupt::TimedOut) && self.exited_by_deadline() {
            // Registers the drain timer
            return self.watch.poll_interrupt(cx).is_some();
        }
        now.is_some()
    }

    /// The deadline fired. If the process already exited on its own, the
    /// timeout is void and the remaining output is drained, bounded by the
    /// drain timeout.
    fn exited_by_deadline(&mut self) -> bool {
        match self.handle.try_wait() {
            Ok(Some(_)) => {
                self.watch.interrupted = None;
                let drain = Timer::after(self.drain_timeout);
                self.watch.deadline = Some((drain, Interrupt::OutputHeld));
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to check PID {}: {}", self.handle.pid(), e);
                false
            }
        }
    }

    /// Both pipes are at end of file; wait for exit while still feeding stdin
    async fn wait_or_interrupt(&mut self) -> Result<Option<ExitStatus>> {
        loop {
            let exited = {
                let watch = &mut self.watch;
                let mut wait = pin!(self.handle.wait());
                poll_fn(|cx| {
                    watch.poll_stdin(cx);
                    if let Poll::Ready(status) = wait.as_mut().poll(cx) {
                        return Poll::Ready(status.map(Some));
                    }
                    match watch.poll_interrupt(cx) {
                        Some(_) => Poll::Ready(Ok(None)),
                        None => Poll::Pending,
                    }
                })
                .await?
            };

            if exited.is_some() || self.watch.interrupted != Some(Interrupt::TimedOut) {
                return Ok(exited);
            }
            if !self.exited_by_deadline() {
                return Ok(None);
            }
        }
    }

    /// Collect what the process wrote before it died. A pipe inherited by a
    /// surviving grandchild may never close, so this is bounded.
    async fn drain_after_termination(&mut self) {
        if self.output_done {
            return;
        }
        let drain_timeout = self.drain_timeout;
        let output = &mut self.output;
        let chunks = &mut self.chunks;
        let drained = future::or(
            async {
                while let Some(chunk) = output.next().await {
                    chunks.push(chunk);
                }
                true
            },
            async {
                Timer::after(drain_timeout).await;
                false
            },
        )
        .await;

        if drained {
            self.output_done = true;
        } else {
            warn!(
                "Output of `{}` still open {:?} after termination, giving up",
                self.command, self.drain_timeout
            );
        }
    }
}

impl Stream for Execution {
    type Item = StreamChunk;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.poll_chunk(cx) {
            Poll::Ready(Some(chunk)) => {
                this.chunks.push(chunk.clone());
                Poll::Ready(Some(chunk))
            }
            other => other,
        }
    }
}

/// Write `input` and close stdin. Without input, stdin is closed right away
/// so the child sees end of file immediately.
fn input_writer(
    mut stdin: ChildStdin,
    input: Option<&[u8]>,
    pid: u32,
) -> Option<BoxFuture<'static, ()>> {
    let input = input?.to_vec();
    Some(Box::pin(async move {
        if let Err(e) = stdin.write_all(&input).await {
            debug!("PID {} stopped reading stdin: {}", pid, e);
            return;
        }
        if let Err(e) = stdin.close().await {
            debug!("Failed to close stdin of PID {}: {}", pid, e);
        }
    }))
}
