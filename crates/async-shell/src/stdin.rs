//! Interactive stdin for a running process
//!
//! A [`StdinHandle`] is handed out by [`Execution::stdin`](crate::Execution::stdin)
//! when the spec asked for interactive stdin. Input can be written directly or
//! forwarded from a channel; closing the handle delivers end of file.

use async_channel::Receiver;
use async_process::ChildStdin;
use futures_lite::io::AsyncWriteExt;
use tracing::debug;

use crate::error::Result;

/// Writer for a process's stdin
#[derive(Debug)]
pub struct StdinHandle {
    stdin: Option<ChildStdin>,
    pid: u32,
}

impl StdinHandle {
    pub(crate) fn new(stdin: ChildStdin, pid: u32) -> Self {
        Self {
            stdin: Some(stdin),
            pid,
        }
    }

    /// Write raw bytes to stdin
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stdin = self.open()?;
        stdin.write_all(data).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Write a line to stdin (adds newline)
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let stdin = self.open()?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Forward everything received on `channel` to stdin, then close it once
    /// the channel is closed
    pub async fn forward_channel(mut self, channel: Receiver<Vec<u8>>) -> Result<()> {
        while let Ok(data) = channel.recv().await {
            self.write(&data).await?;
        }
        self.close().await
    }

    /// Close stdin so the process sees end of file. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.close().await?;
            debug!("Closed stdin of PID {}", self.pid);
        }
        Ok(())
    }

    /// Returns true once [`close`](StdinHandle::close) was called
    pub fn is_closed(&self) -> bool {
        self.stdin.is_none()
    }

    fn open(&mut self) -> std::io::Result<&mut ChildStdin> {
        self.stdin.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin is already closed")
        })
    }
}
