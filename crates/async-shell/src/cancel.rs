//! Caller-owned cancellation signal

use async_channel::{Receiver, Sender};

/// A cloneable token that cancels every execution watching it.
///
/// Cancellation is one-way: once [`cancel`](CancelToken::cancel) is called the
/// token stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    // Nothing is ever sent; closing the channel is the signal.
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        let (tx, rx) = async_channel::bounded(1);
        Self { tx, rx }
    }

    /// Cancel all executions watching this token
    pub fn cancel(&self) {
        self.tx.close();
    }

    /// Returns true once [`cancel`](CancelToken::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves when the token is cancelled
    pub async fn cancelled(&self) {
        // recv only fails once the channel is closed
        while self.rx.recv().await.is_ok() {}
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
