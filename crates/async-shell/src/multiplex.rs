//! Concurrent, line-buffered draining of stdout and stderr
//!
//! Each stream is read by its own line reader; the two are merged with
//! [`futures::stream::select`] so neither can block the other. Chunks are
//! stamped with a sequence number the moment the merged stream yields them,
//! which records true arrival order across both streams.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream};
use futures_lite::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{trace, warn};

use crate::chunk::{StreamChunk, StreamKind};

/// Default upper bound on a single chunk; longer lines are split
pub const DEFAULT_MAX_CHUNK_LEN: usize = 64 * 1024;

/// Merged, sequenced output of both streams of one process
pub struct Multiplexer {
    merged: BoxStream<'static, (StreamKind, Vec<u8>)>,
    next_seq: u64,
}

impl Multiplexer {
    /// Start draining `stdout` and `stderr`
    pub fn new<O, E>(stdout: O, stderr: E, max_chunk_len: usize) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let max_chunk_len = max_chunk_len.max(1);
        let merged = stream::select(
            line_stream(StreamKind::Stdout, stdout, max_chunk_len),
            line_stream(StreamKind::Stderr, stderr, max_chunk_len),
        );
        Self {
            merged: Box::pin(merged),
            next_seq: 0,
        }
    }
}

impl Stream for Multiplexer {
    type Item = StreamChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.merged.as_mut().poll_next(cx) {
            Poll::Ready(Some((stream, data))) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                trace!(?stream, seq, len = data.len(), "chunk");
                Poll::Ready(Some(StreamChunk::new(stream, seq, data)))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn line_stream<R>(
    kind: StreamKind,
    reader: R,
    max_chunk_len: usize,
) -> BoxStream<'static, (StreamKind, Vec<u8>)>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    Box::pin(stream::unfold(
        Some(BufReader::new(reader)),
        move |reader| async move {
            let mut reader = reader?;
            match read_chunk(&mut reader, max_chunk_len).await {
                Ok(Some(data)) => Some(((kind, data), Some(reader))),
                Ok(None) => None,
                Err(e) => {
                    warn!("Error reading {:?}: {}", kind, e);
                    None
                }
            }
        },
    ))
}

/// Read up to and including the next `\n`, or `max_len` bytes, whichever
/// comes first. Returns `None` at end of stream.
async fn read_chunk<R>(
    reader: &mut BufReader<R>,
    max_len: usize,
) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = Vec::new();
    loop {
        let (complete, used) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok((!chunk.is_empty()).then_some(chunk));
            }

            let room = max_len - chunk.len();
            let window = &available[..available.len().min(room)];
            match window.iter().position(|b| *b == b'\n') {
                Some(i) => {
                    chunk.extend_from_slice(&window[..=i]);
                    (true, i + 1)
                }
                None => {
                    chunk.extend_from_slice(window);
                    (chunk.len() == max_len, window.len())
                }
            }
        };
        reader.consume(used);

        if complete {
            return Ok(Some(chunk));
        }
    }
}
