//! Captured output chunks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which output stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// One ordered unit of captured output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// The stream the bytes were read from
    pub stream: StreamKind,
    /// Arrival order across both streams of one execution, starting at 0
    pub seq: u64,
    /// Raw bytes, normally one line including its terminating `\n`
    pub data: Vec<u8>,
    /// When the chunk was read
    pub timestamp: DateTime<Utc>,
}

impl StreamChunk {
    /// Create a chunk stamped with the current time
    pub fn new(stream: StreamKind, seq: u64, data: Vec<u8>) -> Self {
        Self {
            stream,
            seq,
            data,
            timestamp: Utc::now(),
        }
    }

    /// The chunk decoded as UTF-8 with any line separator stripped
    pub fn text(&self) -> String {
        let text = String::from_utf8_lossy(&self.data);
        text.trim_end_matches(['\n', '\r']).to_owned()
    }

    /// Returns true if this chunk came from stdout
    pub fn is_stdout(&self) -> bool {
        self.stream == StreamKind::Stdout
    }
}
