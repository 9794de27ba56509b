//! Append-only persistence sinks.
//!
//! A sink appends one keyed [`Entry`] to a named partition of a remote store.
//! The capture loop never waits on a sink: entries go through a per-feed
//! [`SinkWriter`] that writes them in order on its own task.

pub mod jsonl;
pub mod realtime_db;
mod writer;

pub use jsonl::JsonlSink;
pub use realtime_db::RealtimeDbSink;
pub use writer::{SinkWriter, DEFAULT_QUEUE_CAPACITY};

use async_trait::async_trait;
use feedrelay::Entry;

/// Errors from a store write.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store rejected write with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid sink configuration: {0}")]
    Config(String),

    #[error("write timed out")]
    Timeout,
}

/// Append one timestamped, uniquely keyed record to a partition.
#[async_trait]
pub trait EntrySink: Send + Sync {
    async fn append(&self, partition: &str, key: &str, entry: &Entry) -> Result<(), SinkError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}
