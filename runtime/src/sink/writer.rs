//! Per-feed ordered write queue.

use super::{EntrySink, SinkError};
use crate::events::{EventBus, FeedEvent};
use feedrelay::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct Job {
    key: String,
    entry: Entry,
}

/// Hands entries to a sink on a background task, one at a time, in the
/// order they were submitted.
pub struct SinkWriter {
    feed: String,
    tx: mpsc::Sender<Job>,
    task: JoinHandle<()>,
}

impl SinkWriter {
    pub fn spawn(
        feed: &str,
        partition: &str,
        sink: Arc<dyn EntrySink>,
        write_timeout: Duration,
        capacity: usize,
        events: EventBus,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let feed_name = feed.to_string();
        let partition = partition.to_string();

        let task = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let write = sink.append(&partition, &job.key, &job.entry);
                let result = tokio::time::timeout(write_timeout, write)
                    .await
                    .unwrap_or(Err(SinkError::Timeout));
                match result {
                    Ok(()) => {
                        tracing::debug!(feed = %feed_name, key = %job.key, "entry stored");
                    }
                    Err(e) => {
                        tracing::warn!(
                            feed = %feed_name,
                            key = %job.key,
                            "store write failed: {e}"
                        );
                        events.emit(FeedEvent::SinkFailed {
                            feed: feed_name.clone(),
                            key: job.key,
                            error: e.to_string(),
                        });
                    }
                }
            }
        });

        Self {
            feed: feed.to_string(),
            tx,
            task,
        }
    }

    /// Queue an entry without waiting. Returns `false` if it was dropped.
    pub fn submit(&self, key: String, entry: Entry) -> bool {
        match self.tx.try_send(Job { key, entry }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(
                    feed = %self.feed,
                    key = %job.key,
                    "store queue full, dropping entry"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(
                    feed = %self.feed,
                    key = %job.key,
                    "store writer stopped, dropping entry"
                );
                false
            }
        }
    }

    /// Stop accepting entries and wait for queued ones to be written.
    pub async fn close(self) {
        let SinkWriter { feed, tx, task } = self;
        drop(tx);
        if let Err(e) = task.await {
            tracing::warn!(feed = %feed, "store writer task ended abnormally: {e}");
        }
    }
}
