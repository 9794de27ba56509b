// Copyright 2026 FeedRelay Contributors
// SPDX-License-Identifier: Apache-2.0

//! FeedRelay event bus — typed events from every feed.
//!
//! The EventBus is a `tokio::sync::broadcast` channel that carries
//! [`FeedEvent`] values. Any consumer (the CLI event printer, tests, log
//! shippers) can subscribe independently. When no subscribers exist,
//! events are silently dropped.

use crate::supervisor::FeedState;
use feedrelay::Classification;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event FeedRelay emits. Serialized to JSON for the `--events` stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedEvent {
    // ── Runner Events ─────────────────────
    /// The runner is about to start its feeds.
    RunnerStarted { version: String, feeds: usize },
    /// Every feed has stopped.
    RunnerStopped,

    // ── Feed Events ───────────────────────
    /// A supervisor entered a new state.
    StateChanged { feed: String, state: FeedState },
    /// A supervisor is tearing its session down.
    Recovering { feed: String, cause: String },
    /// The daily restart window was hit.
    ScheduledRestart { feed: String, date: String },
    /// A new distinct value was captured and queued for the store.
    ValueCaptured {
        feed: String,
        key: String,
        magnitude: String,
        classification: Classification,
    },
    /// A store write failed; the value is dropped.
    SinkFailed {
        feed: String,
        key: String,
        error: String,
    },
    /// A supervisor returned after cancellation.
    FeedStopped { feed: String },
}

impl FeedEvent {
    /// The feed this event concerns, if any.
    pub fn feed(&self) -> Option<&str> {
        match self {
            FeedEvent::StateChanged { feed, .. }
            | FeedEvent::Recovering { feed, .. }
            | FeedEvent::ScheduledRestart { feed, .. }
            | FeedEvent::ValueCaptured { feed, .. }
            | FeedEvent::SinkFailed { feed, .. }
            | FeedEvent::FeedStopped { feed } => Some(feed),
            FeedEvent::RunnerStarted { .. } | FeedEvent::RunnerStopped => None,
        }
    }
}

/// Check if an event is related to a specific feed.
///
/// Runner events are not feed-specific and match every feed.
pub fn event_matches_feed(event: &FeedEvent, feed: &str) -> bool {
    event.feed().map_or(true, |f| f == feed)
}

/// The central event bus.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<FeedEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: FeedEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
