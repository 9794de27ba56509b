//! Core data types for feeds, observations, and persisted entries.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Characters a partition path segment may not contain.
const FORBIDDEN_PARTITION_CHARS: [char; 5] = ['.', '#', '$', '[', ']'];

/// Immutable descriptor of one concurrently-run feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Human-readable feed name, used in logs and events.
    pub name: String,
    /// Address of the view that renders the signal.
    pub target_url: String,
    /// Partition of the remote store this feed appends to.
    pub partition: String,
    /// Per-feed credentials; falls back to the process-wide ones when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl FeedConfig {
    pub fn new(
        name: impl Into<String>,
        target_url: impl Into<String>,
        partition: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target_url: target_url.into(),
            partition: partition.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Check the descriptor for values the store or the logs cannot carry.
    pub fn validate(&self) -> FeedResult<()> {
        if self.name.trim().is_empty() {
            return Err(FeedError::InvalidFeed("feed name is empty".to_string()));
        }
        if self.target_url.trim().is_empty() {
            return Err(FeedError::InvalidFeed(format!(
                "feed '{}' has an empty target address",
                self.name
            )));
        }
        validate_partition(&self.partition)
    }
}

/// Validate a store partition path such as `history` or `games/aviator2`.
pub fn validate_partition(partition: &str) -> FeedResult<()> {
    if partition.is_empty() {
        return Err(FeedError::InvalidPartition("partition is empty".to_string()));
    }
    if partition.starts_with('/') || partition.ends_with('/') || partition.contains("//") {
        return Err(FeedError::InvalidPartition(format!(
            "'{partition}' has an empty path segment"
        )));
    }
    if let Some(c) = partition
        .chars()
        .find(|c| FORBIDDEN_PARTITION_CHARS.contains(c) || c.is_control())
    {
        return Err(FeedError::InvalidPartition(format!(
            "'{partition}' contains forbidden character {c:?}"
        )));
    }
    Ok(())
}

/// Login credentials for the target surface.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Both fields carry something other than whitespace.
    pub fn is_usable(&self) -> bool {
        !self.email.trim().is_empty() && !self.password.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// A parsed magnitude and the wall-clock instant it was read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservedValue {
    pub magnitude: f64,
    pub observed_at: DateTime<FixedOffset>,
}

impl ObservedValue {
    pub fn new(magnitude: f64, observed_at: DateTime<FixedOffset>) -> Self {
        Self {
            magnitude,
            observed_at,
        }
    }
}

/// Errors raised by the core types.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("Invalid feed: {0}")]
    InvalidFeed(String),

    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    #[error("Invalid restart window: {0}")]
    InvalidWindow(String),
}

/// Convenience result type.
pub type FeedResult<T> = Result<T, FeedError>;
