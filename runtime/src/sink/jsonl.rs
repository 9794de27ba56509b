//! JSON-lines file sink for offline runs.
//!
//! Each partition is one file, `{dir}/{partition}.jsonl` with `/` replaced
//! by `_`, holding one `{"key": .., "entry": ..}` object per line.

use super::{EntrySink, SinkError};
use async_trait::async_trait;
use feedrelay::Entry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One stored line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonlRecord {
    pub key: String,
    pub entry: Entry,
}

pub struct JsonlSink {
    dir: PathBuf,
    // Serializes appends so lines from different feeds never interleave.
    lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn partition_path(&self, partition: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", partition.replace('/', "_")))
    }

    /// Read every record of a partition back, skipping malformed lines.
    pub async fn read_partition(&self, partition: &str) -> Result<Vec<JsonlRecord>, SinkError> {
        read_records(&self.partition_path(partition)).await
    }
}

async fn read_records(path: &Path) -> Result<Vec<JsonlRecord>, SinkError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(raw
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

#[async_trait]
impl EntrySink for JsonlSink {
    async fn append(&self, partition: &str, key: &str, entry: &Entry) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(&JsonlRecord {
            key: key.to_string(),
            entry: entry.clone(),
        })?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.partition_path(partition))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("jsonl {}", self.dir.display())
    }
}
