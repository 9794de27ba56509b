//! Realtime-database REST sink.
//!
//! Writes `PUT {base}/{partition}/{key}.json` with the entry as the body.
//! A `PUT` to a fresh key is an append; replaying the same key overwrites
//! it with identical content, which is how duplicate writes collapse.

use super::{EntrySink, SinkError};
use async_trait::async_trait;
use feedrelay::Entry;
use std::time::Duration;
use url::Url;

pub struct RealtimeDbSink {
    client: reqwest::Client,
    base: Url,
    auth: Option<String>,
}

impl RealtimeDbSink {
    pub fn new(base_url: &str, auth: Option<String>, timeout: Duration) -> Result<Self, SinkError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| SinkError::Config(format!("bad store url '{base_url}': {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(SinkError::Config(format!(
                "store url '{base_url}' must be http or https"
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("feedrelay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base,
            auth: auth.filter(|a| !a.is_empty()),
        })
    }

    /// Address of one record.
    pub fn record_url(&self, partition: &str, key: &str) -> Result<Url, SinkError> {
        let mut url = self
            .base
            .join(&format!("{partition}/{key}.json"))
            .map_err(|e| SinkError::Config(format!("bad record path: {e}")))?;
        if let Some(auth) = &self.auth {
            url.query_pairs_mut().append_pair("auth", auth);
        }
        Ok(url)
    }
}

#[async_trait]
impl EntrySink for RealtimeDbSink {
    async fn append(&self, partition: &str, key: &str, entry: &Entry) -> Result<(), SinkError> {
        let url = self.record_url(partition, key)?;
        let response = self.client.put(url).json(entry).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }

    fn describe(&self) -> String {
        format!("realtime-db {}", self.base)
    }
}
