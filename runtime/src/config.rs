//! Relay configuration: a JSON file plus environment overrides.
//!
//! Every key except `feeds` has a default. Environment variables are applied
//! after the file so deployments can keep secrets out of it.

use crate::clock::{parse_offset, RestartWindow, SystemClock};
use crate::driver::LaunchOptions;
use crate::selectors::SelectorTable;
use crate::session::SessionSettings;
use crate::sink::{EntrySink, JsonlSink, RealtimeDbSink, SinkError, DEFAULT_QUEUE_CAPACITY};
use crate::supervisor::SupervisorSettings;
use chrono::FixedOffset;
use feedrelay::{Credentials, FeedConfig, FeedError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "feedrelay.json";
pub const DEFAULT_DATA_DIR: &str = "feedrelay-data";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("cannot build store: {0}")]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub feeds: Vec<FeedConfig>,
    /// Landing page with the login form. Login is skipped when absent.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub allow_anonymous: bool,
    /// Used by every feed that has no credentials of its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub restart_window: WindowConfig,
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    #[serde(default)]
    pub min_magnitude: Option<f64>,
    #[serde(default)]
    pub selectors: SelectorTable,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub sink: SinkConfig,
}

fn default_utc_offset() -> String {
    "-03:00".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub poll_interval_ms: u64,
    pub inactivity_secs: u64,
    pub recovery_delay_secs: u64,
    pub launch_backoff_secs: u64,
    pub stagger_secs: u64,
    pub navigation_timeout_secs: u64,
    pub frame_wait_secs: u64,
    pub container_wait_secs: u64,
    pub login_settle_ms: u64,
    pub relocate_attempts: u32,
    pub sink_timeout_secs: u64,
    pub teardown_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 150,
            inactivity_secs: 360,
            recovery_delay_secs: 5,
            launch_backoff_secs: 5,
            stagger_secs: 2,
            navigation_timeout_secs: 30,
            frame_wait_secs: 15,
            container_wait_secs: 10,
            login_settle_ms: 3000,
            relocate_attempts: 2,
            sink_timeout_secs: 10,
            teardown_secs: 15,
        }
    }
}

/// Local `"HH:MM"` bounds of the daily restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub start: String,
    pub end: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start: "00:00".to_string(),
            end: "00:05".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window: (u32, u32),
    pub chromium_path: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window: (1920, 1080),
            chromium_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    RealtimeDb {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth: Option<String>,
    },
    Jsonl {
        dir: PathBuf,
    },
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Jsonl {
            dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

/// `--config`, then `FEEDRELAY_CONFIG`, then `./feedrelay.json`.
pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| read_env_string("FEEDRELAY_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RelayConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Read the file and apply process environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&raw)?;
        config.apply_env(read_env_string);
        Ok(config)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let email = lookup("FEEDRELAY_EMAIL").or_else(|| lookup("EMAIL"));
        let password = lookup("FEEDRELAY_PASSWORD").or_else(|| lookup("PASSWORD"));
        if let (Some(email), Some(password)) = (email, password) {
            self.credentials = Some(Credentials::new(email, password));
        }

        if let Some(url) = lookup("FEEDRELAY_DB_URL") {
            let auth = match &self.sink {
                SinkConfig::RealtimeDb { auth, .. } => auth.clone(),
                SinkConfig::Jsonl { .. } => None,
            };
            self.sink = SinkConfig::RealtimeDb { url, auth };
        }
        if let Some(token) = lookup("FEEDRELAY_DB_AUTH") {
            if let SinkConfig::RealtimeDb { auth, .. } = &mut self.sink {
                *auth = Some(token);
            }
        }

        if let Some(path) = lookup("FEEDRELAY_CHROMIUM_PATH") {
            self.browser.chromium_path = Some(PathBuf::from(path));
        }
        if let Some(ms) = lookup("FEEDRELAY_POLL_MS").and_then(|v| v.parse().ok()) {
            self.timing.poll_interval_ms = ms;
        }
        if let Some(secs) = lookup("FEEDRELAY_INACTIVITY_SECS").and_then(|v| v.parse().ok()) {
            self.timing.inactivity_secs = secs;
        }
    }

    /// Refuse configurations the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feeds.is_empty() {
            return Err(ConfigError::Invalid("no feeds configured".to_string()));
        }

        let mut names = HashSet::new();
        let mut partitions = HashSet::new();
        for feed in &self.feeds {
            feed.validate()?;
            if !names.insert(feed.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate feed name '{}'", feed.name)));
            }
            if !partitions.insert(feed.partition.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "feeds share partition '{}'",
                    feed.partition
                )));
            }
            check_http_url(&feed.target_url, &format!("target of feed '{}'", feed.name))?;
            if !self.allow_anonymous && self.credentials_for(feed).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "feed '{}' has no credentials; set FEEDRELAY_EMAIL/FEEDRELAY_PASSWORD or allow_anonymous",
                    feed.name
                )));
            }
        }

        if let Some(base) = &self.base_url {
            check_http_url(base, "base_url")?;
        }

        let missing = self.selectors.missing_required();
        if !missing.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "empty selector tables: {}",
                missing.join(", ")
            )));
        }

        self.offset()?;
        self.window()?;

        if self.timing.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".to_string()));
        }
        if self.timing.inactivity_secs == 0 {
            return Err(ConfigError::Invalid("inactivity_secs must be positive".to_string()));
        }
        if let Some(floor) = self.min_magnitude {
            if !floor.is_finite() {
                return Err(ConfigError::Invalid("min_magnitude must be finite".to_string()));
            }
        }

        match &self.sink {
            SinkConfig::RealtimeDb { url, .. } => check_http_url(url, "sink url")?,
            SinkConfig::Jsonl { dir } if dir.as_os_str().is_empty() => {
                return Err(ConfigError::Invalid("jsonl sink needs a directory".to_string()));
            }
            SinkConfig::Jsonl { .. } => {}
        }
        Ok(())
    }

    fn credentials_for<'a>(&'a self, feed: &'a FeedConfig) -> Option<&'a Credentials> {
        feed.credentials
            .as_ref()
            .or(self.credentials.as_ref())
            .filter(|c| c.is_usable())
    }

    /// Feeds with the shared credentials filled in where they have none.
    pub fn resolved_feeds(&self) -> Vec<FeedConfig> {
        self.feeds
            .iter()
            .map(|feed| {
                let mut feed = feed.clone();
                if feed.credentials.is_none() {
                    feed.credentials = self.credentials.clone();
                }
                feed
            })
            .collect()
    }

    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        Ok(parse_offset(&self.utc_offset)?)
    }

    pub fn window(&self) -> Result<RestartWindow, ConfigError> {
        Ok(RestartWindow::parse(
            &self.restart_window.start,
            &self.restart_window.end,
        )?)
    }

    pub fn clock(&self) -> Result<SystemClock, ConfigError> {
        Ok(SystemClock::new(self.offset()?))
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_secs(self.timing.stagger_secs)
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            headless: self.browser.headless,
            window: self.browser.window,
            executable: self.browser.chromium_path.clone(),
            ..LaunchOptions::default()
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        let t = &self.timing;
        SessionSettings {
            launch: self.launch_options(),
            base_url: self.base_url.clone(),
            navigation_timeout: Duration::from_secs(t.navigation_timeout_secs),
            login_settle: Duration::from_millis(t.login_settle_ms),
            frame_wait: Duration::from_secs(t.frame_wait_secs),
            container_wait: Duration::from_secs(t.container_wait_secs),
            selectors: self.selectors.clone(),
        }
    }

    pub fn supervisor_settings(&self) -> Result<SupervisorSettings, ConfigError> {
        let t = &self.timing;
        Ok(SupervisorSettings {
            poll_interval: Duration::from_millis(t.poll_interval_ms),
            inactivity_timeout: Duration::from_secs(t.inactivity_secs),
            recovery_delay: Duration::from_secs(t.recovery_delay_secs),
            launch_backoff: Duration::from_secs(t.launch_backoff_secs),
            relocate_attempts: t.relocate_attempts,
            restart_window: self.window()?,
            min_magnitude: self.min_magnitude,
            sink_timeout: Duration::from_secs(t.sink_timeout_secs),
            teardown_timeout: Duration::from_secs(t.teardown_secs),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        })
    }

    pub fn build_sink(&self) -> Result<Arc<dyn EntrySink>, ConfigError> {
        let sink: Arc<dyn EntrySink> = match &self.sink {
            SinkConfig::RealtimeDb { url, auth } => Arc::new(RealtimeDbSink::new(
                url,
                auth.clone(),
                Duration::from_secs(self.timing.sink_timeout_secs),
            )?),
            SinkConfig::Jsonl { dir } => Arc::new(JsonlSink::new(dir.clone())),
        };
        Ok(sink)
    }

    /// The configuration as JSON with passwords and tokens masked.
    pub fn redacted(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        mask_secrets(&mut value);
        value
    }
}

fn check_http_url(raw: &str, what: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ConfigError::Invalid(format!("{what} '{raw}' is not a valid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!("{what} '{raw}' must be http or https")));
    }
    Ok(())
}

fn mask_secrets(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if matches!(key.as_str(), "password" | "auth") && !v.is_null() {
                    *v = serde_json::Value::String("***".to_string());
                } else {
                    mask_secrets(v);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(mask_secrets),
        _ => {}
    }
}
