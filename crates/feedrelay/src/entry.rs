//! Persisted entry records, classification bands, and entry keys.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::types::ObservedValue;

/// Key format: local date and time down to microseconds.
const ENTRY_KEY_FORMAT: &str = "%Y-%m-%d_%H-%M-%S-%6f";

/// Display class derived purely from the magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    #[serde(rename = "default-bg")]
    Default,
    #[serde(rename = "blue-bg")]
    Blue,
    #[serde(rename = "purple-bg")]
    Purple,
    #[serde(rename = "magenta-bg")]
    Magenta,
}

impl Classification {
    /// Fixed bands: `< 1` default, `[1, 2)` blue, `[2, 10)` purple, `>= 10` magenta.
    pub fn of(magnitude: f64) -> Self {
        if magnitude >= 10.0 {
            Self::Magenta
        } else if magnitude >= 2.0 {
            Self::Purple
        } else if magnitude >= 1.0 {
            Self::Blue
        } else {
            Self::Default
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default-bg",
            Self::Blue => "blue-bg",
            Self::Purple => "purple-bg",
            Self::Magenta => "magenta-bg",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write-once record appended to the store.
///
/// Field names follow the store layout consumers already read:
/// `multiplier`, `time`, `color`, `date`, all strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = "multiplier")]
    pub magnitude: String,
    pub time: String,
    #[serde(rename = "color")]
    pub classification: Classification,
    pub date: String,
}

impl Entry {
    pub fn from_observation(value: &ObservedValue) -> Self {
        Self {
            magnitude: format!("{:.2}", value.magnitude),
            time: value.observed_at.format("%H:%M:%S").to_string(),
            classification: Classification::of(value.magnitude),
            date: value.observed_at.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Derive the store key for an observation instant.
///
/// Microsecond resolution keeps keys from two feeds writing in the same
/// second apart and keeps a resumed feed from landing on an earlier key.
pub fn entry_key(instant: &DateTime<FixedOffset>) -> String {
    instant.format(ENTRY_KEY_FORMAT).to_string()
}
