//! CLI subcommand implementations for the FeedRelay binary.

pub mod check_cmd;
pub mod doctor;
pub mod run_cmd;

use crate::config::{resolve_path, RelayConfig};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Load the configuration the way every subcommand does.
pub fn load_config(explicit: Option<PathBuf>) -> Result<(PathBuf, RelayConfig)> {
    let path = resolve_path(explicit);
    let config = RelayConfig::load(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    Ok((path, config))
}
