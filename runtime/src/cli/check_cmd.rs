//! Validate the configuration and print it with secrets masked.

use super::load_config;
use anyhow::Result;
use std::path::PathBuf;

pub fn run(config_path: Option<PathBuf>) -> Result<()> {
    let (path, config) = load_config(config_path)?;
    let rendered = serde_json::to_string_pretty(&config.redacted())?;
    println!("{rendered}");

    match config.validate() {
        Ok(()) => {
            eprintln!("{}: OK ({} feeds)", path.display(), config.feeds.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            std::process::exit(1);
        }
    }
}
