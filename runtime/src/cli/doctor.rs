//! Environment readiness check.

use crate::config::{resolve_path, RelayConfig};
use crate::driver::chromium::find_chromium;
use anyhow::Result;
use std::path::PathBuf;

/// Check Chromium availability and configuration validity.
pub fn run(config_path: Option<PathBuf>) -> Result<()> {
    println!("FeedRelay Doctor");
    println!("================");
    println!();

    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let path = resolve_path(config_path);
    let config = match RelayConfig::load(&path) {
        Ok(config) => {
            println!("[OK] Configuration loaded: {}", path.display());
            Some(config)
        }
        Err(e) => {
            println!("[!!] Configuration not loaded: {e}");
            None
        }
    };

    let valid = match &config {
        Some(config) => match config.validate() {
            Ok(()) => {
                println!("[OK] Configuration valid ({} feeds)", config.feeds.len());
                true
            }
            Err(e) => {
                println!("[!!] Configuration invalid: {e}");
                false
            }
        },
        None => false,
    };

    let explicit = config.as_ref().and_then(|c| c.browser.chromium_path.clone());
    let chromium = find_chromium(explicit.as_deref());
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome/Chromium or set FEEDRELAY_CHROMIUM_PATH."
        ),
    }

    if let Some(config) = &config {
        match config.build_sink() {
            Ok(sink) => println!("[OK] Store: {}", sink.describe()),
            Err(e) => println!("[!!] Store: {e}"),
        }
        if config.credentials.is_none() && config.feeds.iter().all(|f| f.credentials.is_none()) {
            println!("[??] No credentials; feeds will run anonymously");
        }
    }

    println!();
    if valid && chromium.is_some() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}
