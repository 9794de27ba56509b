//! Log subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber, writing to stderr.
///
/// Filter: `RUST_LOG`, then `level`, then `FEEDRELAY_LOG`, then `info`.
pub fn init(level: Option<&str>, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let fallback = level
            .map(str::to_string)
            .or_else(|| std::env::var("FEEDRELAY_LOG").ok())
            .unwrap_or_else(|| "info".to_string());
        EnvFilter::try_new(&fallback).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = installed {
        eprintln!("logging already initialised: {e}");
    }
}
