//! Start every configured feed and relay until Ctrl-C.

use super::load_config;
use crate::driver::chromium::ChromiumLauncher;
use crate::events::{event_matches_feed, EventBus};
use crate::runner::MultiFeedRunner;
use crate::session::SessionManager;
use crate::supervisor::FeedServices;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

pub async fn run(
    config_path: Option<PathBuf>,
    only: Option<String>,
    print_events: bool,
) -> Result<()> {
    let (path, mut config) = load_config(config_path)?;
    if let Some(name) = &only {
        config.feeds.retain(|f| &f.name == name);
        if config.feeds.is_empty() {
            bail!("no feed named '{name}' in {}", path.display());
        }
    }
    config
        .validate()
        .with_context(|| format!("refusing to start with {}", path.display()))?;

    let events = EventBus::default();
    if print_events {
        spawn_event_printer(&events, only);
    }

    let services = FeedServices {
        sessions: Arc::new(SessionManager::new(
            Arc::new(ChromiumLauncher::new()),
            config.session_settings(),
        )),
        sink: config.build_sink()?,
        clock: Arc::new(config.clock()?),
        events,
    };

    let runner = MultiFeedRunner::new(
        config.resolved_feeds(),
        services,
        config.supervisor_settings()?,
    )
    .with_stagger(config.stagger());

    runner.run_until_ctrl_c().await;
    Ok(())
}

/// Print events as JSON lines on stdout, optionally for one feed only.
fn spawn_event_printer(events: &EventBus, feed: Option<String>) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) if feed.as_deref().is_some_and(|f| !event_matches_feed(&event, f)) => {}
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::debug!("event not serializable: {e}"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("event printer lagged, {n} events skipped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
