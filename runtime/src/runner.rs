//! Runs one supervisor per feed under a shared cancellation scope.

use crate::events::FeedEvent;
use crate::supervisor::{FeedServices, FeedSupervisor, SupervisorSettings};
use feedrelay::FeedConfig;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub struct MultiFeedRunner {
    feeds: Vec<FeedConfig>,
    services: FeedServices,
    settings: SupervisorSettings,
    stagger: Duration,
    shutdown: CancellationToken,
}

impl MultiFeedRunner {
    pub fn new(
        feeds: Vec<FeedConfig>,
        services: FeedServices,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            feeds,
            services,
            settings,
            stagger: Duration::from_secs(2),
            shutdown: CancellationToken::new(),
        }
    }

    /// Delay between consecutive feed starts.
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Root token; cancelling it stops every feed.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start every feed and wait until all of them have stopped.
    ///
    /// Feeds only stop on cancellation, so under normal operation this never
    /// returns.
    pub async fn run(self) {
        let MultiFeedRunner {
            feeds,
            services,
            settings,
            stagger,
            shutdown,
        } = self;

        services.events.emit(FeedEvent::RunnerStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            feeds: feeds.len(),
        });
        tracing::info!(feeds = feeds.len(), sink = %services.sink.describe(), "runner started");

        let mut tasks = JoinSet::new();
        for (i, feed) in feeds.into_iter().enumerate() {
            if i > 0 && !stagger.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(stagger) => {}
                }
            }
            tracing::info!(feed = %feed.name, partition = %feed.partition, "starting feed");
            let supervisor = FeedSupervisor::new(feed, services.clone(), settings.clone());
            tasks.spawn(supervisor.run(shutdown.child_token()));
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("feed task ended abnormally: {e}");
            }
        }

        tracing::info!("runner stopped");
        services.events.emit(FeedEvent::RunnerStopped);
    }

    /// Run until Ctrl-C or until the token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(self) {
        let shutdown = self.shutdown.clone();
        let signal_watch = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl-C received; stopping feeds");
                    signal_watch.cancel();
                }
                _ = signal_watch.cancelled() => {}
            }
        });
        self.run().await;
        shutdown.cancel();
    }
}
