//! Per-feed fault-recovery state machine.
//!
//! ```text
//! STARTING → AUTHENTICATING → LOCATING → POLLING
//!     ↑                          ↑          │
//!     │                          └──────────┤ stale container (cheap re-locate)
//!     └──────────── RECOVERING ←────────────┘ anything else
//! ```
//!
//! Every failure in every state ends up in `Recovering`, which tears the
//! whole session down and starts over. The loop only ends on cancellation.

use crate::clock::{Clock, RestartWindow};
use crate::driver::DriverError;
use crate::events::{EventBus, FeedEvent};
use crate::extractor::SignalExtractor;
use crate::session::{Session, SessionManager};
use crate::sink::{EntrySink, SinkWriter, DEFAULT_QUEUE_CAPACITY};
use chrono::NaiveDate;
use feedrelay::{entry_key, Entry, FeedConfig, ObservedValue, Poll};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Supervisor states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    Starting,
    Authenticating,
    Locating,
    Polling,
    Recovering,
}

/// Why a session is being torn down.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryCause {
    LaunchFailed(String),
    LandingPageFailed,
    NavigationFailed,
    TargetNotFound,
    TargetLost,
    DriverFailed(String),
    Inactive(Duration),
    ScheduledRestart,
}

impl std::fmt::Display for RecoveryCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoveryCause::LaunchFailed(e) => write!(f, "{e}"),
            RecoveryCause::LandingPageFailed => f.write_str("landing page did not load"),
            RecoveryCause::NavigationFailed => f.write_str("feed view did not load"),
            RecoveryCause::TargetNotFound => f.write_str("frame or container not found"),
            RecoveryCause::TargetLost => f.write_str("container lost and re-location failed"),
            RecoveryCause::DriverFailed(e) => write!(f, "driver failure: {e}"),
            RecoveryCause::Inactive(d) => write!(f, "no new value for {}s", d.as_secs()),
            RecoveryCause::ScheduledRestart => f.write_str("scheduled restart"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub poll_interval: Duration,
    /// Longest stretch without a new value before the session counts as stalled.
    pub inactivity_timeout: Duration,
    pub recovery_delay: Duration,
    /// Delay after a failed browser launch.
    pub launch_backoff: Duration,
    /// Re-location tries after a stale container before full recovery.
    pub relocate_attempts: u32,
    pub restart_window: RestartWindow,
    pub min_magnitude: Option<f64>,
    pub sink_timeout: Duration,
    /// Longest wait for a browser to shut down before it is abandoned.
    pub teardown_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(150),
            inactivity_timeout: Duration::from_secs(360),
            recovery_delay: Duration::from_secs(5),
            launch_backoff: Duration::from_secs(5),
            relocate_attempts: 2,
            restart_window: RestartWindow::default(),
            min_magnitude: None,
            sink_timeout: Duration::from_secs(10),
            teardown_timeout: Duration::from_secs(15),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Collaborators shared by every supervisor of a runner.
#[derive(Clone)]
pub struct FeedServices {
    pub sessions: Arc<SessionManager>,
    pub sink: Arc<dyn EntrySink>,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
}

/// Everything a supervisor owns for the duration of one run.
struct RunState {
    session: Option<Session>,
    extractor: SignalExtractor,
    last_value_at: Instant,
    restart_day: NaiveDate,
    relocating: bool,
    cause: Option<RecoveryCause>,
}

pub struct FeedSupervisor {
    feed: FeedConfig,
    services: FeedServices,
    settings: SupervisorSettings,
}

impl FeedSupervisor {
    pub fn new(feed: FeedConfig, services: FeedServices, settings: SupervisorSettings) -> Self {
        Self {
            feed,
            services,
            settings,
        }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let writer = SinkWriter::spawn(
            &self.feed.name,
            &self.feed.partition,
            Arc::clone(&self.services.sink),
            self.settings.sink_timeout,
            self.settings.queue_capacity,
            self.services.events.clone(),
        );
        let value_lookups = self.services.sessions.settings().selectors.value.clone();
        let mut run = RunState {
            session: None,
            extractor: SignalExtractor::new(value_lookups, self.settings.min_magnitude),
            last_value_at: Instant::now(),
            restart_day: self.services.clock.now().date_naive(),
            relocating: false,
            cause: None,
        };

        let mut state = FeedState::Starting;
        loop {
            self.enter(state);
            let next = match state {
                FeedState::Starting => self.start(&mut run, &shutdown).await,
                FeedState::Authenticating => self.authenticate(&mut run, &shutdown).await,
                FeedState::Locating => self.locate(&mut run, &shutdown).await,
                FeedState::Polling => self.poll(&mut run, &writer, &shutdown).await,
                FeedState::Recovering => self.recover(&mut run, &shutdown).await,
            };
            match next {
                Some(next) => state = next,
                None => break,
            }
        }

        // Shutdown is already requested here, so only the timeout bounds the close.
        if let Some(session) = run.session.take() {
            self.close_session(session, &CancellationToken::new()).await;
        }
        writer.close().await;
        tracing::info!(feed = %self.feed.name, "feed stopped");
        self.services.events.emit(FeedEvent::FeedStopped {
            feed: self.feed.name.clone(),
        });
    }

    fn enter(&self, state: FeedState) {
        tracing::info!(feed = %self.feed.name, ?state, "state change");
        self.services.events.emit(FeedEvent::StateChanged {
            feed: self.feed.name.clone(),
            state,
        });
    }

    fn fail(&self, run: &mut RunState, cause: RecoveryCause) -> Option<FeedState> {
        run.cause = Some(cause);
        Some(FeedState::Recovering)
    }

    async fn start(&self, run: &mut RunState, shutdown: &CancellationToken) -> Option<FeedState> {
        tracing::info!(feed = %self.feed.name, "starting browser");
        match cancellable(shutdown, self.services.sessions.open()).await? {
            Ok(session) => {
                run.session = Some(session);
                Some(FeedState::Authenticating)
            }
            Err(e) => self.fail(run, RecoveryCause::LaunchFailed(e.to_string())),
        }
    }

    async fn authenticate(
        &self,
        run: &mut RunState,
        shutdown: &CancellationToken,
    ) -> Option<FeedState> {
        let Some(session) = run.session.as_mut() else {
            return Some(FeedState::Starting);
        };
        let sessions = &self.services.sessions;

        let logged_in = cancellable(
            shutdown,
            sessions.authenticate(session, self.feed.credentials.as_ref()),
        )
        .await?;
        if !logged_in {
            return self.fail(run, RecoveryCause::LandingPageFailed);
        }

        let loaded = cancellable(
            shutdown,
            sessions.navigate(session, &self.feed.target_url),
        )
        .await?;
        if !loaded {
            return self.fail(run, RecoveryCause::NavigationFailed);
        }
        run.relocating = false;
        Some(FeedState::Locating)
    }

    async fn locate(&self, run: &mut RunState, shutdown: &CancellationToken) -> Option<FeedState> {
        let Some(session) = run.session.as_mut() else {
            return Some(FeedState::Starting);
        };

        let attempts = if run.relocating {
            self.settings.relocate_attempts.max(1)
        } else {
            1
        };
        let mut found = session.target().is_some();
        let mut attempt = 0;
        while !found && attempt < attempts {
            attempt += 1;
            found = cancellable(shutdown, self.services.sessions.locate(session)).await?;
        }

        if !found {
            let cause = if run.relocating {
                RecoveryCause::TargetLost
            } else {
                RecoveryCause::TargetNotFound
            };
            return self.fail(run, cause);
        }

        if run.relocating {
            // Same session: keep the baseline so a re-found value is not emitted twice.
            tracing::info!(
                feed = %self.feed.name,
                baseline = ?run.extractor.baseline(),
                "container re-located"
            );
        } else {
            run.extractor.reset();
            run.last_value_at = Instant::now();
            tracing::info!(feed = %self.feed.name, session = %session.id, "monitoring");
        }
        run.relocating = false;
        Some(FeedState::Polling)
    }

    async fn poll(
        &self,
        run: &mut RunState,
        writer: &SinkWriter,
        shutdown: &CancellationToken,
    ) -> Option<FeedState> {
        let Some(container) = run
            .session
            .as_ref()
            .and_then(|s| s.target())
            .map(|t| t.container.clone())
        else {
            return Some(FeedState::Starting);
        };

        loop {
            let now = self.services.clock.now();
            if self.settings.restart_window.is_due(&now, run.restart_day) {
                run.restart_day = now.date_naive();
                tracing::info!(feed = %self.feed.name, "scheduled restart");
                self.services.events.emit(FeedEvent::ScheduledRestart {
                    feed: self.feed.name.clone(),
                    date: run.restart_day.to_string(),
                });
                return self.fail(run, RecoveryCause::ScheduledRestart);
            }

            let idle = run.last_value_at.elapsed();
            if idle > self.settings.inactivity_timeout {
                return self.fail(run, RecoveryCause::Inactive(idle));
            }

            let Some(session) = run.session.as_mut() else {
                return Some(FeedState::Starting);
            };
            let polled = cancellable(
                shutdown,
                run.extractor.poll(session.driver_mut(), &container),
            )
            .await?;

            match polled {
                Ok(Poll::NewValue(magnitude)) => {
                    run.last_value_at = Instant::now();
                    let value = ObservedValue::new(magnitude, self.services.clock.now());
                    self.emit_value(writer, value);
                }
                Ok(Poll::NoChange) | Ok(Poll::Unreadable) => {}
                Err(e) if e.is_structural() || matches!(e, DriverError::Timeout(_)) => {
                    tracing::warn!(feed = %self.feed.name, "container handle failed: {e}");
                    session.forget_target();
                    run.relocating = true;
                    return Some(FeedState::Locating);
                }
                Err(e) => return self.fail(run, RecoveryCause::DriverFailed(e.to_string())),
            }

            cancellable(shutdown, tokio::time::sleep(self.settings.poll_interval)).await?;
        }
    }

    fn emit_value(&self, writer: &SinkWriter, value: ObservedValue) {
        let entry = Entry::from_observation(&value);
        let key = entry_key(&value.observed_at);
        tracing::info!(
            feed = %self.feed.name,
            key = %key,
            color = %entry.classification,
            "{:.2}x",
            value.magnitude
        );
        self.services.events.emit(FeedEvent::ValueCaptured {
            feed: self.feed.name.clone(),
            key: key.clone(),
            magnitude: entry.magnitude.clone(),
            classification: entry.classification,
        });
        writer.submit(key, entry);
    }

    async fn recover(&self, run: &mut RunState, shutdown: &CancellationToken) -> Option<FeedState> {
        let cause = run
            .cause
            .take()
            .unwrap_or(RecoveryCause::DriverFailed("unknown".to_string()));
        let delay = match cause {
            RecoveryCause::ScheduledRestart => Duration::ZERO,
            RecoveryCause::LaunchFailed(_) => self.settings.launch_backoff,
            _ => self.settings.recovery_delay,
        };
        tracing::warn!(
            feed = %self.feed.name,
            "recovering: {cause}; restarting in {}s",
            delay.as_secs()
        );
        self.services.events.emit(FeedEvent::Recovering {
            feed: self.feed.name.clone(),
            cause: cause.to_string(),
        });

        if let Some(session) = run.session.take() {
            if !self.close_session(session, shutdown).await {
                return None;
            }
        }
        run.extractor.reset();
        run.relocating = false;

        cancellable(shutdown, tokio::time::sleep(delay)).await?;
        Some(FeedState::Starting)
    }

    /// Quit the browser, giving up after the teardown timeout. Returns
    /// `false` if `shutdown` fired first.
    async fn close_session(&self, session: Session, shutdown: &CancellationToken) -> bool {
        let id = session.id.clone();
        tracing::debug!(
            feed = %self.feed.name,
            session = %id,
            "closing session after {}s",
            session.age().as_secs()
        );
        let limit = self.settings.teardown_timeout;
        match cancellable(shutdown, tokio::time::timeout(limit, session.close())).await {
            None => false,
            Some(Ok(Ok(()))) => true,
            Some(Ok(Err(e))) => {
                tracing::debug!(
                    feed = %self.feed.name,
                    session = %id,
                    "teardown error ignored: {e}"
                );
                true
            }
            Some(Err(_)) => {
                tracing::warn!(
                    feed = %self.feed.name,
                    session = %id,
                    "browser did not shut down within {}s, abandoning it",
                    limit.as_secs()
                );
                true
            }
        }
    }
}

/// Run `fut` unless `shutdown` fires first; `None` means cancelled.
async fn cancellable<F: Future>(shutdown: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        out = fut => Some(out),
    }
}

