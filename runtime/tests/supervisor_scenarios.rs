//! Supervisor state machine driven against the scripted browser.

mod support;

use feedrelay::{Classification, FeedConfig};
use feedrelay_runtime::events::FeedEvent;
use feedrelay_runtime::supervisor::{FeedState, FeedSupervisor, SupervisorSettings};
use std::sync::Arc;
use std::time::Duration;
use support::{
    drain, local, session_settings, supervisor_settings, FailingSink, Harness, World,
};
use tokio_util::sync::CancellationToken;

fn feed() -> FeedConfig {
    FeedConfig::new("ORIGINAL", "https://example.test/aviator", "history")
}

/// Run one supervisor for `secs` of (paused) time, then cancel it.
async fn run_for(harness: &Harness, settings: SupervisorSettings, secs: u64) -> Vec<FeedEvent> {
    run_with(harness, settings, secs, |_| {}).await
}

async fn run_with<F>(
    harness: &Harness,
    settings: SupervisorSettings,
    secs: u64,
    midway: F,
) -> Vec<FeedEvent>
where
    F: FnOnce(&Harness),
{
    let mut rx = harness.events.subscribe();
    let shutdown = CancellationToken::new();
    let supervisor = FeedSupervisor::new(feed(), harness.services.clone(), settings);
    let task = tokio::spawn(supervisor.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_secs(2)).await;
    midway(harness);
    tokio::time::sleep(Duration::from_secs(secs.saturating_sub(2))).await;

    shutdown.cancel();
    task.await.unwrap();
    drain(&mut rx)
}

fn states(events: &[FeedEvent]) -> Vec<FeedState> {
    events
        .iter()
        .filter_map(|e| match e {
            FeedEvent::StateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

fn recoveries(events: &[FeedEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            FeedEvent::Recovering { cause, .. } => Some(cause.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_reading_stream_emits_distinct_values() {
    let harness = Harness::new(World::ready().with_readings(&["", "1.50x", "1.50x", "2.00x"]));
    let events = run_for(&harness, supervisor_settings(), 5).await;

    let entries = harness.sink.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].magnitude, "1.50");
    assert_eq!(entries[0].classification, Classification::Blue);
    assert_eq!(entries[1].magnitude, "2.00");
    assert_eq!(entries[1].classification, Classification::Purple);

    let writes = harness.sink.writes.lock().unwrap();
    assert!(writes.iter().all(|(partition, _, _)| partition == "history"));
    assert_ne!(writes[0].1, writes[1].1);
    drop(writes);

    assert_eq!(
        states(&events),
        vec![
            FeedState::Starting,
            FeedState::Authenticating,
            FeedState::Locating,
            FeedState::Polling
        ]
    );
    assert!(recoveries(&events).is_empty());
    assert!(matches!(events.last(), Some(FeedEvent::FeedStopped { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_inactivity_recovers_once_and_re_emits() {
    let harness = Harness::new(World::ready().with_readings(&["1.50x"]));
    // Inactivity ceiling is 30s; one recovery fits in 50s, a second does not.
    let events = run_for(&harness, supervisor_settings(), 50).await;

    let causes = recoveries(&events);
    assert_eq!(causes.len(), 1, "{causes:?}");
    assert!(causes[0].starts_with("no new value"));

    let seq = states(&events);
    let polling_to_recovering = seq
        .windows(3)
        .filter(|w| **w == [FeedState::Polling, FeedState::Recovering, FeedState::Starting])
        .count();
    assert_eq!(polling_to_recovering, 1);

    // The baseline does not survive the teardown.
    assert_eq!(harness.sink.magnitudes(), vec!["1.50", "1.50"]);

    let world = harness.world.lock().unwrap();
    assert_eq!(world.launches, 2);
    assert_eq!(world.quits, 2);
}

#[tokio::test(start_paused = true)]
async fn test_stale_container_relocates_without_teardown() {
    let harness = Harness::new(World::ready().with_readings(&["1.50x"]));
    let events = run_with(&harness, supervisor_settings(), 6, |h| {
        h.world.lock().unwrap().stale_reads = 1;
    })
    .await;

    assert!(recoveries(&events).is_empty());
    assert_eq!(
        states(&events),
        vec![
            FeedState::Starting,
            FeedState::Authenticating,
            FeedState::Locating,
            FeedState::Polling,
            FeedState::Locating,
            FeedState::Polling
        ]
    );
    // Same session, same baseline: the value is not written twice.
    assert_eq!(harness.sink.magnitudes(), vec!["1.50"]);
    assert_eq!(harness.world.lock().unwrap().launches, 1);
}

#[tokio::test(start_paused = true)]
async fn test_lost_container_escalates_to_recovery() {
    let harness = Harness::new(World::ready().with_readings(&["1.50x"]));
    let events = run_with(&harness, supervisor_settings(), 6, |h| {
        h.world.lock().unwrap().present.remove(support::CONTAINER);
    })
    .await;

    let causes = recoveries(&events);
    assert!(!causes.is_empty());
    assert_eq!(causes[0], "container lost and re-location failed");
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_restart_once_per_day() {
    let harness = Harness::with_settings(
        World::ready().with_readings(&["1.50x"]),
        session_settings(),
        local(2026, 5, 1, 23, 59, 0),
    );
    let events = run_with(&harness, supervisor_settings(), 20, |h| {
        h.clock.set(local(2026, 5, 2, 0, 1, 0));
    })
    .await;

    let restarts: Vec<&String> = events
        .iter()
        .filter_map(|e| match e {
            FeedEvent::ScheduledRestart { date, .. } => Some(date),
            _ => None,
        })
        .collect();
    assert_eq!(restarts, vec!["2026-05-02"]);
    assert_eq!(recoveries(&events), vec!["scheduled restart".to_string()]);
    assert_eq!(harness.world.lock().unwrap().launches, 2);
}

#[tokio::test(start_paused = true)]
async fn test_launch_failures_back_off_and_retry() {
    let mut world = World::ready().with_readings(&["3.10x"]);
    world.fail_launches = 2;
    let harness = Harness::new(world);
    let events = run_for(&harness, supervisor_settings(), 14).await;

    let causes = recoveries(&events);
    assert_eq!(causes.len(), 2);
    assert!(causes.iter().all(|c| c.starts_with("browser launch failed")));
    assert_eq!(harness.world.lock().unwrap().launches, 1);
    assert_eq!(harness.sink.magnitudes(), vec!["3.10"]);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_failure_recovers() {
    let mut world = World::ready();
    world.fail_navigation = true;
    let harness = Harness::new(world);
    let events = run_for(&harness, supervisor_settings(), 4).await;

    assert_eq!(recoveries(&events).first().map(String::as_str), Some("feed view did not load"));
    assert!(harness.sink.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_floor_filters_small_readings() {
    let harness = Harness::new(World::ready().with_readings(&["0.50x", "1.20x"]));
    let settings = SupervisorSettings {
        min_magnitude: Some(1.0),
        ..supervisor_settings()
    };
    run_for(&harness, settings, 3).await;
    assert_eq!(harness.sink.magnitudes(), vec!["1.20"]);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_quits_session() {
    let harness = Harness::new(World::ready().with_readings(&["1.00x"]));
    let events = run_for(&harness, supervisor_settings(), 3).await;

    let world = harness.world.lock().unwrap();
    assert_eq!(world.launches, 1);
    assert_eq!(world.quits, 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, FeedEvent::FeedStopped { feed } if feed == "ORIGINAL")));
}

#[tokio::test(start_paused = true)]
async fn test_hung_browser_quit_is_abandoned() {
    let mut world = World::ready().with_readings(&["1.50x"]);
    world.hang_quit = true;
    let harness = Harness::new(world);
    let mut rx = harness.events.subscribe();
    let shutdown = CancellationToken::new();
    let supervisor = FeedSupervisor::new(feed(), harness.services.clone(), supervisor_settings());
    let task = tokio::spawn(supervisor.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(harness.world.lock().unwrap().launches >= 2);

    shutdown.cancel();
    let joined = tokio::time::timeout(Duration::from_secs(60), task).await;
    assert!(joined.is_ok(), "supervisor did not stop after cancel");

    let events = drain(&mut rx);
    let causes = recoveries(&events);
    assert!(causes.len() >= 2, "{causes:?}");
    assert!(causes.iter().all(|c| c.starts_with("no new value")));
    assert!(matches!(events.last(), Some(FeedEvent::FeedStopped { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_slow_page_load_still_reaches_polling() {
    let mut world = World::ready().with_readings(&["1.50x"]);
    world.slow_navigation = true;
    let harness = Harness::new(world);
    let events = run_for(&harness, supervisor_settings(), 5).await;

    assert!(recoveries(&events).is_empty());
    assert_eq!(
        states(&events),
        vec![
            FeedState::Starting,
            FeedState::Authenticating,
            FeedState::Locating,
            FeedState::Polling
        ]
    );
    assert_eq!(harness.sink.magnitudes(), vec!["1.50"]);
}

#[tokio::test(start_paused = true)]
async fn test_store_failures_do_not_interrupt_capture() {
    let mut harness = Harness::new(World::ready().with_readings(&["1.10x", "1.20x", "1.30x"]));
    let failing = Arc::new(FailingSink::default());
    harness.services.sink = failing.clone();
    let events = run_for(&harness, supervisor_settings(), 5).await;

    let captured = events
        .iter()
        .filter(|e| matches!(e, FeedEvent::ValueCaptured { .. }))
        .count();
    let failed = events
        .iter()
        .filter(|e| matches!(e, FeedEvent::SinkFailed { .. }))
        .count();
    assert_eq!(captured, 3);
    assert_eq!(failed, 3);
    assert_eq!(*failing.attempts.lock().unwrap(), 3);

    assert!(recoveries(&events).is_empty());
    assert_eq!(states(&events).last(), Some(&FeedState::Polling));
    assert_eq!(harness.world.lock().unwrap().launches, 1);
}
