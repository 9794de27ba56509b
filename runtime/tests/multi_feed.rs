//! Several feeds under one runner.

mod support;

use feedrelay::FeedConfig;
use feedrelay_runtime::events::FeedEvent;
use feedrelay_runtime::runner::MultiFeedRunner;
use std::collections::HashSet;
use std::time::Duration;
use support::{drain, supervisor_settings, Harness, World};

fn feeds() -> Vec<FeedConfig> {
    vec![
        FeedConfig::new("ORIGINAL", "https://example.test/aviator", "history"),
        FeedConfig::new("AVIATOR2", "https://example.test/aviator-2", "aviator2"),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_runner_starts_every_feed_and_stops_on_cancel() {
    let harness = Harness::new(World::ready().with_readings(&["1.50x"]));
    let mut rx = harness.events.subscribe();

    let runner = MultiFeedRunner::new(feeds(), harness.services.clone(), supervisor_settings())
        .with_stagger(Duration::from_secs(2));
    let shutdown = runner.cancellation_token();
    let task = tokio::spawn(runner.run());

    tokio::time::sleep(Duration::from_secs(5)).await;
    shutdown.cancel();
    task.await.unwrap();

    let events = drain(&mut rx);
    assert!(matches!(
        events.first(),
        Some(FeedEvent::RunnerStarted { feeds: 2, .. })
    ));
    assert!(matches!(events.last(), Some(FeedEvent::RunnerStopped)));

    let stopped: HashSet<&str> = events
        .iter()
        .filter_map(|e| match e {
            FeedEvent::FeedStopped { feed } => Some(feed.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(stopped, HashSet::from(["ORIGINAL", "AVIATOR2"]));

    // Each feed writes to its own partition.
    let writes = harness.sink.writes.lock().unwrap();
    let partitions: HashSet<&str> = writes.iter().map(|(p, _, _)| p.as_str()).collect();
    assert_eq!(partitions, HashSet::from(["history", "aviator2"]));

    let world = harness.world.lock().unwrap();
    assert_eq!(world.launches, 2);
    assert_eq!(world.quits, 2);
}

#[tokio::test(start_paused = true)]
async fn test_starts_are_staggered() {
    let harness = Harness::new(World::ready().with_readings(&["1.50x"]));
    let runner = MultiFeedRunner::new(feeds(), harness.services.clone(), supervisor_settings())
        .with_stagger(Duration::from_secs(10));
    let shutdown = runner.cancellation_token();
    let task = tokio::spawn(runner.run());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.world.lock().unwrap().launches, 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.world.lock().unwrap().launches, 2);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_stagger_skips_remaining_feeds() {
    let harness = Harness::new(World::ready().with_readings(&["1.50x"]));
    let runner = MultiFeedRunner::new(feeds(), harness.services.clone(), supervisor_settings())
        .with_stagger(Duration::from_secs(60));
    let shutdown = runner.cancellation_token();
    let task = tokio::spawn(runner.run());

    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown.cancel();
    task.await.unwrap();

    assert_eq!(harness.world.lock().unwrap().launches, 1);
}
