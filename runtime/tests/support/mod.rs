//! Scripted in-memory browser, recording store and settable clock shared by
//! the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, TimeZone};
use feedrelay::Entry;
use feedrelay_runtime::clock::Clock;
use feedrelay_runtime::driver::{
    DriverError, DriverResult, DriverSession, ElementRef, LaunchOptions, Launcher, Lookup,
};
use feedrelay_runtime::events::{EventBus, FeedEvent};
use feedrelay_runtime::selectors::SelectorTable;
use feedrelay_runtime::session::{SessionManager, SessionSettings};
use feedrelay_runtime::sink::{EntrySink, SinkError};
use feedrelay_runtime::supervisor::{FeedServices, SupervisorSettings};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const FRAME: &str = "//iframe[contains(@src,'aviator')]";
pub const CONTAINER: &str = ".payouts-block";
pub const VALUE: &str = ".payout:first-child";

/// What the fake page looks like, shared by every session it launches.
#[derive(Debug, Default)]
pub struct World {
    /// Selectors that currently match something.
    pub present: HashSet<String>,
    /// Texts returned by successive value reads; the last one repeats.
    pub readings: VecDeque<String>,
    /// The next N value reads fail with a stale element.
    pub stale_reads: u32,
    /// The next N launches fail.
    pub fail_launches: u32,
    /// Navigation is refused outright.
    pub fail_navigation: bool,
    /// Navigation never reports the page as loaded.
    pub slow_navigation: bool,
    /// Browsers never finish quitting.
    pub hang_quit: bool,

    pub launches: u32,
    pub quits: u32,
    pub navigations: Vec<String>,
    pub lookups: Vec<String>,
    pub clicks: Vec<String>,
    pub fills: Vec<(String, String)>,
}

impl World {
    /// A page whose frame, container and value all resolve.
    pub fn ready() -> Self {
        let mut world = World::default();
        for selector in [FRAME, CONTAINER, VALUE] {
            world.present.insert(selector.to_string());
        }
        world
    }

    pub fn with_readings(mut self, readings: &[&str]) -> Self {
        self.readings = readings.iter().map(|r| r.to_string()).collect();
        self
    }

    fn next_reading(&mut self) -> String {
        if self.readings.len() > 1 {
            self.readings.pop_front().unwrap_or_default()
        } else {
            self.readings.front().cloned().unwrap_or_default()
        }
    }
}

pub type SharedWorld = Arc<Mutex<World>>;

pub fn shared(world: World) -> SharedWorld {
    Arc::new(Mutex::new(world))
}

pub struct FakeLauncher {
    pub world: SharedWorld,
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, _options: &LaunchOptions) -> DriverResult<Box<dyn DriverSession>> {
        let mut world = self.world.lock().unwrap();
        if world.fail_launches > 0 {
            world.fail_launches -= 1;
            return Err(DriverError::Launch("scripted launch failure".to_string()));
        }
        world.launches += 1;
        Ok(Box::new(FakeSession {
            world: Arc::clone(&self.world),
            frames: Vec::new(),
        }))
    }
}

pub struct FakeSession {
    world: SharedWorld,
    frames: Vec<Vec<Lookup>>,
}

impl FakeSession {
    pub fn new(world: SharedWorld) -> Self {
        Self {
            world,
            frames: Vec::new(),
        }
    }
}

fn resolves(world: &World, element: &ElementRef) -> bool {
    element
        .chain()
        .iter()
        .all(|lookup| world.present.contains(&lookup.selector))
}

#[async_trait]
impl DriverSession for FakeSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> DriverResult<()> {
        let mut world = self.world.lock().unwrap();
        world.navigations.push(url.to_string());
        self.frames.clear();
        if world.fail_navigation {
            return Err(DriverError::Navigation(format!("{url}: net::ERR_NAME_NOT_RESOLVED")));
        }
        if world.slow_navigation {
            return Err(DriverError::Timeout(timeout));
        }
        Ok(())
    }

    async fn switch_to_frame(&mut self, frame: &ElementRef) -> DriverResult<()> {
        self.frames.push(frame.chain().to_vec());
        Ok(())
    }

    async fn switch_to_root(&mut self) -> DriverResult<()> {
        self.frames.clear();
        Ok(())
    }

    async fn find_element(
        &mut self,
        lookup: &Lookup,
        within: Option<&ElementRef>,
    ) -> DriverResult<Option<ElementRef>> {
        let mut world = self.world.lock().unwrap();
        world.lookups.push(lookup.selector.clone());
        if let Some(parent) = within {
            if !resolves(&world, parent) {
                return Err(DriverError::StaleElement(parent.chain().len().to_string()));
            }
        }
        if !world.present.contains(&lookup.selector) {
            return Ok(None);
        }
        Ok(Some(match within {
            Some(parent) => parent.child(lookup.clone()),
            None => ElementRef::new(self.frames.clone(), vec![lookup.clone()]),
        }))
    }

    async fn read_text(&mut self, element: &ElementRef) -> DriverResult<String> {
        let mut world = self.world.lock().unwrap();
        if world.stale_reads > 0 {
            world.stale_reads -= 1;
            return Err(DriverError::StaleElement("scripted".to_string()));
        }
        if !resolves(&world, element) {
            return Err(DriverError::StaleElement("detached".to_string()));
        }
        Ok(world.next_reading())
    }

    async fn click(&mut self, element: &ElementRef) -> DriverResult<()> {
        let mut world = self.world.lock().unwrap();
        let selector = element.lookup().map(|l| l.selector.clone()).unwrap_or_default();
        world.clicks.push(selector);
        Ok(())
    }

    async fn fill(&mut self, element: &ElementRef, text: &str) -> DriverResult<()> {
        let mut world = self.world.lock().unwrap();
        let selector = element.lookup().map(|l| l.selector.clone()).unwrap_or_default();
        world.fills.push((selector, text.to_string()));
        Ok(())
    }

    async fn quit(self: Box<Self>) -> DriverResult<()> {
        let hang = {
            let mut world = self.world.lock().unwrap();
            world.quits += 1;
            world.hang_quit
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Store that keeps every write in memory.
#[derive(Default)]
pub struct RecordingSink {
    pub writes: Mutex<Vec<(String, String, Entry)>>,
}

impl RecordingSink {
    pub fn entries(&self) -> Vec<Entry> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, entry)| entry.clone())
            .collect()
    }

    pub fn magnitudes(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.magnitude).collect()
    }
}

#[async_trait]
impl EntrySink for RecordingSink {
    async fn append(&self, partition: &str, key: &str, entry: &Entry) -> Result<(), SinkError> {
        self.writes
            .lock()
            .unwrap()
            .push((partition.to_string(), key.to_string(), entry.clone()));
        Ok(())
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}

/// Store whose writes always fail.
#[derive(Default)]
pub struct FailingSink {
    pub attempts: Mutex<u32>,
}

#[async_trait]
impl EntrySink for FailingSink {
    async fn append(&self, _partition: &str, _key: &str, _entry: &Entry) -> Result<(), SinkError> {
        *self.attempts.lock().unwrap() += 1;
        Err(SinkError::Status {
            status: 503,
            body: "unavailable".to_string(),
        })
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

/// Wall clock that moves forward by one millisecond on every read.
pub struct TestClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl TestClock {
    pub fn at(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let mut now = self.now.lock().unwrap();
        let current = *now;
        *now = current + ChronoDuration::milliseconds(1);
        current
    }
}

pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<FixedOffset> {
    FixedOffset::west_opt(3 * 3600)
        .unwrap()
        .with_ymd_and_hms(y, m, d, h, min, s)
        .unwrap()
}

/// Midday, well away from the restart window.
pub fn midday() -> DateTime<FixedOffset> {
    local(2026, 5, 1, 12, 0, 0)
}

pub fn session_settings() -> SessionSettings {
    SessionSettings {
        base_url: None,
        navigation_timeout: Duration::from_secs(5),
        login_settle: Duration::from_millis(100),
        frame_wait: Duration::from_secs(1),
        container_wait: Duration::from_secs(1),
        selectors: SelectorTable::default(),
        ..SessionSettings::default()
    }
}

pub fn supervisor_settings() -> SupervisorSettings {
    SupervisorSettings {
        poll_interval: Duration::from_millis(150),
        inactivity_timeout: Duration::from_secs(30),
        recovery_delay: Duration::from_secs(5),
        launch_backoff: Duration::from_secs(5),
        ..SupervisorSettings::default()
    }
}

pub struct Harness {
    pub world: SharedWorld,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<TestClock>,
    pub events: EventBus,
    pub services: FeedServices,
}

impl Harness {
    pub fn new(world: World) -> Self {
        Self::with_settings(world, session_settings(), midday())
    }

    pub fn with_settings(
        world: World,
        settings: SessionSettings,
        now: DateTime<FixedOffset>,
    ) -> Self {
        let world = shared(world);
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(TestClock::at(now));
        let events = EventBus::new(8192);
        let launcher = Arc::new(FakeLauncher {
            world: Arc::clone(&world),
        });
        let services = FeedServices {
            sessions: Arc::new(SessionManager::new(launcher, settings)),
            sink: sink.clone(),
            clock: clock.clone(),
            events: events.clone(),
        };
        Self {
            world,
            sink,
            clock,
            events,
            services,
        }
    }
}

/// Everything already sitting in the receiver.
pub fn drain(rx: &mut broadcast::Receiver<FeedEvent>) -> Vec<FeedEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
