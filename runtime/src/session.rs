//! Browser session lifecycle: launch, login, navigation to the feed view.
//!
//! A [`Session`] is owned by exactly one supervisor and is never repaired
//! across a teardown; recovery always builds a new one through
//! [`SessionManager::open`].

use crate::driver::{DriverError, DriverSession, LaunchOptions, Launcher};
use crate::locator::{ElementLocator, FrameTarget, Located};
use crate::selectors::SelectorTable;
use feedrelay::Credentials;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A live browser handle plus the frame and container located in it.
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    driver: Box<dyn DriverSession>,
    target: Option<FrameTarget>,
    opened_at: Instant,
}

impl Session {
    pub fn new(driver: Box<dyn DriverSession>) -> Self {
        Self {
            id: format!("sess-{}", uuid::Uuid::new_v4().simple()),
            driver,
            target: None,
            opened_at: Instant::now(),
        }
    }

    /// The located frame and container, if any.
    pub fn target(&self) -> Option<&FrameTarget> {
        self.target.as_ref()
    }

    /// Drop the located handles so the next lookup starts from scratch.
    pub fn forget_target(&mut self) {
        self.target = None;
    }

    pub fn driver_mut(&mut self) -> &mut dyn DriverSession {
        self.driver.as_mut()
    }

    /// How long the session has been alive.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Shut the browser down.
    pub async fn close(self) -> Result<(), DriverError> {
        self.driver.quit().await
    }
}

/// Timeouts and tables used to bring a session to the feed view.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub launch: LaunchOptions,
    /// Landing page that hosts the login form.
    pub base_url: Option<String>,
    pub navigation_timeout: Duration,
    /// Pause after submitting the login form.
    pub login_settle: Duration,
    pub frame_wait: Duration,
    pub container_wait: Duration,
    pub selectors: SelectorTable,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            launch: LaunchOptions::default(),
            base_url: None,
            navigation_timeout: Duration::from_secs(30),
            login_settle: Duration::from_secs(3),
            frame_wait: Duration::from_secs(15),
            container_wait: Duration::from_secs(10),
            selectors: SelectorTable::default(),
        }
    }
}

/// Opens sessions and drives them to the feed view.
pub struct SessionManager {
    launcher: Arc<dyn Launcher>,
    settings: SessionSettings,
    locator: ElementLocator,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn Launcher>, settings: SessionSettings) -> Self {
        let locator = ElementLocator::new(settings.frame_wait, settings.container_wait);
        Self {
            launcher,
            settings,
            locator,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Launch a fresh browser.
    pub async fn open(&self) -> Result<Session, DriverError> {
        let driver = self.launcher.launch(&self.settings.launch).await?;
        let session = Session::new(driver);
        tracing::debug!(session = %session.id, "browser launched");
        Ok(session)
    }

    /// Log in through the landing page.
    ///
    /// Best-effort: missing credentials or a missing login form are logged
    /// and treated as "stay anonymous". Returns `false` only when the
    /// landing page itself cannot be loaded.
    pub async fn authenticate(
        &self,
        session: &mut Session,
        credentials: Option<&Credentials>,
    ) -> bool {
        let Some(base_url) = self.settings.base_url.as_deref() else {
            tracing::debug!(session = %session.id, "no landing page configured, skipping login");
            return true;
        };
        let Some(credentials) = credentials.filter(|c| c.is_usable()) else {
            tracing::info!(session = %session.id, "no credentials, skipping login");
            return true;
        };

        if !self.load(session, base_url, "landing page").await {
            return false;
        }

        let driver = session.driver.as_mut();

        match self.submit_login(driver, credentials).await {
            Ok(()) => {
                tracing::info!(session = %session.id, "login submitted");
                tokio::time::sleep(self.settings.login_settle).await;
            }
            Err(step) => {
                tracing::warn!(session = %session.id, "login skipped: {step} not found");
            }
        }
        true
    }

    async fn submit_login(
        &self,
        driver: &mut dyn DriverSession,
        credentials: &Credentials,
    ) -> Result<(), &'static str> {
        let table = &self.settings.selectors;

        let button = self
            .locator
            .locate(driver, &table.login_button, None)
            .await
            .found()
            .ok_or("login button")?;
        driver.click(&button).await.map_err(|_| "login button")?;

        let email = self
            .locator
            .locate(driver, &table.email_field, None)
            .await
            .found()
            .ok_or("email field")?;
        driver
            .fill(&email, &credentials.email)
            .await
            .map_err(|_| "email field")?;

        let password = self
            .locator
            .locate(driver, &table.password_field, None)
            .await
            .found()
            .ok_or("password field")?;
        driver
            .fill(&password, &credentials.password)
            .await
            .map_err(|_| "password field")?;

        let submit = self
            .locator
            .locate(driver, &table.submit_button, None)
            .await
            .found()
            .ok_or("submit button")?;
        driver.click(&submit).await.map_err(|_| "submit button")
    }

    /// Load the feed view and confirm the frame and container are present.
    pub async fn navigate(&self, session: &mut Session, target_url: &str) -> bool {
        session.forget_target();
        if !self.load(session, target_url, "feed view").await {
            return false;
        }
        self.locate(session).await
    }

    /// Start loading `url`. A page still loading when the timeout expires
    /// counts as loaded; the lookups that follow decide whether it is usable.
    async fn load(&self, session: &mut Session, url: &str, what: &str) -> bool {
        let timeout = self.settings.navigation_timeout;
        match session.driver.navigate(url, timeout).await {
            Ok(()) => true,
            Err(DriverError::Timeout(_)) => {
                tracing::debug!(
                    session = %session.id,
                    "{what} still loading after {}s, continuing",
                    timeout.as_secs()
                );
                true
            }
            Err(e) => {
                tracing::warn!(session = %session.id, "{what} failed to load: {e}");
                false
            }
        }
    }

    /// Resolve the frame and container and remember them on the session.
    pub async fn locate(&self, session: &mut Session) -> bool {
        session.forget_target();
        let table = &self.settings.selectors;
        let located = self
            .locator
            .locate_in_frames(
                session.driver.as_mut(),
                &table.frame_levels(),
                &table.container,
            )
            .await;
        match located {
            Located::Found(target) => {
                session.target = Some(target);
                true
            }
            Located::NotFound => false,
        }
    }
}
