//! Browser automation seam.
//!
//! Defines the `Launcher` and `DriverSession` traits that abstract over the
//! browser engine (currently Chromium via chromiumoxide). The rest of the
//! runtime only ever talks to a page through these.

pub mod chromium;
mod script;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How a candidate selector is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum By {
    /// CSS selector.
    Css,
    /// XPath expression.
    Xpath,
    /// Value of the element's `name` attribute.
    Name,
}

impl By {
    pub fn as_str(self) -> &'static str {
        match self {
            By::Css => "css",
            By::Xpath => "xpath",
            By::Name => "name",
        }
    }
}

/// One lookup step: a selector and how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lookup {
    pub by: By,
    pub selector: String,
}

impl Lookup {
    pub fn new(by: By, selector: impl Into<String>) -> Self {
        Self {
            by,
            selector: selector.into(),
        }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(By::Css, selector)
    }

    pub fn xpath(selector: impl Into<String>) -> Self {
        Self::new(By::Xpath, selector)
    }

    pub fn name(selector: impl Into<String>) -> Self {
        Self::new(By::Name, selector)
    }
}

impl std::fmt::Display for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.by.as_str(), self.selector)
    }
}

/// Handle to an element found by a [`DriverSession`].
///
/// The handle records how it was reached (the frames entered and the lookup
/// chain inside the innermost document) so it can be re-resolved on every
/// use. A handle whose chain no longer resolves is stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    frames: Vec<Vec<Lookup>>,
    chain: Vec<Lookup>,
}

impl ElementRef {
    pub fn new(frames: Vec<Vec<Lookup>>, chain: Vec<Lookup>) -> Self {
        Self { frames, chain }
    }

    /// Frames that were entered, outermost first.
    pub fn frames(&self) -> &[Vec<Lookup>] {
        &self.frames
    }

    /// Lookups from the document root down to this element.
    pub fn chain(&self) -> &[Lookup] {
        &self.chain
    }

    /// The lookup that matched this element itself.
    pub fn lookup(&self) -> Option<&Lookup> {
        self.chain.last()
    }

    /// A handle for `lookup` searched inside this element.
    pub fn child(&self, lookup: Lookup) -> Self {
        let mut chain = self.chain.clone();
        chain.push(lookup);
        Self {
            frames: self.frames.clone(),
            chain,
        }
    }
}

/// Deterministic launch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub headless: bool,
    pub window: (u32, u32),
    /// Explicit browser binary; resolved through the fallback chain when absent.
    pub executable: Option<PathBuf>,
    /// Upper bound on any single page script.
    pub script_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window: (1920, 1080),
            executable: None,
            script_timeout: Duration::from_secs(5),
        }
    }
}

/// Failures surfaced by a driver.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("stale element: {0}")]
    StaleElement(String),

    #[error("page script failed: {0}")]
    Script(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// The page structure moved under a handle; re-locating may fix it.
    pub fn is_structural(&self) -> bool {
        matches!(self, DriverError::StaleElement(_))
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Starts browser sessions.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Launch a fresh browser with one page.
    async fn launch(&self, options: &LaunchOptions) -> DriverResult<Box<dyn DriverSession>>;
}

/// One live browser page and its current frame context.
#[async_trait]
pub trait DriverSession: Send {
    /// Load `url` in the top-level page and return to the root context.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> DriverResult<()>;
    /// Make `frame` the context for subsequent lookups.
    async fn switch_to_frame(&mut self, frame: &ElementRef) -> DriverResult<()>;
    /// Return to the top-level document.
    async fn switch_to_root(&mut self) -> DriverResult<()>;
    /// Find the first match of `lookup` in the current context, or inside
    /// `within` when given. `Ok(None)` means nothing matched right now.
    async fn find_element(
        &mut self,
        lookup: &Lookup,
        within: Option<&ElementRef>,
    ) -> DriverResult<Option<ElementRef>>;
    /// Rendered text of an element.
    async fn read_text(&mut self, element: &ElementRef) -> DriverResult<String>;
    async fn click(&mut self, element: &ElementRef) -> DriverResult<()>;
    /// Replace the value of an input element.
    async fn fill(&mut self, element: &ElementRef, text: &str) -> DriverResult<()>;
    /// Shut the browser down.
    async fn quit(self: Box<Self>) -> DriverResult<()>;
}
