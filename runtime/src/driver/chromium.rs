//! Chromium-based driver using chromiumoxide.

use super::script::{self, Action, Reply};
use super::{DriverError, DriverResult, DriverSession, ElementRef, LaunchOptions, Launcher, Lookup};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Last-resort location on Linux images that ship a distro Chromium.
const SYSTEM_CHROMIUM: &str = "/usr/bin/chromium";

/// Time allowed for a graceful browser shutdown before the process is killed.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Configured path
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        tracing::warn!("configured chromium path {} does not exist", path.display());
    }

    // 2. FEEDRELAY_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("FEEDRELAY_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. ~/.feedrelay/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".feedrelay/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".feedrelay/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".feedrelay/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".feedrelay/chromium/chrome-linux64/chrome"),
                home.join(".feedrelay/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 4. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Well-known install locations
    let fallback = if cfg!(target_os = "macos") {
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome")
    } else {
        PathBuf::from(SYSTEM_CHROMIUM)
    };
    fallback.exists().then_some(fallback)
}

/// Launches headless Chromium instances.
#[derive(Debug, Default, Clone)]
pub struct ChromiumLauncher;

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self
    }

    fn browser_config(
        options: &LaunchOptions,
        chrome_path: PathBuf,
    ) -> DriverResult<BrowserConfig> {
        let (width, height) = options.window;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(width, height)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-popup-blocking")
            .arg("--disable-extensions")
            .arg("--log-level=3")
            .arg(format!("--window-size={width},{height}"))
            // Nested game frames are cross-origin; their documents must stay reachable.
            .arg("--disable-web-security")
            .arg("--disable-site-isolation-trials")
            .arg("--disable-features=IsolateOrigins,site-per-process");
        if options.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        builder
            .build()
            .map_err(|e| DriverError::Launch(format!("failed to build browser config: {e}")))
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self, options: &LaunchOptions) -> DriverResult<Box<dyn DriverSession>> {
        let chrome_path = find_chromium(options.executable.as_deref()).ok_or_else(|| {
            DriverError::Launch(
                "Chromium not found. Set FEEDRELAY_CHROMIUM_PATH or install chromium.".to_string(),
            )
        })?;
        tracing::debug!("launching chromium at {}", chrome_path.display());

        let config = Self::browser_config(options, chrome_path)?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(format!("failed to launch Chromium: {e}")))?;

        // Spawn the handler task
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(DriverError::Launch(format!("failed to create new page: {e}")));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler: handler_task,
            frames: Vec::new(),
            script_timeout: options.script_timeout,
        }))
    }
}

/// A single Chromium page with its current frame context.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    frames: Vec<Vec<Lookup>>,
    script_timeout: Duration,
}

impl ChromiumSession {
    async fn run(
        &self,
        frames: &[Vec<Lookup>],
        chain: &[Lookup],
        action: Action<'_>,
    ) -> DriverResult<Reply> {
        let js = script::build(frames, chain, action);
        let result = tokio::time::timeout(self.script_timeout, self.page.evaluate(js.as_str()))
            .await
            .map_err(|_| DriverError::Timeout(self.script_timeout))?
            .map_err(|e| DriverError::Script(e.to_string()))?;

        let raw: String = result
            .into_value()
            .map_err(|e| DriverError::Script(format!("failed to convert script result: {e:?}")))?;
        script::parse_reply(&raw)
            .map_err(|e| DriverError::Protocol(format!("bad script reply: {e}")))
    }

    async fn act(&self, element: &ElementRef, action: Action<'_>) -> DriverResult<Reply> {
        match self.run(element.frames(), element.chain(), action).await? {
            Reply::Ok { text } => Ok(Reply::Ok { text }),
            Reply::Missing | Reply::Stale => Err(DriverError::StaleElement(describe(element))),
            Reply::FrameLost => Err(DriverError::StaleElement(format!(
                "frame lost under {}",
                describe(element)
            ))),
        }
    }
}

fn describe(element: &ElementRef) -> String {
    element
        .lookup()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<root>".to_string())
}

#[async_trait]
impl DriverSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> DriverResult<()> {
        self.frames.clear();
        // `goto` resolves on the load event of every frame, which slow embedded
        // frames can hold back. Callers treat `Timeout` as "still loading" and
        // confirm readiness with element lookups.
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DriverError::Navigation(format!("{url}: {e}"))),
            Err(_) => Err(DriverError::Timeout(timeout)),
        }
    }

    async fn switch_to_frame(&mut self, frame: &ElementRef) -> DriverResult<()> {
        match self.run(frame.frames(), frame.chain(), Action::Probe).await? {
            Reply::Ok { .. } => {
                let mut frames = frame.frames().to_vec();
                frames.push(frame.chain().to_vec());
                self.frames = frames;
                Ok(())
            }
            _ => Err(DriverError::StaleElement(describe(frame))),
        }
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
        let candidate = match within {
            Some(parent) => parent.child(lookup.clone()),
            None => ElementRef::new(self.frames.clone(), vec![lookup.clone()]),
        };
        match self.run(candidate.frames(), candidate.chain(), Action::Probe).await? {
            Reply::Ok { .. } => Ok(Some(candidate)),
            Reply::Missing => Ok(None),
            Reply::Stale => Err(DriverError::StaleElement(format!(
                "parent of {lookup} is gone"
            ))),
            Reply::FrameLost => Err(DriverError::StaleElement(format!(
                "frame lost while looking up {lookup}"
            ))),
        }
    }

    async fn read_text(&mut self, element: &ElementRef) -> DriverResult<String> {
        match self.act(element, Action::Text).await? {
            Reply::Ok { text } => Ok(text.unwrap_or_default()),
            _ => Ok(String::new()),
        }
    }

    async fn click(&mut self, element: &ElementRef) -> DriverResult<()> {
        self.act(element, Action::Click).await.map(|_| ())
    }

    async fn fill(&mut self, element: &ElementRef, text: &str) -> DriverResult<()> {
        self.act(element, Action::Fill(text)).await.map(|_| ())
    }

    async fn quit(self: Box<Self>) -> DriverResult<()> {
        let ChromiumSession {
            mut browser,
            page,
            handler,
            ..
        } = *self;
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, page.close()).await;
        let graceful = tokio::time::timeout(CLOSE_TIMEOUT, async {
            browser.close().await.map_err(|e| e.to_string())?;
            browser.wait().await.map_err(|e| e.to_string())?;
            Ok::<(), String>(())
        })
        .await;

        let result = match graceful {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DriverError::Protocol(format!("browser close failed: {e}"))),
            Err(_) => Err(DriverError::Timeout(CLOSE_TIMEOUT)),
        };
        if let Err(e) = &result {
            tracing::debug!("{e}; killing browser process");
            if let Some(Err(e)) = browser.kill().await {
                tracing::warn!("failed to kill browser process: {e}");
            }
        }
        handler.abort();
        result
    }
}
