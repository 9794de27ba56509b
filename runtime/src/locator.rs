//! Ordered-candidate element discovery.
//!
//! Candidates are tried strictly in order; the first structural match wins.
//! Each candidate gets a bounded wait before the next one is tried. Lookup
//! failures never escape: the caller always gets `Found` or `NotFound`.

use crate::driver::{DriverSession, ElementRef, Lookup};
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Result of a lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Located<T = ElementRef> {
    Found(T),
    NotFound,
}

impl<T> Located<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Located::Found(v) => Some(v),
            Located::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Located::Found(_))
    }
}

/// A frame and the container resolved inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTarget {
    pub frame: ElementRef,
    pub container: ElementRef,
}

#[derive(Debug, Clone, Copy)]
pub struct ElementLocator {
    frame_wait: Duration,
    element_wait: Duration,
    probe_interval: Duration,
}

impl ElementLocator {
    pub fn new(frame_wait: Duration, element_wait: Duration) -> Self {
        Self {
            frame_wait,
            element_wait,
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Find the first candidate that matches in the current context, or
    /// inside `within` when given.
    pub async fn locate(
        &self,
        session: &mut dyn DriverSession,
        candidates: &[Lookup],
        within: Option<&ElementRef>,
    ) -> Located {
        self.locate_with(session, candidates, within, self.element_wait)
            .await
    }

    /// Enter each frame level in turn, then find the container inside the
    /// innermost one. Every level is itself an ordered candidate list.
    ///
    /// Always starts from the top-level document.
    pub async fn locate_in_frames(
        &self,
        session: &mut dyn DriverSession,
        frame_levels: &[Vec<Lookup>],
        containers: &[Lookup],
    ) -> Located<FrameTarget> {
        if let Err(e) = session.switch_to_root().await {
            tracing::debug!("switch to root failed: {e}");
            return Located::NotFound;
        }

        let mut innermost = None;
        for level in frame_levels {
            let located = self
                .locate_with(session, level, None, self.frame_wait)
                .await;
            let Located::Found(frame) = located else {
                tracing::debug!("no frame candidate matched");
                return Located::NotFound;
            };
            if let Err(e) = session.switch_to_frame(&frame).await {
                tracing::debug!("entering frame failed: {e}");
                return Located::NotFound;
            }
            innermost = Some(frame);
        }

        let Some(frame) = innermost else {
            tracing::debug!("no frame levels configured");
            return Located::NotFound;
        };

        match self.locate(session, containers, None).await {
            Located::Found(container) => Located::Found(FrameTarget { frame, container }),
            Located::NotFound => {
                tracing::debug!("no container candidate matched inside frame");
                Located::NotFound
            }
        }
    }

    async fn locate_with(
        &self,
        session: &mut dyn DriverSession,
        candidates: &[Lookup],
        within: Option<&ElementRef>,
        wait: Duration,
    ) -> Located {
        for candidate in candidates {
            if let Some(element) = self.wait_for(session, candidate, within, wait).await {
                tracing::trace!("matched {candidate}");
                return Located::Found(element);
            }
        }
        Located::NotFound
    }

    async fn wait_for(
        &self,
        session: &mut dyn DriverSession,
        candidate: &Lookup,
        within: Option<&ElementRef>,
        wait: Duration,
    ) -> Option<ElementRef> {
        let deadline = Instant::now() + wait;
        loop {
            match session.find_element(candidate, within).await {
                Ok(Some(element)) => return Some(element),
                Ok(None) => {}
                Err(e) if e.is_structural() => {
                    // The context itself is gone; waiting will not bring it back.
                    tracing::debug!("lookup {candidate} lost its context: {e}");
                    return None;
                }
                Err(e) => tracing::debug!("lookup {candidate} failed: {e}"),
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            tokio::time::sleep(self.probe_interval.min(deadline - now)).await;
        }
    }
}
