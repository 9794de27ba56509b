//! Reads the current value out of the located container.

use crate::driver::{DriverResult, DriverSession, ElementRef, Lookup};
use feedrelay::{Poll, SignalBaseline};

pub struct SignalExtractor {
    baseline: SignalBaseline,
    value: Vec<Lookup>,
}

impl SignalExtractor {
    /// `value` lists where the newest value sits inside the container; when
    /// empty the container's own text is read.
    pub fn new(value: Vec<Lookup>, floor: Option<f64>) -> Self {
        Self {
            baseline: SignalBaseline::with_floor(floor),
            value,
        }
    }

    pub fn reset(&mut self) {
        self.baseline.reset();
    }

    pub fn baseline(&self) -> Option<f64> {
        self.baseline.last()
    }

    /// Read the container once.
    ///
    /// A container that exists but has no value element yet is `Unreadable`.
    /// `Err` means the container handle itself went bad.
    pub async fn poll(
        &mut self,
        session: &mut dyn DriverSession,
        container: &ElementRef,
    ) -> DriverResult<Poll> {
        let element = if self.value.is_empty() {
            Some(container.clone())
        } else {
            let mut found = None;
            for candidate in &self.value {
                if let Some(element) = session.find_element(candidate, Some(container)).await? {
                    found = Some(element);
                    break;
                }
            }
            found
        };

        let Some(element) = element else {
            return Ok(Poll::Unreadable);
        };
        let text = session.read_text(&element).await?;
        let poll = self.baseline.observe(&text);
        if poll == Poll::Unreadable {
            tracing::trace!("unreadable text {text:?}");
        }
        Ok(poll)
    }
}
