//! Value normalization and run-length change detection.

/// Unit suffix rendered after the magnitude, e.g. `1.23x`.
pub const UNIT_MARKER: char = 'x';

/// Outcome of feeding one raw reading into a [`SignalBaseline`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Poll {
    /// A magnitude different from the previous accepted one.
    NewValue(f64),
    /// Same magnitude as the previous accepted one.
    NoChange,
    /// Empty, unparseable, or below the configured floor. Baseline untouched.
    Unreadable,
}

/// Parse a rendered reading such as `"1.23x"` into its magnitude.
///
/// Returns `None` for empty text, text that is not a finite number once the
/// trailing unit marker is removed, or a bare unit marker.
pub fn normalize(raw: &str) -> Option<f64> {
    let text = raw.trim();
    let text = text
        .strip_suffix(UNIT_MARKER)
        .or_else(|| text.strip_suffix(UNIT_MARKER.to_ascii_uppercase()))
        .unwrap_or(text)
        .trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Remembers the last accepted magnitude and reports changes against it.
///
/// Comparison is exact: the source already quantizes to two decimals, so two
/// renderings of the same value parse to the same `f64`.
#[derive(Debug, Clone, Default)]
pub struct SignalBaseline {
    last: Option<f64>,
    min_magnitude: Option<f64>,
}

impl SignalBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse readings below `floor` (treated as unreadable).
    pub fn with_floor(floor: Option<f64>) -> Self {
        Self {
            last: None,
            min_magnitude: floor,
        }
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }

    /// Forget the last accepted magnitude.
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn observe(&mut self, raw: &str) -> Poll {
        let Some(value) = normalize(raw) else {
            return Poll::Unreadable;
        };
        if self.min_magnitude.is_some_and(|floor| value < floor) {
            tracing::trace!(value, "reading below floor");
            return Poll::Unreadable;
        }
        if self.last == Some(value) {
            return Poll::NoChange;
        }
        self.last = Some(value);
        Poll::NewValue(value)
    }
}
