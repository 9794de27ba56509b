//! Wall-clock source and the daily restart window.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc};
use feedrelay::{FeedError, FeedResult};

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// System time shifted to a fixed local offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Parse `"-03:00"`, `"+05:30"` or `"Z"` into an offset.
pub fn parse_offset(raw: &str) -> FeedResult<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| bad_offset(raw));
    }
    let (sign, rest) = if let Some(rest) = raw.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = raw.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(bad_offset(raw));
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(|| bad_offset(raw))?;
    let hours: i32 = hours.parse().map_err(|_| bad_offset(raw))?;
    let minutes: i32 = minutes.parse().map_err(|_| bad_offset(raw))?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return Err(bad_offset(raw));
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(|| bad_offset(raw))
}

fn bad_offset(raw: &str) -> FeedError {
    FeedError::InvalidWindow(format!("bad utc offset '{raw}'"))
}

/// Daily local time band in which a feed tears its session down once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl RestartWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> FeedResult<Self> {
        if end < start {
            return Err(FeedError::InvalidWindow(format!(
                "window end {end} is before start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse `"HH:MM"` bounds. The end minute is included in full.
    pub fn parse(start: &str, end: &str) -> FeedResult<Self> {
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), "%H:%M")
                .map_err(|e| FeedError::InvalidWindow(format!("'{s}': {e}")))
        };
        let end = parse(end)?;
        Self::new(parse(start)?, end.with_second(59).unwrap_or(end))
    }

    pub fn contains(&self, at: NaiveTime) -> bool {
        at >= self.start && at <= self.end
    }

    /// `now` is inside the window and today's restart has not happened yet.
    pub fn is_due(&self, now: &DateTime<FixedOffset>, last_restart_day: NaiveDate) -> bool {
        self.contains(now.time()) && now.date_naive() != last_restart_day
    }
}

impl Default for RestartWindow {
    fn default() -> Self {
        Self {
            start: NaiveTime::MIN,
            end: NaiveTime::from_hms_opt(0, 5, 59).unwrap_or(NaiveTime::MIN),
        }
    }
}
