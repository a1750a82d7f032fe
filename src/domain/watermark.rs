//! Poll watermark.
//!
//! The operation date (Unix seconds) of the most recent payment already
//! dispatched. Only the watcher loop writes it, and it never moves back.

use chrono::{DateTime, TimeDelta, Utc};

/// Non-decreasing timestamp boundary for incremental polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(i64);

impl Watermark {
    /// Start at an explicit Unix timestamp (seconds).
    pub const fn at(seconds: i64) -> Self {
        Self(seconds)
    }

    /// Start at the current wall-clock second.
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    /// Current value in Unix seconds.
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Move to `max(current, date)`. Returns true if the value changed.
    ///
    /// Dates outside the range `chrono` can represent are ignored.
    pub fn advance(&mut self, date: i64) -> bool {
        if date > self.0 && DateTime::from_timestamp(date, 0).is_some() {
            self.0 = date;
            true
        } else {
            false
        }
    }

    /// Inclusive start of the next query window: one second past the mark.
    ///
    /// Saturates at the representable bounds instead of wrapping.
    pub fn next_window_start(self) -> DateTime<Utc> {
        let Some(mark) = DateTime::from_timestamp(self.0, 0) else {
            return if self.0 > 0 {
                DateTime::<Utc>::MAX_UTC
            } else {
                DateTime::<Utc>::MIN_UTC
            };
        };
        mark.checked_add_signed(TimeDelta::seconds(1)).unwrap_or(mark)
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
