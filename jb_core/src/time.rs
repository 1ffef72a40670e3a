// ABOUTME: Utilities for working with times and timestamps.
// ABOUTME: Provides UTC "now" helpers, RFC3339 formatting, and a monotonic timer.
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Get the current UTC time.
///
/// # Examples
///
/// ```
/// use jb_core::utc_now;
/// let now = utc_now();
/// assert!(now.timestamp() > 0);
/// ```
pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a UTC timestamp as RFC3339.
///
/// # Examples
///
/// ```
/// use jb_core::to_rfc3339;
/// use chrono::{TimeZone, Utc};
///
/// let time = Utc.timestamp_opt(1_609_459_200, 0).unwrap(); // 2021-01-01
/// assert_eq!(to_rfc3339(time), "2021-01-01T00:00:00+00:00");
/// ```
pub fn to_rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339()
}

/// Get the current time as an RFC3339 formatted string.
pub fn now_iso8601() -> String {
    to_rfc3339(utc_now())
}

/// Create a monotonic duration measurer, for wall-clock-independent timing
/// (dispatch latency, wait_timeout bookkeeping).
pub struct MonotonicTimer {
    start: Instant,
}

impl MonotonicTimer {
    /// Create a new timer starting now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time since creation.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Reset the timer to now.
    pub fn reset(&mut self) {
        self.start = Instant::now();
    }
}

impl Default for MonotonicTimer {
    fn default() -> Self {
        Self::new()
    }
}
