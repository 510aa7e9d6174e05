//! Clocks and trailing-window durations.
//!
//! The temporal state store never reads the wall clock directly; it asks a
//! [`Clock`]. Production code uses [`SystemClock`], tests drive a
//! [`ManualClock`] so window queries are deterministic.

use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

/// Source of timestamps for the temporal state store.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// # Examples
///
/// ```
/// use chrono::Duration;
/// use rulegate::time::{Clock, ManualClock};
///
/// let clock = ManualClock::starting_now();
/// let t0 = clock.now();
/// clock.advance(Duration::seconds(30));
/// assert_eq!(clock.now() - t0, Duration::seconds(30));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `at`.
    #[must_use]
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    /// Creates a clock frozen at the current wall-clock time.
    #[must_use]
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Moves the clock forward (or backward, for a negative duration).
    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard += by;
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn window_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\d+(?:\.\d+)?)\s*(ms|s|m|h|d)\s*$").expect("window pattern compiles")
    })
}

/// Parses a window string such as `"30d"`, `"5m"` or `"500ms"` into seconds.
///
/// Parsing is case-insensitive. Unknown suffixes and malformed input
/// yield `0.0`.
///
/// # Examples
///
/// ```
/// use rulegate::time::parse_window;
///
/// assert_eq!(parse_window("1h"), 3600.0);
/// assert_eq!(parse_window("500ms"), 0.5);
/// assert_eq!(parse_window("2W"), 0.0);
/// ```
#[must_use]
pub fn parse_window(window: &str) -> f64 {
    let Some(caps) = window_regex().captures(window) else {
        return 0.0;
    };
    let Ok(amount) = caps[1].parse::<f64>() else {
        return 0.0;
    };
    let unit = match caps[2].to_ascii_lowercase().as_str() {
        "ms" => 0.001,
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        "d" => 86_400.0,
        _ => return 0.0,
    };
    amount * unit
}

/// Converts a window length in seconds into a chrono duration.
///
/// Negative or non-finite input maps to zero; very large windows saturate.
#[must_use]
pub fn window_duration(seconds: f64) -> Duration {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Duration::zero();
    }
    let micros = seconds * 1_000_000.0;
    #[allow(clippy::cast_possible_truncation)]
    let micros = if micros >= i64::MAX as f64 { i64::MAX } else { micros as i64 };
    Duration::microseconds(micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_window("30d"), 30.0 * 86_400.0);
        assert_eq!(parse_window("5m"), 300.0);
        assert_eq!(parse_window("45s"), 45.0);
        assert_eq!(parse_window("2h"), 7200.0);
        assert_eq!(parse_window("500ms"), 0.5);
    }

    #[test]
    fn test_parse_is_case_insensitive_and_trimmed() {
        assert_eq!(parse_window(" 1H "), 3600.0);
        assert_eq!(parse_window("250MS"), 0.25);
        assert_eq!(parse_window("1.5m"), 90.0);
    }

    #[test]
    fn test_unknown_or_malformed_is_zero() {
        assert_eq!(parse_window("3w"), 0.0);
        assert_eq!(parse_window("10"), 0.0);
        assert_eq!(parse_window("d"), 0.0);
        assert_eq!(parse_window(""), 0.0);
        assert_eq!(parse_window("-5m"), 0.0);
    }

    #[test]
    fn test_window_duration() {
        assert_eq!(window_duration(1.5), Duration::milliseconds(1500));
        assert_eq!(window_duration(-1.0), Duration::zero());
        assert_eq!(window_duration(f64::NAN), Duration::zero());
        assert_eq!(window_duration(1e300), Duration::microseconds(i64::MAX));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::starting_now();
        let t0 = clock.now();
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), t0 + Duration::minutes(5));
        clock.set(t0);
        assert_eq!(clock.now(), t0);
    }
}
