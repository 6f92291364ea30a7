//! Monotonic timing utilities
//!
//! All controller timestamps are derived from a [`Clock`], which counts
//! microseconds from a fixed epoch instant. Sleeps go through `spin_sleep`
//! so that short pauses (hundreds of microseconds) are honoured without
//! under-sleeping.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of microseconds in a second
pub const MICROS_PER_SECOND: f64 = 1e6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A monotonic microsecond clock anchored at its creation instant.
///
/// Timestamps read from the same clock are monotonically non-decreasing.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Clock {
    /// Create a new clock with its epoch at the current instant.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Microseconds elapsed since the clock's epoch.
    pub fn now_us(&self) -> i64 {
        self.epoch.elapsed().as_micros() as i64
    }

    /// Seconds elapsed since the clock's epoch.
    pub fn now_s(&self) -> f64 {
        self.now_us() as f64 / MICROS_PER_SECOND
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Sleep for at least the given duration.
///
/// May over-sleep slightly (scheduler granularity) but never under-sleeps.
pub fn sleep_at_least(duration: Duration) {
    spin_sleep::SpinSleeper::default().sleep(duration);
}

/// Sleep for `remainder_us` microseconds if positive, otherwise return
/// immediately.
///
/// Used to pad a step out to a fixed budget: pass in
/// `budget_us - elapsed_us` and an overrunning step simply doesn't pause.
pub fn sleep_remainder_us(remainder_us: i64) {
    if remainder_us > 0 {
        sleep_at_least(Duration::from_micros(remainder_us as u64));
    }
}

/// Sleep for the given number of milliseconds.
pub fn sleep_ms(ms: u64) {
    sleep_at_least(Duration::from_millis(ms));
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clock_monotonic() {
        let clock = Clock::new();
        let mut prev = clock.now_us();
        for _ in 0..100 {
            let now = clock.now_us();
            assert!(now >= prev);
            prev = now;
        }
    }

    #[test]
    fn test_clock_units() {
        let clock = Clock::new();
        sleep_ms(10);
        let us = clock.now_us();
        let s = clock.now_s();
        assert!(us >= 10_000);
        // The second reading is later, but only marginally
        assert!(s >= us as f64 / MICROS_PER_SECOND);
        assert!(s - us as f64 / MICROS_PER_SECOND < 0.01);
    }

    #[test]
    fn test_sleep_at_least_never_undersleeps() {
        let start = Instant::now();
        sleep_at_least(Duration::from_micros(500));
        assert!(start.elapsed() >= Duration::from_micros(500));
    }

    #[test]
    fn test_sleep_remainder_negative_is_noop() {
        let start = Instant::now();
        sleep_remainder_us(-1500);
        sleep_remainder_us(0);
        // Should return well within a millisecond
        assert!(start.elapsed() < Duration::from_millis(1));
    }
}
