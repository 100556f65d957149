//! Wall-clock source and request deadlines.
//!
//! The selection loop never reads the system clock directly; it asks a
//! `Deadline` built over a `Clock`, so tests can drive timeouts explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Monotonic reading, only differences are meaningful
    fn now(&self) -> Duration;

    /// Current UNIX time in seconds
    fn unix_time(&self) -> i64;
}

/// Real clock backed by `Instant` and `SystemTime`
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn unix_time(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Clock that advances by a fixed step every time it is read
#[derive(Debug)]
pub struct SteppingClock {
    micros: AtomicU64,
    step_micros: u64,
    unix_time: i64,
}

impl SteppingClock {
    pub fn new(step: Duration) -> Self {
        Self {
            micros: AtomicU64::new(0),
            step_micros: step.as_micros() as u64,
            unix_time: 1_600_000_000,
        }
    }

    /// Clock that never advances
    pub fn frozen() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn with_unix_time(mut self, unix_time: i64) -> Self {
        self.unix_time = unix_time;
        self
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Duration {
        let before = self.micros.fetch_add(self.step_micros, Ordering::Relaxed);
        Duration::from_micros(before)
    }

    fn unix_time(&self) -> i64 {
        self.unix_time
    }
}

/// Time budget measured from construction
pub struct Deadline<'a> {
    clock: &'a dyn Clock,
    started: Duration,
    budget: Duration,
}

impl<'a> Deadline<'a> {
    pub fn start(clock: &'a dyn Clock, budget: Duration) -> Self {
        let started = clock.now();
        Self { clock, started, budget }
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.started)
    }

    pub fn expired(&self) -> bool {
        self.elapsed() > self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frozen_clock_never_expires() {
        let clock = SteppingClock::frozen();
        let deadline = Deadline::start(&clock, Duration::from_millis(1));
        for _ in 0..100 {
            assert!(!deadline.expired());
        }
    }

    #[test]
    fn test_stepping_clock_expires_after_budget() {
        let clock = SteppingClock::new(Duration::from_millis(1));
        // start reads 0ms, then 1ms, 2ms, ...
        let deadline = Deadline::start(&clock, Duration::from_millis(3));
        assert!(!deadline.expired()); // 1ms
        assert!(!deadline.expired()); // 2ms
        assert!(!deadline.expired()); // 3ms
        assert!(deadline.expired()); // 4ms
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(clock.unix_time() > 1_500_000_000);
    }
}
