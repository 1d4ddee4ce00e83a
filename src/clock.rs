//! Monotonic time source.
//!
//! Timestamps are [`Duration`]s since the clock's own epoch. Differences are
//! always taken with `saturating_sub` so a reordered read can never wrap.

use crate::Result;
use std::time::{Duration, Instant};

pub trait Clock: Send {
    /// Current monotonic time since the clock epoch.
    fn now(&self) -> Result<Duration>;
}

/// [`Instant`]-backed clock, epoch at construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Result<Duration> {
        Ok(self.epoch.elapsed())
    }
}

/// Time elapsed from `earlier` to `now`, zero if `now` is behind.
pub fn elapsed_since(now: Duration, earlier: Duration) -> Duration {
    now.saturating_sub(earlier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now().unwrap();
        let b = clock.now().unwrap();
        assert!(b >= a);
    }

    #[test]
    fn test_elapsed_saturates() {
        let a = Duration::from_millis(10);
        let b = Duration::from_millis(4);
        assert_eq!(elapsed_since(a, b), Duration::from_millis(6));
        assert_eq!(elapsed_since(b, a), Duration::ZERO);
    }
}
