//! Standard library based [`Clock`]
//!
//! Implementation of [`Clock`] using Rust standard library. This is
//! mostly useful for testing code in pure software.

use ::std::time;

use crate::timer::{Clock, Duration, Instant};

/// Standard library based [`Clock`]
///
/// Counts milliseconds since the clock was created. The counter wraps
/// after about 49 days, which the scheduler tolerates.
pub struct StdClock {
    epoch: time::Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            epoch: time::Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(self.epoch.elapsed().as_millis() as u32)
    }

    fn sleep(&self, duration: Duration) {
        ::std::thread::sleep(time::Duration::from_millis(duration.ticks().into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic() {
        let clock = StdClock::new();
        let start = clock.now();

        clock.sleep(Duration::from_ticks(5));

        let elapsed = clock.now().checked_duration_since(start).unwrap();
        assert!(elapsed >= Duration::from_ticks(5));
    }
}
