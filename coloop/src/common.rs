#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    };
    use std::task::Wake;

    use crate::timer::{Clock, Duration, Instant};

    pub struct MockWaker {
        pub woke: AtomicBool,
    }

    impl MockWaker {
        pub fn new() -> Self {
            Self {
                woke: AtomicBool::new(false),
            }
        }

        /// Return whether the waker was woken, and reset it
        pub fn take(&self) -> bool {
            self.woke.swap(false, Ordering::Relaxed)
        }
    }

    impl Wake for MockWaker {
        fn wake(self: Arc<Self>) {
            self.woke.store(true, Ordering::Relaxed);
        }
    }

    /// Millisecond clock advanced by hand. Sleeping moves time forward.
    #[derive(Clone, Default)]
    pub struct MockClock {
        ticks: Arc<AtomicU32>,
        slept: Arc<AtomicU32>,
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn starting_at(ticks: u32) -> Self {
            let clock = Self::new();
            clock.ticks.store(ticks, Ordering::Relaxed);
            clock
        }

        pub fn advance(&self, ms: u32) {
            let ticks = self.ticks.load(Ordering::Relaxed);
            self.ticks.store(ticks.wrapping_add(ms), Ordering::Relaxed);
        }

        pub fn tick(&self) {
            self.advance(1);
        }

        pub fn slept(&self) -> u32 {
            self.slept.load(Ordering::Relaxed)
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Instant {
            Instant::from_ticks(self.ticks.load(Ordering::Relaxed))
        }

        fn sleep(&self, duration: Duration) {
            let slept = self.slept.load(Ordering::Relaxed);
            self.slept
                .store(slept + duration.ticks(), Ordering::Relaxed);
            self.advance(duration.ticks());
        }
    }
}
