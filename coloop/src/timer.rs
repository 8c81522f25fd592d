//! Timer slots for delaying tasks, and the clock they are measured
//! against
//!
//! [`Scheduler`](crate::Scheduler) requires a clock source that
//! implements [`Clock`]. Two reference implementations are provided:
//! - [`cortex_m::SysTickClock`] - A systick-based clock for Cortex-M systems
//! - [`std::StdClock`] - A standard library based clock for testing in software
//!
//! Every task owns exactly one [`Timer`] slot. [`delay`], [`delay_until`]
//! and [`Semaphore::wait_timeout`](crate::Semaphore::wait_timeout) all
//! arm that slot, so a task can only have one timed wait pending at a
//! time.

use core::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use futures::Future;

use crate::scheduler::Tcb;

#[cfg(feature = "cortex-m")]
#[cfg_attr(feature = "nightly", doc(cfg(feature = "cortex-m")))]
pub mod cortex_m;

#[cfg(feature = "std")]
#[cfg_attr(feature = "nightly", doc(cfg(feature = "std")))]
pub mod std;

/// Point in time, in milliseconds. Comparisons tolerate the counter
/// wrapping around.
pub type Instant = fugit::TimerInstantU32<1000>;

/// Span of time in milliseconds
pub type Duration = fugit::MillisDurationU32;

/// Trait for interfacing with the monotonic clock source.
///
/// Check out `std::StdClock` for a reference implementation.
pub trait Clock {
    /// Return current time
    fn now(&self) -> Instant;

    /// Suspend the host for at most `duration`. Returning early, for
    /// instance on an interrupt, is always allowed.
    fn sleep(&self, duration: Duration) {
        let _ = duration;
    }
}

impl<C> Clock for &C
where
    C: Clock + ?Sized,
{
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// An armed deadline, or nothing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    /// Create timer that is not armed
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Arm timer to expire `duration` after `now`
    pub fn arm(&mut self, now: Instant, duration: Duration) {
        self.arm_at(now + duration);
    }

    /// Arm timer to expire at `deadline`
    pub fn arm_at(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Return whether the deadline has been reached. A timer that is not
    /// armed never expires.
    pub fn expired(&self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    /// Time left until the deadline, zero once expired. `None` when the
    /// timer is not armed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|deadline| {
            deadline
                .checked_duration_since(now)
                .unwrap_or(Duration::from_ticks(0))
        })
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct TimeoutError {}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timed out")
    }
}

impl core::error::Error for TimeoutError {}

#[derive(Clone, Copy)]
enum Target {
    After(Duration),
    At(Instant),
}

/// Future delaying a task until a deadline
///
/// The deadline is fixed on the first poll. Every poll that leaves the
/// delay pending arms the task's timer slot with it, so a delay that is
/// dropped or completed no longer bounds the idle time.
pub struct Delay {
    target: Target,
    deadline: Option<Instant>,
}

impl Delay {
    fn new(target: Target) -> Self {
        Self {
            target,
            deadline: None,
        }
    }
}

impl Future for Delay {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let tcb = Tcb::current(cx);
        let now = tcb.now();
        let target = self.target;

        let deadline = *self.deadline.get_or_insert(match target {
            Target::After(duration) => now + duration,
            Target::At(deadline) => deadline,
        });

        // The condition is checked right away, so a delay that has
        // already passed does not suspend the task
        if now >= deadline {
            tcb.progress();
            Poll::Ready(())
        } else {
            tcb.arm(deadline);
            Poll::Pending
        }
    }
}

/// Future that wraps around another future, giving up if it doesn't
/// finish before the task's timer expires. The inner future is polled
/// first, so it wins when both are ready.
pub(crate) struct Timeout<F>
where
    F: Future,
{
    future: F,
    delay: Delay,
}

impl<F> Timeout<F>
where
    F: Future,
{
    pub(crate) fn new(future: F, duration: Duration) -> Self {
        Self {
            future,
            delay: Delay::new(Target::After(duration)),
        }
    }
}

impl<F> Future for Timeout<F>
where
    F: Future,
{
    type Output = Result<F::Output, TimeoutError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let (future, delay) = unsafe {
            let this = self.get_unchecked_mut();
            (Pin::new_unchecked(&mut this.future), &mut this.delay)
        };

        if let Poll::Ready(ret) = future.poll(cx) {
            Poll::Ready(Ok(ret))
        } else if let Poll::Ready(()) = Pin::new(delay).poll(cx) {
            Poll::Ready(Err(TimeoutError {}))
        } else {
            Poll::Pending
        }
    }
}

/// Delay the current task for duration
///
/// # Example
/// ```
/// # use coloop::{delay, Duration};
/// async fn blink() {
///     loop {
///         // toggle led here
///         delay(Duration::from_ticks(500)).await;
///     }
/// }
/// ```
pub fn delay(duration: Duration) -> Delay {
    Delay::new(Target::After(duration))
}

/// Delay the current task until deadline
pub fn delay_until(deadline: Instant) -> Delay {
    Delay::new(Target::At(deadline))
}

#[cfg(test)]
mod tests {
    use ::std::pin::pin;
    use ::std::sync::Arc;

    use crossbeam_queue::ArrayQueue;

    use crate::common::tests::MockClock;
    use crate::scheduler::Scheduler;
    use crate::task::Task;

    use super::*;

    fn ms(ticks: u32) -> Duration {
        Duration::from_ticks(ticks)
    }

    fn at(ticks: u32) -> Instant {
        Instant::from_ticks(ticks)
    }

    #[test]
    fn state() {
        let mut timer = Timer::new();

        assert!(!timer.is_armed());
        assert!(!timer.expired(at(1_000_000)));
        assert_eq!(timer.remaining(at(0)), None);

        timer.arm(at(10), ms(5));

        assert_eq!(timer.deadline(), Some(at(15)));
        assert!(!timer.expired(at(14)));
        assert!(timer.expired(at(15)));
        assert_eq!(timer.remaining(at(10)), Some(ms(5)));
        assert_eq!(timer.remaining(at(20)), Some(ms(0)));

        timer.disarm();
        assert!(!timer.is_armed());
    }

    #[test]
    fn wraparound() {
        let mut timer = Timer::new();

        timer.arm(at(u32::MAX - 2), ms(10));

        assert!(!timer.expired(at(u32::MAX)));
        assert!(!timer.expired(at(6)));
        assert!(timer.expired(at(7)));
        assert_eq!(timer.remaining(at(u32::MAX)), Some(ms(8)));
    }

    #[test]
    fn timer() {
        let clock = MockClock::new();

        let test_future = |queue| {
            async fn future(queue: Arc<ArrayQueue<u32>>) {
                queue.push(1).unwrap();

                delay(ms(0)).await;

                queue.push(2).unwrap();

                delay(ms(1)).await;

                queue.push(3).unwrap();

                delay(ms(2)).await;

                queue.push(4).unwrap();

                delay(ms(10)).await;

                queue.push(5).unwrap();
            }

            future(queue)
        };

        let array_queue = Arc::new(ArrayQueue::new(10));
        let mut task = pin!(Task::new(test_future(array_queue.clone())));
        let scheduler = pin!(Scheduler::<_, 2>::new(clock.clone()));
        let handle = scheduler.as_ref().get_handle();

        handle.register(task.as_mut().get_handle()).unwrap();
        handle.run_cycle();

        // Zero delay does not suspend
        assert_eq!(array_queue.pop(), Some(1));
        assert_eq!(array_queue.pop(), Some(2));
        assert_eq!(array_queue.pop(), None);
        assert_eq!(handle.idle_time(), ms(1));

        clock.tick();
        handle.run_cycle();

        assert_eq!(array_queue.pop(), Some(3));
        assert_eq!(array_queue.pop(), None);

        clock.tick();
        handle.run_cycle();

        assert_eq!(array_queue.pop(), None);
        assert_eq!(handle.idle_time(), ms(1));

        clock.tick();
        handle.run_cycle();

        assert_eq!(array_queue.pop(), Some(4));
        assert_eq!(array_queue.pop(), None);

        for _ in 0..9 {
            clock.tick();
            handle.run_cycle();

            assert_eq!(array_queue.pop(), None);
        }

        clock.tick();
        handle.run_cycle();

        assert_eq!(array_queue.pop(), Some(5));
        assert_eq!(array_queue.pop(), None);
        assert_eq!(handle.task_count(), 0);
    }

    #[test]
    fn delay_until_deadline() {
        let clock = MockClock::starting_at(5);
        let array_queue = Arc::new(ArrayQueue::new(10));

        async fn future(queue: Arc<ArrayQueue<u32>>) {
            // Already in the past
            delay_until(at(0)).await;
            queue.push(1).unwrap();

            delay_until(at(8)).await;
            queue.push(2).unwrap();
        }

        let mut task = pin!(Task::new(future(array_queue.clone())));
        let scheduler = pin!(Scheduler::<_, 1>::new(clock.clone()));
        let handle = scheduler.as_ref().get_handle();

        handle.register(task.as_mut().get_handle()).unwrap();
        handle.run_cycle();

        assert_eq!(array_queue.pop(), Some(1));
        assert_eq!(array_queue.pop(), None);
        assert_eq!(handle.idle_time(), ms(3));

        clock.advance(2);
        handle.run_cycle();
        assert_eq!(array_queue.pop(), None);

        clock.advance(1);
        handle.run_cycle();
        assert_eq!(array_queue.pop(), Some(2));
    }

    #[test]
    fn dropped_delay_releases_timer() {
        let clock = MockClock::new();
        let sem = Arc::new(crate::sync::Semaphore::new(0));

        async fn future(sem: Arc<crate::sync::Semaphore>) {
            // Signalled before the timeout, the delay inside is dropped
            let _ = sem.wait_timeout(ms(100)).await;
            sem.wait().await;
        }

        let mut task = pin!(Task::new(future(sem.clone())));
        let scheduler = pin!(Scheduler::<_, 1>::with_config(
            clock.clone(),
            crate::scheduler::SchedulerConfig::default().with_idle_ceiling(ms(500)),
        ));
        let handle = scheduler.as_ref().get_handle();

        handle.register(task.as_mut().get_handle()).unwrap();
        handle.run_cycle();
        assert_eq!(handle.idle_time(), ms(100));

        sem.signal();
        clock.advance(10);
        handle.run_cycle();

        assert_eq!(handle.idle_time(), ms(500));
    }
}
