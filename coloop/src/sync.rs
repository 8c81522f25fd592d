//! Counting semaphore shared between tasks and interrupt handlers

use core::{
    cell::Cell,
    pin::Pin,
    task::{Context, Poll},
};

use critical_section::Mutex;
use futures::Future;

use crate::scheduler::{activity, Tcb};
use crate::timer::{Duration, Timeout, TimeoutError};

/// Counting semaphore
///
/// Tasks take units with [`wait`](Semaphore::wait) or
/// [`wait_timeout`](Semaphore::wait_timeout). Anything, including an
/// interrupt handler, can add units with [`signal`](Semaphore::signal).
/// Waiters are not queued: whichever waiter the scheduler resumes first
/// after a signal takes the unit.
///
/// # Example
/// ```
/// use coloop::Semaphore;
///
/// static SEM: Semaphore = Semaphore::new(0);
///
/// SEM.signal();
/// assert_eq!(SEM.count(), 1);
/// assert!(SEM.try_take());
/// assert!(!SEM.try_take());
/// ```
pub struct Semaphore {
    count: Mutex<Cell<u32>>,
}

impl Semaphore {
    pub const fn new(count: u32) -> Self {
        Self {
            count: Mutex::new(Cell::new(count)),
        }
    }

    /// Add one unit
    ///
    /// A waiter is resumed again before the running cycle ends, even if
    /// it comes before the signalling task in the pool.
    pub fn signal(&self) {
        critical_section::with(|cs| {
            let count = self.count.borrow(cs);
            count.set(count.get().saturating_add(1));
        });

        activity::notify();
    }

    /// Add one unit from an interrupt handler
    ///
    /// Tasks are polled by the scheduler, so no waker has to be called
    /// here. A cycle that is running sees the new count before it ends,
    /// otherwise the next cycle does.
    pub fn signal_from_isr(&self) {
        self.signal();
    }

    /// Current number of units
    pub fn count(&self) -> u32 {
        critical_section::with(|cs| self.count.borrow(cs).get())
    }

    /// Take one unit if there is one
    pub fn try_take(&self) -> bool {
        critical_section::with(|cs| {
            let count = self.count.borrow(cs);

            match count.get() {
                0 => false,
                n => {
                    count.set(n - 1);
                    true
                }
            }
        })
    }

    /// Wait until a unit can be taken
    ///
    /// A unit that is already there is taken on the first poll without
    /// suspending the task.
    pub fn wait(&self) -> SemaphoreWait<'_> {
        SemaphoreWait { semaphore: self }
    }

    /// Wait until a unit can be taken, giving up after `timeout`
    ///
    /// Uses the timer slot of the calling task. If a unit is there when
    /// the timeout expires, the unit is taken and `Ok` is returned.
    pub fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), TimeoutError>> + '_ {
        Timeout::new(self.wait(), timeout)
    }
}

/// Future returned by [`Semaphore::wait`]
pub struct SemaphoreWait<'a> {
    semaphore: &'a Semaphore,
}

impl Future for SemaphoreWait<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.semaphore.try_take() {
            Tcb::current(cx).progress();
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}
