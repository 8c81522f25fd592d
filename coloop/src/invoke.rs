//! Spawning sub-tasks from inside a running task
//!
//! [`invoke`] links a new task into the scheduler that is running the
//! caller. The body of the new task lives in an [`Invocation`], storage
//! that belongs to the call site rather than to the caller, so it
//! outlives the parent if it has to.
//!
//! The sub-task is first resumed on a later pass than the one in which
//! it was spawned. That resumption only registers it; its body runs on
//! the resumptions after that, and once the body completes the sub-task
//! terminates and the call site can be used again.
//!
//! # Example
//! ```
//! # use core::pin::{pin, Pin};
//! # use core::task::{Context, Poll};
//! # use core::future::Future;
//! # use coloop::{invoke, Clock, Instant, Invocation, Scheduler, Task};
//! # struct Zero;
//! # impl Clock for Zero {
//! #     fn now(&self) -> Instant {
//! #         Instant::from_ticks(0)
//! #     }
//! # }
//! struct Blink;
//!
//! impl Future for Blink {
//!     type Output = ();
//!
//!     fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
//!         // toggle led here
//!         Poll::Ready(())
//!     }
//! }
//!
//! static BLINK: Invocation<Blink> = Invocation::new();
//!
//! async fn parent() {
//!     invoke(&BLINK, Blink).await.unwrap();
//! }
//!
//! let mut task = pin!(Task::new(parent()));
//! let scheduler = pin!(Scheduler::<_, 2>::new(Zero));
//! let handle = scheduler.as_ref().get_handle();
//!
//! handle.register(task.as_mut().get_handle()).unwrap();
//! handle.run_cycle();
//!
//! assert!(!BLINK.is_live());
//! assert_eq!(handle.task_count(), 0);
//! ```

use core::{
    cell::{Cell, UnsafeCell},
    pin::Pin,
    task::{Context, Poll},
};

use critical_section::Mutex;
use futures::Future;

use crate::error::SpawnError;
use crate::scheduler::Tcb;
use crate::task::{poll_slot, RawTask, TaskId};

/// Call-site storage for a sub-task body
pub struct Invocation<F> {
    future: UnsafeCell<Option<F>>,
    live: Mutex<Cell<bool>>,
}

// The body is only written by whoever claimed `live`, and only polled by
// the scheduler that sub-task was spawned into
unsafe impl<F: Send> Sync for Invocation<F> {}

impl<F> Invocation<F>
where
    F: Future<Output = ()> + 'static,
{
    pub const fn new() -> Self {
        Self {
            future: UnsafeCell::new(None),
            live: Mutex::new(Cell::new(false)),
        }
    }

    /// Return whether a sub-task spawned here has not terminated yet
    pub fn is_live(&self) -> bool {
        critical_section::with(|cs| self.live.borrow(cs).get())
    }

    /// Take the call site, returning false if it is already live
    fn claim(&self) -> bool {
        critical_section::with(|cs| !self.live.borrow(cs).replace(true))
    }

    fn release(&self) {
        critical_section::with(|cs| self.live.borrow(cs).set(false));
    }

    fn raw(&'static self) -> RawTask {
        let ptr = self as *const Self as *mut ();

        unsafe { RawTask::with_poll(ptr, poll_invocation::<F>) }
    }
}

impl<F> Default for Invocation<F>
where
    F: Future<Output = ()> + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// # Safety
/// `ptr` must point to a live `Invocation<F>`
unsafe fn poll_invocation<F: Future<Output = ()> + 'static>(
    ptr: *mut (),
    cx: &mut Context<'_>,
) -> Poll<()> {
    let invocation = unsafe { &*ptr.cast::<Invocation<F>>() };
    let poll = unsafe { poll_slot::<F>(invocation.future.get().cast(), cx) };

    if poll.is_ready() {
        invocation.release();
    }

    poll
}

/// Future returned by [`invoke`]
pub struct Invoke<F>
where
    F: 'static,
{
    invocation: &'static Invocation<F>,
    body: Option<F>,
}

// The body is moved into the invocation before it is ever polled
impl<F> Unpin for Invoke<F> {}

impl<F> Future for Invoke<F>
where
    F: Future<Output = ()> + 'static,
{
    type Output = Result<TaskId, SpawnError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let tcb = Tcb::current(cx);
        let invocation = self.invocation;

        let Some(body) = self.body.take() else {
            panic!("invoke polled after completion");
        };

        if !invocation.claim() {
            return Poll::Ready(Err(SpawnError::Busy));
        }

        unsafe { *invocation.future.get() = Some(body) };

        match tcb.spawn(invocation.raw()) {
            Ok(id) => {
                tcb.progress();
                Poll::Ready(Ok(id))
            }
            Err(err) => {
                unsafe { *invocation.future.get() = None };
                invocation.release();
                Poll::Ready(Err(err))
            }
        }
    }
}

/// Spawn `body` as a new task of the scheduler running the caller
///
/// Completes on its first poll, the caller never waits for the
/// sub-task. Fails with [`SpawnError::Busy`] if the sub-task last spawned
/// from `invocation` is still running, and with [`SpawnError::Full`] if
/// the scheduler has no free task control block. In both cases `body`
/// is dropped.
///
/// # Panics
/// If polled outside of a [`Scheduler`](crate::Scheduler)
pub fn invoke<F>(invocation: &'static Invocation<F>, body: F) -> Invoke<F>
where
    F: Future<Output = ()> + 'static,
{
    Invoke {
        invocation,
        body: Some(body),
    }
}
