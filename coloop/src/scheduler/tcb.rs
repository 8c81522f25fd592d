use core::cell::Cell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU8, Ordering};
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use crate::error::SpawnError;
use crate::task::{RawTask, TaskId, TaskStatus};
use crate::timer::{Duration, Instant, Timer};

use super::activity;

/// Passed a suspension point provided by this crate
const PROGRESS: u8 = 1 << 0;
/// Woken through the waker of the running poll
const WOKEN: u8 = 1 << 1;

/// Services the scheduler offers to the task being resumed
pub(crate) trait Kernel {
    fn now(&self) -> Instant;

    fn spawn(&self, parent: TaskId, task: RawTask) -> Result<TaskId, SpawnError>;
}

// Waker lent to a task for the duration of one poll. Points at the TCB.
static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake, noop);

// Clones may be kept anywhere, so they carry no pointer and only bump
// the activity counter
static DETACHED_VTABLE: RawWakerVTable =
    RawWakerVTable::new(clone, detached_wake, detached_wake, noop);

unsafe fn clone(_ptr: *const ()) -> RawWaker {
    RawWaker::new(core::ptr::null(), &DETACHED_VTABLE)
}

unsafe fn wake(ptr: *const ()) {
    let tcb = &*(ptr as *const Tcb);
    tcb.flags.fetch_or(WOKEN, Ordering::Release);
}

unsafe fn detached_wake(_ptr: *const ()) {
    activity::notify();
}

unsafe fn noop(_ptr: *const ()) {}

/// Task control block
///
/// Binds a task to its place in the pool and to its timer slot. The
/// waker handed to the task on every resumption points back here, which
/// is how delays and semaphore waits find the slot of the task awaiting
/// them.
pub(crate) struct Tcb {
    id: TaskId,
    task: Cell<Option<RawTask>>,
    timer: Cell<Timer>,
    flags: AtomicU8,
    anchor_pending: Cell<bool>,
    parent: Cell<Option<TaskId>>,
    pub(super) prev: Cell<Option<TaskId>>,
    pub(super) next: Cell<Option<TaskId>>,
    kernel: Cell<Option<NonNull<dyn Kernel>>>,
}

impl Tcb {
    pub(crate) fn new(id: TaskId) -> Self {
        Self {
            id,
            task: Cell::new(None),
            timer: Cell::new(Timer::new()),
            flags: AtomicU8::new(0),
            anchor_pending: Cell::new(false),
            parent: Cell::new(None),
            prev: Cell::new(None),
            next: Cell::new(None),
            kernel: Cell::new(None),
        }
    }

    /// Return control block of the task being polled with `cx`
    ///
    /// # Panics
    /// If the waker in `cx` is not the one a [`Scheduler`](crate::Scheduler)
    /// passed to the poll
    pub(crate) fn current<'c>(cx: &'c Context<'_>) -> &'c Tcb {
        let waker = cx.waker();

        if !core::ptr::eq(waker.vtable(), &VTABLE) {
            panic!("coloop primitive polled outside of a coloop scheduler");
        }

        unsafe { &*(waker.data() as *const Tcb) }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn parent(&self) -> Option<TaskId> {
        self.parent.get()
    }

    /// # Safety
    /// `kernel` must stay valid for as long as this control block is
    /// resumed
    pub(crate) unsafe fn set_kernel(&self, kernel: NonNull<dyn Kernel>) {
        self.kernel.set(Some(kernel));
    }

    fn kernel(&self) -> &dyn Kernel {
        match self.kernel.get() {
            Some(kernel) => unsafe { kernel.as_ref() },
            None => unreachable!(),
        }
    }

    pub(crate) fn task(&self) -> Option<RawTask> {
        self.task.get()
    }

    /// Attach task to this free control block
    pub(crate) fn attach(&self, task: RawTask, parent: Option<TaskId>) {
        self.task.set(Some(task));
        self.timer.set(Timer::new());
        self.flags.store(0, Ordering::Relaxed);
        self.anchor_pending.set(parent.is_some());
        self.parent.set(parent);
    }

    /// Detach the task once it has terminated
    pub(crate) fn detach(&self) {
        self.task.set(None);
        self.timer.set(Timer::new());
        self.flags.store(0, Ordering::Relaxed);
        self.parent.set(None);
    }

    pub(crate) fn now(&self) -> Instant {
        self.kernel().now()
    }

    pub(crate) fn spawn(&self, task: RawTask) -> Result<TaskId, SpawnError> {
        self.kernel().spawn(self.id, task)
    }

    /// Arm the timer slot for the wait that is pending at the end of the
    /// running poll
    pub(crate) fn arm(&self, deadline: Instant) {
        let mut timer = self.timer.get();

        debug_assert!(
            !timer.is_armed(),
            "task {} has more than one timed wait pending",
            self.id
        );

        timer.arm_at(deadline);
        self.timer.set(timer);
    }

    pub(crate) fn remaining(&self, now: Instant) -> Option<Duration> {
        self.timer.get().remaining(now)
    }

    /// Record that the task moved past a suspension point
    pub(crate) fn progress(&self) {
        self.flags.fetch_or(PROGRESS, Ordering::Release);
    }

    fn waker(&self) -> Waker {
        let ptr: *const () = (self as *const Tcb).cast();

        unsafe { Waker::from_raw(RawWaker::new(ptr, &VTABLE)) }
    }

    /// Run the task forward to its next suspension point
    pub(crate) fn resume(&self) -> TaskStatus {
        let Some(task) = self.task.get() else {
            return TaskStatus::Terminated;
        };

        // A spawned task's first resumption only moves it past its anchor
        if self.anchor_pending.replace(false) {
            return TaskStatus::Running;
        }

        self.flags.store(0, Ordering::Relaxed);
        // Re-armed by whichever timed wait is still pending after the poll
        self.timer.set(Timer::new());

        let waker = self.waker();
        let mut cx = Context::from_waker(&waker);

        match unsafe { task.poll(&mut cx) } {
            Poll::Ready(()) => TaskStatus::Terminated,
            Poll::Pending => {
                let flags = self.flags.swap(0, Ordering::Acquire);

                if flags & PROGRESS != 0 {
                    TaskStatus::Running
                } else if flags & WOKEN != 0 {
                    TaskStatus::Yielded
                } else {
                    TaskStatus::Waiting
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(tcb: &Tcb) -> u8 {
        tcb.flags.load(Ordering::Relaxed)
    }

    #[test]
    fn lent_waker_sets_flag() {
        let tcb = Tcb::new(TaskId::new(3));
        let waker = tcb.waker();

        assert_eq!(flags(&tcb), 0);

        waker.wake_by_ref();
        assert_eq!(flags(&tcb), WOKEN);
    }

    #[test]
    fn cloned_waker_is_detached() {
        let tcb = Box::new(Tcb::new(TaskId::new(3)));
        let clone = tcb.waker().clone();

        assert!(core::ptr::eq(clone.vtable(), &DETACHED_VTABLE));
        assert!(clone.data().is_null());

        // Outlives the control block it was cloned from
        drop(tcb);

        let before = activity::current();
        clone.wake_by_ref();
        clone.clone().wake();
        assert_eq!(activity::current(), before.wrapping_add(2));
    }

    #[test]
    fn current_from_context() {
        let tcb = Tcb::new(TaskId::new(7));
        let waker = tcb.waker();
        let cx = Context::from_waker(&waker);

        assert_eq!(Tcb::current(&cx).id(), TaskId::new(7));
    }

    #[test]
    #[should_panic(expected = "outside of a coloop scheduler")]
    fn foreign_waker() {
        let waker = futures::task::noop_waker();
        let cx = Context::from_waker(&waker);

        Tcb::current(&cx);
    }

    #[test]
    #[should_panic(expected = "outside of a coloop scheduler")]
    fn cloned_waker_has_no_control_block() {
        let tcb = Tcb::new(TaskId::new(1));
        let clone = tcb.waker().clone();
        let cx = Context::from_waker(&clone);

        Tcb::current(&cx);
    }
}
