//! Resumable tasks and their scheduling status
use core::{
    fmt,
    marker::PhantomData,
    ops::{BitOr, BitOrAssign},
    pin::Pin,
    task::{Context, Poll},
};

use futures::Future;

/// Outcome of resuming a task once
///
/// Statuses combine with `|`: the aggregate of a set of resumptions is
/// [`TaskStatus::Waiting`] only if every member is `Waiting`.
///
/// # Example
/// ```
/// use coloop::TaskStatus;
///
/// let aggregate = [TaskStatus::Waiting, TaskStatus::Yielded, TaskStatus::Waiting]
///     .into_iter()
///     .fold(TaskStatus::default(), |acc, s| acc | s);
///
/// assert!(!aggregate.is_waiting());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskStatus {
    /// No progress was made
    #[default]
    Waiting,
    /// Parked cooperatively, wants to run again
    Yielded,
    /// Made progress and is now suspended
    Running,
    /// Finished, the task will be removed from the pool
    Terminated,
}

impl TaskStatus {
    pub fn is_waiting(self) -> bool {
        self == TaskStatus::Waiting
    }

    pub fn is_terminated(self) -> bool {
        self == TaskStatus::Terminated
    }
}

impl BitOr for TaskStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.max(rhs)
    }
}

impl BitOrAssign for TaskStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

/// Identifier of a task control block within one scheduler
///
/// Identifiers are reused once the task they named has terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u16);

impl TaskId {
    pub(crate) const fn new(index: u16) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Caller-owned storage for an async task
///
/// The future is dropped in place as soon as it completes, so a
/// finished task that is registered again terminates on its first
/// resumption.
///
/// # Example
///```
/// use coloop::Task;
///
/// async fn task_fn() {
/// }
///
/// let task = Task::new(task_fn());
/// ```
pub struct Task<F>
where
    F: Future<Output = ()> + 'static,
{
    future: Option<F>,
}

impl<F> Task<F>
where
    F: Future<Output = ()> + 'static,
{
    /// Create new task from future
    pub fn new(future: F) -> Self {
        Self {
            future: Some(future),
        }
    }

    /// Return handle to pinned task
    pub fn get_handle(self: Pin<&mut Self>) -> TaskHandle<'_> {
        let task = unsafe { Pin::get_unchecked_mut(self) };

        TaskHandle {
            raw: unsafe { RawTask::from_slot(&mut task.future) },
            _marker: PhantomData,
        }
    }
}

/// Type erased handle for [`Task`], consumed by registration
pub struct TaskHandle<'a> {
    pub(crate) raw: RawTask,
    _marker: PhantomData<&'a mut ()>,
}

/// Type erased pointer to a pinned future and its poll function
#[derive(Clone, Copy)]
pub(crate) struct RawTask {
    future: *mut (),
    poll: unsafe fn(*mut (), &mut Context<'_>) -> Poll<()>,
}

impl RawTask {
    /// # Safety
    /// `slot` must stay pinned and valid while the task is linked
    pub(crate) unsafe fn from_slot<F: Future<Output = ()>>(slot: *mut Option<F>) -> Self {
        Self {
            future: slot.cast(),
            poll: poll_slot::<F>,
        }
    }

    /// # Safety
    /// `poll` must be called with a pointer of the matching type
    pub(crate) unsafe fn with_poll(
        future: *mut (),
        poll: unsafe fn(*mut (), &mut Context<'_>) -> Poll<()>,
    ) -> Self {
        Self { future, poll }
    }

    /// Address of the storage, used to detect double registration
    pub(crate) fn addr(&self) -> *mut () {
        self.future
    }

    /// # Safety
    /// The storage must still be valid and pinned
    pub(crate) unsafe fn poll(&self, cx: &mut Context<'_>) -> Poll<()> {
        (self.poll)(self.future, cx)
    }
}

/// Poll a future stored in an `Option`, dropping it in place once it
/// has completed
///
/// # Safety
/// `ptr` must point to a pinned `Option<F>`
pub(crate) unsafe fn poll_slot<F: Future<Output = ()>>(
    ptr: *mut (),
    cx: &mut Context<'_>,
) -> Poll<()> {
    let slot = unsafe { &mut *ptr.cast::<Option<F>>() };

    match slot.as_mut() {
        Some(future) => {
            let poll = unsafe { Pin::new_unchecked(future) }.poll(cx);

            if poll.is_ready() {
                *slot = None;
            }

            poll
        }
        None => Poll::Ready(()),
    }
}

#[derive(Debug)]
struct YieldFuture {
    done: bool,
}

impl YieldFuture {
    fn new() -> Self {
        Self { done: false }
    }
}

impl Future for YieldFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.done {
            self.done = true;
            cx.waker().wake_by_ref();

            Poll::Pending
        } else {
            Poll::Ready(())
        }
    }
}

/// Yield task
///
/// The resumption reports [`TaskStatus::Yielded`], so the scheduler
/// runs another pass before the cycle ends.
pub fn yield_now() -> impl Future<Output = ()> {
    YieldFuture::new()
}

#[cfg(test)]
mod tests {
    use crossbeam_queue::ArrayQueue;
    use std::sync::Arc;

    use crate::common::tests::MockWaker;

    use super::*;

    #[test]
    fn task() {
        let queue = Arc::new(ArrayQueue::new(10));

        let test_future = |queue| {
            async fn future(queue: Arc<ArrayQueue<u32>>) {
                for i in 0..2 {
                    queue.push(i).unwrap();
                    yield_now().await;
                }
            }

            future(queue)
        };

        let mut task = Task::new(test_future(queue.clone()));
        let handle = unsafe { Pin::new_unchecked(&mut task).get_handle() };
        let mockwaker = Arc::new(MockWaker::new());
        let waker = mockwaker.clone().into();
        let mut cx = Context::from_waker(&waker);

        assert_eq!(unsafe { handle.raw.poll(&mut cx) }, Poll::Pending);
        assert!(mockwaker.take());

        assert_eq!(queue.pop().unwrap(), 0);
        assert!(queue.pop().is_none());

        assert_eq!(unsafe { handle.raw.poll(&mut cx) }, Poll::Pending);

        assert_eq!(queue.pop().unwrap(), 1);
        assert!(queue.pop().is_none());

        assert_eq!(unsafe { handle.raw.poll(&mut cx) }, Poll::Ready(()));
        assert!(task.future.is_none());
    }

    #[test]
    fn finished_task_stays_finished() {
        let mut task = Task::new(async {});
        let handle = unsafe { Pin::new_unchecked(&mut task).get_handle() };
        let waker = Arc::new(MockWaker::new()).into();
        let mut cx = Context::from_waker(&waker);

        assert_eq!(unsafe { handle.raw.poll(&mut cx) }, Poll::Ready(()));
        assert_eq!(unsafe { handle.raw.poll(&mut cx) }, Poll::Ready(()));
    }

    #[test]
    fn status_aggregate() {
        let mut aggregate = TaskStatus::default();

        aggregate |= TaskStatus::Waiting;
        assert!(aggregate.is_waiting());

        aggregate |= TaskStatus::Yielded;
        assert_eq!(aggregate, TaskStatus::Yielded);

        aggregate |= TaskStatus::Waiting;
        assert!(!aggregate.is_waiting());

        assert_eq!(TaskStatus::Running | TaskStatus::Terminated, TaskStatus::Terminated);
        assert!((TaskStatus::Terminated | TaskStatus::Waiting).is_terminated());
    }
}
