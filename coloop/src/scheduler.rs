//! Cooperative scheduler
//!
//! Every call to [`SchedulerHandle::run_cycle`] walks the task pool in
//! passes, resuming each task once per pass, until a whole pass goes by
//! in which no task made progress and nothing signalled a waiting task.
//! A task that terminates is unlinked at once and a fresh pass starts
//! from the head of the pool.
//!
//! # Example
//!```
//! # use core::sync::atomic::{AtomicBool, Ordering};
//! # use core::pin::pin;
//! # use coloop::{Clock, Instant, Scheduler, Task};
//! struct Zero;
//!
//! impl Clock for Zero {
//!     fn now(&self) -> Instant {
//!         Instant::from_ticks(0)
//!     }
//! }
//!
//! async fn task_fn(flag: &AtomicBool) {
//!     flag.store(true, Ordering::Relaxed);
//! }
//!
//! static FLAG: AtomicBool = AtomicBool::new(false);
//!
//! let mut task = pin!(Task::new(task_fn(&FLAG)));
//! let scheduler = pin!(Scheduler::<_, 4>::new(Zero));
//! let handle = scheduler.as_ref().get_handle();
//!
//! handle.register(task.as_mut().get_handle()).unwrap();
//! assert!(!FLAG.load(Ordering::Relaxed));
//!
//! handle.run_cycle();
//! assert!(FLAG.load(Ordering::Relaxed));
//! assert_eq!(handle.task_count(), 0);
//! ```

use core::cell::Cell;
use core::marker::{PhantomData, PhantomPinned};
use core::pin::Pin;
use core::ptr::NonNull;

use log::{debug, trace};

use crate::error::SpawnError;
use crate::task::{RawTask, TaskHandle, TaskId, TaskStatus};
use crate::timer::{Clock, Duration, Instant};

pub(crate) use self::tcb::Tcb;
use self::{pool::Pool, tcb::Kernel};

pub(crate) mod activity;
mod pool;
mod tcb;

/// Idle time reported when no armed timer is closer
pub const DEFAULT_IDLE_CEILING: Duration = Duration::from_ticks(1000);

/// Scheduler configuration
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Upper bound for [`SchedulerHandle::idle_time`]
    pub idle_ceiling: Duration,
}

impl SchedulerConfig {
    pub fn with_idle_ceiling(mut self, idle_ceiling: Duration) -> Self {
        self.idle_ceiling = idle_ceiling;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_ceiling: DEFAULT_IDLE_CEILING,
        }
    }
}

/// What happened during one call to [`SchedulerHandle::run_cycle`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Passes over the pool, including the final quiescent one
    pub passes: u32,
    /// Task resumptions across all passes
    pub resumptions: u32,
    /// Tasks that terminated and were unlinked
    pub retired: u32,
}

/// Cooperative scheduler with room for `N` tasks
///
/// The scheduler must be pinned before use, see [`Scheduler::get_handle`].
/// Every registered task must outlive `'t`, and the scheduler can only be
/// used within `'t`.
pub struct Scheduler<'t, C, const N: usize>
where
    C: Clock,
{
    clock: C,
    config: SchedulerConfig,
    tcbs: [Tcb; N],
    pool: Pool,
    in_cycle: Cell<bool>,
    initialized: Cell<bool>,
    // Invariant, so registering cannot shorten 't
    _tasks: PhantomData<fn(&'t ()) -> &'t ()>,
    _pin: PhantomPinned,
}

/// Clears the running flag when a cycle ends, also by a panicking task
struct CycleGuard<'a>(&'a Cell<bool>);

impl<'a> CycleGuard<'a> {
    fn enter(in_cycle: &'a Cell<bool>) -> Self {
        assert!(
            !in_cycle.replace(true),
            "run_cycle called while a cycle is running"
        );

        Self(in_cycle)
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<'t, C, const N: usize> Scheduler<'t, C, N>
where
    C: Clock,
{
    /// Create new scheduler with default configuration
    pub fn new(clock: C) -> Self {
        Self::with_config(clock, SchedulerConfig::default())
    }

    /// Create new scheduler
    pub fn with_config(clock: C, config: SchedulerConfig) -> Self {
        assert!(N <= u16::MAX as usize, "too many task control blocks");

        let tcbs = core::array::from_fn(|i| Tcb::new(TaskId::new(i as u16)));
        let pool = Pool::new(&tcbs);

        Self {
            clock,
            config,
            tcbs,
            pool,
            in_cycle: Cell::new(false),
            initialized: Cell::new(false),
            _tasks: PhantomData,
            _pin: PhantomPinned,
        }
    }

    fn init(self: Pin<&Self>) {
        let this = self.get_ref();

        if this.initialized.replace(true) {
            return;
        }

        let kernel: NonNull<dyn Kernel + '_> = NonNull::from(this as &dyn Kernel);
        // The TCBs are owned by the scheduler and only resumed through it,
        // so they never use the pointer after the pinned scheduler is gone
        let kernel = unsafe {
            core::mem::transmute::<NonNull<dyn Kernel + '_>, NonNull<dyn Kernel>>(kernel)
        };

        for tcb in &this.tcbs {
            unsafe { tcb.set_kernel(kernel) };
        }
    }

    /// Initialize and return handle to pinned `Scheduler`
    pub fn get_handle(self: Pin<&Self>) -> SchedulerHandle<'_, 't, C, N> {
        self.init();

        SchedulerHandle { scheduler: self }
    }

    fn tcb(&self, id: TaskId) -> &Tcb {
        &self.tcbs[id.index()]
    }

    fn insert(&self, task: RawTask, parent: Option<TaskId>) -> Result<TaskId, SpawnError> {
        let duplicate = self
            .pool
            .iter(&self.tcbs)
            .filter_map(Tcb::task)
            .any(|linked| linked.addr() == task.addr());

        if duplicate {
            return Err(SpawnError::AlreadyRegistered);
        }

        let id = self.pool.alloc(&self.tcbs).ok_or(SpawnError::Full)?;

        self.tcb(id).attach(task, parent);
        self.pool.push_back(&self.tcbs, id);

        match parent {
            Some(parent) => debug!("task {} spawned by {}", id, parent),
            None => debug!("task {} registered", id),
        }

        Ok(id)
    }

    fn retire(&self, id: TaskId) {
        let tcb = self.tcb(id);

        match tcb.parent() {
            Some(parent) => debug!("task {} (spawned by {}) terminated", id, parent),
            None => debug!("task {} terminated", id),
        }

        tcb.detach();
        self.pool.unlink(&self.tcbs, id);
    }

    /// Resume every task once, starting at the head of the pool. Stops
    /// early when a task terminates.
    fn pass(&self, stats: &mut CycleStats) -> TaskStatus {
        let mut aggregate = TaskStatus::Waiting;
        // Tasks linked during this pass wait for the next one
        let last = self.pool.tail();
        let mut cursor = self.pool.head();

        while let Some(id) = cursor {
            let status = self.tcb(id).resume();

            stats.resumptions = stats.resumptions.saturating_add(1);
            aggregate |= status;

            if status.is_terminated() {
                self.retire(id);
                stats.retired = stats.retired.saturating_add(1);
                break;
            }

            cursor = if Some(id) == last {
                None
            } else {
                self.pool.next(&self.tcbs, id)
            };
        }

        aggregate
    }

    fn run_cycle(&self) -> CycleStats {
        let guard = CycleGuard::enter(&self.in_cycle);
        let mut stats = CycleStats::default();

        loop {
            stats.passes = stats.passes.saturating_add(1);

            // A signal raised during the pass may concern a task that
            // already ran in it
            let before = activity::current();
            let aggregate = self.pass(&mut stats);

            if aggregate.is_waiting() && activity::current() == before {
                break;
            }
        }

        drop(guard);

        trace!(
            "cycle done: {} passes, {} resumptions, {} retired",
            stats.passes,
            stats.resumptions,
            stats.retired
        );

        stats
    }

    fn idle_time(&self) -> Duration {
        let now = self.clock.now();

        self.pool
            .iter(&self.tcbs)
            .filter_map(|tcb| tcb.remaining(now))
            .fold(self.config.idle_ceiling, |min, remaining| {
                if remaining.ticks() < min.ticks() {
                    remaining
                } else {
                    min
                }
            })
    }
}

impl<C, const N: usize> Kernel for Scheduler<'_, C, N>
where
    C: Clock,
{
    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn spawn(&self, parent: TaskId, task: RawTask) -> Result<TaskId, SpawnError> {
        self.insert(task, Some(parent))
    }
}

/// Handle to pinned [`Scheduler`]
///
/// Use this to ensure pinned and initalized [`Scheduler`]. Use
/// [`Scheduler::get_handle`] to create handle.
pub struct SchedulerHandle<'a, 't, C, const N: usize>
where
    C: Clock,
{
    scheduler: Pin<&'a Scheduler<'t, C, N>>,
}

impl<'a, 't, C, const N: usize> SchedulerHandle<'a, 't, C, N>
where
    C: Clock,
{
    /// Add task to the end of the task pool
    ///
    /// Fails if the task is already in the pool, or if all task control
    /// blocks are in use.
    ///
    /// The task stays borrowed for as long as the scheduler is used, so it
    /// cannot be dropped while it is still in the pool:
    ///
    /// ```compile_fail
    /// # use core::pin::pin;
    /// # use coloop::{Clock, Instant, Scheduler, Task};
    /// # struct Zero;
    /// # impl Clock for Zero {
    /// #     fn now(&self) -> Instant {
    /// #         Instant::from_ticks(0)
    /// #     }
    /// # }
    /// let scheduler = pin!(Scheduler::<_, 1>::new(Zero));
    /// let handle = scheduler.as_ref().get_handle();
    ///
    /// {
    ///     let mut task = pin!(Task::new(async {}));
    ///     handle.register(task.as_mut().get_handle()).unwrap();
    /// }
    ///
    /// handle.run_cycle();
    /// ```
    pub fn register(&self, task: TaskHandle<'t>) -> Result<TaskId, SpawnError> {
        self.scheduler.insert(task.raw, None)
    }

    /// Run tasks until none of them makes progress
    ///
    /// Never returns if some task keeps making progress forever.
    pub fn run_cycle(&self) -> CycleStats {
        self.scheduler.run_cycle()
    }

    /// Time until the closest armed timer expires, capped at the
    /// configured ceiling
    ///
    /// This is only a hint: an interrupt may make a task runnable sooner.
    /// Zero means [`run_cycle`](Self::run_cycle) should be called again
    /// right away.
    pub fn idle_time(&self) -> Duration {
        self.scheduler.idle_time()
    }

    /// Run one cycle, then let the clock sleep for the idle time
    pub fn run_once(&self) -> CycleStats {
        let stats = self.run_cycle();
        let idle = self.idle_time();

        if idle.ticks() > 0 {
            self.scheduler.clock.sleep(idle);
        }

        stats
    }

    /// Number of tasks in the pool
    pub fn task_count(&self) -> usize {
        self.scheduler.pool.len()
    }

    /// Return whether the task is still in the pool
    pub fn is_registered(&self, id: TaskId) -> bool {
        self.scheduler
            .pool
            .iter(&self.scheduler.tcbs)
            .any(|tcb| tcb.id() == id)
    }

    /// Return current time
    pub fn now(&self) -> Instant {
        self.scheduler.clock.now()
    }

    /// Return reference to the clock
    pub fn clock(&self) -> &C {
        &self.scheduler.clock
    }
}
