//! Coloop is a cooperative, run-to-quiescence task scheduler targetting
//! embedded systems.
//!
//! Features:
//! - Static allocation, task storage is owned by the caller
//! - Every scheduling cycle runs tasks until none of them can make
//!   progress, so signals between tasks resolve within one cycle
//! - Delays and semaphore waits with timeout, sharing one timer slot
//!   per task
//! - Idle time hint for putting the CPU to sleep between cycles
//! - Dynamic spawning of sub-tasks from inside a running task
//!
//! # Example
//! ```ignore
//! static SEM: Semaphore = Semaphore::new(0);
//!
//! async fn producer() {
//!     loop {
//!         delay(Duration::millis(1000)).await;
//!         SEM.signal();
//!     }
//! }
//!
//! async fn consumer() {
//!     loop {
//!         match SEM.wait_timeout(Duration::millis(2000)).await {
//!             Ok(()) => log::info!("got it"),
//!             Err(TimeoutError {}) => log::warn!("timed out"),
//!         }
//!     }
//! }
//!
//! fn main() {
//!     let mut producer = pin!(Task::new(producer()));
//!     let mut consumer = pin!(Task::new(consumer()));
//!     let scheduler = pin!(Scheduler::<_, 4>::new(StdClock::new()));
//!     let handle = scheduler.as_ref().get_handle();
//!
//!     handle.register(producer.as_mut().get_handle()).unwrap();
//!     handle.register(consumer.as_mut().get_handle()).unwrap();
//!
//!     loop {
//!         // Run to quiescence, then sleep until the next deadline
//!         handle.run_once();
//!     }
//! }
//! ```
//!
//! See the `demos/` directory for a complete program.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![cfg_attr(feature = "nightly", feature(doc_cfg))]

#[cfg(test)]
mod common;

pub mod error;
pub mod invoke;
pub mod scheduler;
pub mod sync;
pub mod task;
pub mod timer;

pub use error::SpawnError;
pub use invoke::{invoke, Invocation};
pub use scheduler::{CycleStats, Scheduler, SchedulerConfig, SchedulerHandle};
pub use sync::Semaphore;
pub use task::{yield_now, Task, TaskHandle, TaskId, TaskStatus};
pub use timer::{delay, delay_until, Clock, Duration, Instant, TimeoutError, Timer};
