//! Errors reported when adding tasks to a scheduler

use core::fmt;

/// Reason a task could not be added to the task pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Every task control block of the scheduler is in use
    Full,
    /// The task is already linked into the pool
    AlreadyRegistered,
    /// The invoke call site still has a live sub-task
    Busy,
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::Full => write!(f, "task pool is full"),
            SpawnError::AlreadyRegistered => write!(f, "task is already registered"),
            SpawnError::Busy => write!(f, "invoke call site is still running"),
        }
    }
}

impl core::error::Error for SpawnError {}
