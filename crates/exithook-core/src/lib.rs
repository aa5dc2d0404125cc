//! # exithook-core
//!
//! Task-termination hook for a small multitasking kernel.
//!
//! When a task ends, voluntarily or because another task deleted it,
//! [`ExitHook::run_exit_hook`] performs the cleanup that must happen while
//! the task is still schedulable: exit callbacks run newest first, the
//! parent learns of the exit, blocked waiters are released, streams are
//! flushed, uncollected child records are discarded and file and signal
//! resources are let go. Every step tolerates a repeated call.

#![deny(unsafe_code)]

pub mod child;
pub mod config;
pub mod error;
pub mod hook;
pub mod log;
pub mod notify;
pub mod reap;
pub mod registry;
pub mod sched;
pub mod signal;
pub mod task;
pub mod waiter;

pub use config::{HookConfig, ParentTracking};
pub use error::{ConsistencyError, RegistryFull, SignalError, StepFailure};
pub use hook::{ExitHook, ExitReport, NoResources, TaskResources, run_exit_hook};
pub use notify::NotifyOutcome;
pub use sched::{Scheduler, TaskEntry, TaskFlags};
pub use task::{ParentLink, TaskId, TaskKind, TaskRecord};
pub use waiter::ExitWaiter;
