//! Error taxonomy for the exit hook.
//!
//! Three classes exist and they are handled very differently:
//!
//! - [`RegistryFull`] is returned synchronously to a task registering an exit
//!   callback. It never surfaces during the hook itself.
//! - [`StepFailure`] wraps resource-level failures (stream flush, parent
//!   signal submission). The orchestrator records them in its report and keeps
//!   going.
//! - [`ConsistencyError`] means the scheduler's child accounting is corrupt.
//!   It is never returned; [`fatal`] panics with it.

use serde::Serialize;
use thiserror::Error;

use crate::task::TaskId;

/// Every slot of a callback registry is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("exit callback registry full ({capacity} slots)")]
pub struct RegistryFull {
    pub capacity: usize,
}

/// Submission of a signal to a task's mailbox failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind")]
pub enum SignalError {
    #[error("task {target} is not accepting signals")]
    Unsignalable { target: TaskId },
    #[error("signal queue of task {target} is full ({capacity} pending)")]
    QueueFull { target: TaskId, capacity: usize },
}

/// Corrupted cross-task accounting detected while notifying a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("parent {parent} has no live children to account for")]
    ChildCountUnderflow { parent: TaskId },
    #[error("parent {parent} holds no status record for child {child}")]
    MissingChildRecord { parent: TaskId, child: TaskId },
}

/// Abort on corrupted scheduler state.
///
/// Continuing would risk corrupting an unrelated task's accounting.
#[cold]
#[track_caller]
pub fn fatal(err: ConsistencyError) -> ! {
    panic!("exit hook consistency violation: {err}")
}

/// A non-fatal failure of one hook step.
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error("flushing streams of task {task} failed: {source}")]
    StreamFlush {
        task: TaskId,
        #[source]
        source: std::io::Error,
    },
    #[error("notifying parent {parent} failed: {source}")]
    ParentSignal {
        parent: TaskId,
        #[source]
        source: SignalError,
    },
}

impl StepFailure {
    /// Short stable name for logs and reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StreamFlush { .. } => "stream_flush",
            Self::ParentSignal { .. } => "parent_signal",
        }
    }

    /// errno-style code for the failure, when one is known.
    #[must_use]
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::StreamFlush { source, .. } => source.raw_os_error(),
            Self::ParentSignal { source, .. } => Some(match source {
                SignalError::Unsignalable { .. } => crate::signal::ESRCH,
                SignalError::QueueFull { .. } => crate::signal::EAGAIN,
            }),
        }
    }
}
