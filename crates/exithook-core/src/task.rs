//! Task control record as seen by the exit hook.
//!
//! The record is owned by the scheduler; the hook only ever borrows it. The
//! part of a task that *other* tasks touch (child accounting, signal mailbox)
//! lives in the scheduler table instead, see [`crate::sched::TaskEntry`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RegistryFull;
use crate::registry::{AtExitRegistry, OnExitRegistry};
use crate::waiter::ExitWaiter;

/// Scheduler-wide task identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i32);

impl TaskId {
    /// An id no task can hold. Looking it up always fails.
    pub const INVALID: TaskId = TaskId(-1);

    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What sort of execution unit a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Process-like task. Reports its exit to its parent.
    Task,
    /// Thread inside a task. Joined through a separate mechanism.
    Pthread,
    /// Kernel thread.
    Kernel,
}

impl TaskKind {
    #[must_use]
    pub const fn is_process_like(self) -> bool {
        matches!(self, Self::Task)
    }
}

/// Single-use link from a task to its parent.
///
/// The link is consumed when the exit notification is delivered; after that
/// the task behaves as if it never had a parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParentLink {
    Attached(TaskId),
    #[default]
    Detached,
}

impl ParentLink {
    #[must_use]
    pub fn new(parent: TaskId) -> Self {
        if parent.is_valid() {
            Self::Attached(parent)
        } else {
            Self::Detached
        }
    }

    /// The parent id to look up, or [`TaskId::INVALID`] once detached.
    #[must_use]
    pub fn id(self) -> TaskId {
        match self {
            Self::Attached(id) => id,
            Self::Detached => TaskId::INVALID,
        }
    }

    #[must_use]
    pub fn is_attached(self) -> bool {
        matches!(self, Self::Attached(_))
    }

    /// Detach, returning the parent that was linked (if any).
    pub fn take(&mut self) -> Option<TaskId> {
        match std::mem::take(self) {
            Self::Attached(id) => Some(id),
            Self::Detached => None,
        }
    }
}

/// Bookkeeping for one task or thread, borrowed by the exit hook.
pub struct TaskRecord {
    id: TaskId,
    kind: TaskKind,
    pub(crate) parent: ParentLink,
    pub(crate) atexit: AtExitRegistry,
    pub(crate) onexit: OnExitRegistry,
    exit_waiter: Option<Arc<ExitWaiter>>,
    pub(crate) exit_status: Option<i32>,
}

impl TaskRecord {
    #[must_use]
    pub fn new(id: TaskId, kind: TaskKind) -> Self {
        Self {
            id,
            kind,
            parent: ParentLink::Detached,
            atexit: AtExitRegistry::new(),
            onexit: OnExitRegistry::new(),
            exit_waiter: None,
            exit_status: None,
        }
    }

    /// Link this task under `parent`.
    #[must_use]
    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent = ParentLink::new(parent);
        self
    }

    /// Attach a blocking primitive other threads can wait on for this task's exit.
    #[must_use]
    pub fn with_exit_waiter(mut self, waiter: Arc<ExitWaiter>) -> Self {
        self.exit_waiter = Some(waiter);
        self
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    #[must_use]
    pub fn parent(&self) -> ParentLink {
        self.parent
    }

    #[must_use]
    pub fn exit_waiter(&self) -> Option<&Arc<ExitWaiter>> {
        self.exit_waiter.as_ref()
    }

    /// Status the exit hook last ran with, if it has run.
    #[must_use]
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    /// Register a zero-argument callback to run when this task exits.
    pub fn atexit<F>(&mut self, func: F) -> Result<(), RegistryFull>
    where
        F: FnOnce() + Send + 'static,
    {
        self.atexit.register(Box::new(func)).map(|_| ())
    }

    /// Register a callback receiving the exit status and `arg` when this task exits.
    pub fn on_exit<F>(&mut self, func: F, arg: usize) -> Result<(), RegistryFull>
    where
        F: FnOnce(i32, usize) + Send + 'static,
    {
        self.onexit.register((Box::new(func), arg)).map(|_| ())
    }

    #[must_use]
    pub fn pending_atexit(&self) -> usize {
        self.atexit.occupied()
    }

    #[must_use]
    pub fn pending_onexit(&self) -> usize {
        self.onexit.occupied()
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("parent", &self.parent)
            .field("atexit", &self.atexit.occupied())
            .field("onexit", &self.onexit.occupied())
            .field("exit_waiter", &self.exit_waiter.is_some())
            .field("exit_status", &self.exit_status)
            .finish()
    }
}
