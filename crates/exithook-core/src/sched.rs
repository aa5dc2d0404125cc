//! Scheduler task table and the scheduler-wide lock.
//!
//! The table holds the part of each task that other tasks reach into: child
//! accounting and the pending-signal mailbox. Access goes through a
//! [`SchedGuard`]; a [`TaskHandle`] obtained from it borrows the guard, so it
//! cannot outlive the lock.
//!
//! The lock is recursive but the table is a `RefCell` behind it: only one
//! [`TaskHandle`] may be live at a time on a given thread. Taking the lock
//! again while a handle is live is fine; reaching the table through the
//! scheduler again (another `lookup`, [`Scheduler::with_task`],
//! [`Scheduler::contains`] and the like) panics. Nested work goes through
//! the handle already held.

use std::cell::{RefCell, RefMut};
use std::collections::BTreeMap;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::child::{ChildStatus, ChildStatusList};
use crate::config::ParentTracking;
use crate::signal::SignalQueue;
use crate::task::TaskId;

/// Per-task scheduler flags.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskFlags(u8);

impl TaskFlags {
    pub const NONE: TaskFlags = TaskFlags(0);
    /// The task does not retain exit status of its children.
    pub const NO_CHILD_WAIT: TaskFlags = TaskFlags(1 << 0);
    /// The task has run its exit hook and no longer accounts for children.
    pub const EXITING: TaskFlags = TaskFlags(1 << 1);

    #[must_use]
    pub const fn contains(self, other: TaskFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn union(self, other: TaskFlags) -> TaskFlags {
        TaskFlags(self.0 | other.0)
    }
}

/// Cross-task state of one task, owned by the scheduler table.
#[derive(Debug, Clone, Default)]
pub struct TaskEntry {
    pub flags: TaskFlags,
    live_children: usize,
    children: ChildStatusList,
    pub signals: SignalQueue,
}

impl TaskEntry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_flags(mut self, flags: TaskFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn is_exiting(&self) -> bool {
        self.flags.contains(TaskFlags::EXITING)
    }

    /// Stop accounting for children. Later child exits see no parent.
    pub fn mark_exiting(&mut self) {
        self.flags = self.flags.union(TaskFlags::EXITING);
    }

    /// Whether a child's exit is stored as a status record under `tracking`.
    #[must_use]
    pub fn keeps_child_status(&self, tracking: ParentTracking) -> bool {
        tracking.retains_child_status() && !self.flags.contains(TaskFlags::NO_CHILD_WAIT)
    }

    /// Register `child` as trackable under this task.
    ///
    /// Creates a pending status record when status is kept, otherwise bumps
    /// the live child count. Returns false if a record for `child` already
    /// exists.
    pub fn add_child(&mut self, child: TaskId, tracking: ParentTracking) -> bool {
        if self.keeps_child_status(tracking) {
            self.children.insert(child)
        } else {
            self.live_children += 1;
            true
        }
    }

    #[must_use]
    pub fn live_children(&self) -> usize {
        self.live_children
    }

    /// Account for one exited child. Returns false if none were live.
    pub fn release_live_child(&mut self) -> bool {
        match self.live_children.checked_sub(1) {
            Some(remaining) => {
                self.live_children = remaining;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn child_records(&self) -> &ChildStatusList {
        &self.children
    }

    pub fn child_records_mut(&mut self) -> &mut ChildStatusList {
        &mut self.children
    }

    /// Collect the record of `child` if it has exited.
    pub fn collect_child(&mut self, child: TaskId) -> Option<ChildStatus> {
        if self.children.find(child)?.exited {
            self.children.remove(child)
        } else {
            None
        }
    }

    /// Collect the oldest exited child's record.
    pub fn collect_any_exited(&mut self) -> Option<ChildStatus> {
        self.children.remove_first_exited()
    }
}

type TaskTable = BTreeMap<TaskId, TaskEntry>;

/// Checked handle to a task's shared entry, valid while its guard is held.
pub type TaskHandle<'g> = RefMut<'g, TaskEntry>;

/// Scheduler task table behind the scheduler-wide recursive lock.
pub struct Scheduler {
    table: ReentrantMutex<RefCell<TaskTable>>,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: ReentrantMutex::new(RefCell::new(TaskTable::new())),
        }
    }

    /// Acquire the scheduler lock. Recursive acquisition is allowed.
    pub fn lock(&self) -> SchedGuard<'_> {
        SchedGuard {
            table: self.table.lock(),
        }
    }

    /// Add (or replace) the shared entry for `id`. Invalid ids are ignored.
    pub fn insert_task(&self, id: TaskId, entry: TaskEntry) -> Option<TaskEntry> {
        if !id.is_valid() {
            return None;
        }
        self.lock().table.borrow_mut().insert(id, entry)
    }

    /// Remove the shared entry for `id`, as when its record is deallocated.
    pub fn remove_task(&self, id: TaskId) -> Option<TaskEntry> {
        self.lock().table.borrow_mut().remove(&id)
    }

    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.lock().table.borrow().contains_key(&id)
    }

    /// Run `f` on the entry for `id` under the scheduler lock.
    ///
    /// # Panics
    ///
    /// Panics if `f` reaches back into this scheduler's table (for example
    /// `contains` or a nested `with_task`); the entry is still borrowed.
    pub fn with_task<R>(&self, id: TaskId, f: impl FnOnce(&mut TaskEntry) -> R) -> Option<R> {
        let guard = self.lock();
        let mut entry = guard.lookup(id)?;
        Some(f(&mut entry))
    }

    /// Drop everything queued for `id` and stop accepting new signals.
    pub fn discard_pending_signals(&self, id: TaskId) -> usize {
        self.with_task(id, |entry| {
            entry.signals.close();
            entry.signals.clear()
        })
        .unwrap_or(0)
    }

    #[must_use]
    pub fn task_count(&self) -> usize {
        self.lock().table.borrow().len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.task_count())
            .finish()
    }
}

/// Held scheduler lock. Releasing it invalidates every handle obtained from it.
pub struct SchedGuard<'a> {
    table: ReentrantMutexGuard<'a, RefCell<TaskTable>>,
}

impl SchedGuard<'_> {
    /// Look up a task's shared entry. [`TaskId::INVALID`] never resolves.
    #[must_use]
    pub fn lookup(&self, id: TaskId) -> Option<TaskHandle<'_>> {
        if !id.is_valid() {
            return None;
        }
        RefMut::filter_map(self.table.borrow_mut(), |table| table.get_mut(&id)).ok()
    }
}
