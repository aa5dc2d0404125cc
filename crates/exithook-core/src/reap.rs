//! Discard child status records nobody will collect.
//!
//! A terminating parent can no longer wait for its children, so whatever
//! status records it still owns are destroyed rather than re-parented. This
//! bounds the records a dead task can leave behind at zero.
//!
//! The parent's entry may stay in the table for a while (the deletion path
//! runs later). Reaping marks it exiting so a child that exits in between
//! is reported as having no parent.

use crate::sched::Scheduler;
use crate::task::TaskRecord;

/// Destroy every child status record owned by `task` and mark it exiting.
/// Returns how many records were discarded.
pub fn reap_own_children(sched: &Scheduler, task: &TaskRecord) -> usize {
    sched
        .with_task(task.id(), |entry| {
            entry.mark_exiting();
            entry.child_records_mut().clear()
        })
        .unwrap_or(0)
}
