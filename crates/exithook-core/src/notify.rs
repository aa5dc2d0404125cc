//! Parent notification: child accounting plus the child-terminated signal.
//!
//! Lookup, accounting update, link release and signal submission all happen
//! under one hold of the scheduler lock, so the parent cannot be torn down in
//! the middle. Consuming the parent link before the lock is released is what
//! makes a second call a no-op.

use serde::Serialize;

use crate::config::ParentTracking;
use crate::error::{ConsistencyError, SignalError, fatal};
use crate::sched::Scheduler;
use crate::signal::SigInfo;
use crate::task::{TaskId, TaskRecord};

/// What parent notification did for one terminating task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotifyOutcome {
    /// Thread-like task, or parent tracking is disabled.
    NotApplicable,
    /// No live parent: never had one, already gone or exiting, or already notified.
    NoParent,
    /// Accounting updated and the signal queued.
    Delivered { parent: TaskId },
    /// Accounting updated but the parent refused the signal.
    SignalFailed { parent: TaskId, error: SignalError },
}

impl NotifyOutcome {
    /// The parent's accounting was updated by this call.
    #[must_use]
    pub fn reached_parent(self) -> bool {
        matches!(self, Self::Delivered { .. } | Self::SignalFailed { .. })
    }
}

/// Report `task`'s termination with `status` to its parent.
///
/// # Panics
///
/// Panics (via [`fatal`]) if the parent's accounting is inconsistent: its
/// live child count is already zero, or it is expected to hold a status
/// record for `task` and does not.
pub fn notify_parent(
    sched: &Scheduler,
    task: &mut TaskRecord,
    status: i32,
    tracking: ParentTracking,
) -> NotifyOutcome {
    if !tracking.notifies_parent() || !task.kind().is_process_like() {
        return NotifyOutcome::NotApplicable;
    }

    let guard = sched.lock();
    let parent_id = task.parent.id();
    let Some(mut parent) = guard.lookup(parent_id).filter(|p| !p.is_exiting()) else {
        return NotifyOutcome::NoParent;
    };

    if parent.keeps_child_status(tracking) {
        match parent.child_records_mut().find_mut(task.id()) {
            Some(record) => record.mark_exited(status),
            None => fatal(ConsistencyError::MissingChildRecord {
                parent: parent_id,
                child: task.id(),
            }),
        }
    } else if !parent.release_live_child() {
        fatal(ConsistencyError::ChildCountUnderflow { parent: parent_id });
    }

    task.parent.take();

    let info = SigInfo::child_exited(task.id(), status);
    match parent.signals.submit(parent_id, info) {
        Ok(()) => NotifyOutcome::Delivered { parent: parent_id },
        Err(error) => NotifyOutcome::SignalFailed {
            parent: parent_id,
            error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::{TaskEntry, TaskFlags};
    use crate::signal::{CLD_EXITED, SIGCHLD};
    use crate::task::{ParentLink, TaskKind};

    const PARENT: TaskId = TaskId(1);
    const CHILD: TaskId = TaskId(2);

    fn family(tracking: ParentTracking, flags: TaskFlags) -> (Scheduler, TaskRecord) {
        let sched = Scheduler::new();
        let mut entry = TaskEntry::new().with_flags(flags);
        entry.add_child(CHILD, tracking);
        sched.insert_task(PARENT, entry);
        sched.insert_task(CHILD, TaskEntry::new());
        let child = TaskRecord::new(CHILD, TaskKind::Task).with_parent(PARENT);
        (sched, child)
    }

    #[test]
    fn child_status_record_is_marked_exited() {
        let (sched, mut child) = family(ParentTracking::ChildStatus, TaskFlags::NONE);
        let outcome = notify_parent(&sched, &mut child, 3, ParentTracking::ChildStatus);
        assert_eq!(outcome, NotifyOutcome::Delivered { parent: PARENT });
        assert_eq!(child.parent(), ParentLink::Detached);

        let record = sched
            .with_task(PARENT, |p| *p.child_records().find(CHILD).unwrap())
            .unwrap();
        assert!(record.exited);
        assert_eq!(record.status, 3);
    }

    #[test]
    fn signal_payload_describes_the_exit() {
        let (sched, mut child) = family(ParentTracking::ChildStatus, TaskFlags::NONE);
        notify_parent(&sched, &mut child, 9, ParentTracking::ChildStatus);
        let info = sched.with_task(PARENT, |p| p.signals.pop()).unwrap().unwrap();
        assert_eq!(info.signo, SIGCHLD);
        assert_eq!(info.code, CLD_EXITED);
        assert_eq!(info.pid, CHILD);
        assert_eq!(info.status, 9);
        assert_eq!(info.value, None);
    }

    #[test]
    fn second_notification_is_a_no_op() {
        let (sched, mut child) = family(ParentTracking::Counter, TaskFlags::NONE);
        sched.with_task(PARENT, |p| p.add_child(TaskId(3), ParentTracking::Counter));

        let first = notify_parent(&sched, &mut child, 0, ParentTracking::Counter);
        let second = notify_parent(&sched, &mut child, 0, ParentTracking::Counter);
        assert!(first.reached_parent());
        assert_eq!(second, NotifyOutcome::NoParent);
        assert_eq!(sched.with_task(PARENT, |p| p.live_children()), Some(1));
        assert_eq!(sched.with_task(PARENT, |p| p.signals.pending().len()), Some(1));
    }

    #[test]
    fn opted_out_parent_only_loses_a_live_child() {
        let (sched, mut child) = family(ParentTracking::ChildStatus, TaskFlags::NO_CHILD_WAIT);
        let outcome = notify_parent(&sched, &mut child, 1, ParentTracking::ChildStatus);
        assert!(outcome.reached_parent());
        assert_eq!(sched.with_task(PARENT, |p| p.live_children()), Some(0));
        assert_eq!(sched.with_task(PARENT, |p| p.child_records().len()), Some(0));
    }

    #[test]
    fn missing_parent_submits_nothing() {
        let (sched, mut child) = family(ParentTracking::ChildStatus, TaskFlags::NONE);
        sched.remove_task(PARENT);
        let outcome = notify_parent(&sched, &mut child, 0, ParentTracking::ChildStatus);
        assert_eq!(outcome, NotifyOutcome::NoParent);
        // The link stays; there was nothing to consume it for.
        assert_eq!(child.parent(), ParentLink::Attached(PARENT));
    }

    #[test]
    fn exiting_parent_is_treated_as_absent() {
        let (sched, mut child) = family(ParentTracking::ChildStatus, TaskFlags::NONE);
        sched.with_task(PARENT, |p| {
            p.mark_exiting();
            p.child_records_mut().clear();
        });
        let outcome = notify_parent(&sched, &mut child, 5, ParentTracking::ChildStatus);
        assert_eq!(outcome, NotifyOutcome::NoParent);
        assert_eq!(sched.with_task(PARENT, |p| p.signals.pending().len()), Some(0));
    }

    #[test]
    fn threads_and_disabled_tracking_are_not_applicable() {
        let (sched, _) = family(ParentTracking::ChildStatus, TaskFlags::NONE);
        let mut thread = TaskRecord::new(CHILD, TaskKind::Pthread).with_parent(PARENT);
        assert_eq!(
            notify_parent(&sched, &mut thread, 0, ParentTracking::ChildStatus),
            NotifyOutcome::NotApplicable
        );
        assert_eq!(thread.parent(), ParentLink::Attached(PARENT));

        let mut task = TaskRecord::new(CHILD, TaskKind::Task).with_parent(PARENT);
        assert_eq!(
            notify_parent(&sched, &mut task, 0, ParentTracking::Disabled),
            NotifyOutcome::NotApplicable
        );
    }

    #[test]
    fn unsignalable_parent_still_has_accounting_updated() {
        let (sched, mut child) = family(ParentTracking::ChildStatus, TaskFlags::NONE);
        sched.with_task(PARENT, |p| p.signals.close());
        let outcome = notify_parent(&sched, &mut child, 2, ParentTracking::ChildStatus);
        assert_eq!(
            outcome,
            NotifyOutcome::SignalFailed {
                parent: PARENT,
                error: SignalError::Unsignalable { target: PARENT },
            }
        );
        assert_eq!(child.parent(), ParentLink::Detached);
        let exited = sched
            .with_task(PARENT, |p| p.child_records().find(CHILD).unwrap().exited)
            .unwrap();
        assert!(exited);
    }

    #[test]
    #[should_panic(expected = "has no live children")]
    fn counter_underflow_is_fatal() {
        let sched = Scheduler::new();
        sched.insert_task(PARENT, TaskEntry::new());
        let mut child = TaskRecord::new(CHILD, TaskKind::Task).with_parent(PARENT);
        notify_parent(&sched, &mut child, 0, ParentTracking::Counter);
    }

    #[test]
    #[should_panic(expected = "holds no status record for child 2")]
    fn missing_child_record_is_fatal() {
        let sched = Scheduler::new();
        sched.insert_task(PARENT, TaskEntry::new());
        let mut child = TaskRecord::new(CHILD, TaskKind::Task).with_parent(PARENT);
        notify_parent(&sched, &mut child, 0, ParentTracking::ChildStatus);
    }
}
