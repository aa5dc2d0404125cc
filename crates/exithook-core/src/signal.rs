//! Exit-notification payload and the per-task pending-signal mailbox.
//!
//! Generic signal queuing and delivery belongs to the signal subsystem; this
//! module only builds the one child-terminated event the exit hook sends and
//! models the mailbox it is dropped into.

use std::collections::VecDeque;

use serde::Serialize;

use crate::config::SIGNAL_QUEUE_DEPTH;
use crate::error::SignalError;
use crate::task::TaskId;

/// Child stopped or terminated.
pub const SIGCHLD: i32 = 17;

/// `si_code` for SIGCHLD: child has exited.
pub const CLD_EXITED: i32 = 1;

/// No such process.
pub const ESRCH: i32 = 3;
/// Resource temporarily unavailable.
pub const EAGAIN: i32 = 11;

/// Signal information delivered with a queued signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SigInfo {
    pub signo: i32,
    pub code: i32,
    /// Task that caused the signal.
    pub pid: TaskId,
    pub status: i32,
    /// Attached value, if any.
    pub value: Option<usize>,
}

impl SigInfo {
    /// Notification that `child` exited normally with `status`.
    #[must_use]
    pub const fn child_exited(child: TaskId, status: i32) -> Self {
        Self {
            signo: SIGCHLD,
            code: CLD_EXITED,
            pid: child,
            status,
            value: None,
        }
    }
}

/// Bounded queue of signals pending for one task.
///
/// A closed queue models a task that can no longer be signalled.
#[derive(Debug, Clone)]
pub struct SignalQueue {
    pending: VecDeque<SigInfo>,
    capacity: usize,
    open: bool,
}

impl SignalQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(SIGNAL_QUEUE_DEPTH)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity,
            open: true,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Stop accepting submissions. Already queued signals stay queued.
    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn reopen(&mut self) {
        self.open = true;
    }

    /// Queue `info` for `owner`.
    pub fn submit(&mut self, owner: TaskId, info: SigInfo) -> Result<(), SignalError> {
        if !self.open {
            return Err(SignalError::Unsignalable { target: owner });
        }
        if self.pending.len() >= self.capacity {
            return Err(SignalError::QueueFull {
                target: owner,
                capacity: self.capacity,
            });
        }
        self.pending.push_back(info);
        Ok(())
    }

    #[must_use]
    pub fn pending(&self) -> &VecDeque<SigInfo> {
        &self.pending
    }

    /// Remove and return the oldest pending signal.
    pub fn pop(&mut self) -> Option<SigInfo> {
        self.pending.pop_front()
    }

    /// Discard everything pending. Returns how many signals were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

impl Default for SignalQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_exited_payload_shape() {
        let info = SigInfo::child_exited(TaskId(12), 3);
        assert_eq!(info.signo, SIGCHLD);
        assert_eq!(info.code, CLD_EXITED);
        assert_eq!(info.pid, TaskId(12));
        assert_eq!(info.status, 3);
        assert_eq!(info.value, None);
    }

    #[test]
    fn closed_queue_rejects_submission() {
        let mut queue = SignalQueue::new();
        queue.close();
        let err = queue
            .submit(TaskId(1), SigInfo::child_exited(TaskId(2), 0))
            .unwrap_err();
        assert_eq!(err, SignalError::Unsignalable { target: TaskId(1) });
        assert!(queue.pending().is_empty());
    }

    #[test]
    fn full_queue_rejects_submission() {
        let mut queue = SignalQueue::with_capacity(1);
        queue
            .submit(TaskId(1), SigInfo::child_exited(TaskId(2), 0))
            .unwrap();
        let err = queue
            .submit(TaskId(1), SigInfo::child_exited(TaskId(3), 0))
            .unwrap_err();
        assert_eq!(
            err,
            SignalError::QueueFull {
                target: TaskId(1),
                capacity: 1
            }
        );
    }

    #[test]
    fn queue_is_fifo_and_clearable() {
        let mut queue = SignalQueue::new();
        for child in 2..5 {
            queue
                .submit(TaskId(1), SigInfo::child_exited(TaskId(child), child))
                .unwrap();
        }
        assert_eq!(queue.pop().map(|i| i.pid), Some(TaskId(2)));
        assert_eq!(queue.clear(), 2);
        assert!(queue.pop().is_none());
    }

    #[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]
    #[test]
    fn constants_match_linux_abi() {
        assert_eq!(SIGCHLD, libc::SIGCHLD);
        assert_eq!(CLD_EXITED, libc::CLD_EXITED);
        assert_eq!(ESRCH, libc::ESRCH);
        assert_eq!(EAGAIN, libc::EAGAIN);
    }
}
