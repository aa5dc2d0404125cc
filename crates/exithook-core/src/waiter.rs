//! Direct exit waiters, used when tasks have no parent linkage.
//!
//! [`ExitWaiter`] is the blocking primitive threads park on until a task
//! exits. Waiters are released in the order they blocked. Exactly one of them
//! receives the raw exit status: the first that asked for it. Everyone else
//! wakes with `None`.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::{Condvar, Mutex};

use crate::task::TaskRecord;

/// Encode an exit status the way `wait` reports it: exit code in bits 8..16.
#[must_use]
pub const fn encode_wait_status(status: i32) -> i32 {
    (status & 0xff) << 8
}

/// Recover the exit code from an encoded wait status.
#[must_use]
pub const fn decode_wait_status(wait_status: i32) -> i32 {
    (wait_status >> 8) & 0xff
}

#[derive(Debug, Default)]
struct WaitState {
    next_ticket: u64,
    blocked: VecDeque<u64>,
    released: HashSet<u64>,
    /// Waiter that asked for the raw status and has not received it yet.
    status_request: Option<u64>,
    written: HashMap<u64, i32>,
    closed: bool,
}

/// Blocking primitive for threads waiting on a task's termination.
#[derive(Debug, Default)]
pub struct ExitWaiter {
    state: Mutex<WaitState>,
    cond: Condvar,
}

impl ExitWaiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the task exits.
    ///
    /// With `want_status`, the caller asks for the encoded exit status to be
    /// written for it; only one waiter can hold that request. Returns
    /// immediately with `None` if the task has already exited.
    pub fn wait_for_exit(&self, want_status: bool) -> Option<i32> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.blocked.push_back(ticket);
        if want_status && state.status_request.is_none() {
            state.status_request = Some(ticket);
        }
        while !state.released.remove(&ticket) {
            self.cond.wait(&mut state);
        }
        state.written.remove(&ticket)
    }

    /// Number of threads currently blocked.
    #[must_use]
    pub fn pending_waiter_count(&self) -> usize {
        self.state.lock().blocked.len()
    }

    /// Write `wait_status` for the waiter holding the status request, if any,
    /// and clear the request.
    pub fn write_requested_status(&self, wait_status: i32) -> bool {
        let mut state = self.state.lock();
        match state.status_request.take() {
            Some(ticket) => {
                state.written.insert(ticket, wait_status);
                true
            }
            None => false,
        }
    }

    /// Release the longest-blocked waiter. Returns false if none was blocked.
    pub fn release_one(&self) -> bool {
        let mut state = self.state.lock();
        let Some(ticket) = state.blocked.pop_front() else {
            return false;
        };
        state.released.insert(ticket);
        drop(state);
        self.cond.notify_all();
        true
    }

    /// Refuse new waiters; later calls to [`Self::wait_for_exit`] return at once.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Release every thread blocked on `task`'s exit primitive.
///
/// The waiter holding the status request gets `status` in wait encoding.
/// Returns how many threads were released; a task without a waiter, or a
/// second call, releases none.
pub fn wake_waiters(task: &TaskRecord, status: i32) -> usize {
    let Some(waiter) = task.exit_waiter() else {
        return 0;
    };
    waiter.close();
    let mut released = 0;
    while waiter.pending_waiter_count() > 0 {
        waiter.write_requested_status(encode_wait_status(status));
        if waiter.release_one() {
            released += 1;
        }
    }
    released
}
