//! Exit hook orchestrator.
//!
//! [`ExitHook::run_exit_hook`] is called from two places for one task: the
//! voluntary exit path, on the exiting task's own context, and the forced
//! deletion path, on the deleting task's context after the victim has been
//! taken off the ready queue. Either may run first and both may run. Every
//! step therefore guards itself:
//!
//! 1. `atexit` callbacks, newest first. Slots empty as they fire.
//! 2. `on_exit` callbacks with the exit status. Same.
//! 3. Parent notification. The parent link is consumed on first delivery.
//! 4. Direct waiter wakeup (only without parent tracking). Nobody is left
//!    blocked after the first run.
//! 5. Stream flush, best effort.
//! 6. Reap this task's own uncollected child records and stop accounting
//!    for children, so a child exiting later sees no parent.
//! 7. Release file resources early, while the task is still schedulable.
//! 8. Drop queued signal state.
//!
//! Steps 5, 7 and 8 call into [`TaskResources`], whose implementations must
//! be safe to call again. None of the steps can make the hook fail: failures
//! are recorded in the [`ExitReport`] and logged.

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::HookConfig;
use crate::error::StepFailure;
use crate::log::{HookStep, LogEmitter, LogEntry, LogLevel};
use crate::notify::{NotifyOutcome, notify_parent};
use crate::reap::reap_own_children;
use crate::sched::Scheduler;
use crate::task::{TaskId, TaskRecord};
use crate::waiter::wake_waiters;

/// Resource-release collaborators invoked by the hook.
///
/// Each method may be called more than once for the same task.
pub trait TaskResources {
    /// Flush every output stream the task owns.
    fn flush_all_streams(&self, task: &TaskRecord) -> std::io::Result<()>;

    /// Close the task's file descriptors and related resources.
    fn release_file_resources(&self, task: &TaskRecord);

    /// Free signal-subsystem state (handlers, masks, queued actions).
    fn teardown_signal_state(&self, task: &TaskRecord);
}

/// Collaborator for tasks that own no streams, files or signal state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResources;

impl TaskResources for NoResources {
    fn flush_all_streams(&self, _task: &TaskRecord) -> std::io::Result<()> {
        Ok(())
    }

    fn release_file_resources(&self, _task: &TaskRecord) {}

    fn teardown_signal_state(&self, _task: &TaskRecord) {}
}

impl<R: TaskResources + ?Sized> TaskResources for &R {
    fn flush_all_streams(&self, task: &TaskRecord) -> std::io::Result<()> {
        (**self).flush_all_streams(task)
    }

    fn release_file_resources(&self, task: &TaskRecord) {
        (**self).release_file_resources(task);
    }

    fn teardown_signal_state(&self, task: &TaskRecord) {
        (**self).teardown_signal_state(task);
    }
}

/// What one run of the hook did.
#[derive(Debug, Serialize)]
pub struct ExitReport {
    pub task: TaskId,
    pub status: i32,
    pub atexit_fired: usize,
    pub onexit_fired: usize,
    pub notify: NotifyOutcome,
    pub waiters_released: usize,
    pub children_reaped: usize,
    pub signals_discarded: usize,
    #[serde(skip)]
    pub failures: Vec<StepFailure>,
}

impl ExitReport {
    fn new(task: TaskId, status: i32) -> Self {
        Self {
            task,
            status,
            atexit_fired: 0,
            onexit_fired: 0,
            notify: NotifyOutcome::NotApplicable,
            waiters_released: 0,
            children_reaped: 0,
            signals_discarded: 0,
            failures: Vec::new(),
        }
    }

    /// Every step completed without a recorded failure.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Total callbacks fired across both registries.
    #[must_use]
    pub fn callbacks_fired(&self) -> usize {
        self.atexit_fired + self.onexit_fired
    }
}

/// The exit hook, bound to a scheduler and its resource collaborators.
pub struct ExitHook<'s, R = NoResources> {
    sched: &'s Scheduler,
    resources: R,
    config: HookConfig,
    log: Option<Mutex<LogEmitter>>,
}

impl<'s> ExitHook<'s, NoResources> {
    #[must_use]
    pub fn new(sched: &'s Scheduler, config: HookConfig) -> Self {
        Self {
            sched,
            resources: NoResources,
            config,
            log: None,
        }
    }
}

impl<'s, R: TaskResources> ExitHook<'s, R> {
    /// Replace the resource collaborators.
    #[must_use]
    pub fn with_resources<T: TaskResources>(self, resources: T) -> ExitHook<'s, T> {
        ExitHook {
            sched: self.sched,
            resources,
            config: self.config,
            log: self.log,
        }
    }

    /// Emit structured events for every run.
    #[must_use]
    pub fn with_log(mut self, emitter: LogEmitter) -> Self {
        self.log = Some(Mutex::new(emitter));
        self
    }

    #[must_use]
    pub fn config(&self) -> HookConfig {
        self.config
    }

    /// Run every termination step for `task`. Safe to call again for the same task.
    ///
    /// # Panics
    ///
    /// Panics if the parent's child accounting is found corrupt (see
    /// [`notify_parent`]). Callbacks that panic propagate as well.
    pub fn run_exit_hook(&self, task: &mut TaskRecord, status: i32) -> ExitReport {
        let tracking = self.config.parent_tracking;
        let mut report = ExitReport::new(task.id(), status);
        task.exit_status = Some(status);
        self.log_event(
            LogEntry::new("", LogLevel::Debug, "exit_hook_begin")
                .with_task(task.id())
                .with_status(status),
        );

        report.atexit_fired = task.atexit.drain_and_invoke();
        report.onexit_fired = task.onexit.drain_and_invoke(status);

        report.notify = notify_parent(self.sched, task, status, tracking);
        if let NotifyOutcome::SignalFailed { parent, error } = report.notify {
            self.record_failure(
                &mut report,
                HookStep::NotifyParent,
                StepFailure::ParentSignal {
                    parent,
                    source: error,
                },
            );
        }

        if tracking.wakes_waiters() {
            report.waiters_released = wake_waiters(task, status);
        }

        if let Err(source) = self.resources.flush_all_streams(task) {
            self.record_failure(
                &mut report,
                HookStep::FlushStreams,
                StepFailure::StreamFlush {
                    task: task.id(),
                    source,
                },
            );
        }

        if tracking.retains_child_status() {
            report.children_reaped = reap_own_children(self.sched, task);
        }

        self.resources.release_file_resources(task);

        report.signals_discarded = self.sched.discard_pending_signals(task.id());
        self.resources.teardown_signal_state(task);

        let level = if report.is_clean() {
            LogLevel::Info
        } else {
            LogLevel::Warn
        };
        let mut details = serde_json::to_value(&report).unwrap_or_default();
        if let Some(fields) = details.as_object_mut() {
            let kinds: Vec<&str> = report.failures.iter().map(StepFailure::kind).collect();
            fields.insert("failures".into(), serde_json::json!(kinds));
        }
        self.log_event(
            LogEntry::new("", level, "exit_hook_end")
                .with_task(task.id())
                .with_status(status)
                .with_details(details),
        );
        report
    }

    fn record_failure(&self, report: &mut ExitReport, step: HookStep, failure: StepFailure) {
        let mut entry = LogEntry::new("", LogLevel::Warn, "exit_hook_step_failed")
            .with_task(report.task)
            .with_step(step)
            .with_errno(failure.errno())
            .with_details(serde_json::json!({
                "failure": failure.kind(),
                "message": failure.to_string(),
            }));
        if let StepFailure::ParentSignal { parent, .. } = &failure {
            entry = entry.with_parent(*parent);
        }
        self.log_event(entry);
        report.failures.push(failure);
    }

    fn log_event(&self, entry: LogEntry) {
        if let Some(log) = &self.log {
            // A task that cannot log must still finish exiting.
            let _ = log.lock().emit_entry(entry);
        }
    }
}

/// Run the exit hook for `task` with the environment-selected configuration
/// and no resource collaborators.
pub fn run_exit_hook(sched: &Scheduler, task: &mut TaskRecord, status: i32) -> ExitReport {
    ExitHook::new(sched, HookConfig::from_env()).run_exit_hook(task, status)
}
