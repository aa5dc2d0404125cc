//! Exit hook configuration.
//!
//! Slot capacities are fixed at build time. How a terminating task reports to
//! whoever waits for it is selected via the `EXITHOOK_PARENT_TRACKING`
//! environment variable:
//! - `child-status` (default): the parent keeps one status record per child
//!   until it collects it, unless the parent opted out with
//!   [`crate::sched::TaskFlags::NO_CHILD_WAIT`], in which case only its live
//!   child count is maintained.
//! - `counter`: the parent only keeps a live child count.
//! - `off`: tasks have no parent linkage; threads blocked on the task's exit
//!   primitive are woken directly.

use std::sync::OnceLock;

/// Number of `atexit` slots per task.
pub const ATEXIT_MAX: usize = 8;

/// Number of `on_exit` slots per task.
pub const ONEXIT_MAX: usize = 8;

/// Pending signals a task mailbox holds before submissions fail.
pub const SIGNAL_QUEUE_DEPTH: usize = 32;

/// How a terminating task's exit is made visible.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentTracking {
    /// Parent keeps per-child status records pending collection.
    #[default]
    ChildStatus,
    /// Parent keeps a live child count only.
    Counter,
    /// No parent linkage; direct waiters are woken instead.
    Disabled,
}

impl ParentTracking {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "child-status" | "child_status" | "status" | "retain" => Self::ChildStatus,
            "counter" | "count" => Self::Counter,
            "off" | "none" | "disabled" => Self::Disabled,
            _ => Self::ChildStatus,
        }
    }

    /// Parent notification runs in this mode.
    #[must_use]
    pub const fn notifies_parent(self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Child status records are kept, and therefore must be reaped.
    #[must_use]
    pub const fn retains_child_status(self) -> bool {
        matches!(self, Self::ChildStatus)
    }

    /// Direct waiter wakeup runs in this mode.
    #[must_use]
    pub const fn wakes_waiters(self) -> bool {
        matches!(self, Self::Disabled)
    }
}

/// Configuration handed to [`crate::hook::ExitHook`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HookConfig {
    pub parent_tracking: ParentTracking,
}

impl HookConfig {
    #[must_use]
    pub const fn new(parent_tracking: ParentTracking) -> Self {
        Self { parent_tracking }
    }

    /// Configuration resolved from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(parent_tracking())
    }
}

static TRACKING: OnceLock<ParentTracking> = OnceLock::new();

/// Environment variable selecting the parent tracking mode.
pub const TRACKING_ENV: &str = "EXITHOOK_PARENT_TRACKING";

fn resolve_from_env() -> ParentTracking {
    std::env::var(TRACKING_ENV)
        .map(|v| ParentTracking::from_str_loose(&v))
        .unwrap_or_default()
}

/// Get the configured parent tracking mode (reads env var on first call, caches thereafter).
///
/// Callers racing the first resolution block until it completes and all see
/// the same mode.
#[must_use]
pub fn parent_tracking() -> ParentTracking {
    *TRACKING.get_or_init(resolve_from_env)
}
