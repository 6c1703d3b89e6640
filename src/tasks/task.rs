//! Shared task-lifecycle plumbing.
//!
//! Resolves DESIGN NOTES §9's "TaskEngine inheritance" redesign flag: there
//! is no base class to inherit from, just one `TaskHandle` type every
//! `spawn_*` function in this module returns. Grounded directly on the
//! teacher's `hub/workers.rs` thread + `Arc<AtomicBool>` kill flag + Drop-join
//! + manual `Debug` pattern.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Why a task's loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Killed cooperatively by the Supervisor.
    Killed,
    /// Repeated transient failures exceeded the task's own threshold
    /// (e.g. Listener framing timeouts).
    Timeout,
    /// An unrecoverable condition was observed (e.g. a non-timeout I/O error,
    /// or a fatal device-reported protocol error).
    Error,
}

/// A shared flag tasks poll cooperatively between work items.
#[derive(Clone, Default)]
pub struct KillSwitch(Arc<AtomicBool>);

impl KillSwitch {
    /// Build a fresh, unset kill switch.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Signal the task to exit at its next poll point.
    pub fn kill(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// True once [`Self::kill`] has been called.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A handle to a spawned task thread. Dropping it signals kill and joins.
pub struct TaskHandle {
    name: &'static str,
    kill_switch: KillSwitch,
    join_handle: Option<JoinHandle<TaskOutcome>>,
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl TaskHandle {
    /// Wrap a spawned thread's join handle with its kill switch.
    #[must_use]
    pub fn new(name: &'static str, kill_switch: KillSwitch, join_handle: JoinHandle<TaskOutcome>) -> Self {
        Self {
            name,
            kill_switch,
            join_handle: Some(join_handle),
        }
    }

    /// Task name, for logging and the task registry.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task to exit cooperatively.
    pub fn kill(&self) {
        self.kill_switch.kill();
    }

    /// True if the task thread has already finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Block until the task exits, up to `timeout`. Returns `None` if it
    /// didn't finish in time (caller, typically the Supervisor, logs and
    /// moves on per `KillTimeout`). A task that times out here is detached
    /// onto its own reaper thread rather than left for `Drop` to join, so
    /// giving up on the deadline is not silently undone by a later drop.
    pub fn join_timeout(mut self, timeout: std::time::Duration) -> Option<TaskOutcome> {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if self.is_finished() {
                return self.join_handle.take().and_then(|h| h.join().ok());
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        if let Some(handle) = self.join_handle.take() {
            let name = self.name;
            std::thread::spawn(move || {
                if let Ok(outcome) = handle.join() {
                    log::debug!("task '{name}' finished after its caller gave up: {outcome:?}");
                }
            });
        }
        None
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.kill_switch.kill();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}
