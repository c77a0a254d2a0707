//! Event policy engine.
//!
//! Runs the configured actions for a worker error or a worker exit, in the
//! configured order, then always emits the generic notification.
//!
//! Actions are additive: `[log, exit]` logs and then exits. Terminal actions
//! (`throw`, `exit`) are not executed here. The engine records the first one,
//! skips whatever is listed after it (the process would not survive past
//! it), emits the notification and hands back a [`Disposition`] for the
//! caller to carry out. Listeners therefore always observe the event before
//! the process goes away.

use std::sync::Arc;

use super::events::{ClusterEvents, ProcessInfo, WorkerError};
use crate::runtime::{ProcessControl, WorkerHandle};
use crate::types::{ErrorAction, EventPolicy, ExitAction};

/// Exit code a worker uses when the `exit` error action fires.
pub const WORKER_ERROR_EXIT_CODE: i32 = 1;

/// Exit code the coordinator uses when a worker it follows was killed by a
/// signal (there is no worker exit code to propagate).
pub const SIGNALED_EXIT_CODE: i32 = 1;

/// What must happen to the current process after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Exit(i32),
    Abort,
}

impl Disposition {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Disposition::Continue)
    }

    /// Carry out the disposition. `Continue` does nothing.
    pub fn apply(self, control: &dyn ProcessControl, reason: &str) {
        match self {
            Disposition::Continue => {}
            Disposition::Exit(code) => control.exit(code),
            Disposition::Abort => control.abort(reason),
        }
    }
}

/// Interprets the configured [`EventPolicy`].
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    policy: EventPolicy,
    events: Arc<ClusterEvents>,
}

impl PolicyEngine {
    pub fn new(policy: EventPolicy, events: Arc<ClusterEvents>) -> Self {
        Self { policy, events }
    }

    /// Handle an uncaught error inside a worker.
    pub fn on_worker_error(&self, error: &WorkerError, process: &ProcessInfo) -> Disposition {
        let mut disposition = Disposition::Continue;

        for action in &self.policy.on_error {
            match action {
                ErrorAction::Log => {
                    tracing::error!(pid = process.pid, "worker_error: {}", error);
                }
                ErrorAction::Continue => {}
                ErrorAction::Exit => {
                    disposition = Disposition::Exit(WORKER_ERROR_EXIT_CODE);
                    break;
                }
                ErrorAction::Throw => {
                    disposition = Disposition::Abort;
                    break;
                }
            }
        }

        self.events.emit_error(error, process);
        disposition
    }

    /// Handle the exit of a worker, as observed by the coordinator.
    pub fn on_worker_exit(
        &self,
        worker: &WorkerHandle,
        code: Option<i32>,
        signal: Option<i32>,
    ) -> Disposition {
        let mut disposition = Disposition::Continue;

        for action in &self.policy.on_exit {
            match action {
                ExitAction::Log => {
                    tracing::warn!(
                        worker = %worker.id(),
                        pid = worker.pid(),
                        code = ?code,
                        signal = ?signal,
                        "worker_exited: pid {}",
                        worker.pid()
                    );
                }
                ExitAction::Exit => {
                    disposition = Disposition::Exit(code.unwrap_or(SIGNALED_EXIT_CODE));
                    break;
                }
            }
        }

        self.events.emit_exit(worker, code, signal);
        disposition
    }
}
