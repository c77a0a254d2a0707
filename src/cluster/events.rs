//! Typed listener registry for cluster notifications.
//!
//! Three notifications exist, each with its own payload shape:
//!   start(handle)              - once per forked worker, in fork order
//!   error(error, process)      - every uncaught worker error
//!   exit(handle, code, signal) - every observed worker exit
//!
//! Listeners run synchronously on the emitting task, in registration order.

use std::fmt;

use crate::runtime::WorkerHandle;
use crate::types::WorkerId;

/// How an uncaught error surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerErrorKind {
    /// The app returned `Err`.
    Returned,
    /// The app panicked.
    Panicked,
}

/// An error raised by the app inside a worker and not handled by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerError {
    kind: WorkerErrorKind,
    message: String,
}

impl WorkerError {
    pub fn returned(message: impl Into<String>) -> Self {
        Self {
            kind: WorkerErrorKind::Returned,
            message: message.into(),
        }
    }

    pub fn panicked(message: impl Into<String>) -> Self {
        Self {
            kind: WorkerErrorKind::Panicked,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> WorkerErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WorkerErrorKind::Returned => write!(f, "{}", self.message),
            WorkerErrorKind::Panicked => write!(f, "panic: {}", self.message),
        }
    }
}

impl std::error::Error for WorkerError {}

/// The process an error notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Set when running as a forked worker.
    pub worker: Option<WorkerId>,
}

impl ProcessInfo {
    pub fn current(worker: Option<WorkerId>) -> Self {
        Self {
            pid: std::process::id(),
            worker,
        }
    }
}

type StartListener = Box<dyn Fn(&WorkerHandle) + Send + Sync>;
type ErrorListener = Box<dyn Fn(&WorkerError, &ProcessInfo) + Send + Sync>;
type ExitListener = Box<dyn Fn(&WorkerHandle, Option<i32>, Option<i32>) + Send + Sync>;

/// Registered listeners. Filled before `start()`, read-only afterwards.
#[derive(Default)]
pub struct ClusterEvents {
    start: Vec<StartListener>,
    error: Vec<ErrorListener>,
    exit: Vec<ExitListener>,
}

impl fmt::Debug for ClusterEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterEvents")
            .field("start", &self.start.len())
            .field("error", &self.error.len())
            .field("exit", &self.exit.len())
            .finish()
    }
}

impl ClusterEvents {
    pub fn on_start<F>(&mut self, listener: F)
    where
        F: Fn(&WorkerHandle) + Send + Sync + 'static,
    {
        self.start.push(Box::new(listener));
    }

    pub fn on_error<F>(&mut self, listener: F)
    where
        F: Fn(&WorkerError, &ProcessInfo) + Send + Sync + 'static,
    {
        self.error.push(Box::new(listener));
    }

    pub fn on_exit<F>(&mut self, listener: F)
    where
        F: Fn(&WorkerHandle, Option<i32>, Option<i32>) + Send + Sync + 'static,
    {
        self.exit.push(Box::new(listener));
    }

    pub(crate) fn emit_start(&self, worker: &WorkerHandle) {
        for listener in &self.start {
            listener(worker);
        }
    }

    pub(crate) fn emit_error(&self, error: &WorkerError, process: &ProcessInfo) {
        for listener in &self.error {
            listener(error, process);
        }
    }

    pub(crate) fn emit_exit(&self, worker: &WorkerHandle, code: Option<i32>, signal: Option<i32>) {
        for listener in &self.exit {
            listener(worker, code, signal);
        }
    }
}
