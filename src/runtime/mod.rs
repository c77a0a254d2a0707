//! Process runtime - the OS-facing side of the supervisor.
//!
//! The cluster core never touches processes directly. It goes through two
//! seams so that tests can substitute fakes:
//! - [`ProcessRuntime`]: create workers and report their exits.
//! - [`ProcessControl`]: terminate the current process.

mod command;

pub use command::CommandRuntime;

use std::net::SocketAddr;
use tokio::sync::mpsc;

use crate::types::{Result, WorkerId};

/// Environment variable carrying the worker id into a forked child.
pub const WORKER_ID_ENV: &str = "PREFORK_WORKER_ID";
/// Environment variable carrying the fork channel address into a forked child.
pub const CHANNEL_ENV: &str = "PREFORK_CHANNEL";

/// Handle to a forked worker process.
///
/// Cheap to clone; clones refer to the same worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHandle {
    id: WorkerId,
    pid: u32,
}

impl WorkerHandle {
    pub fn new(id: WorkerId, pid: u32) -> Self {
        Self { id, pid }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// OS process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// What a worker needs to know at fork time.
#[derive(Debug, Clone)]
pub struct ForkSpec {
    pub id: WorkerId,
    /// Fork channel address the child reports to.
    pub channel: SocketAddr,
}

/// A worker termination as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    pub id: WorkerId,
    pub pid: u32,
    /// Exit code when the worker exited normally.
    pub code: Option<i32>,
    /// Signal number when the worker was killed by a signal.
    pub signal: Option<i32>,
}

/// Creates worker processes and reports their exits.
pub trait ProcessRuntime: Send {
    /// Start one worker.
    ///
    /// Exactly one [`ExitReport`] for this worker must eventually be sent on
    /// `exits`, in the order the runtime observes terminations.
    fn fork(&mut self, spec: &ForkSpec, exits: mpsc::UnboundedSender<ExitReport>)
        -> Result<WorkerHandle>;
}

/// Terminates the current process.
pub trait ProcessControl: Send + Sync {
    /// Exit with `code`.
    fn exit(&self, code: i32);

    /// Terminate abnormally.
    fn abort(&self, reason: &str);
}

/// [`ProcessControl`] backed by `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemControl;

impl ProcessControl for SystemControl {
    fn exit(&self, code: i32) {
        tracing::info!(code, pid = std::process::id(), "process_exit");
        std::process::exit(code)
    }

    fn abort(&self, reason: &str) {
        eprintln!("uncaught error in process {}: {}", std::process::id(), reason);
        std::process::abort()
    }
}
