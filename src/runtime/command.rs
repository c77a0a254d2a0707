//! Worker spawning via `tokio::process`.
//!
//! Rust cannot safely `fork()` a multi-threaded tokio process, so a "fork"
//! re-executes the current binary with the same arguments. The child learns
//! that it is a worker from [`WORKER_ID_ENV`] and finds the coordinator
//! through [`CHANNEL_ENV`].

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::{ExitReport, ForkSpec, ProcessRuntime, WorkerHandle, CHANNEL_ENV, WORKER_ID_ENV};
use crate::types::{Error, Result};

/// Spawns workers by running a program with the worker environment set.
#[derive(Debug, Clone)]
pub struct CommandRuntime {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandRuntime {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-run the current executable with the current arguments.
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| Error::fork(format!("failed to get current executable: {}", e)))?;
        Ok(Self::new(program, std::env::args_os().skip(1).collect()))
    }
}

impl ProcessRuntime for CommandRuntime {
    fn fork(
        &mut self,
        spec: &ForkSpec,
        exits: mpsc::UnboundedSender<ExitReport>,
    ) -> Result<WorkerHandle> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(WORKER_ID_ENV, spec.id.to_string())
            .env(CHANNEL_ENV, spec.channel.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::fork(format!("failed to spawn worker {}: {}", spec.id, e)))?;
        let pid = child.id().ok_or_else(|| {
            Error::fork(format!("worker {} exited before reporting a pid", spec.id))
        })?;

        let id = spec.id;
        tokio::spawn(async move {
            let report = match child.wait().await {
                Ok(status) => ExitReport {
                    id,
                    pid,
                    code: status.code(),
                    signal: exit_signal(&status),
                },
                Err(e) => {
                    tracing::error!(worker = %id, pid, "worker_wait_failed: {}", e);
                    ExitReport {
                        id,
                        pid,
                        code: None,
                        signal: None,
                    }
                }
            };
            // Receiver gone means the supervisor already stopped.
            let _ = exits.send(report);
        });

        tracing::debug!(worker = %id, pid, "worker_spawned");
        Ok(WorkerHandle::new(id, pid))
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::types::WorkerId;

    fn spec(id: u32) -> ForkSpec {
        ForkSpec {
            id: WorkerId::new(id).unwrap(),
            channel: "127.0.0.1:9".parse().unwrap(),
        }
    }

    fn sh(script: &str) -> CommandRuntime {
        CommandRuntime::new("/bin/sh", vec!["-c".into(), script.into()])
    }

    #[tokio::test]
    async fn test_exit_code_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runtime = sh("exit 3");

        let handle = runtime.fork(&spec(1), tx).unwrap();
        let report = rx.recv().await.unwrap();

        assert_eq!(report.id, handle.id());
        assert_eq!(report.pid, handle.pid());
        assert_eq!(report.code, Some(3));
        assert_eq!(report.signal, None);
    }

    #[tokio::test]
    async fn test_worker_environment_is_set() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runtime =
            sh(r#"[ "$PREFORK_CHANNEL" = "127.0.0.1:9" ] || exit 99; exit "$PREFORK_WORKER_ID""#);

        runtime.fork(&spec(4), tx).unwrap();
        let report = rx.recv().await.unwrap();

        assert_eq!(report.code, Some(4));
    }

    #[tokio::test]
    async fn test_signal_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runtime = sh("kill -TERM $$");

        runtime.fork(&spec(1), tx).unwrap();
        let report = rx.recv().await.unwrap();

        assert_eq!(report.code, None);
        assert_eq!(report.signal, Some(15));
    }

    #[tokio::test]
    async fn test_missing_program_is_fork_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut runtime = CommandRuntime::new("/nonexistent/prefork-worker", vec![]);

        let err = runtime.fork(&spec(1), tx).unwrap_err();
        assert!(matches!(err, Error::Fork(_)));
    }
}
