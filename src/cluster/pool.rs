//! Worker pool manager - the coordinator path.
//!
//! Forks the configured number of workers, then hands the registry to a
//! single supervision task that reacts to disconnect signals and exits:
//!
//! ```text
//!   fork 1 → start(1) → fork 2 → start(2) → ... → fork N → start(N)
//!                                                      │
//!                          ┌───────────────────────────┘
//!                          ▼
//!                 ┌─────────────────┐  Disconnect   ┌──────────────────┐
//!                 │   supervision   │ ◄──────────── │   fork channel   │
//!                 │      task       │               └──────────────────┘
//!                 │ (owns registry) │  ExitReport   ┌──────────────────┐
//!                 │                 │ ◄──────────── │  process runtime │
//!                 └────────┬────────┘               └──────────────────┘
//!                          ▼
//!                   policy engine
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::events::ClusterEvents;
use super::policy::PolicyEngine;
use crate::ipc::{ChannelMessage, ForkChannel};
use crate::runtime::{ExitReport, ForkSpec, ProcessControl, ProcessRuntime, WorkerHandle};
use crate::types::{ClusterConfig, Error, Result, WorkerId};

/// Live workers, keyed by id. Owned by exactly one task at a time.
#[derive(Debug, Default)]
struct Registry {
    workers: BTreeMap<WorkerId, WorkerHandle>,
}

impl Registry {
    fn insert(&mut self, handle: WorkerHandle) {
        self.workers.insert(handle.id(), handle);
    }

    fn remove(&mut self, id: &WorkerId) -> Option<WorkerHandle> {
        self.workers.remove(id)
    }

    fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

/// Handle to a running coordinator, returned by `Cluster::start`.
#[derive(Debug)]
pub struct Supervisor {
    workers: Vec<WorkerHandle>,
    channel: ForkChannel,
    task: JoinHandle<()>,
}

impl Supervisor {
    /// Workers forked by this coordinator, in fork order.
    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    pub fn channel_addr(&self) -> SocketAddr {
        self.channel.addr()
    }

    /// True once a worker disconnect (or a terminal exit policy) tore the
    /// fork channel down.
    pub fn is_channel_released(&self) -> bool {
        self.channel.is_released()
    }

    /// Resolve once the fork channel has been released.
    pub async fn channel_released(&self) {
        self.channel.released().await
    }

    /// Resolve once every worker has exited.
    pub async fn wait(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::internal(format!("supervision task failed: {}", e)))
    }
}

/// Fork every worker and start supervising them.
pub(crate) async fn start_coordinator(
    config: &ClusterConfig,
    events: Arc<ClusterEvents>,
    mut runtime: Box<dyn ProcessRuntime>,
    control: Arc<dyn ProcessControl>,
) -> Result<Supervisor> {
    let (channel, messages) = ForkChannel::bind().await?;
    let (exits_tx, exits_rx) = mpsc::unbounded_channel();
    let mut registry = Registry::default();
    let mut forked = Vec::with_capacity(config.worker_count.get());

    tracing::info!(
        workers = config.worker_count.get(),
        pid = std::process::id(),
        "coordinator_starting"
    );

    for ordinal in 1..=config.worker_count.get() {
        let id = u32::try_from(ordinal)
            .ok()
            .and_then(|n| WorkerId::new(n).ok())
            .ok_or_else(|| Error::fork(format!("worker ordinal {} out of range", ordinal)))?;
        let spec = ForkSpec {
            id,
            channel: channel.addr(),
        };

        let handle = match runtime.fork(&spec, exits_tx.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(worker = %id, "fork_failed: {}", e);
                channel.release();
                return Err(e);
            }
        };

        tracing::info!(worker = %id, pid = handle.pid(), "worker_forked");
        registry.insert(handle.clone());
        events.emit_start(&handle);
        forked.push(handle);
    }
    // Only the runtime's waiters hold senders now; the receiver closes when
    // the last of them reports.
    drop(exits_tx);

    let forked_ids = forked.iter().map(WorkerHandle::id).collect();
    let supervision = Supervision {
        registry,
        forked: forked_ids,
        channel: channel.clone(),
        engine: PolicyEngine::new(config.events.clone(), events),
        control,
    };
    let task = tokio::spawn(supervision.run(messages, exits_rx).in_current_span());

    Ok(Supervisor {
        workers: forked,
        channel,
        task,
    })
}

struct Supervision {
    registry: Registry,
    /// Every id ever forked; outlives registry entries removed on exit.
    forked: BTreeSet<WorkerId>,
    channel: ForkChannel,
    engine: PolicyEngine,
    control: Arc<dyn ProcessControl>,
}

impl Supervision {
    async fn run(
        mut self,
        mut messages: mpsc::UnboundedReceiver<ChannelMessage>,
        mut exits: mpsc::UnboundedReceiver<ExitReport>,
    ) {
        let mut messages_open = true;

        while !self.registry.is_empty() {
            tokio::select! {
                // A disconnect is always sent before the worker exits.
                biased;

                message = messages.recv(), if messages_open => match message {
                    Some(message) => self.on_message(message),
                    None => messages_open = false,
                },
                report = exits.recv() => match report {
                    Some(report) => self.on_exit(report),
                    None => {
                        tracing::warn!("exit_reports_closed with live workers");
                        break;
                    }
                },
            }
        }

        self.channel.release();
        tracing::info!("coordinator_finished: channel {}", self.channel.addr());
    }

    fn on_message(&mut self, message: ChannelMessage) {
        match message {
            ChannelMessage::Hello { worker, pid } => {
                tracing::debug!(worker = %worker, pid, "worker_online");
            }
            ChannelMessage::Listening { worker, addr } => {
                tracing::info!(worker = %worker, "worker_listening on {}", addr);
            }
            ChannelMessage::Disconnect { worker } => {
                if !self.forked.contains(&worker) || self.channel.is_released() {
                    return;
                }
                tracing::info!(worker = %worker, "worker_disconnected: releasing fork channel");
                self.channel.release();
            }
        }
    }

    fn on_exit(&mut self, report: ExitReport) {
        let handle = self
            .registry
            .remove(&report.id)
            .unwrap_or_else(|| WorkerHandle::new(report.id, report.pid));

        let disposition = self.engine.on_worker_exit(&handle, report.code, report.signal);
        if disposition.is_terminal() {
            self.channel.release();
        }
        disposition.apply(self.control.as_ref(), "worker exit policy");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::ChannelClient;
    use crate::types::{ClusterOptions, ExitAction};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Runtime that never spawns anything; exits are injected by the test.
    struct ScriptedRuntime {
        next_pid: u32,
        exits: Arc<Mutex<Vec<mpsc::UnboundedSender<ExitReport>>>>,
        fail_at: Option<u32>,
    }

    impl ProcessRuntime for ScriptedRuntime {
        fn fork(
            &mut self,
            spec: &ForkSpec,
            exits: mpsc::UnboundedSender<ExitReport>,
        ) -> Result<WorkerHandle> {
            if self.fail_at == Some(spec.id.get()) {
                return Err(Error::fork("EAGAIN"));
            }
            self.next_pid += 1;
            self.exits.lock().unwrap().push(exits);
            Ok(WorkerHandle::new(spec.id, self.next_pid))
        }
    }

    #[derive(Default)]
    struct RecordingControl {
        exits: Mutex<Vec<i32>>,
    }

    impl ProcessControl for RecordingControl {
        fn exit(&self, code: i32) {
            self.exits.lock().unwrap().push(code);
        }

        fn abort(&self, _reason: &str) {}
    }

    fn config(workers: usize, options: ClusterOptions) -> ClusterConfig {
        crate::cluster::normalize::normalize(Some(workers), options).unwrap()
    }

    #[tokio::test]
    async fn test_fork_failure_propagates() {
        let runtime = ScriptedRuntime {
            next_pid: 100,
            exits: Arc::default(),
            fail_at: Some(2),
        };
        let err = start_coordinator(
            &config(3, ClusterOptions::default()),
            Arc::new(ClusterEvents::default()),
            Box::new(runtime),
            Arc::new(RecordingControl::default()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Fork(_)));
    }

    #[tokio::test]
    async fn test_unknown_worker_exit_still_reported() {
        let senders = Arc::new(Mutex::new(Vec::new()));
        let runtime = ScriptedRuntime {
            next_pid: 100,
            exits: senders.clone(),
            fail_at: None,
        };
        let control = Arc::new(RecordingControl::default());

        let supervisor = start_coordinator(
            &config(1, ClusterOptions::default().on_exit(ExitAction::Exit)),
            Arc::new(ClusterEvents::default()),
            Box::new(runtime),
            control.clone(),
        )
        .await
        .unwrap();

        let tx = senders.lock().unwrap()[0].clone();
        // A report for an id the registry never saw, then the real one.
        tx.send(ExitReport {
            id: WorkerId::new(9).unwrap(),
            pid: 999,
            code: Some(7),
            signal: None,
        })
        .unwrap();
        tx.send(ExitReport {
            id: WorkerId::new(1).unwrap(),
            pid: 101,
            code: Some(0),
            signal: None,
        })
        .unwrap();
        drop(tx);
        senders.lock().unwrap().clear();

        supervisor.wait().await.unwrap();
        assert_eq!(*control.exits.lock().unwrap(), vec![7, 0]);
    }

    fn scripted(senders: &Arc<Mutex<Vec<mpsc::UnboundedSender<ExitReport>>>>) -> ScriptedRuntime {
        ScriptedRuntime {
            next_pid: 100,
            exits: senders.clone(),
            fail_at: None,
        }
    }

    fn exit_report(id: u32) -> ExitReport {
        ExitReport {
            id: WorkerId::new(id).unwrap(),
            pid: 100 + id,
            code: Some(0),
            signal: None,
        }
    }

    #[tokio::test]
    async fn test_disconnect_from_forked_worker_releases_channel() {
        let senders = Arc::new(Mutex::new(Vec::new()));
        let supervisor = start_coordinator(
            &config(2, ClusterOptions::default()),
            Arc::new(ClusterEvents::default()),
            Box::new(scripted(&senders)),
            Arc::new(RecordingControl::default()),
        )
        .await
        .unwrap();
        let addr = supervisor.channel_addr();

        // An id this coordinator never forked is ignored.
        let stranger = ChannelClient::connect(addr, WorkerId::new(9).unwrap()).await.unwrap();
        stranger.disconnect().await.unwrap();
        let early = tokio::time::timeout(Duration::from_millis(200), supervisor.channel_released());
        assert!(early.await.is_err());
        assert!(!supervisor.is_channel_released());

        // The first real disconnect tears the channel down; a second one is a no-op.
        let first = ChannelClient::connect(addr, WorkerId::new(1).unwrap()).await.unwrap();
        let second = ChannelClient::connect(addr, WorkerId::new(2).unwrap()).await.unwrap();
        first.disconnect().await.unwrap();
        let _ = second.disconnect().await;
        tokio::time::timeout(Duration::from_secs(5), supervisor.channel_released())
            .await
            .unwrap();
        assert!(supervisor.is_channel_released());

        // Supervision keeps following exits after the release.
        let tx = senders.lock().unwrap()[0].clone();
        tx.send(exit_report(1)).unwrap();
        tx.send(exit_report(2)).unwrap();
        drop(tx);
        senders.lock().unwrap().clear();
        supervisor.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_after_exit_report_still_releases_channel() {
        let senders = Arc::new(Mutex::new(Vec::new()));
        let (exited_tx, mut exited_rx) = mpsc::unbounded_channel();
        let mut events = ClusterEvents::default();
        events.on_exit(move |worker, _, _| {
            let _ = exited_tx.send(worker.id());
        });

        let supervisor = start_coordinator(
            &config(2, ClusterOptions::default()),
            Arc::new(events),
            Box::new(scripted(&senders)),
            Arc::new(RecordingControl::default()),
        )
        .await
        .unwrap();
        let tx = senders.lock().unwrap()[0].clone();
        let worker = WorkerId::new(1).unwrap();

        // The exit report wins the race against the worker's disconnect frame.
        tx.send(exit_report(1)).unwrap();
        assert_eq!(exited_rx.recv().await, Some(worker));
        assert!(!supervisor.is_channel_released());

        let client = ChannelClient::connect(supervisor.channel_addr(), worker)
            .await
            .unwrap();
        client.disconnect().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), supervisor.channel_released())
            .await
            .unwrap();

        tx.send(exit_report(2)).unwrap();
        drop(tx);
        senders.lock().unwrap().clear();
        supervisor.wait().await.unwrap();
    }
}
