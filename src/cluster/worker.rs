//! Worker bootstrap - the worker path.

use async_trait::async_trait;
use std::sync::Arc;

use super::events::{ClusterEvents, ProcessInfo, WorkerError};
use super::policy::{Disposition, PolicyEngine};
use super::role::WorkerEnv;
use crate::http::{self, App, HttpServer, UncaughtErrorHook};
use crate::ipc::ChannelClient;
use crate::runtime::ProcessControl;
use crate::types::{ClusterConfig, Error, Result};

/// The single uncaught-error handler of a worker process.
///
/// Every connection shares it; it routes errors through the policy engine
/// and carries out whatever the policy decides.
pub(crate) struct UncaughtErrorHandler {
    engine: PolicyEngine,
    process: ProcessInfo,
    channel: Option<Arc<ChannelClient>>,
    control: Arc<dyn ProcessControl>,
}

impl UncaughtErrorHandler {
    pub(crate) fn new(
        engine: PolicyEngine,
        process: ProcessInfo,
        channel: Option<Arc<ChannelClient>>,
        control: Arc<dyn ProcessControl>,
    ) -> Self {
        Self {
            engine,
            process,
            channel,
            control,
        }
    }
}

#[async_trait]
impl UncaughtErrorHook for UncaughtErrorHandler {
    async fn uncaught(&self, error: WorkerError) {
        let disposition = self.engine.on_worker_error(&error, &self.process);

        if let Disposition::Exit(_) = disposition {
            if let Some(channel) = &self.channel {
                if let Err(e) = channel.disconnect().await {
                    tracing::warn!(
                        worker = %channel.worker(),
                        pid = self.process.pid,
                        "worker_disconnect_failed: {}",
                        e
                    );
                }
            }
        }
        disposition.apply(self.control.as_ref(), error.message());
    }
}

/// Run the worker: connect to the coordinator, bind, serve forever.
pub(crate) async fn run_worker(
    config: ClusterConfig,
    app: Arc<dyn App>,
    events: Arc<ClusterEvents>,
    env: WorkerEnv,
    control: Arc<dyn ProcessControl>,
) -> Result<()> {
    let channel = match (env.channel, env.worker) {
        (Some(addr), Some(worker)) => {
            Some(Arc::new(ChannelClient::connect(addr, worker).await?))
        }
        (Some(addr), None) => {
            tracing::warn!("fork channel {} given without a worker id, running detached", addr);
            None
        }
        (None, _) => None,
    };

    let handler = Arc::new(UncaughtErrorHandler::new(
        PolicyEngine::new(config.events.clone(), events),
        ProcessInfo::current(env.worker),
        channel.clone(),
        control,
    ));

    let tls = if config.is_https {
        let options = config
            .advanced
            .tls
            .as_ref()
            .ok_or_else(|| Error::configuration("is_https requires advanced.tls"))?;
        Some(http::tls::acceptor(options)?)
    } else {
        None
    };

    let listener = http::bind(&config.listen).await?;
    let local_addr = listener.local_addr()?;
    config.listen.on_listening.call(local_addr);
    if let Some(channel) = &channel {
        if let Err(e) = channel.listening(local_addr).await {
            tracing::warn!("worker_listening_report_failed: {}", e);
        }
    }

    let mut server = HttpServer::new(listener, app, handler, config.advanced.clone());
    if let Some(acceptor) = tls {
        server = server.with_tls(acceptor);
    }
    server.serve().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::{ChannelMessage, ForkChannel};
    use crate::types::{ErrorAction, EventPolicy, WorkerId};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingControl {
        calls: Mutex<Vec<String>>,
    }

    impl ProcessControl for RecordingControl {
        fn exit(&self, code: i32) {
            self.calls.lock().unwrap().push(format!("exit({})", code));
        }

        fn abort(&self, reason: &str) {
            self.calls.lock().unwrap().push(format!("abort({})", reason));
        }
    }

    fn handler(
        on_error: Vec<ErrorAction>,
        channel: Option<Arc<ChannelClient>>,
        control: Arc<RecordingControl>,
    ) -> UncaughtErrorHandler {
        let engine = PolicyEngine::new(
            EventPolicy {
                on_error,
                on_exit: vec![],
            },
            Arc::new(ClusterEvents::default()),
        );
        UncaughtErrorHandler::new(engine, ProcessInfo::current(None), channel, control)
    }

    #[tokio::test]
    async fn test_exit_action_disconnects_then_exits() {
        let (fork_channel, mut messages) = ForkChannel::bind().await.unwrap();
        let worker = WorkerId::new(2).unwrap();
        let client = Arc::new(ChannelClient::connect(fork_channel.addr(), worker).await.unwrap());
        let control = Arc::new(RecordingControl::default());

        handler(vec![ErrorAction::Exit], Some(client), control.clone())
            .uncaught(WorkerError::returned("boom"))
            .await;

        assert!(matches!(messages.recv().await, Some(ChannelMessage::Hello { .. })));
        assert_eq!(messages.recv().await, Some(ChannelMessage::Disconnect { worker }));
        assert_eq!(*control.calls.lock().unwrap(), vec!["exit(1)"]);
    }

    #[tokio::test]
    async fn test_throw_aborts_with_error_message() {
        let control = Arc::new(RecordingControl::default());

        handler(vec![ErrorAction::Throw], None, control.clone())
            .uncaught(WorkerError::panicked("index out of bounds"))
            .await;

        assert_eq!(
            *control.calls.lock().unwrap(),
            vec!["abort(index out of bounds)"]
        );
    }

    #[tokio::test]
    async fn test_no_actions_keeps_process_alive() {
        let control = Arc::new(RecordingControl::default());

        handler(vec![], None, control.clone())
            .uncaught(WorkerError::returned("boom"))
            .await;

        assert!(control.calls.lock().unwrap().is_empty());
    }
}
