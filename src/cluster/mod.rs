//! Cluster - construction, role dispatch and the public entry point.
//!
//! A [`Cluster`] is built once from an app plus optional worker count and
//! options, then started. `start()` asks the [`RoleSource`] which role this
//! process plays and runs exactly one of the two paths:
//!
//! ```text
//!   Cluster::new / with_* / builder ──► normalize ──► ClusterConfig
//!                                                        │
//!                                              start() ──┤ role?
//!                                  ┌─────────────────────┴─────────────────┐
//!                             Coordinator                               Worker
//!                      pool::start_coordinator                  worker::run_worker
//!                      (fork N, supervise exits)           (bind, serve, error policy)
//! ```
//!
//! Starting twice from the same process is not supported: `start()`
//! consumes the cluster, and callers must not build and start a second one.

mod events;
mod normalize;
mod policy;
mod pool;
mod role;
mod worker;

pub use events::{ClusterEvents, ProcessInfo, WorkerError, WorkerErrorKind};
pub use normalize::{logical_cpus, normalize};
pub use policy::{Disposition, PolicyEngine, SIGNALED_EXIT_CODE, WORKER_ERROR_EXIT_CODE};
pub use pool::Supervisor;
pub use role::{EnvRoleSource, FixedRole, Role, RoleSource, WorkerEnv};

use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

use crate::http::App;
use crate::observability::process_span;
use crate::runtime::{CommandRuntime, ProcessControl, ProcessRuntime, SystemControl, WorkerHandle};
use crate::types::{ClusterConfig, ClusterOptions, Error, Result};

/// Outcome of [`Cluster::start`].
#[derive(Debug)]
pub enum Started {
    /// Workers are forked; the supervisor keeps watching them.
    Coordinator(Supervisor),
    /// The worker's server stopped.
    Worker,
}

/// A multi-process HTTP service: one app, served by N worker processes.
pub struct Cluster {
    app: Arc<dyn App>,
    config: ClusterConfig,
    events: ClusterEvents,
    role_source: Box<dyn RoleSource>,
    runtime: Option<Box<dyn ProcessRuntime>>,
    control: Arc<dyn ProcessControl>,
}

impl fmt::Debug for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("config", &self.config)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl Cluster {
    /// One worker per logical CPU, default options.
    pub fn new(app: impl App) -> Result<Self> {
        Self::builder().app(app).build()
    }

    pub fn with_workers(app: impl App, workers: usize) -> Result<Self> {
        Self::builder().app(app).workers(workers).build()
    }

    pub fn with_options(app: impl App, options: ClusterOptions) -> Result<Self> {
        Self::builder().app(app).options(options).build()
    }

    pub fn with_workers_and_options(
        app: impl App,
        workers: usize,
        options: ClusterOptions,
    ) -> Result<Self> {
        Self::builder().app(app).workers(workers).options(options).build()
    }

    pub fn builder() -> ClusterBuilder {
        ClusterBuilder::default()
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Called once per forked worker, in fork order.
    pub fn on_start<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&WorkerHandle) + Send + Sync + 'static,
    {
        self.events.on_start(listener);
        self
    }

    /// Called for every uncaught worker error, after the configured actions.
    pub fn on_error<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&WorkerError, &ProcessInfo) + Send + Sync + 'static,
    {
        self.events.on_error(listener);
        self
    }

    /// Called for every worker exit, after the configured actions.
    pub fn on_exit<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&WorkerHandle, Option<i32>, Option<i32>) + Send + Sync + 'static,
    {
        self.events.on_exit(listener);
        self
    }

    /// Replace the role source (defaults to [`EnvRoleSource`]).
    pub fn role_source(mut self, source: impl RoleSource + 'static) -> Self {
        self.role_source = Box::new(source);
        self
    }

    /// Replace the process runtime (defaults to re-running the current executable).
    pub fn runtime(mut self, runtime: impl ProcessRuntime + 'static) -> Self {
        self.runtime = Some(Box::new(runtime));
        self
    }

    /// Replace process termination (defaults to [`SystemControl`]).
    pub fn process_control(mut self, control: impl ProcessControl + 'static) -> Self {
        self.control = Arc::new(control);
        self
    }

    /// Run the coordinator or the worker path, depending on the role.
    ///
    /// Coordinator: returns once every worker has been forked.
    /// Worker: serves until the process ends; returns only on a fatal error.
    pub async fn start(self) -> Result<Started> {
        let role = self.role_source.role();
        tracing::debug!(?role, pid = std::process::id(), "cluster_start");

        let events = Arc::new(self.events);
        match role {
            Role::Coordinator => {
                let runtime = match self.runtime {
                    Some(runtime) => runtime,
                    None => Box::new(CommandRuntime::current_exe()?),
                };
                let supervisor =
                    pool::start_coordinator(&self.config, events, runtime, self.control)
                        .instrument(process_span(None))
                        .await?;
                Ok(Started::Coordinator(supervisor))
            }
            Role::Worker => {
                let env = WorkerEnv::from_env()?;
                let span = process_span(env.worker);
                worker::run_worker(self.config, self.app, events, env, self.control)
                    .instrument(span)
                    .await?;
                Ok(Started::Worker)
            }
        }
    }
}

/// Step-by-step construction; the only path that can lack an app.
#[derive(Default)]
pub struct ClusterBuilder {
    app: Option<Arc<dyn App>>,
    workers: Option<usize>,
    options: ClusterOptions,
}

impl fmt::Debug for ClusterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterBuilder")
            .field("app", &self.app.is_some())
            .field("workers", &self.workers)
            .field("options", &self.options)
            .finish()
    }
}

impl ClusterBuilder {
    pub fn app(mut self, app: impl App) -> Self {
        self.app = Some(Arc::new(app));
        self
    }

    /// Zero means one worker per logical CPU.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn options(mut self, options: ClusterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<Cluster> {
        let app = self
            .app
            .ok_or_else(|| Error::configuration("no request handler supplied"))?;
        let config = normalize(self.workers, self.options)?;

        Ok(Cluster {
            app,
            config,
            events: ClusterEvents::default(),
            role_source: Box::new(EnvRoleSource),
            runtime: None,
            control: Arc::new(SystemControl),
        })
    }
}
