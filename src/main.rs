//! Prefork demo server - main entry point.
//!
//! Serves a hello-world app from N worker processes:
//! - `GET /`      answers with the serving worker's pid
//! - `GET /panic` panics inside the app to exercise the error policy

use clap::Parser;
use hyper::body::Incoming;
use hyper::{Request, StatusCode};
use std::path::PathBuf;

use prefork::http::{text, AppResult};
use prefork::{Cluster, ClusterOptions, ErrorAction, ExitAction, Started, TlsOptions};

#[derive(Debug, Parser)]
#[command(name = "prefork-demo", version, about = "Multi-process hello-world HTTP server")]
struct Args {
    /// Number of workers (0 = one per logical CPU)
    #[arg(long, env = "PREFORK_WORKERS", default_value_t = 0)]
    workers: usize,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    hostname: Option<String>,

    #[arg(long)]
    backlog: Option<u32>,

    /// JSON options document, applied before the other flags
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, num_args = 1..)]
    on_error: Vec<ErrorAction>,

    #[arg(long, value_enum, num_args = 1..)]
    on_exit: Vec<ExitAction>,

    #[arg(long, requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    #[arg(long, requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

impl Args {
    fn options(&self) -> prefork::Result<ClusterOptions> {
        let mut options = match &self.config {
            Some(path) => ClusterOptions::from_file(path)?,
            None => ClusterOptions::default(),
        }
        .apply_env()?;

        if let Some(port) = self.port {
            options = options.port(port);
        }
        if let Some(hostname) = &self.hostname {
            options = options.hostname(hostname.clone());
        }
        if let Some(backlog) = self.backlog {
            options = options.backlog(backlog);
        }
        if !self.on_error.is_empty() {
            options = options.on_error(self.on_error.clone());
        }
        if !self.on_exit.is_empty() {
            options = options.on_exit(self.on_exit.clone());
        }
        if let (Some(cert_path), Some(key_path)) = (&self.tls_cert, &self.tls_key) {
            options = options.https(TlsOptions {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            });
        }

        Ok(options.on_listening(|addr| {
            tracing::info!(pid = std::process::id(), "worker_ready on {}", addr);
        }))
    }
}

#[allow(clippy::panic)]
async fn hello(req: Request<Incoming>) -> AppResult {
    if req.uri().path() == "/panic" {
        panic!("requested panic");
    }
    Ok(text(
        StatusCode::OK,
        format!("hello from pid {}\n", std::process::id()),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize observability
    prefork::observability::init_tracing();

    let mut cluster = Cluster::with_workers_and_options(hello, args.workers, args.options()?)?;
    cluster
        .on_start(|worker| {
            tracing::info!(worker = %worker.id(), pid = worker.pid(), "demo_worker_started")
        })
        .on_error(|error, process| {
            tracing::warn!(pid = process.pid, "demo_worker_error: {}", error)
        });

    match cluster.start().await? {
        Started::Coordinator(supervisor) => {
            tracing::info!(
                "prefork-demo coordinator running {} workers",
                supervisor.workers().len()
            );
            tokio::select! {
                result = supervisor.wait() => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("coordinator_interrupted"),
            }
        }
        Started::Worker => {}
    }

    Ok(())
}
