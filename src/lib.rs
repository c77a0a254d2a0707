//! # Prefork - Multi-Process HTTP Supervisor
//!
//! Serves one HTTP(S) app from N worker processes that share a listening
//! address, supervised by a coordinator process:
//! - Worker count defaults to the number of logical CPUs
//! - Every worker binds the same host/port (`SO_REUSEPORT`)
//! - Configurable reaction to uncaught worker errors (throw, log, exit, continue)
//! - Configurable reaction to worker exits (log, exit)
//! - Typed notifications for start, error and exit
//!
//! ## Architecture
//!
//! The same executable plays both roles. The coordinator re-runs itself once
//! per worker; the environment tells each child which role it has:
//! ```text
//!                  ┌──────────────────────────────┐
//!                  │         Coordinator          │
//!                  │  ┌──────────┐ ┌───────────┐  │
//!                  │  │   Pool   │ │  Policy   │  │
//!                  │  │ Registry │ │  Engine   │  │
//!                  │  └──────────┘ └───────────┘  │
//!                  │        ▲ fork channel        │
//!                  └────────┼─────────────────────┘
//!             ┌─────────────┼─────────────┐
//!        ┌────┴────┐   ┌────┴────┐   ┌────┴────┐
//!        │Worker 1 │   │Worker 2 │   │Worker N │
//!        │  HTTP   │   │  HTTP   │   │  HTTP   │
//!        └────┬────┘   └────┬────┘   └────┬────┘
//!             └──── host:port (shared) ───┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use hyper::{Request, StatusCode};
//! use hyper::body::Incoming;
//! use prefork::{http::text, Cluster, ClusterOptions, ErrorAction};
//!
//! # async fn run() -> prefork::Result<()> {
//! let app = |_req: Request<Incoming>| async {
//!     Ok::<_, prefork::http::AppError>(text(StatusCode::OK, "hello"))
//! };
//! let options = ClusterOptions::default().port(3000).on_error(ErrorAction::Log);
//! Cluster::with_options(app, options)?.start().await?;
//! # Ok(())
//! # }
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod cluster;
pub mod http;
pub mod ipc;
pub mod runtime;
pub mod types;

// Internal utilities
pub mod observability;

pub use cluster::{Cluster, ClusterBuilder, ClusterEvents, ProcessInfo, Role, Started, WorkerError};
pub use http::App;
pub use runtime::WorkerHandle;
pub use types::{
    ClusterConfig, ClusterOptions, Error, ErrorAction, ExitAction, Result, TlsOptions, WorkerId,
};
