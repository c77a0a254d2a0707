//! Observability utilities.

use std::sync::OnceLock;
use tracing::Span;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::types::WorkerId;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Initialize tracing subscriber once for the process.
///
/// Logs go to stderr so workers, which inherit the coordinator's stderr,
/// interleave into one stream. Log format defaults to plain text and can be
/// switched to JSON via `PREFORK_LOG_FORMAT=json`. Filter defaults to `info`
/// if `RUST_LOG` is unset.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let json = std::env::var("PREFORK_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let result = if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}

/// Span wrapping everything a process logs, tagged with its role.
///
/// Workers inherit the coordinator's stderr; the span fields tell the
/// interleaved lines apart.
pub fn process_span(worker: Option<WorkerId>) -> Span {
    let pid = std::process::id();
    match worker {
        Some(worker) => tracing::info_span!("worker", id = %worker, pid),
        None => tracing::info_span!("coordinator", pid),
    }
}

#[cfg(test)]
mod tests {
    use super::{init_tracing, process_span};
    use crate::types::WorkerId;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn process_span_names_role() {
        init_tracing();
        let worker = process_span(WorkerId::new(2).ok());
        let coordinator = process_span(None);
        if let (Some(w), Some(c)) = (worker.metadata(), coordinator.metadata()) {
            assert_eq!(w.name(), "worker");
            assert_eq!(c.name(), "coordinator");
        }
    }
}
