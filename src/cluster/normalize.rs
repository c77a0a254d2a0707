//! Configuration normalization: caller options → canonical [`ClusterConfig`].

use std::num::NonZeroUsize;

use crate::types::{
    ClusterConfig, ClusterOptions, Error, EventPolicy, ListenConfig, OneOrMany, Result,
    DEFAULT_BACKLOG, DEFAULT_HOSTNAME, DEFAULT_PORT,
};

/// Number of logical CPUs, falling back to 1 when the host will not say.
pub fn logical_cpus() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

/// Fill every unset field with its default.
///
/// A worker count of `None` or `Some(0)` means one worker per logical CPU.
pub fn normalize(worker_count: Option<usize>, options: ClusterOptions) -> Result<ClusterConfig> {
    if options.is_https && options.advanced.tls.is_none() {
        return Err(Error::configuration(
            "is_https requires certificate material in advanced.tls",
        ));
    }

    let worker_count = worker_count
        .and_then(NonZeroUsize::new)
        .unwrap_or_else(logical_cpus);

    let listen = ListenConfig {
        port: options.listen.port.unwrap_or(DEFAULT_PORT),
        hostname: options
            .listen
            .hostname
            .unwrap_or_else(|| DEFAULT_HOSTNAME.to_string()),
        backlog: options.listen.backlog.unwrap_or(DEFAULT_BACKLOG),
        on_listening: options.listen.on_listening.unwrap_or_default(),
    };

    let events = EventPolicy {
        on_error: options.events.error.map(OneOrMany::into_vec).unwrap_or_default(),
        on_exit: options.events.exit.map(OneOrMany::into_vec).unwrap_or_default(),
    };

    Ok(ClusterConfig {
        advanced: options.advanced,
        listen,
        is_https: options.is_https,
        events,
        worker_count,
    })
}
