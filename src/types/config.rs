//! Configuration structures.
//!
//! Two layers live here:
//! - [`ClusterOptions`]: what callers (or an options document) supply. Every
//!   field may be unset.
//! - [`ClusterConfig`]: the canonical, fully populated record produced by
//!   normalization. Downstream code only ever reads this one.
//!
//! Options are loaded from code, JSON documents and environment variables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::errors::{Error, Result};

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 8080;
/// Hostname used when none is configured (all IPv4 interfaces).
pub const DEFAULT_HOSTNAME: &str = "0.0.0.0";
/// Listen backlog used when none is configured.
pub const DEFAULT_BACKLOG: u32 = 511;

// =============================================================================
// Policy actions
// =============================================================================

/// Action taken when a worker hits an uncaught error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ErrorAction {
    /// Abort the worker process abnormally.
    Throw,
    /// Log the error message and the worker's pid.
    Log,
    /// Disconnect from the coordinator and exit the worker.
    Exit,
    /// Keep serving. Only the generic notification fires.
    Continue,
}

/// Action taken by the coordinator when a worker exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ExitAction {
    /// Log the exited worker's pid, exit code and signal.
    Log,
    /// Terminate the coordinator itself.
    Exit,
}

/// A single policy value or an ordered list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// Flatten into an ordered list. A list is returned unchanged.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

impl From<ErrorAction> for OneOrMany<ErrorAction> {
    fn from(action: ErrorAction) -> Self {
        OneOrMany::One(action)
    }
}

impl From<ExitAction> for OneOrMany<ExitAction> {
    fn from(action: ExitAction) -> Self {
        OneOrMany::One(action)
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(values: Vec<T>) -> Self {
        OneOrMany::Many(values)
    }
}

impl<T, const N: usize> From<[T; N]> for OneOrMany<T> {
    fn from(values: [T; N]) -> Self {
        OneOrMany::Many(values.into())
    }
}

// =============================================================================
// Listening callback
// =============================================================================

/// Callback invoked once a worker's socket is ready, with the bound address.
#[derive(Clone)]
pub struct ListeningCallback(Arc<dyn Fn(SocketAddr) + Send + Sync>);

impl ListeningCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(SocketAddr) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, addr: SocketAddr) {
        (self.0)(addr)
    }
}

impl Default for ListeningCallback {
    fn default() -> Self {
        Self::new(|_| {})
    }
}

impl fmt::Debug for ListeningCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ListeningCallback")
    }
}

// =============================================================================
// Options (caller-facing, every field optional)
// =============================================================================

/// Options accepted by the cluster constructors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterOptions {
    /// Server tuning passed through to the HTTP layer untouched.
    pub advanced: AdvancedServerOptions,

    /// Listening address settings.
    pub listen: ListenOptions,

    /// Error/exit policies.
    pub events: EventOptions,

    /// Serve HTTPS instead of HTTP. Requires `advanced.tls`.
    #[serde(alias = "isHttps")]
    pub is_https: bool,
}

/// Listening address settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenOptions {
    pub port: Option<u16>,
    pub hostname: Option<String>,
    pub backlog: Option<u32>,

    /// Only settable from code.
    #[serde(skip)]
    pub on_listening: Option<ListeningCallback>,
}

/// Policy settings, each either a single action or an ordered list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventOptions {
    pub error: Option<OneOrMany<ErrorAction>>,
    pub exit: Option<OneOrMany<ExitAction>>,
}

/// HTTP server tuning. Opaque to the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedServerOptions {
    /// Certificate material for HTTPS.
    pub tls: Option<TlsOptions>,

    /// HTTP/1.1 keep-alive.
    pub keep_alive: bool,

    /// Maximum time to receive request headers (e.g. `"10s"`).
    #[serde(with = "humantime_serde")]
    pub header_read_timeout: Option<Duration>,
}

impl Default for AdvancedServerOptions {
    fn default() -> Self {
        Self {
            tls: None,
            keep_alive: true,
            header_read_timeout: None,
        }
    }
}

/// PEM certificate chain and private key locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsOptions {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl ClusterOptions {
    /// Parse an options document.
    pub fn from_json(document: &str) -> Result<Self> {
        serde_json::from_str(document)
            .map_err(|e| Error::configuration(format!("invalid options document: {}", e)))
    }

    /// Load an options document from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&document)
    }

    /// Overlay `PREFORK_PORT`, `PREFORK_HOSTNAME` and `PREFORK_BACKLOG`.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn apply_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PREFORK_PORT") {
            let port = port.trim().parse().map_err(|_| {
                Error::configuration(format!("PREFORK_PORT is not a port: {}", port))
            })?;
            self.listen.port = Some(port);
        }
        if let Some(hostname) = lookup("PREFORK_HOSTNAME") {
            self.listen.hostname = Some(hostname);
        }
        if let Some(backlog) = lookup("PREFORK_BACKLOG") {
            let backlog = backlog.trim().parse().map_err(|_| {
                Error::configuration(format!("PREFORK_BACKLOG is not a number: {}", backlog))
            })?;
            self.listen.backlog = Some(backlog);
        }
        Ok(self)
    }

    pub fn port(mut self, port: u16) -> Self {
        self.listen.port = Some(port);
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.listen.hostname = Some(hostname.into());
        self
    }

    pub fn backlog(mut self, backlog: u32) -> Self {
        self.listen.backlog = Some(backlog);
        self
    }

    pub fn on_listening<F>(mut self, f: F) -> Self
    where
        F: Fn(SocketAddr) + Send + Sync + 'static,
    {
        self.listen.on_listening = Some(ListeningCallback::new(f));
        self
    }

    pub fn on_error(mut self, actions: impl Into<OneOrMany<ErrorAction>>) -> Self {
        self.events.error = Some(actions.into());
        self
    }

    pub fn on_exit(mut self, actions: impl Into<OneOrMany<ExitAction>>) -> Self {
        self.events.exit = Some(actions.into());
        self
    }

    /// Serve HTTPS with the given certificate material.
    pub fn https(mut self, tls: TlsOptions) -> Self {
        self.advanced.tls = Some(tls);
        self.is_https = true;
        self
    }
}

// =============================================================================
// Canonical configuration (normalized, fully populated)
// =============================================================================

/// Canonical cluster configuration. Immutable once normalized.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub advanced: AdvancedServerOptions,
    pub listen: ListenConfig,
    pub is_https: bool,
    pub events: EventPolicy,
    pub worker_count: NonZeroUsize,
}

/// Resolved listening settings.
#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub port: u16,
    pub hostname: String,
    pub backlog: u32,
    pub on_listening: ListeningCallback,
}

/// Ordered action lists for the two event classes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPolicy {
    pub on_error: Vec<ErrorAction>,
    pub on_exit: Vec<ExitAction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_with_single_and_list_actions() {
        let opts = ClusterOptions::from_json(
            r#"{
                "listen": { "port": 9000, "hostname": "127.0.0.1" },
                "events": { "error": "log", "exit": ["log", "exit"] }
            }"#,
        )
        .unwrap();

        assert_eq!(opts.listen.port, Some(9000));
        assert_eq!(opts.listen.hostname.as_deref(), Some("127.0.0.1"));
        assert_eq!(opts.events.error, Some(OneOrMany::One(ErrorAction::Log)));
        assert_eq!(
            opts.events.exit,
            Some(OneOrMany::Many(vec![ExitAction::Log, ExitAction::Exit]))
        );
        assert!(!opts.is_https);
    }

    #[test]
    fn test_unknown_action_is_configuration_error() {
        let err = ClusterOptions::from_json(r#"{ "events": { "exit": "restart" } }"#).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_throw_is_not_an_exit_action() {
        let err = ClusterOptions::from_json(r#"{ "events": { "exit": ["throw"] } }"#).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_is_https_alias_and_durations() {
        let opts = ClusterOptions::from_json(
            r#"{
                "isHttps": true,
                "advanced": {
                    "tls": { "cert_path": "/tmp/cert.pem", "key_path": "/tmp/key.pem" },
                    "keep_alive": false,
                    "header_read_timeout": "5s"
                }
            }"#,
        )
        .unwrap();

        assert!(opts.is_https);
        assert!(!opts.advanced.keep_alive);
        assert_eq!(opts.advanced.header_read_timeout, Some(Duration::from_secs(5)));
        assert_eq!(
            opts.advanced.tls.unwrap().cert_path,
            PathBuf::from("/tmp/cert.pem")
        );
    }

    #[test]
    fn test_empty_document_leaves_everything_unset() {
        let opts = ClusterOptions::from_json("{}").unwrap();
        assert!(opts.listen.port.is_none());
        assert!(opts.events.error.is_none());
        assert!(opts.advanced.keep_alive);
    }

    #[test]
    fn test_apply_env_overlays_listen_fields() {
        let opts = ClusterOptions::default()
            .port(1234)
            .apply_env_from(|key| match key {
                "PREFORK_PORT" => Some("4321".to_string()),
                "PREFORK_BACKLOG" => Some("64".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(opts.listen.port, Some(4321));
        assert_eq!(opts.listen.backlog, Some(64));
        assert!(opts.listen.hostname.is_none());
    }

    #[test]
    fn test_apply_env_rejects_bad_port() {
        let err = ClusterOptions::default()
            .apply_env_from(|key| (key == "PREFORK_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, br#"{ "listen": { "backlog": 128 } }"#).unwrap();

        let opts = ClusterOptions::from_file(file.path()).unwrap();
        assert_eq!(opts.listen.backlog, Some(128));

        let missing = ClusterOptions::from_file("/nonexistent/prefork.json").unwrap_err();
        assert!(missing.is_configuration());
    }
}
