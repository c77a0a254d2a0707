//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.
//!
//! Worker runtime errors and worker exits are not errors of this crate: they
//! are events handled by the configured policy.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the prefork supervisor.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing request handler or unusable options. Raised at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The process runtime could not create a worker.
    #[error("fork failed: {0}")]
    Fork(String),

    /// A worker could not bind or configure its listening socket.
    #[error("listen failed: {0}")]
    Listen(String),

    /// Fork channel bind/connect failure.
    #[error("fork channel error: {0}")]
    Channel(String),

    /// Certificate or key material could not be loaded.
    #[error("tls error: {0}")]
    Tls(String),

    /// Internal errors (supervisor task failures).
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// Convenience constructors
impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn fork(msg: impl Into<String>) -> Self {
        Self::Fork(msg.into())
    }

    pub fn listen(msg: impl Into<String>) -> Self {
        Self::Listen(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for errors raised while resolving configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = Error::listen("0.0.0.0:80: permission denied");
        assert_eq!(
            err.to_string(),
            "listen failed: 0.0.0.0:80: permission denied"
        );
    }

    #[test]
    fn test_is_configuration() {
        assert!(Error::configuration("no app").is_configuration());
        assert!(!Error::fork("EAGAIN").is_configuration());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
