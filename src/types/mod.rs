//! Core types for the prefork supervisor.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (WorkerId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Caller options and the normalized cluster configuration

mod config;
mod errors;
mod ids;

pub use config::{
    AdvancedServerOptions, ClusterConfig, ClusterOptions, ErrorAction, EventOptions,
    EventPolicy, ExitAction, ListenConfig, ListenOptions, ListeningCallback, OneOrMany,
    TlsOptions, DEFAULT_BACKLOG, DEFAULT_HOSTNAME, DEFAULT_PORT,
};
pub use errors::{Error, Result};
pub use ids::WorkerId;
