//! Error Types
//!
//! The registry itself never fails: stale or duplicate notifications are
//! absorbed as no-ops. Errors only exist at the edges, where the crate talks
//! to the host scheduler or reads its configuration.

use thiserror::Error;

/// Failure to hand a task to the host's home thread.
#[derive(Debug, Error)]
pub enum HostError {
    /// The home loop was shut down; no further tasks will run.
    #[error("home loop is closed")]
    Closed,

    /// A home-thread-only operation was invoked from another thread.
    #[error("operation requires the home thread")]
    NotHomeThread,
}

/// Failure to load or validate a [`RegistryConfig`](crate::RegistryConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse registry config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid registry config: {0}")]
    Invalid(String),
}
