//! Error types for the request monitor.

use thiserror::Error;

/// Result type alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Failures raised by a [`StorageProvider`](crate::storage::StorageProvider).
///
/// A missing record is not an error: lookups return `Ok(None)`.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend unreachable or schema setup failed. Fatal at startup.
    #[error("storage initialization failed: {0}")]
    Init(String),

    /// A single record could not be persisted.
    #[error("failed to store request record: {0}")]
    Write(String),

    /// A stats / search / dashboard read failed.
    #[error("storage query failed: {0}")]
    Query(String),
}

/// Invalid settings detected while building the runtime configuration.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("sample rate must be within [0, 1], got {0}")]
    SampleRate(f64),

    #[error("slow request threshold must not be negative, got {0}ms")]
    SlowThreshold(i64),

    #[error("database url is required for the sqlite backend")]
    MissingDatabaseUrl,

    #[error("retention interval must be greater than zero")]
    ZeroRetentionInterval,
}

/// Top-level error returned from the binary and from startup helpers.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
