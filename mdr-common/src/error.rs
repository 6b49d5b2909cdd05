//! Common error types for MDR

use thiserror::Error;

/// Common result type for MDR operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the registry and preference layers
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Module descriptor rejected at creation/registration time
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote store unreachable or misconfigured
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    /// Remote write (insert/update) failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
