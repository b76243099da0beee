//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while persisting.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend refused the write.
    #[error("{table} insert rejected with status {status}: {message}")]
    Rejected {
        table: &'static str,
        status: u16,
        message: String,
    },

    /// Missing or invalid configuration.
    #[error("invalid store configuration: {0}")]
    Config(String),
}
