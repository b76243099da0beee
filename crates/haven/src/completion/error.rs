//! Completion client error types.

use std::time::Duration;

use thiserror::Error;

/// Result type for completion operations.
pub type CompletionResult<T> = Result<T, CompletionError>;

/// Errors that can occur while talking to the completion provider.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Connection failed.
    #[error("Failed to connect to completion provider at {url}: {message}")]
    ConnectionFailed { url: String, message: String },

    /// Provider did not answer in time.
    #[error("Completion provider did not respond within {0:?}")]
    Timeout(Duration),

    /// Provider answered with a non-success status.
    #[error("Completion provider returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// No API key configured.
    #[error("No API key configured for the completion provider")]
    MissingApiKey,

    /// HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}
