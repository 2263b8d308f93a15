//! Transport error types.

use thiserror::Error;

/// Errors from control requests and push-stream setup.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP request itself failed (DNS, connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, often a JSON error object.
        body: String,
    },
    /// A response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
