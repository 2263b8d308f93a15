//! Wire decoding errors.

use thiserror::Error;

/// Errors raised while decoding frame payloads received from the gateway.
#[derive(Debug, Error)]
pub enum WireError {
    /// The payload was not valid JSON.
    #[error("invalid frame payload JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload was valid JSON but not an object.
    #[error("frame payload is not a JSON object")]
    NotAnObject,
    /// A batch id could not be read as an unsigned integer.
    #[error("invalid batch id: {0}")]
    InvalidBatchId(String),
}

/// Result type for wire decoding.
pub type Result<T> = std::result::Result<T, WireError>;
