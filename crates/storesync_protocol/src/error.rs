//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for encoding and decoding.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload is not valid JSON or does not match the message shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}
