//! Error types for the sync server.

use storesync_engine::SyncError;
use storesync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
///
/// These are transport-level failures. Failures of a well-formed request are
/// reported inside the response's error payload instead.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request body is not a sync request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The engine could not be set up.
    #[error("engine setup failed: {0}")]
    Setup(#[from] SyncError),

    /// The response could not be encoded.
    #[error("encoding failed: {0}")]
    Encoding(String),
}

impl ServerError {
    /// Maps a decode failure of the request body.
    pub fn malformed(err: &ProtocolError) -> Self {
        ServerError::InvalidRequest(err.to_string())
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServerError::InvalidRequest(_))
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storesync_protocol::SyncRequest;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Encoding("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn malformed_body_is_client_error() {
        let err = SyncRequest::decode(b"{not json").unwrap_err();
        let err = ServerError::malformed(&err);
        assert!(err.is_client_error());
        assert!(err.to_string().starts_with("invalid request:"));
    }
}
