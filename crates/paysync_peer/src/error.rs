//! Error types for the reference peer.

use paysync_codec::CodecError;
use thiserror::Error;

/// Result type for peer operations.
pub type PeerResult<T> = Result<T, PeerError>;

/// Errors that can occur while handling a sync request.
#[derive(Error, Debug)]
pub enum PeerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or rejected bearer token.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// No resource at this path.
    #[error("no such resource: {0}")]
    NotFound(String),

    /// Method not supported on this path.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Request body could not be decoded.
    #[error("malformed payload: {0}")]
    Codec(#[from] CodecError),

    /// Internal peer error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PeerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, PeerError::Internal(_))
    }

    /// HTTP status reported for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            PeerError::InvalidRequest(_) | PeerError::Codec(_) => 400,
            PeerError::NotAuthorized(_) => 401,
            PeerError::NotFound(_) => 404,
            PeerError::MethodNotAllowed(_) => 405,
            PeerError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(PeerError::InvalidRequest("bad".into()).is_client_error());
        assert!(PeerError::Internal("oops".into()).is_server_error());
        assert!(!PeerError::NotFound("/x".into()).is_server_error());
    }

    #[test]
    fn status_codes() {
        assert_eq!(PeerError::NotAuthorized("x".into()).status_code(), 401);
        assert_eq!(PeerError::NotFound("x".into()).status_code(), 404);
        assert_eq!(
            PeerError::from(CodecError::invalid_structure("x")).status_code(),
            400
        );
        assert_eq!(PeerError::Internal("x".into()).status_code(), 500);
    }
}
