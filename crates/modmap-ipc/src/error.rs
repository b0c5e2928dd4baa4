//! Endpoint error types.

use std::io;

use modmap_wire::WireError;
use thiserror::Error;

/// Errors surfaced by the client and server endpoints.
#[derive(Debug, Error)]
pub enum MapperError {
    /// Framing failure from the wire codec.
    #[error("framing error: {0}")]
    Wire(#[from] WireError),

    /// Transport failure outside the codec.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the stream in the middle of a batch.
    #[error("peer closed the stream mid-batch")]
    UnexpectedEof,

    /// The resolver ended the session during connection negotiation.
    #[error("session closed by resolver")]
    SessionClosed,

    /// A response line could not be decoded.
    #[error("malformed response: {detail}")]
    MalformedResponse {
        /// What the client saw.
        detail: String,
    },

    /// The helper answered a request with an `ERROR` response.
    #[error("helper reported an error: {message}")]
    Remote {
        /// The error code and optional human text from the wire.
        message: String,
    },

    /// The response batch did not pair 1:1 with the request batch.
    #[error("response batch mismatch: sent {sent} requests, received {received} responses")]
    BatchMismatch {
        /// Requests flushed in the batch.
        sent: usize,
        /// Responses decoded from the reply.
        received: usize,
    },
}

impl MapperError {
    /// True for errors scoped to a single request; the session remains
    /// usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MapperError::Remote { .. })
    }

    /// True for errors that terminate the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MapperError::Io(_)
                | MapperError::Wire(WireError::Io(_))
                | MapperError::UnexpectedEof
                | MapperError::SessionClosed
        )
    }
}

/// Specialized `Result` for endpoint operations.
pub type MapperResult<T> = std::result::Result<T, MapperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_errors_are_recoverable() {
        let err = MapperError::Remote {
            message: "version mismatch".to_string(),
        };
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_transport_errors_are_fatal() {
        let err = MapperError::from(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.is_fatal());
        assert!(!err.is_recoverable());

        assert!(MapperError::UnexpectedEof.is_fatal());
        assert!(MapperError::SessionClosed.is_fatal());
    }

    #[test]
    fn test_framing_errors_are_neither() {
        let err = MapperError::from(WireError::TrailingData);
        assert!(!err.is_recoverable());
        assert!(!err.is_fatal());
    }
}
