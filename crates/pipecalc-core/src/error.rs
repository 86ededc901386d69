//! Error types for the pipe calculator.
//!
//! Every variant is terminal for the connection it occurred on. Nothing in
//! this crate retries; recovery is left to the caller.

use thiserror::Error;

/// Main error type for the pipe calculator.
#[derive(Debug, Error)]
pub enum PipeCalcError {
    // Protocol errors
    #[error("Invalid operation tag: 0x{byte:02x}")]
    InvalidOperation { byte: u8 },

    #[error("Malformed payload: expected {expected} bytes, got {actual}")]
    MalformedPayload { expected: usize, actual: usize },

    #[error("Malformed response: expected {expected} bytes, got {actual}")]
    MalformedResponse { expected: usize, actual: usize },

    // Session errors
    #[error("Failed to connect to pipe {name}: {reason}")]
    ConnectFailed { name: String, reason: String },

    #[error("Request failed: {message}")]
    RequestFailed { message: String },

    #[error("Operation was cancelled")]
    Cancelled,

    // Transport errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for pipe calculator operations.
pub type Result<T> = std::result::Result<T, PipeCalcError>;

impl From<std::io::Error> for PipeCalcError {
    fn from(err: std::io::Error) -> Self {
        PipeCalcError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl PipeCalcError {
    /// Wrap a transport failure that happened in the middle of a round trip.
    pub fn request_failed(err: impl std::fmt::Display) -> Self {
        PipeCalcError::RequestFailed {
            message: err.to_string(),
        }
    }

    /// Cancellation is expected rather than exceptional and must not be
    /// reported as an error by the core.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PipeCalcError::Cancelled)
    }

    /// Whether the error is a protocol violation by the peer.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            PipeCalcError::InvalidOperation { .. }
                | PipeCalcError::MalformedPayload { .. }
                | PipeCalcError::MalformedResponse { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipeCalcError::InvalidOperation { byte: b'X' };
        assert_eq!(err.to_string(), "Invalid operation tag: 0x58");

        let err = PipeCalcError::MalformedPayload {
            expected: 8,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "Malformed payload: expected 8 bytes, got 3"
        );
    }

    #[test]
    fn test_io_conversion_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err: PipeCalcError = io.into();
        match err {
            PipeCalcError::Io { message, source } => {
                assert!(message.contains("pipe gone"));
                assert!(source.is_some());
            }
            other => panic!("Expected Io, got: {:?}", other),
        }
    }

    #[test]
    fn test_classification() {
        assert!(PipeCalcError::Cancelled.is_cancellation());
        assert!(!PipeCalcError::Cancelled.is_protocol_violation());
        assert!(PipeCalcError::InvalidOperation { byte: 0 }.is_protocol_violation());
        assert!(!PipeCalcError::request_failed("eof").is_cancellation());
    }
}
