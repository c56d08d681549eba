//! Error types for the imgsrv client.
//!
//! A request can fail because the server said no (`Rejected`), because
//! the server said something this client does not understand
//! (`UnexpectedStatus`), or because the transport broke (`Connect`,
//! `Frame`, `Io`).

use std::io;
use std::net::SocketAddr;

use imgsrv_protocol::{FrameError, Status};
use thiserror::Error;

// ============================================================================
// Client Error Type
// ============================================================================

/// Client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not reach the server.
    #[error("Failed to connect to {addr}: {error}")]
    Connect {
        /// Address that was dialed.
        addr: SocketAddr,
        /// Underlying reason.
        error: String,
    },

    /// The server answered with an error status.
    ///
    /// `detail` is the explanation line the server sends after every
    /// error status.
    #[error("Server rejected request with {status}: {detail}")]
    Rejected {
        /// The error status received.
        status: Status,
        /// Explanation sent by the server.
        detail: String,
    },

    /// The server answered with a status that does not fit the exchange.
    #[error("Unexpected status {actual}, expected {expected}")]
    UnexpectedStatus { expected: Status, actual: Status },

    /// Framing or transport failure.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Local I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ClientError {
    /// Returns true if the server rejected the request on purpose.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_display() {
        let error = ClientError::Rejected {
            status: Status::NameRejected,
            detail: "Length of name must be between 3 and 10 characters".to_string(),
        };
        let display = format!("{error}");
        assert!(display.contains("ERR_N"));
        assert!(display.contains("between 3 and 10"));
        assert!(error.is_rejection());
    }

    #[test]
    fn test_unexpected_status_display() {
        let error = ClientError::UnexpectedStatus {
            expected: Status::GrayscaleDone,
            actual: Status::BinaryDone,
        };
        let display = format!("{error}");
        assert!(display.contains("SUC_BIN"));
        assert!(display.contains("SUC_GS"));
        assert!(!error.is_rejection());
    }

    #[test]
    fn test_frame_error_is_transparent() {
        let error: ClientError = FrameError::Timeout.into();
        assert_eq!(error.to_string(), FrameError::Timeout.to_string());
    }

    #[test]
    fn test_io_error_from_conversion() {
        let error: ClientError = io::Error::new(io::ErrorKind::NotFound, "image.png").into();
        assert!(matches!(error, ClientError::Io(_)));
        assert!(error.to_string().contains("IO error"));
    }
}
