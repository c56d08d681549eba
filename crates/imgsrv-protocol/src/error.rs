//! Framing errors.

use std::io;

use thiserror::Error;

/// Errors that can occur while reading or writing frames.
///
/// Every variant is fatal to the connection it happened on.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Socket read/write failure.
    #[error("I/O error: {0}")]
    Transport(#[from] io::Error),

    /// Peer closed the connection before any byte of the item arrived.
    #[error("Connection closed")]
    EndOfStream,

    /// Peer closed the connection in the middle of a file payload.
    #[error("Connection closed after {received} of {expected} bytes")]
    Truncated { received: u64, expected: u64 },

    /// No data arrived within the idle window.
    #[error("Read timeout")]
    Timeout,

    /// Peer did not accept data within the write window.
    #[error("Write timeout")]
    WriteTimeout,

    /// Announced file length exceeds the configured bound.
    #[error("File too large: {length} bytes (max: {max})")]
    FileTooLarge { length: u64, max: u64 },

    /// A text line exceeded the line length bound.
    #[error("Line too long (max: {max} bytes)")]
    LineTooLong { max: usize },

    /// A status line outside the fixed vocabulary.
    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    /// A byte-ack reply other than `0` or `1`.
    #[error("Invalid ack byte: {0}")]
    InvalidAck(u8),
}

impl FrameError {
    /// Returns true for idle read or write timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout | Self::WriteTimeout)
    }

    /// Returns true if the peer sent a value violating the protocol,
    /// as opposed to the transport failing.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::FileTooLarge { .. }
                | Self::LineTooLong { .. }
                | Self::UnknownStatus(_)
                | Self::InvalidAck(_)
        )
    }
}

/// Result type for frame operations.
pub type FrameResult<T> = Result<T, FrameError>;
