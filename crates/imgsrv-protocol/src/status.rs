//! Status vocabulary.
//!
//! The command profile answers each client step with one status line.
//! Every error status is followed by exactly one human-readable detail
//! line. The byte-ack profile answers with a single byte instead.

use std::fmt;
use std::str::FromStr;

use imgsrv_core::TransformKind;

use crate::error::FrameError;

/// Status line sent by the server in the command profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// `SUC_CMD` - command keyword recognized
    CommandAccepted,
    /// `ERR_CMD` - unknown keyword; detail lists valid keywords
    CommandRejected,
    /// `SUC_N` - name accepted
    NameAccepted,
    /// `ERR_N` - name length out of bounds; detail explains the bound
    NameRejected,
    /// `SUC_GS` - grayscale result follows
    GrayscaleDone,
    /// `ERR_GS` - grayscale failed
    GrayscaleFailed,
    /// `SUC_BIN` - binary result follows
    BinaryDone,
    /// `ERR_BIN` - binary failed
    BinaryFailed,
}

impl Status {
    /// All statuses, in protocol order.
    pub const ALL: [Status; 8] = [
        Self::CommandAccepted,
        Self::CommandRejected,
        Self::NameAccepted,
        Self::NameRejected,
        Self::GrayscaleDone,
        Self::GrayscaleFailed,
        Self::BinaryDone,
        Self::BinaryFailed,
    ];

    /// Wire text of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CommandAccepted => "SUC_CMD",
            Self::CommandRejected => "ERR_CMD",
            Self::NameAccepted => "SUC_N",
            Self::NameRejected => "ERR_N",
            Self::GrayscaleDone => "SUC_GS",
            Self::GrayscaleFailed => "ERR_GS",
            Self::BinaryDone => "SUC_BIN",
            Self::BinaryFailed => "ERR_BIN",
        }
    }

    /// Returns true for `SUC_*` statuses.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            Self::CommandAccepted | Self::NameAccepted | Self::GrayscaleDone | Self::BinaryDone
        )
    }

    /// Returns true if a detail line follows this status.
    pub fn has_detail(self) -> bool {
        !self.is_success()
    }

    /// Status sent before a processed file.
    pub fn success_for(transform: TransformKind) -> Self {
        match transform {
            TransformKind::Grayscale => Self::GrayscaleDone,
            TransformKind::Binary => Self::BinaryDone,
        }
    }

    /// Status sent when a transform failed.
    pub fn failure_for(transform: TransformKind) -> Self {
        match transform {
            TransformKind::Grayscale => Self::GrayscaleFailed,
            TransformKind::Binary => Self::BinaryFailed,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| FrameError::UnknownStatus(s.to_string()))
    }
}

/// Single-byte reply of the byte-ack profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Failure,
    Success,
}

impl Ack {
    /// Wire byte of the ack.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Failure => 0,
            Self::Success => 1,
        }
    }

    /// Parses a wire byte.
    pub fn from_byte(byte: u8) -> Result<Self, FrameError> {
        match byte {
            0 => Ok(Self::Failure),
            1 => Ok(Self::Success),
            other => Err(FrameError::InvalidAck(other)),
        }
    }
}

impl From<bool> for Ack {
    fn from(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Failure
        }
    }
}
