//! imgsrv Protocol - Wire protocol for image transfer
//!
//! This crate provides the framing and status vocabulary shared by the
//! server and the client:
//! - `codec` - newline-terminated text lines and length-prefixed files over a byte stream
//! - `status` - status lines of the command profile and the byte-ack reply
//! - `error` - framing failures (transport, timeout, protocol violation)
//!
//! All multi-byte integers on the wire are big-endian: file lengths are
//! `u64`, the binary threshold is `i32`.

pub mod codec;
pub mod error;
pub mod status;

pub use codec::{Connection, TcpConnection, DEFAULT_CHUNK_SIZE, MAX_LINE_LENGTH};
pub use error::{FrameError, FrameResult};
pub use status::{Ack, Status};
