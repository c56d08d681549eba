//! imgsrv Core - Shared types for the image processing server
//!
//! This crate provides the domain types shared between
//! the server (imgsrvd) and the client (imgsrv-client):
//! - `command` - Keyword table mapping a command to a storage directory and transform
//! - `naming` - Negotiated storage names and on-disk artifact paths
//! - `transform` - The `ImageProcessor` seam and its raster implementation
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod command;
pub mod error;
pub mod naming;
pub mod transform;

// Re-exports for convenience
pub use command::{Command, CommandTable, TransformKind, BINARY_KEYWORD, GRAYSCALE_KEYWORD};
pub use error::{DomainError, DomainResult};
pub use naming::{processed_path, StorageName, StoredFile, MAX_NAME_LENGTH, MIN_NAME_LENGTH};
pub use transform::{ImageProcessor, RasterProcessor, TransformError};
