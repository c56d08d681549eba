//! imgsrv Client - talks to a running `imgsrvd`
//!
//! This crate provides:
//! - `client` - `ImageClient`, one connection per request, for both the
//!   command profile and the byte-ack profile
//! - `error` - `ClientError`, separating server rejections from transport
//!   failures
//!
//! ```rust,ignore
//! use imgsrv_client::{ClientConfig, ImageClient, ImageRequest};
//!
//! let client = ImageClient::new(ClientConfig::new("127.0.0.1:8080".parse()?));
//! let gray = client.process(ImageRequest::grayscale("photo", bytes)).await?;
//! ```

pub mod client;
pub mod error;

pub use client::{ClientConfig, ImageClient, ImageRequest};
pub use error::{ClientError, Result};
