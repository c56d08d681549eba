//! imgsrv Daemon - TCP image processing server
//!
//! This crate provides the server side of imgsrv:
//! - `config` - Static startup parameters, loaded from TOML
//! - `server` - Connection acceptor and per-client protocol sessions
//! - `storage` - Storage directory bootstrap and scoped cleanup of artifacts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        imgsrvd                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   ImageServer   │────▶│  ServerContext (Arc)        │   │
//! │  │  (TcpListener)  │     │  config + CommandTable +    │   │
//! │  └────────┬────────┘     │  ImageProcessor             │   │
//! │           │              └──────────────┬──────────────┘   │
//! │           │ accept()                    │ read-only        │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ Session         │     │ ByteAckSession              │   │
//! │  │ (command prof.) │     │ (byte-ack profile)          │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! No `.unwrap()`, `.expect()` or `panic!()` in production code: every
//! per-connection failure is contained to its own task.

pub mod config;
pub mod server;
pub mod storage;
