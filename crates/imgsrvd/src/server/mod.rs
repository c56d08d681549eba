//! TCP server for imgsrv.
//!
//! The server:
//! - Creates the storage directories named by the command table
//! - Listens on a TCP socket with the configured backlog
//! - Spawns one session task per accepted client
//! - Supports graceful shutdown via CancellationToken, letting in-flight
//!   sessions run to completion
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ImageServer   │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ Session /       │────▶│  ServerContext  │
//! │ ByteAckSession  │     │   (read-only)   │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! A failing or timed out session only ever closes its own socket; the
//! accept loop and the other sessions are unaffected.

mod byte_ack;
mod session;
mod transfer;

pub use byte_ack::ByteAckSession;
pub use session::{CloseReason, Session, SessionError, SessionState};

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

use imgsrv_core::{CommandTable, ImageProcessor};

use crate::config::{Profile, ServerConfig};
use crate::storage::prepare_storage;

/// Consecutive non-connection accept errors after which the listener is
/// considered dead
const MAX_ACCEPT_FAILURES: u32 = 16;

/// Pause after a listener-level accept error
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Immutable state shared by the acceptor and every session.
pub struct ServerContext {
    config: ServerConfig,
    commands: CommandTable,
    processor: Arc<dyn ImageProcessor>,
}

impl ServerContext {
    /// Creates a context with the standard command table of `config`.
    pub fn new(config: ServerConfig, processor: Arc<dyn ImageProcessor>) -> Self {
        let commands = config.command_table();
        Self::with_commands(config, commands, processor)
    }

    /// Creates a context with a custom command table.
    pub fn with_commands(
        config: ServerConfig,
        commands: CommandTable,
        processor: Arc<dyn ImageProcessor>,
    ) -> Self {
        Self {
            config,
            commands,
            processor,
        }
    }

    /// Returns the startup configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the command table.
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Returns a handle to the image processor.
    pub fn processor(&self) -> Arc<dyn ImageProcessor> {
        Arc::clone(&self.processor)
    }
}

/// Connection acceptor.
///
/// Owns the listening socket; each accepted connection is handed to a
/// session running on its own task.
pub struct ImageServer {
    /// Listening socket
    listener: TcpListener,

    /// Shared read-only state
    context: Arc<ServerContext>,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Tracks in-flight sessions so shutdown can wait for them
    sessions: TaskTracker,

    /// Connection counter for log correlation
    connection_counter: AtomicU64,
}

impl ImageServer {
    /// Prepares storage and binds the listening socket.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        context: Arc<ServerContext>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        prepare_storage(context.commands()).map_err(|(path, e)| ServerError::StorageSetup {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        let addr = context.config().socket_addr();
        let bind_error = move |e: io::Error| ServerError::Bind {
            addr,
            error: e.to_string(),
        };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(context.config().backlog).map_err(bind_error)?;

        info!(
            addr = %addr,
            profile = ?context.config().profile,
            backlog = context.config().backlog,
            "Image server listening"
        );

        Ok(Self {
            listener,
            context,
            cancel_token,
            sessions: TaskTracker::new(),
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Listener(e.to_string()))
    }

    /// Returns the number of sessions still running.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Runs the accept loop.
    ///
    /// Returns after the cancellation token fires or the listener fails,
    /// once every outstanding session has finished.
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut failures = 0u32;
        let mut outcome = Ok(());

        loop {
            debug!("Waiting for a client");

            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            failures = 0;
                            self.handle_connection(stream, peer);
                        }
                        Err(e) if is_connection_error(&e) => {
                            // Only this connection attempt is lost
                            warn!(error = %e, "Failed to accept connection");
                        }
                        Err(e) => {
                            failures += 1;
                            error!(error = %e, failures, "Listener error");
                            if failures >= MAX_ACCEPT_FAILURES {
                                outcome = Err(ServerError::Listener(e.to_string()));
                                break;
                            }
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    }
                }
            }
        }

        self.sessions.close();
        if !self.sessions.is_empty() {
            info!(
                sessions = self.sessions.len(),
                "Waiting for in-flight sessions"
            );
        }
        self.sessions.wait().await;

        info!("Image server stopped");
        outcome
    }

    /// Spawns the session task for an accepted connection.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let connection = self.connection_counter.fetch_add(1, Ordering::Relaxed);
        let context = Arc::clone(&self.context);

        info!(client = %peer, connection, "Client connected");

        let span = info_span!("session", connection, client = %peer);
        self.sessions.spawn(
            async move {
                let reason = match context.config().profile {
                    Profile::Command => Session::from_stream(stream, peer, context).run().await,
                    Profile::ByteAck => {
                        ByteAckSession::from_stream(stream, peer, context).run().await
                    }
                };
                debug!(reason = ?reason, "Session finished");
            }
            .instrument(span),
        );
    }
}

/// Accept errors that only concern the connection being accepted.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
    )
}

/// Errors that can occur in server operations.
///
/// All of them are fatal to the server; per-connection failures never
/// surface here.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to create storage directory {path}: {error}")]
    StorageSetup { path: String, error: String },

    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("Listener failed: {0}")]
    Listener(String),
}
