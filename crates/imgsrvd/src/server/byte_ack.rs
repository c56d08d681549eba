//! Byte-ack profile session.
//!
//! The client sends one file frame and receives a single byte: `1` when a
//! grayscale version was produced, `0` otherwise. There is no command or
//! name negotiation; the upload is stored in the grayscale directory under
//! a name derived from the peer address alone.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Local;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use imgsrv_core::{StoredFile, TransformKind};
use imgsrv_protocol::{Ack, Connection};

use super::session::{CloseReason, SessionError};
use super::transfer::{receive_upload, run_transform};
use super::ServerContext;
use crate::storage::PendingFile;

/// Session for a single byte-ack client.
pub struct ByteAckSession<R, W> {
    connection: Connection<R, W>,
    client: SocketAddr,
    context: Arc<ServerContext>,
}

impl ByteAckSession<OwnedReadHalf, OwnedWriteHalf> {
    /// Creates a session over an accepted TCP stream.
    pub fn from_stream(stream: TcpStream, client: SocketAddr, context: Arc<ServerContext>) -> Self {
        let connection = Connection::from_stream(stream, context.config().idle_timeout());
        Self::new(connection, client, context)
    }
}

impl<R, W> ByteAckSession<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(connection: Connection<R, W>, client: SocketAddr, context: Arc<ServerContext>) -> Self {
        Self {
            connection,
            client,
            context,
        }
    }

    /// Receives, converts and acknowledges one file, then closes.
    pub async fn run(mut self) -> CloseReason {
        let (ack, reason, result) = match self.convert().await {
            Ok(result) => (Ack::Success, CloseReason::Completed, Some(result)),
            Err(SessionError::Frame(e)) if e.is_protocol_violation() => {
                // The peer may still be listening
                warn!(error = %e, "Upload rejected");
                (Ack::Failure, CloseReason::Aborted(e.into()), None)
            }
            Err(e @ SessionError::Frame(_)) => {
                // Transport is unusable; no reply
                warn!(error = %e, "Upload failed");
                self.shutdown().await;
                return CloseReason::Aborted(e);
            }
            Err(e) => {
                warn!(error = %e, "Conversion failed");
                (Ack::Failure, CloseReason::TransformFailed(e), None)
            }
        };

        if let Err(e) = self.connection.send_ack(ack).await {
            warn!(error = %e, "Acknowledgement not delivered");
            self.shutdown().await;
            return CloseReason::Aborted(e.into());
        }

        if let Some(result) = result {
            let path = result.keep();
            info!(result = %path.display(), "Image converted");
        }

        self.shutdown().await;
        reason
    }

    async fn convert(&mut self) -> Result<PendingFile, SessionError> {
        let command = self
            .context
            .commands()
            .find_by_transform(TransformKind::Grayscale)
            .ok_or(SessionError::Unsupported(TransformKind::Grayscale))?;

        let stored = StoredFile::unnamed(command.storage_dir(), self.client, Local::now());
        let max_length = self.context.config().max_file_length;

        let upload = receive_upload(&mut self.connection, stored.path(), max_length).await?;
        let result = run_transform(
            self.context.processor(),
            TransformKind::Grayscale,
            upload.path(),
            None,
        )
        .await?;

        if self.context.config().keep_uploads {
            let _ = upload.keep();
        }
        Ok(result)
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.connection.shutdown().await {
            debug!(error = %e, "Connection shutdown failed");
        }
    }
}
