//! Command profile session.
//!
//! Each accepted client gets its own `Session`, which drives the protocol
//! state machine from the first line to the close of the socket:
//!
//! ```text
//! AwaitCommand ──SUC_CMD──▶ AwaitName ──SUC_N──▶ AwaitFile
//!      │ ERR_CMD                │ ERR_N              │
//!      ▼                        ▼                    ├── bin ──▶ AwaitThreshold
//!   Closed ◀──────────────── Closed                  │                │
//!      ▲                                             ▼                ▼
//!      └──── ERR_GS / ERR_BIN ◀──────────────── Processing ◀──────────┘
//!      ▲                                             │
//!      └────────────── SUC_GS / SUC_BIN + file ◀── SendResult
//! ```
//!
//! Every transition is a call to [`Session::step`], which consumes the
//! current state and returns the next one. End of stream, timeouts and
//! other transport failures close the session without a response since the
//! peer is presumed gone.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use imgsrv_core::{Command, StorageName, StoredFile, TransformError, TransformKind};
use imgsrv_protocol::{Connection, FrameError, Status};

use super::transfer::{receive_upload, run_transform};
use super::ServerContext;
use crate::storage::PendingFile;

/// Protocol state of a session.
#[derive(Debug)]
pub enum SessionState {
    /// Waiting for the command keyword line
    AwaitCommand,

    /// Waiting for the name line
    AwaitName { command: Command },

    /// Waiting for the file frame
    AwaitFile { command: Command, name: StorageName },

    /// Waiting for the binary threshold
    AwaitThreshold {
        command: Command,
        upload: PendingFile,
    },

    /// Running the transform
    Processing {
        command: Command,
        upload: PendingFile,
        threshold: Option<i32>,
    },

    /// Sending the processed file
    SendResult {
        command: Command,
        result: PendingFile,
    },

    /// Terminal state
    Closed(CloseReason),
}

/// Why a session ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The processed file was delivered
    Completed,

    /// Unknown command; `ERR_CMD` was sent
    CommandRejected,

    /// Name length out of bounds; `ERR_N` was sent
    NameRejected,

    /// The transform failed; the command's error status was sent
    TransformFailed(SessionError),

    /// The session ended without a response
    Aborted(SessionError),
}

impl CloseReason {
    /// Returns true if the client received its result.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Errors that can end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Storage error at {path}: {error}")]
    Storage { path: PathBuf, error: String },

    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("No command runs the {0} transform")]
    Unsupported(TransformKind),
}

impl SessionError {
    pub(crate) fn storage(path: &Path, error: io::Error) -> Self {
        Self::Storage {
            path: path.to_path_buf(),
            error: error.to_string(),
        }
    }
}

fn aborted(error: impl Into<SessionError>) -> SessionState {
    SessionState::Closed(CloseReason::Aborted(error.into()))
}

/// Session for a single command profile client.
pub struct Session<R, W> {
    /// Framed connection, owned exclusively by this session
    connection: Connection<R, W>,

    /// Peer address, part of stored file names
    client: SocketAddr,

    /// Shared read-only state
    context: Arc<ServerContext>,

    /// Whether the connection has been shut down
    closed: bool,
}

impl Session<OwnedReadHalf, OwnedWriteHalf> {
    /// Creates a session over an accepted TCP stream.
    pub fn from_stream(stream: TcpStream, client: SocketAddr, context: Arc<ServerContext>) -> Self {
        let connection = Connection::from_stream(stream, context.config().idle_timeout());
        Self::new(connection, client, context)
    }
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a session over an existing connection.
    pub fn new(connection: Connection<R, W>, client: SocketAddr, context: Arc<ServerContext>) -> Self {
        Self {
            connection,
            client,
            context,
            closed: false,
        }
    }

    /// Runs the state machine to completion and closes the connection.
    pub async fn run(mut self) -> CloseReason {
        let mut state = SessionState::AwaitCommand;

        loop {
            state = match self.step(state).await {
                SessionState::Closed(reason) => {
                    self.close().await;
                    log_close(&reason);
                    return reason;
                }
                next => next,
            };
        }
    }

    /// Performs one transition.
    pub async fn step(&mut self, state: SessionState) -> SessionState {
        match state {
            SessionState::AwaitCommand => self.await_command().await,
            SessionState::AwaitName { command } => self.await_name(command).await,
            SessionState::AwaitFile { command, name } => self.await_file(command, name).await,
            SessionState::AwaitThreshold { command, upload } => {
                self.await_threshold(command, upload).await
            }
            SessionState::Processing {
                command,
                upload,
                threshold,
            } => self.process(command, upload, threshold).await,
            SessionState::SendResult { command, result } => {
                self.send_result(command, result).await
            }
            closed @ SessionState::Closed(_) => closed,
        }
    }

    /// Shuts down the connection. Calling it again is a no-op.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.connection.shutdown().await {
            debug!(error = %e, "Connection shutdown failed");
        }
    }

    /// Returns true once the connection was shut down.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    async fn await_command(&mut self) -> SessionState {
        let line = match self.connection.receive_line().await {
            Ok(line) => line,
            Err(e @ FrameError::LineTooLong { .. }) => {
                warn!(error = %e, "Oversized command line");
                String::new()
            }
            Err(e) => return aborted(e),
        };

        let Some(command) = self.context.commands().lookup(&line).cloned() else {
            warn!(keyword = %line, "Unknown command");
            let keywords = self.context.commands().keywords();
            return match self
                .connection
                .send_status_with_detail(Status::CommandRejected, &keywords)
                .await
            {
                Ok(()) => SessionState::Closed(CloseReason::CommandRejected),
                Err(e) => aborted(e),
            };
        };

        if let Err(e) = self.connection.send_status(Status::CommandAccepted).await {
            return aborted(e);
        }

        debug!(command = command.keyword(), "Command accepted");
        SessionState::AwaitName { command }
    }

    async fn await_name(&mut self, command: Command) -> SessionState {
        let parsed = match self.connection.receive_line().await {
            Ok(line) => StorageName::parse(&line),
            Err(e @ FrameError::LineTooLong { .. }) => {
                warn!(error = %e, "Oversized name line");
                StorageName::parse("")
            }
            Err(e) => return aborted(e),
        };

        match parsed {
            Ok(name) => {
                if let Err(e) = self.connection.send_status(Status::NameAccepted).await {
                    return aborted(e);
                }
                debug!(name = name.as_str(), "Name accepted");
                SessionState::AwaitFile { command, name }
            }
            Err(e) => {
                warn!(error = %e, "Name rejected");
                match self
                    .connection
                    .send_status_with_detail(Status::NameRejected, &StorageName::length_rule())
                    .await
                {
                    Ok(()) => SessionState::Closed(CloseReason::NameRejected),
                    Err(e) => aborted(e),
                }
            }
        }
    }

    async fn await_file(&mut self, command: Command, name: StorageName) -> SessionState {
        let stored = StoredFile::new(command.storage_dir(), &name, self.client, Local::now());
        let max_length = self.context.config().max_file_length;

        match receive_upload(&mut self.connection, stored.path(), max_length).await {
            Ok(upload) if command.transform().requires_threshold() => {
                SessionState::AwaitThreshold { command, upload }
            }
            Ok(upload) => SessionState::Processing {
                command,
                upload,
                threshold: None,
            },
            Err(e) => {
                warn!(error = %e, "Upload failed");
                aborted(e)
            }
        }
    }

    async fn await_threshold(&mut self, command: Command, upload: PendingFile) -> SessionState {
        match self.connection.receive_int().await {
            Ok(threshold) => SessionState::Processing {
                command,
                upload,
                threshold: Some(threshold),
            },
            Err(e) => {
                warn!(error = %e, "Threshold not received");
                aborted(e)
            }
        }
    }

    async fn process(
        &mut self,
        command: Command,
        upload: PendingFile,
        threshold: Option<i32>,
    ) -> SessionState {
        let transform = command.transform();

        match run_transform(self.context.processor(), transform, upload.path(), threshold).await {
            Ok(result) => {
                if self.context.config().keep_uploads {
                    let _ = upload.keep();
                }
                SessionState::SendResult { command, result }
            }
            Err(e) => {
                error!(error = %e, %transform, "Transform failed");
                drop(upload);
                self.report_failure(transform, e).await
            }
        }
    }

    async fn send_result(&mut self, command: Command, result: PendingFile) -> SessionState {
        let transform = command.transform();

        // Size the result before committing to a success status.
        let opened = async {
            let file = File::open(result.path()).await?;
            let length = file.metadata().await?.len();
            Ok::<_, io::Error>((file, length))
        }
        .await;

        let (mut file, length) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                let error = SessionError::storage(result.path(), e);
                error!(error = %error, "Processed file unreadable");
                drop(result);
                return self.report_failure(transform, error).await;
            }
        };

        if let Err(e) = self.connection.send_status(Status::success_for(transform)).await {
            return aborted(e);
        }

        let chunk_size = self.context.config().chunk_size;
        if let Err(e) = self.connection.send_file(&mut file, length, chunk_size).await {
            warn!(error = %e, "Result transfer failed");
            return aborted(e);
        }

        let path = result.keep();
        info!(result = %path.display(), length, "Result delivered");
        SessionState::Closed(CloseReason::Completed)
    }

    async fn report_failure(&mut self, transform: TransformKind, error: SessionError) -> SessionState {
        let detail = format!("Problem occurred while making {transform} image");
        match self
            .connection
            .send_status_with_detail(Status::failure_for(transform), &detail)
            .await
        {
            Ok(()) => SessionState::Closed(CloseReason::TransformFailed(error)),
            Err(e) => aborted(e),
        }
    }
}

fn log_close(reason: &CloseReason) {
    match reason {
        CloseReason::Completed => info!("Client served"),
        CloseReason::CommandRejected | CloseReason::NameRejected => {
            info!(reason = ?reason, "Client rejected")
        }
        CloseReason::TransformFailed(e) => warn!(error = %e, "Client sent an unprocessable image"),
        CloseReason::Aborted(SessionError::Frame(e)) if e.is_timeout() => {
            info!(error = %e, "Client timed out")
        }
        CloseReason::Aborted(e) => info!(error = %e, "Client disconnected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use imgsrv_core::{processed_path, CommandTable, ImageProcessor};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};

    type Half = Connection<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    /// Writes the input bytes reversed, so results are distinguishable.
    struct ReverseProcessor;

    impl ReverseProcessor {
        fn write(input: &Path, transform: TransformKind) -> Result<PathBuf, TransformError> {
            let mut bytes = std::fs::read(input).map_err(|e| TransformError::Read {
                path: input.to_path_buf(),
                reason: e.to_string(),
            })?;
            bytes.reverse();
            let output = processed_path(input, transform);
            std::fs::write(&output, bytes).map_err(|e| TransformError::Encode {
                path: output.clone(),
                reason: e.to_string(),
            })?;
            Ok(output)
        }
    }

    impl ImageProcessor for ReverseProcessor {
        fn grayscale(&self, input: &Path) -> Result<PathBuf, TransformError> {
            Self::write(input, TransformKind::Grayscale)
        }

        fn binary(&self, input: &Path, threshold: i32) -> Result<PathBuf, TransformError> {
            if !(0..=255).contains(&threshold) {
                return Err(TransformError::InvalidThreshold { threshold });
            }
            Self::write(input, TransformKind::Binary)
        }
    }

    /// Leaves a partial output behind and fails.
    struct FailingProcessor;

    impl ImageProcessor for FailingProcessor {
        fn grayscale(&self, input: &Path) -> Result<PathBuf, TransformError> {
            let _ = std::fs::write(processed_path(input, TransformKind::Grayscale), b"partial");
            Err(TransformError::Decode {
                path: input.to_path_buf(),
                reason: "bad image".to_string(),
            })
        }

        fn binary(&self, input: &Path, _threshold: i32) -> Result<PathBuf, TransformError> {
            Err(TransformError::Decode {
                path: input.to_path_buf(),
                reason: "bad image".to_string(),
            })
        }
    }

    struct Harness {
        session: Session<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>,
        client: Half,
        temp: TempDir,
    }

    fn harness_with(processor: Arc<dyn ImageProcessor>, config: ServerConfig) -> Harness {
        let temp = tempfile::tempdir().unwrap();
        let commands =
            CommandTable::standard(temp.path().join("gray"), temp.path().join("bin"));
        crate::storage::prepare_storage(&commands).unwrap();
        let context = Arc::new(ServerContext::with_commands(config, commands, processor));

        let (a, b) = duplex(256 * 1024);
        let (ar, aw) = split(a);
        let (br, bw) = split(b);
        let idle = Duration::from_secs(5);

        Harness {
            session: Session::new(
                Connection::new(ar, aw, idle),
                "127.0.0.1:40000".parse().unwrap(),
                context,
            ),
            client: Connection::new(br, bw, idle),
            temp,
        }
    }

    fn harness(processor: Arc<dyn ImageProcessor>) -> Harness {
        harness_with(processor, ServerConfig::default())
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }

    // ------------------------------------------------------------------------
    // AwaitCommand
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_known_commands_accepted() {
        for keyword in ["gs", "bin"] {
            let mut h = harness(Arc::new(ReverseProcessor));
            h.client.send_line(keyword).await.unwrap();

            let next = h.session.step(SessionState::AwaitCommand).await;

            assert!(
                matches!(&next, SessionState::AwaitName { command } if command.keyword() == keyword)
            );
            assert_eq!(h.client.receive_status().await.unwrap(), Status::CommandAccepted);
        }
    }

    #[tokio::test]
    async fn test_unknown_commands_rejected() {
        for keyword in ["xyz", "", "GS", "gs "] {
            let mut h = harness(Arc::new(ReverseProcessor));
            h.client.send_line(keyword).await.unwrap();

            let next = h.session.step(SessionState::AwaitCommand).await;

            assert!(matches!(
                next,
                SessionState::Closed(CloseReason::CommandRejected)
            ));
            assert_eq!(h.client.receive_status().await.unwrap(), Status::CommandRejected);
            assert_eq!(h.client.receive_line().await.unwrap(), "gs, bin");
        }
    }

    #[tokio::test]
    async fn test_peer_gone_before_command() {
        let mut h = harness(Arc::new(ReverseProcessor));
        h.client.shutdown().await.unwrap();

        let next = h.session.step(SessionState::AwaitCommand).await;

        assert!(matches!(
            next,
            SessionState::Closed(CloseReason::Aborted(SessionError::Frame(
                FrameError::EndOfStream
            )))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_idle_timeout() {
        let mut h = harness(Arc::new(ReverseProcessor));

        let next = h.session.step(SessionState::AwaitCommand).await;

        assert!(matches!(
            next,
            SessionState::Closed(CloseReason::Aborted(SessionError::Frame(FrameError::Timeout)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_after_command_times_out() {
        let h = harness(Arc::new(ReverseProcessor));
        let (session, mut client) = (h.session, h.client);
        let server = tokio::spawn(session.run());

        client.send_line("gs").await.unwrap();
        assert_eq!(client.receive_status().await.unwrap(), Status::CommandAccepted);

        let reason = server.await.unwrap();
        assert!(matches!(
            reason,
            CloseReason::Aborted(SessionError::Frame(FrameError::Timeout))
        ));
        assert!(matches!(
            client.receive_line().await,
            Err(FrameError::EndOfStream)
        ));
    }

    // ------------------------------------------------------------------------
    // AwaitName
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_name_length_bounds() {
        for length in 0..=12 {
            let mut h = harness(Arc::new(ReverseProcessor));
            let command = CommandTable::default().lookup("gs").unwrap().clone();
            h.client.send_line(&"n".repeat(length)).await.unwrap();

            let next = h.session.step(SessionState::AwaitName { command }).await;
            let status = h.client.receive_status().await.unwrap();

            if (3..=10).contains(&length) {
                assert_eq!(status, Status::NameAccepted, "length {length}");
                assert!(matches!(next, SessionState::AwaitFile { .. }));
            } else {
                assert_eq!(status, Status::NameRejected, "length {length}");
                assert!(h.client.receive_line().await.unwrap().contains("10"));
                assert!(matches!(next, SessionState::Closed(CloseReason::NameRejected)));
            }
        }
    }

    // ------------------------------------------------------------------------
    // Full runs
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_grayscale_run() {
        let h = harness(Arc::new(ReverseProcessor));
        let (session, mut client, temp) = (h.session, h.client, h.temp);
        let server = tokio::spawn(session.run());

        let image: Vec<u8> = (0..12_345u32).map(|i| (i % 256) as u8).collect();
        client.send_line("gs").await.unwrap();
        assert_eq!(client.receive_status().await.unwrap(), Status::CommandAccepted);
        client.send_line("abcdef").await.unwrap();
        assert_eq!(client.receive_status().await.unwrap(), Status::NameAccepted);
        client.send_bytes(&image, 1024).await.unwrap();
        assert_eq!(client.receive_status().await.unwrap(), Status::GrayscaleDone);

        let mut result = Vec::new();
        let length = client.receive_file(u64::MAX, &mut result).await.unwrap();

        let mut expected = image.clone();
        expected.reverse();
        assert_eq!(length, 12_345);
        assert_eq!(result, expected);
        assert!(server.await.unwrap().is_completed());

        // Upload removed, processed result kept.
        let files = files_in(&temp.path().join("gray"));
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("abc_127.0.0.1_40000_"), "{name}");
        assert!(name.ends_with("-gs.png"), "{name}");
    }

    #[tokio::test]
    async fn test_binary_run_with_threshold() {
        let h = harness(Arc::new(ReverseProcessor));
        let (session, mut client, _temp) = (h.session, h.client, h.temp);
        let server = tokio::spawn(session.run());

        client.send_line("bin").await.unwrap();
        assert_eq!(client.receive_status().await.unwrap(), Status::CommandAccepted);
        client.send_line("xyz").await.unwrap();
        assert_eq!(client.receive_status().await.unwrap(), Status::NameAccepted);
        client.send_bytes(&[1, 2, 3], 1024).await.unwrap();
        client.send_int(128).await.unwrap();

        assert_eq!(client.receive_status().await.unwrap(), Status::BinaryDone);
        let mut result = Vec::new();
        client.receive_file(u64::MAX, &mut result).await.unwrap();
        assert_eq!(result, vec![3, 2, 1]);
        assert!(server.await.unwrap().is_completed());
    }

    #[tokio::test]
    async fn test_keep_uploads() {
        let config = ServerConfig {
            keep_uploads: true,
            ..Default::default()
        };
        let h = harness_with(Arc::new(ReverseProcessor), config);
        let (session, mut client, temp) = (h.session, h.client, h.temp);
        let server = tokio::spawn(session.run());

        client.send_line("gs").await.unwrap();
        client.send_line("abc").await.unwrap();
        client.send_bytes(&[9; 10], 4).await.unwrap();
        assert_eq!(client.receive_status().await.unwrap(), Status::CommandAccepted);
        assert_eq!(client.receive_status().await.unwrap(), Status::NameAccepted);
        assert_eq!(client.receive_status().await.unwrap(), Status::GrayscaleDone);
        let mut result = Vec::new();
        client.receive_file(u64::MAX, &mut result).await.unwrap();
        assert!(server.await.unwrap().is_completed());

        assert_eq!(files_in(&temp.path().join("gray")).len(), 2);
    }

    #[tokio::test]
    async fn test_transform_failure_cleans_up() {
        let h = harness(Arc::new(FailingProcessor));
        let (session, mut client, temp) = (h.session, h.client, h.temp);
        let server = tokio::spawn(session.run());

        client.send_line("gs").await.unwrap();
        client.send_line("abc").await.unwrap();
        client.send_bytes(b"not an image", 1024).await.unwrap();

        assert_eq!(client.receive_status().await.unwrap(), Status::CommandAccepted);
        assert_eq!(client.receive_status().await.unwrap(), Status::NameAccepted);
        assert_eq!(client.receive_status().await.unwrap(), Status::GrayscaleFailed);
        assert!(client.receive_line().await.unwrap().contains("grayscale"));
        // Nothing after the detail line
        assert!(matches!(
            client.receive_line().await,
            Err(FrameError::EndOfStream)
        ));

        assert!(matches!(
            server.await.unwrap(),
            CloseReason::TransformFailed(SessionError::Transform(_))
        ));
        assert!(files_in(&temp.path().join("gray")).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_threshold_reports_binary_error() {
        let h = harness(Arc::new(ReverseProcessor));
        let (session, mut client, temp) = (h.session, h.client, h.temp);
        let server = tokio::spawn(session.run());

        client.send_line("bin").await.unwrap();
        client.send_line("abc").await.unwrap();
        client.send_bytes(&[1, 2, 3], 1024).await.unwrap();
        client.send_int(999).await.unwrap();

        assert_eq!(client.receive_status().await.unwrap(), Status::CommandAccepted);
        assert_eq!(client.receive_status().await.unwrap(), Status::NameAccepted);
        assert_eq!(client.receive_status().await.unwrap(), Status::BinaryFailed);
        assert!(!server.await.unwrap().is_completed());
        assert!(files_in(&temp.path().join("bin")).is_empty());
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected_without_file() {
        let config = ServerConfig {
            max_file_length: 16,
            ..Default::default()
        };
        let h = harness_with(Arc::new(ReverseProcessor), config);
        let (session, mut client, temp) = (h.session, h.client, h.temp);
        let server = tokio::spawn(session.run());

        client.send_line("gs").await.unwrap();
        client.send_line("abc").await.unwrap();
        client.send_bytes(&[0; 17], 1024).await.unwrap();

        assert_eq!(client.receive_status().await.unwrap(), Status::CommandAccepted);
        assert_eq!(client.receive_status().await.unwrap(), Status::NameAccepted);
        assert!(matches!(
            client.receive_line().await,
            Err(FrameError::EndOfStream)
        ));
        assert!(matches!(
            server.await.unwrap(),
            CloseReason::Aborted(SessionError::Frame(FrameError::FileTooLarge {
                length: 17,
                max: 16
            }))
        ));
        assert!(files_in(&temp.path().join("gray")).is_empty());
    }

    #[tokio::test]
    async fn test_truncated_upload_removed() {
        let h = harness(Arc::new(ReverseProcessor));
        let (session, mut client, temp) = (h.session, h.client, h.temp);
        let server = tokio::spawn(session.run());

        client.send_line("gs").await.unwrap();
        client.send_line("abc").await.unwrap();
        assert_eq!(client.receive_status().await.unwrap(), Status::CommandAccepted);
        assert_eq!(client.receive_status().await.unwrap(), Status::NameAccepted);

        // Announce 100 bytes, send 10, hang up.
        let short = [7u8; 10];
        let sent = client.send_file(&mut &short[..], 100, 1024).await;
        assert!(matches!(sent, Err(FrameError::Truncated { received: 10, .. })));
        client.shutdown().await.unwrap();

        assert!(matches!(
            server.await.unwrap(),
            CloseReason::Aborted(SessionError::Frame(FrameError::Truncated { .. }))
        ));
        assert!(files_in(&temp.path().join("gray")).is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut h = harness(Arc::new(ReverseProcessor));
        assert!(!h.session.is_closed());

        h.session.close().await;
        h.session.close().await;

        assert!(h.session.is_closed());
        assert!(matches!(
            h.client.receive_line().await,
            Err(FrameError::EndOfStream)
        ));
    }

    #[tokio::test]
    async fn test_closed_state_is_terminal() {
        let mut h = harness(Arc::new(ReverseProcessor));
        let next = h
            .session
            .step(SessionState::Closed(CloseReason::Completed))
            .await;
        assert!(matches!(next, SessionState::Closed(CloseReason::Completed)));
    }
}
