//! Request client for imgsrvd.
//!
//! Every request opens its own TCP connection, walks the protocol to the
//! end and closes it; the server serves exactly one request per
//! connection.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use imgsrv_protocol::{Ack, Connection, Status, TcpConnection, DEFAULT_CHUNK_SIZE};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the image client.
///
/// # Example
///
/// ```rust
/// use imgsrv_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     idle_timeout: Duration::from_secs(60),
///     ..ClientConfig::new("127.0.0.1:8080".parse().unwrap())
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address.
    pub addr: SocketAddr,

    /// Upper bound on connecting, on every wait for the server and on
    /// every write.
    pub idle_timeout: Duration,

    /// Chunk size used when uploading.
    pub chunk_size: usize,

    /// Largest result file accepted from the server.
    pub max_file_length: u64,
}

impl ClientConfig {
    /// Creates a configuration with default limits for `addr`.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            idle_timeout: Duration::from_secs(30),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_file_length: 256 * 1024 * 1024,
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// One command profile request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// Command keyword (`gs`, `bin`)
    pub keyword: String,

    /// Name the server derives the stored file name from
    pub name: String,

    /// Encoded image bytes
    pub image: Vec<u8>,

    /// Threshold sent after the image, for commands that need one
    pub threshold: Option<i32>,
}

impl ImageRequest {
    /// Grayscale conversion request.
    pub fn grayscale(name: impl Into<String>, image: Vec<u8>) -> Self {
        Self {
            keyword: "gs".to_string(),
            name: name.into(),
            image,
            threshold: None,
        }
    }

    /// Binary threshold request.
    pub fn binary(name: impl Into<String>, image: Vec<u8>, threshold: i32) -> Self {
        Self {
            keyword: "bin".to_string(),
            name: name.into(),
            image,
            threshold: Some(threshold),
        }
    }

    /// Status that precedes the result for this keyword, if it is a known one.
    fn expected_success(&self) -> Option<Status> {
        match self.keyword.as_str() {
            "gs" => Some(Status::GrayscaleDone),
            "bin" => Some(Status::BinaryDone),
            _ => None,
        }
    }
}

// ============================================================================
// Image Client
// ============================================================================

/// Client for an imgsrvd instance.
///
/// # Example
///
/// ```rust,ignore
/// use imgsrv_client::{ClientConfig, ImageClient, ImageRequest};
///
/// let client = ImageClient::new(ClientConfig::new("127.0.0.1:8080".parse()?));
/// let bytes = std::fs::read("photo.jpeg")?;
/// let result = client.process(ImageRequest::binary("photo", bytes, 128)).await?;
/// std::fs::write("photo-bin.png", result)?;
/// ```
#[derive(Debug, Clone)]
pub struct ImageClient {
    config: ClientConfig,
}

impl ImageClient {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Runs a command profile request and returns the processed file.
    ///
    /// # Errors
    ///
    /// `ClientError::Rejected` when the server answers with an error status
    /// (unknown command, bad name, failed transform). Any transport failure
    /// is returned as is.
    pub async fn process(&self, request: ImageRequest) -> Result<Vec<u8>> {
        let mut connection = self.connect().await?;
        let result = self.process_on(&mut connection, &request).await;
        let _ = connection.shutdown().await;
        result
    }

    /// Runs a command profile request over an existing connection.
    pub async fn process_on<R, W>(
        &self,
        connection: &mut Connection<R, W>,
        request: &ImageRequest,
    ) -> Result<Vec<u8>>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        connection.send_line(&request.keyword).await?;
        expect_status(connection, Status::CommandAccepted).await?;

        connection.send_line(&request.name).await?;
        expect_status(connection, Status::NameAccepted).await?;

        connection
            .send_bytes(&request.image, self.config.chunk_size)
            .await?;
        if let Some(threshold) = request.threshold {
            connection.send_int(threshold).await?;
        }
        debug!(
            keyword = %request.keyword,
            length = request.image.len(),
            "Image uploaded"
        );

        let status = connection.receive_status().await?;
        let expected = request.expected_success();
        match status {
            other if !other.is_success() => return Err(rejection(connection, other).await),
            done if expected.map_or(is_result_status(done), |e| e == done) => {}
            other => {
                return Err(ClientError::UnexpectedStatus {
                    expected: expected.unwrap_or(Status::GrayscaleDone),
                    actual: other,
                })
            }
        }

        let mut result = Vec::new();
        let length = connection
            .receive_file(self.config.max_file_length, &mut result)
            .await?;

        info!(status = %status, length, "Processed image received");
        Ok(result)
    }

    /// Uploads one image to a byte-ack server.
    ///
    /// Returns whether the server reported a successful conversion.
    pub async fn upload_with_ack(&self, image: &[u8]) -> Result<bool> {
        let mut connection = self.connect().await?;
        let result = self.upload_with_ack_on(&mut connection, image).await;
        let _ = connection.shutdown().await;
        result
    }

    /// Byte-ack upload over an existing connection.
    pub async fn upload_with_ack_on<R, W>(
        &self,
        connection: &mut Connection<R, W>,
        image: &[u8],
    ) -> Result<bool>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        connection.send_bytes(image, self.config.chunk_size).await?;
        let ack = connection.receive_ack().await?;
        debug!(ack = ?ack, "Acknowledgement received");
        Ok(ack == Ack::Success)
    }

    async fn connect(&self) -> Result<TcpConnection> {
        let addr = self.config.addr;
        let connect_error = |error: String| ClientError::Connect { addr, error };

        let stream = timeout(self.config.idle_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| connect_error("timed out".to_string()))?
            .map_err(|e| connect_error(e.to_string()))?;

        debug!(addr = %addr, "Connected");
        Ok(Connection::from_stream(stream, self.config.idle_timeout)
            .with_write_timeout(self.config.idle_timeout))
    }
}

/// Reads the next status and fails unless it is `expected`.
async fn expect_status<R, W>(connection: &mut Connection<R, W>, expected: Status) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let actual = connection.receive_status().await?;
    if actual == expected {
        Ok(())
    } else if !actual.is_success() {
        Err(rejection(connection, actual).await)
    } else {
        Err(ClientError::UnexpectedStatus { expected, actual })
    }
}

fn is_result_status(status: Status) -> bool {
    matches!(status, Status::GrayscaleDone | Status::BinaryDone)
}

/// Builds a `Rejected` error, reading the detail line if one follows.
async fn rejection<R, W>(connection: &mut Connection<R, W>, status: Status) -> ClientError
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let detail = if status.has_detail() {
        match connection.receive_line().await {
            Ok(detail) => detail,
            Err(e) => return e.into(),
        }
    } else {
        String::new()
    };
    ClientError::Rejected { status, detail }
}

// ============================================================================
// Tests
// ============================================================================
