//! Frame codec over a byte stream.
//!
//! `Connection` is the only place that touches raw socket framing. It
//! carries two kinds of items on the same stream:
//!
//! - text lines terminated by `\n` (a trailing `\r` is stripped on receive)
//! - files, framed as an 8-byte big-endian `u64` length followed by exactly
//!   that many payload bytes
//!
//! Reads and writes share one buffered reader and one buffered writer, so
//! lines and binary frames can be freely interleaved.
//!
//! # Timeouts
//!
//! Every blocking read is bounded by the idle timeout; a file payload is
//! read chunk by chunk, each chunk with its own idle window. Writes are
//! bounded by a separate write timeout.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use crate::error::{FrameError, FrameResult};
use crate::status::{Ack, Status};

/// Default chunk size for sending files.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Longest accepted text line, excluding the delimiter.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Buffer size used while receiving a file payload.
const RECEIVE_BUFFER_SIZE: usize = 8 * 1024;

/// Default write timeout (10 seconds)
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection over a split TCP stream.
pub type TcpConnection = Connection<OwnedReadHalf, OwnedWriteHalf>;

/// Framed, timed reader/writer pair for one peer.
pub struct Connection<R, W> {
    /// Buffered reader for incoming lines and frames
    reader: BufReader<R>,

    /// Buffered writer for outgoing lines and frames
    writer: BufWriter<W>,

    /// Bound on every blocking read
    idle_timeout: Duration,

    /// Bound on every write
    write_timeout: Duration,
}

impl TcpConnection {
    /// Splits a TCP stream into a framed connection.
    pub fn from_stream(stream: TcpStream, idle_timeout: Duration) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer, idle_timeout)
    }
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a connection with the given idle timeout.
    pub fn new(reader: R, writer: W, idle_timeout: Duration) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            idle_timeout,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Overrides the write timeout.
    #[must_use]
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Returns the idle timeout.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    // ------------------------------------------------------------------------
    // Lines
    // ------------------------------------------------------------------------

    /// Writes `text` followed by the line delimiter and flushes.
    pub async fn send_line(&mut self, text: &str) -> FrameResult<()> {
        self.write_timed(text.as_bytes()).await?;
        self.write_timed(b"\n").await?;
        self.flush().await?;
        trace!(line = text, "Sent line");
        Ok(())
    }

    /// Sends a status line.
    pub async fn send_status(&mut self, status: Status) -> FrameResult<()> {
        self.send_line(status.as_str()).await
    }

    /// Sends a status line followed by its detail line.
    pub async fn send_status_with_detail(
        &mut self,
        status: Status,
        detail: &str,
    ) -> FrameResult<()> {
        self.send_line(status.as_str()).await?;
        self.send_line(detail).await
    }

    /// Reads one line and returns it without the delimiter.
    ///
    /// A line cut short by the peer closing the connection is returned as
    /// is; `EndOfStream` is only reported if no byte arrived at all.
    pub async fn receive_line(&mut self) -> FrameResult<String> {
        let limit = self.idle_timeout;
        let mut buf = Vec::new();

        let mut bounded = (&mut self.reader).take(MAX_LINE_LENGTH as u64 + 1);
        let read = with_idle_timeout(limit, bounded.read_until(b'\n', &mut buf)).await?;

        if read == 0 {
            return Err(FrameError::EndOfStream);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        } else if buf.len() > MAX_LINE_LENGTH {
            return Err(FrameError::LineTooLong {
                max: MAX_LINE_LENGTH,
            });
        }

        let line = String::from_utf8_lossy(&buf).into_owned();
        trace!(line = %line, "Received line");
        Ok(line)
    }

    /// Reads a status line.
    pub async fn receive_status(&mut self) -> FrameResult<Status> {
        self.receive_line().await?.parse()
    }

    // ------------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------------

    /// Sends an in-memory file in chunks of at most `chunk_size` bytes.
    pub async fn send_bytes(&mut self, bytes: &[u8], chunk_size: usize) -> FrameResult<()> {
        self.write_timed(&(bytes.len() as u64).to_be_bytes()).await?;
        for chunk in bytes.chunks(chunk_size.max(1)) {
            self.write_timed(chunk).await?;
        }
        self.flush().await
    }

    /// Streams `length` bytes from `source` as one file frame.
    ///
    /// Fails with `Truncated` if `source` ends before `length` bytes.
    pub async fn send_file<S>(
        &mut self,
        source: &mut S,
        length: u64,
        chunk_size: usize,
    ) -> FrameResult<()>
    where
        S: AsyncRead + Unpin,
    {
        self.write_timed(&length.to_be_bytes()).await?;

        let mut buf = vec![0u8; chunk_size.max(1)];
        let mut sent: u64 = 0;
        while sent < length {
            let want = (length - sent).min(buf.len() as u64);
            let n = (&mut *source).take(want).read(&mut buf).await?;
            if n == 0 {
                return Err(FrameError::Truncated {
                    received: sent,
                    expected: length,
                });
            }
            self.write_timed(&buf[..n]).await?;
            sent += n as u64;
        }

        self.flush().await?;
        trace!(length, "Sent file");
        Ok(())
    }

    /// Reads the length header of a file frame.
    ///
    /// A length above `max_length` is rejected before any payload byte is
    /// consumed.
    pub async fn receive_file_length(&mut self, max_length: u64) -> FrameResult<u64> {
        let limit = self.idle_timeout;
        let length = with_idle_timeout(limit, self.reader.read_u64()).await?;

        if length > max_length {
            return Err(FrameError::FileTooLarge {
                length,
                max: max_length,
            });
        }
        Ok(length)
    }

    /// Reads exactly `length` payload bytes into `dest` as they arrive.
    pub async fn receive_payload<D>(&mut self, length: u64, dest: &mut D) -> FrameResult<()>
    where
        D: AsyncWrite + Unpin,
    {
        let limit = self.idle_timeout;
        let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
        let mut received: u64 = 0;

        while received < length {
            let want = (length - received).min(buf.len() as u64);
            let n = with_idle_timeout(limit, (&mut self.reader).take(want).read(&mut buf)).await?;
            if n == 0 {
                return Err(FrameError::Truncated {
                    received,
                    expected: length,
                });
            }
            dest.write_all(&buf[..n]).await?;
            received += n as u64;
        }

        dest.flush().await?;
        trace!(length, "Received file");
        Ok(())
    }

    /// Reads a complete file frame into `dest`, returning its length.
    pub async fn receive_file<D>(&mut self, max_length: u64, dest: &mut D) -> FrameResult<u64>
    where
        D: AsyncWrite + Unpin,
    {
        let length = self.receive_file_length(max_length).await?;
        self.receive_payload(length, dest).await?;
        Ok(length)
    }

    // ------------------------------------------------------------------------
    // Scalars
    // ------------------------------------------------------------------------

    /// Reads a big-endian `i32`.
    pub async fn receive_int(&mut self) -> FrameResult<i32> {
        let limit = self.idle_timeout;
        with_idle_timeout(limit, self.reader.read_i32()).await
    }

    /// Writes a big-endian `i32` and flushes.
    pub async fn send_int(&mut self, value: i32) -> FrameResult<()> {
        self.write_timed(&value.to_be_bytes()).await?;
        self.flush().await
    }

    /// Writes a byte-ack reply and flushes.
    pub async fn send_ack(&mut self, ack: Ack) -> FrameResult<()> {
        self.write_timed(&[ack.as_byte()]).await?;
        self.flush().await
    }

    /// Reads a byte-ack reply.
    pub async fn receive_ack(&mut self) -> FrameResult<Ack> {
        let limit = self.idle_timeout;
        let byte = with_idle_timeout(limit, self.reader.read_u8()).await?;
        Ack::from_byte(byte)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Flushes buffered output and shuts down the write side.
    pub async fn shutdown(&mut self) -> FrameResult<()> {
        self.flush().await?;
        let limit = self.write_timeout;
        match timeout(limit, self.writer.shutdown()).await {
            Ok(result) => result.map_err(FrameError::from),
            Err(_) => Err(FrameError::WriteTimeout),
        }
    }

    async fn write_timed(&mut self, bytes: &[u8]) -> FrameResult<()> {
        let limit = self.write_timeout;
        match timeout(limit, self.writer.write_all(bytes)).await {
            Ok(result) => result.map_err(FrameError::from),
            Err(_) => Err(FrameError::WriteTimeout),
        }
    }

    async fn flush(&mut self) -> FrameResult<()> {
        let limit = self.write_timeout;
        match timeout(limit, self.writer.flush()).await {
            Ok(result) => result.map_err(FrameError::from),
            Err(_) => Err(FrameError::WriteTimeout),
        }
    }
}

/// Runs a read under the idle window, mapping a clean EOF to `EndOfStream`.
async fn with_idle_timeout<T, F>(limit: Duration, read: F) -> FrameResult<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout(limit, read).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FrameError::EndOfStream),
        Ok(Err(e)) => Err(FrameError::Transport(e)),
        Err(_) => Err(FrameError::Timeout),
    }
}
