//! Upload and transform steps shared by both protocol profiles.

use std::path::Path;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use imgsrv_core::{processed_path, ImageProcessor, TransformError, TransformKind};
use imgsrv_protocol::Connection;

use super::session::SessionError;
use crate::storage::PendingFile;

/// Receives one file frame into `path`.
///
/// The length header is checked against `max_length` before the file is
/// created, so an oversized announcement never touches the disk. A failed
/// transfer leaves no file behind.
pub(crate) async fn receive_upload<R, W>(
    connection: &mut Connection<R, W>,
    path: &Path,
    max_length: u64,
) -> Result<PendingFile, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let length = connection.receive_file_length(max_length).await?;

    let mut file = File::create(path)
        .await
        .map_err(|e| SessionError::storage(path, e))?;
    let upload = PendingFile::new(path);

    connection.receive_payload(length, &mut file).await?;

    debug!(path = %path.display(), length, "Upload stored");
    Ok(upload)
}

/// Runs a transform on a blocking thread.
///
/// Any partial output is removed if the transform fails.
pub(crate) async fn run_transform(
    processor: Arc<dyn ImageProcessor>,
    transform: TransformKind,
    input: &Path,
    threshold: Option<i32>,
) -> Result<PendingFile, SessionError> {
    let leftover = PendingFile::new(processed_path(input, transform));
    let input = input.to_path_buf();

    let outcome = tokio::task::spawn_blocking(move || processor.apply(transform, &input, threshold))
        .await
        .unwrap_or_else(|e| Err(TransformError::Task(e.to_string())));

    match outcome {
        Ok(output) => {
            let _ = leftover.keep();
            Ok(PendingFile::new(output))
        }
        Err(e) => Err(SessionError::Transform(e)),
    }
}
