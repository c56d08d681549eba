//! Storage directories and scoped artifact cleanup.
//!
//! `PendingFile` owns a path on disk and removes it when dropped, unless
//! it was explicitly kept. Sessions hold one for every artifact they
//! create, so every early return or error path cleans up after itself.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use imgsrv_core::CommandTable;

/// Creates every storage directory named by the command table.
///
/// Returns the first directory that could not be created.
pub fn prepare_storage(commands: &CommandTable) -> Result<(), (PathBuf, io::Error)> {
    for dir in commands.storage_dirs() {
        fs::create_dir_all(dir).map_err(|e| (dir.to_path_buf(), e))?;
        debug!(dir = %dir.display(), "Storage directory ready");
    }
    Ok(())
}

/// A file that is deleted on drop unless kept.
#[derive(Debug)]
pub struct PendingFile {
    path: PathBuf,
    keep: bool,
}

impl PendingFile {
    /// Takes responsibility for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: false,
        }
    }

    /// Returns the guarded path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keeps the file on disk and returns its path.
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        // Blocking unlink on the current thread: one small file per artifact.
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove artifact"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_storage_creates_nested_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let gray = temp.path().join("a/b/gray");
        let bin = temp.path().join("bin");

        prepare_storage(&CommandTable::standard(&gray, &bin)).unwrap();

        assert!(gray.is_dir());
        assert!(bin.is_dir());
    }

    #[test]
    fn test_prepare_storage_reports_failing_dir() {
        let temp = tempfile::tempdir().unwrap();
        let blocker = temp.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let gray = blocker.join("gray");

        let (path, _) = prepare_storage(&CommandTable::standard(&gray, temp.path())).unwrap_err();
        assert_eq!(path, gray);
    }

    #[test]
    fn test_pending_file_removed_on_drop() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("upload.png");
        fs::write(&path, b"data").unwrap();

        drop(PendingFile::new(&path));
        assert!(!path.exists());
    }

    #[test]
    fn test_pending_file_kept() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("result.png");
        fs::write(&path, b"data").unwrap();

        let kept = PendingFile::new(&path).keep();
        assert_eq!(kept, path);
        assert!(path.exists());
    }

    #[test]
    fn test_pending_file_missing_is_quiet() {
        let temp = tempfile::tempdir().unwrap();
        drop(PendingFile::new(temp.path().join("never-created.png")));
    }
}
