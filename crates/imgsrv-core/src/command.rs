//! Command table: keyword → storage directory + transform.
//!
//! The table is built once at startup and never mutated afterwards, so it
//! can be shared by every session without locking. Lookup is exact,
//! case-sensitive string equality.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{DomainError, DomainResult};

/// Keyword selecting the grayscale transform.
pub const GRAYSCALE_KEYWORD: &str = "gs";

/// Keyword selecting the binary threshold transform.
pub const BINARY_KEYWORD: &str = "bin";

/// Which pixel transform a command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    /// Luma conversion, no parameter.
    Grayscale,
    /// Luma threshold; the client sends the threshold after the file.
    Binary,
}

impl TransformKind {
    /// Returns true if the client must send a threshold after the file.
    pub fn requires_threshold(self) -> bool {
        matches!(self, Self::Binary)
    }

    /// Suffix appended to the stem of a processed file.
    pub fn output_suffix(self) -> &'static str {
        match self {
            Self::Grayscale => "gs",
            Self::Binary => "bin",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grayscale => write!(f, "grayscale"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// A single table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    keyword: String,
    storage_dir: PathBuf,
    transform: TransformKind,
}

impl Command {
    /// Creates a new command entry.
    pub fn new(
        keyword: impl Into<String>,
        storage_dir: impl Into<PathBuf>,
        transform: TransformKind,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            storage_dir: storage_dir.into(),
            transform,
        }
    }

    /// Returns the keyword the client sends.
    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// Returns the directory uploads for this command are stored in.
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Returns the transform this command runs.
    pub fn transform(&self) -> TransformKind {
        self.transform
    }
}

/// Immutable keyword table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTable {
    commands: Vec<Command>,
}

impl CommandTable {
    /// Builds a table from a list of entries.
    ///
    /// Rejects empty and duplicate keywords.
    pub fn new(commands: impl IntoIterator<Item = Command>) -> DomainResult<Self> {
        let mut table: Vec<Command> = Vec::new();

        for command in commands {
            if command.keyword.is_empty() {
                return Err(DomainError::EmptyKeyword);
            }
            if table.iter().any(|c| c.keyword == command.keyword) {
                return Err(DomainError::DuplicateKeyword {
                    keyword: command.keyword,
                });
            }
            table.push(command);
        }

        Ok(Self { commands: table })
    }

    /// Builds the standard `gs`/`bin` table over the given directories.
    pub fn standard(grayscale_dir: impl Into<PathBuf>, binary_dir: impl Into<PathBuf>) -> Self {
        Self {
            commands: vec![
                Command::new(GRAYSCALE_KEYWORD, grayscale_dir, TransformKind::Grayscale),
                Command::new(BINARY_KEYWORD, binary_dir, TransformKind::Binary),
            ],
        }
    }

    /// Looks up a command by its exact keyword.
    pub fn lookup(&self, keyword: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.keyword == keyword)
    }

    /// Returns the first command running the given transform.
    pub fn find_by_transform(&self, transform: TransformKind) -> Option<&Command> {
        self.commands.iter().find(|c| c.transform == transform)
    }

    /// Comma-separated keyword list, sent as the `ERR_CMD` detail line.
    pub fn keywords(&self) -> String {
        self.commands
            .iter()
            .map(|c| c.keyword.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Iterates over all entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    /// Iterates over the storage directories that must exist before serving.
    pub fn storage_dirs(&self) -> impl Iterator<Item = &Path> {
        self.commands.iter().map(|c| c.storage_dir())
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::standard("grayscale_images", "binary_images")
    }
}
