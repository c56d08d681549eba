//! Negotiated names and on-disk artifact paths.
//!
//! An upload is stored as `{prefix}_{ip}_{port}_{timestamp}.png` inside the
//! command's storage directory, where `prefix` is the first three characters
//! of the name the client negotiated. Address, port and a nanosecond
//! timestamp make collisions between concurrent clients practically
//! impossible.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::command::TransformKind;
use crate::error::{DomainError, DomainResult};

/// Shortest accepted name, in characters.
pub const MIN_NAME_LENGTH: usize = 3;

/// Longest accepted name, in characters.
pub const MAX_NAME_LENGTH: usize = 10;

/// Number of name characters that end up in the file name.
const PREFIX_LENGTH: usize = 3;

/// Extension of every stored and processed file.
const EXTENSION: &str = "png";

const TIMESTAMP_FORMAT: &str = "%d-%m-%Y_%H-%M-%S-%f";

/// A name that passed length validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageName {
    name: String,
    prefix: String,
}

impl StorageName {
    /// Validates a client-supplied name.
    ///
    /// Length is counted in characters and must be within
    /// `MIN_NAME_LENGTH..=MAX_NAME_LENGTH`.
    pub fn parse(name: &str) -> DomainResult<Self> {
        let length = name.chars().count();
        if !(MIN_NAME_LENGTH..=MAX_NAME_LENGTH).contains(&length) {
            return Err(DomainError::InvalidNameLength {
                length,
                min: MIN_NAME_LENGTH,
                max: MAX_NAME_LENGTH,
            });
        }

        // Path separators and dots must not reach the file system.
        let prefix = name
            .chars()
            .take(PREFIX_LENGTH)
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        Ok(Self {
            name: name.to_string(),
            prefix,
        })
    }

    /// The name as the client sent it.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The file-system-safe three character prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Human-readable explanation of the bound, sent as the `ERR_N` detail line.
    pub fn length_rule() -> String {
        format!(
            "Length of name must be between {MIN_NAME_LENGTH} and {MAX_NAME_LENGTH} characters"
        )
    }
}

/// Path of an uploaded file before processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    path: PathBuf,
}

impl StoredFile {
    /// Derives the path for a named upload.
    pub fn new(dir: &Path, name: &StorageName, client: SocketAddr, at: DateTime<Local>) -> Self {
        let file_name = format!(
            "{}_{}.{EXTENSION}",
            name.prefix(),
            client_stamp(client, at)
        );
        Self {
            path: dir.join(file_name),
        }
    }

    /// Derives the path for an upload without a negotiated name.
    pub fn unnamed(dir: &Path, client: SocketAddr, at: DateTime<Local>) -> Self {
        let file_name = format!("{}.{EXTENSION}", client_stamp(client, at));
        Self {
            path: dir.join(file_name),
        }
    }

    /// Returns the upload path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `{dir}/{stem}-{suffix}.png` for a given input path.
pub fn processed_path(input: &Path, transform: TransformKind) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!("{stem}-{}.{EXTENSION}", transform.output_suffix());

    match input.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

fn client_stamp(client: SocketAddr, at: DateTime<Local>) -> String {
    format!(
        "{}_{}_{}",
        client.ip(),
        client.port(),
        at.format(TIMESTAMP_FORMAT)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 7, 14, 5, 9)
            .single()
            .unwrap()
    }

    #[test]
    fn test_name_length_bounds() {
        for n in 0..=14 {
            let name = "a".repeat(n);
            let result = StorageName::parse(&name);
            if (MIN_NAME_LENGTH..=MAX_NAME_LENGTH).contains(&n) {
                assert!(result.is_ok(), "length {n} should be accepted");
            } else {
                assert_eq!(
                    result.unwrap_err(),
                    DomainError::InvalidNameLength {
                        length: n,
                        min: MIN_NAME_LENGTH,
                        max: MAX_NAME_LENGTH
                    }
                );
            }
        }
    }

    #[test]
    fn test_name_length_counts_characters() {
        // 3 characters, 6 bytes
        assert!(StorageName::parse("çğü").is_ok());
        // 11 characters
        assert!(StorageName::parse("ççççççççççç").is_err());
    }

    #[test]
    fn test_prefix_is_first_three_characters() {
        let name = StorageName::parse("abcdef").unwrap();
        assert_eq!(name.prefix(), "abc");
        assert_eq!(name.as_str(), "abcdef");
    }

    #[test]
    fn test_prefix_sanitizes_path_characters() {
        let name = StorageName::parse("../etc").unwrap();
        assert_eq!(name.prefix(), "___");

        let name = StorageName::parse("a/b").unwrap();
        assert_eq!(name.prefix(), "a_b");
    }

    #[test]
    fn test_stored_file_name() {
        let name = StorageName::parse("abcdef").unwrap();
        let client: SocketAddr = "192.168.0.101:51234".parse().unwrap();
        let stored = StoredFile::new(Path::new("grayscale_images"), &name, client, fixed_time());

        assert_eq!(
            stored.path(),
            Path::new("grayscale_images/abc_192.168.0.101_51234_07-03-2024_14-05-09-000000000.png")
        );
    }

    #[test]
    fn test_unnamed_stored_file() {
        let client: SocketAddr = "10.0.0.1:2000".parse().unwrap();
        let stored = StoredFile::unnamed(Path::new("images"), client, fixed_time());

        assert_eq!(
            stored.path(),
            Path::new("images/10.0.0.1_2000_07-03-2024_14-05-09-000000000.png")
        );
    }

    #[test]
    fn test_processed_path() {
        let input = Path::new("binary_images/abc_1.2.3.4_5_x.png");
        assert_eq!(
            processed_path(input, TransformKind::Binary),
            Path::new("binary_images/abc_1.2.3.4_5_x-bin.png")
        );
        assert_eq!(
            processed_path(input, TransformKind::Grayscale),
            Path::new("binary_images/abc_1.2.3.4_5_x-gs.png")
        );
    }

    #[test]
    fn test_length_rule_mentions_bounds() {
        let rule = StorageName::length_rule();
        assert!(rule.contains('3'));
        assert!(rule.contains("10"));
    }
}
