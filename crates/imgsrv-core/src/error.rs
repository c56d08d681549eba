//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Two table entries share a keyword
    #[error("Duplicate command keyword: {keyword}")]
    DuplicateKeyword { keyword: String },

    /// A table entry has an empty keyword
    #[error("Command keyword must not be empty")]
    EmptyKeyword,

    /// Negotiated name is outside the accepted length bounds
    #[error("Invalid name length: {length} (expected {min}..={max} characters)")]
    InvalidNameLength {
        length: usize,
        min: usize,
        max: usize,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
