//! Error types for package parsing and survey operations.
//!
//! Nothing here is fatal to a multi-file scan: directory-level callers log
//! and skip a file that produces any of these, and move on to the next one.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for package operations.
pub type Result<T> = std::result::Result<T, DbpfError>;

/// Errors that can occur while reading packages or running a survey.
#[derive(Error, Debug)]
pub enum DbpfError {
    /// I/O error not tied to a specific container.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A container could not be opened, mapped or read.
    #[error("Unreadable file {}: {source}", path.display())]
    UnreadableFile {
        /// Path of the file that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The header advertises zero index entries.
    #[error("Empty container: index entry count is zero")]
    EmptyContainer,

    /// A fixed-offset field or payload extends past the end of the buffer.
    #[error("Truncated data at offset {offset:#x}: expected {expected} bytes, got {actual} bytes")]
    TruncatedData {
        /// Offset where the read started.
        offset: usize,
        /// Bytes the read needed.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Index geometry or another structural field makes no sense.
    #[error("Invalid package format: {0}")]
    InvalidFormat(String),

    /// A compressed stream ended before its terminal control code.
    #[error("Truncated compressed stream at input offset {offset:#x} ({decoded} bytes decoded)")]
    TruncatedStream {
        /// Input offset where decoding stopped.
        offset: usize,
        /// Output bytes produced before stopping.
        decoded: usize,
    },

    /// An auxiliary XML descriptor could not be parsed.
    #[error("Malformed XML: {0}")]
    MalformedXml(String),

    /// An auxiliary XML descriptor lacks a required element or attribute.
    #[error("Missing field in resource descriptor: {0}")]
    MissingField(&'static str),

    /// Filter text supplied by the user could not be interpreted.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Settings could not be loaded, saved or validated.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Key or resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl DbpfError {
    /// Creates a truncated data error.
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset where the read started
    /// * `expected` - Number of bytes the read needed
    /// * `len` - Total length of the buffer being read
    pub fn truncated(offset: usize, expected: usize, len: usize) -> Self {
        Self::TruncatedData {
            offset,
            expected,
            actual: len.saturating_sub(offset),
        }
    }

    /// Creates an unreadable file error for `path`.
    pub fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::UnreadableFile {
            path: path.into(),
            source,
        }
    }

    /// Creates a not found error with context about what was being searched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use simidge::error::DbpfError;
    /// let err = DbpfError::not_found("resource", "BCON 0x7f000001");
    /// assert_eq!(err.to_string(), "Not found: resource 'BCON 0x7f000001'");
    /// ```
    pub fn not_found(item_type: &str, name: &str) -> Self {
        Self::NotFound(format!("{} '{}'", item_type, name))
    }

    /// Returns true if a directory scan should skip the file and continue.
    ///
    /// Every error raised while reading a single container is local to that
    /// container; only configuration and filter errors are the caller's
    /// problem.
    pub fn is_skippable(&self) -> bool {
        !matches!(self, Self::InvalidFilter(_) | Self::InvalidConfig(_))
    }
}
