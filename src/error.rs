//! Error handling utilities shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result type used throughout the crate.
pub type Result<T, E = WcError> = std::result::Result<T, E>;

/// Domain-specific error describing failures while planning, scanning, or writing a count.
#[derive(Debug, Error)]
pub enum WcError {
    /// The input path does not exist or is not a regular file.
    #[error("source {path:?} does not exist or is not a regular file")]
    SourceNotFound {
        /// Path that was requested as the count source.
        path: PathBuf,
    },
    /// A byte sequence could not be decoded with the configured encoding.
    #[error("malformed {encoding} byte sequence at offset {offset}")]
    Decode {
        /// Name of the encoding used for decoding.
        encoding: String,
        /// Absolute byte offset of the first malformed byte.
        offset: u64,
    },
    /// The report contains text the output encoding cannot represent.
    #[error("report text cannot be represented in {encoding}")]
    Encode {
        /// Name of the output encoding.
        encoding: String,
    },
    /// A scanning worker failed for a reason other than decoding.
    #[error("worker failed: {0}")]
    WorkerFailure(String),
    /// The requested encoding label is not recognised.
    #[error("unknown encoding label `{0}`")]
    UnknownEncoding(String),
    /// Count configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Filesystem IO error with optional context path.
    #[error("io error while processing {path:?}: {source}")]
    Io {
        /// Underlying IO error returned by the standard library.
        source: std::io::Error,
        /// Target path associated with the IO failure if available.
        path: Option<PathBuf>,
    },
}

impl WcError {
    /// Helper constructor that attaches an optional path when wrapping IO errors.
    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { source, path }
    }
}
