//! Error types shared across the pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the deduplication pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Comparing two perceptual hashes of different widths is a programmer
    /// error and fatal to the run.
    #[error("bit length mismatch: {left} vs {right} bits")]
    BitlenMismatch { left: usize, right: usize },

    /// A file could not be read or decoded. Localized to the file; the
    /// pipeline records it and continues.
    #[error("unreadable input {path:?}: {reason}")]
    UnreadableInput { path: PathBuf, reason: String },

    #[error("cache store error: {0}")]
    Store(#[from] rocksdb::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid frame buffer: {0}")]
    InvalidFrame(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("interrupted")]
    Interrupted,
}

impl Error {
    /// Build an `UnreadableInput` from anything displayable.
    pub fn unreadable(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Error::UnreadableInput {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
