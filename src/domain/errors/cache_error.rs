//! Cache error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid journal: {0}")]
    Journal(String),

    #[error("cache directory {} is already in use", path.display())]
    Locked { path: PathBuf },

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("editor was closed before {0}")]
    EditorClosed(&'static str),
}

impl CacheError {
    /// Creates journal error.
    #[must_use]
    pub fn journal(message: impl Into<String>) -> Self {
        Self::Journal(message.into())
    }
}
