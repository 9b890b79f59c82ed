//! Error types for cache persistence.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Cache result type
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors from cache operations.
///
/// Loading never produces these: unreadable or malformed documents degrade to
/// an empty document. Only directory creation and saving can fail.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write cache document {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize cache document: {0}")]
    Serialize(#[from] serde_json::Error),
}
