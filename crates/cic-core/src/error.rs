//! Error types for cic-core

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while parsing, walking, or syncing a project tree.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("source directory does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("a sync is already running for project {0}")]
    SyncInProgress(String),

    #[error("storage directory could not be prepared: {0}")]
    StorageUnavailable(String),
}

/// Result type for cic-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
