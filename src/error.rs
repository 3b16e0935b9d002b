//! Error types for the backup engine and history store.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Source directory missing: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Restore of {resource} failed, previous data kept at {}: {source}", .sidecar.display())]
    RestoreFailed {
        resource: String,
        sidecar: PathBuf,
        #[source]
        source: Box<VaultError>,
    },
}

/// Result alias for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
