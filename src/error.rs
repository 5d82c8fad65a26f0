//! Error types for the takeout reconciler

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for reconciler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the takeout reconciler
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage access failed for {path}: {source}")]
    StorageAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output folder '{path}' is not empty")]
    OutputNotEmpty { path: PathBuf },

    #[error("Failed to read EXIF data from {path}: {message}")]
    ExifRead { path: PathBuf, message: String },

    #[error("Failed to read container metadata from {path}: {message}")]
    ContainerParse { path: PathBuf, message: String },

    #[error("Metadata tool failed for {path}: {message}")]
    MetadataTool { path: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),
}

impl Error {
    /// Wrap an I/O error with the path it happened on
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::StorageAccess {
            path: path.into(),
            source,
        }
    }
}
