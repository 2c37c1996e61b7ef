//! Error types for the ingestion pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors that can occur in the ingestion pipeline.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Directory watcher error.
    #[error("watcher error: {0}")]
    Watcher(#[from] logbridge_directory_watcher::WatcherError),

    /// Logging could not be set up.
    #[error("logging error: {0}")]
    Logging(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse the configuration file.
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Output stream errors.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Failed to create the output directory.
    #[error("failed to create output directory {}: {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to open the output file.
    #[error("failed to open output file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write to the output file.
    #[error("failed to write output file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
