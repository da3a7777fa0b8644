//! Error types for the discovery pipeline

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error returned by a cloud collaborator call
pub type ApiError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("{context}: {source}")]
    Api {
        context: String,
        #[source]
        source: ApiError,
    },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode scrape targets: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

impl DiscoveryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DiscoveryError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
