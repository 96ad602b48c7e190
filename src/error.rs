//! Error types for stress terrain analytics

use thiserror::Error;

/// Errors that can occur while loading, fetching or computing terrain data
#[derive(Debug, Error)]
pub enum TerrainError {
    #[error("Failed to parse health samples: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid analysis window: {0}")]
    InvalidWindow(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Sample source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
