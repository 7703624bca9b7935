//! Error types for terrain streaming

use thiserror::Error;

/// Main error type for the terrain streaming core
#[derive(Debug, Error)]
pub enum Error {
    #[error("Terrain format error: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Streaming error: {0}")]
    Streaming(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}
