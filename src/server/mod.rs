//! Server module

pub mod config;
pub mod server;

pub use config::ServiceConfig;
pub use server::{run, EmbeddingService, ServeStats};

use crate::models::EmbeddingError;

/// Process-level failures; each one ends the service with a non-zero exit
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model load failed: {0}")]
    ModelLoad(#[source] EmbeddingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Used for catalog loading; model loads wrap their error in `ModelLoad` directly.
impl From<EmbeddingError> for ServiceError {
    fn from(error: EmbeddingError) -> Self {
        match error {
            EmbeddingError::ConfigError { message } => ServiceError::Config(message),
            EmbeddingError::TomlError { error } => ServiceError::Config(error.to_string()),
            EmbeddingError::IoError { error } => ServiceError::Config(error.to_string()),
            other => ServiceError::ModelLoad(other),
        }
    }
}
