//! Embedding model layer
//!
//! Model catalog, device resolution, the `EmbeddingModel` trait and the
//! startup loader that binds one model to one device.

pub mod config;
pub mod device;
pub mod loader;
pub mod model;

// Re-exports
pub use config::{EmbeddingModelsConfig, ModelConfig, PoolingMode};
pub use device::{AcceleratorProbe, Device, DeviceResolver, NoAccelerator};
pub use loader::ModelLoader;
pub use model::{EmbeddingModel, ModelFactory, ModelInfo};

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Result type for embedding models operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Errors that can occur in embedding models operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Model not found: {model_name}")]
    ModelNotFound { model_name: String },

    #[error("Model loading failed: {model_name} - {error}")]
    ModelLoadError { model_name: String, error: String },

    #[error("Model load failed: {error}")]
    ModelLoadFailed { error: String },

    #[error("Inference failed: {model_name} - {error}")]
    InferenceError { model_name: String, error: String },

    #[error("Embedding failed: {error}")]
    EmbeddingFailed { error: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("IO error: {error}")]
    IoError {
        #[source]
        error: std::io::Error,
    },

    #[error("TOML parsing error: {error}")]
    TomlError {
        #[source]
        error: toml::de::Error,
    },

    #[error("ONNX Runtime error: {error}")]
    RuntimeError {
        #[source]
        error: ort::Error,
    },
}

impl From<std::io::Error> for EmbeddingError {
    fn from(error: std::io::Error) -> Self {
        EmbeddingError::IoError { error }
    }
}

impl From<toml::de::Error> for EmbeddingError {
    fn from(error: toml::de::Error) -> Self {
        EmbeddingError::TomlError { error }
    }
}

impl From<ort::Error> for EmbeddingError {
    fn from(error: ort::Error) -> Self {
        EmbeddingError::RuntimeError { error }
    }
}

/// Render an error and its `source()` chain, one cause per line.
///
/// This is the diagnostic detail carried in `traceback` fields.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut rendered = format!("{error}");
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str("\nCaused by: ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

/// Text of a caught panic payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_chain_walks_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "tokenizer.json missing");
        let err = EmbeddingError::from(io);

        let chain = error_chain(&err);
        assert!(chain.starts_with("IO error: tokenizer.json missing"));
        assert!(chain.contains("Caused by: tokenizer.json missing"));
    }

    #[test]
    fn test_error_chain_single_error() {
        let err = EmbeddingError::ModelNotFound {
            model_name: "nope".to_string(),
        };
        assert_eq!(error_chain(&err), "Model not found: nope");
    }

    #[test]
    fn test_panic_message_from_payload() {
        let payload = std::panic::catch_unwind(|| panic!("static text")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static text");

        let payload = std::panic::catch_unwind(|| panic!("formatted {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");
    }
}
