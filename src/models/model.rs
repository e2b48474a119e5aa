//! Model definitions and traits
//!
//! This module defines the `EmbeddingModel` trait the request loop encodes
//! through, and the `ModelFactory` seam the loader uses to build one.

use async_trait::async_trait;
use serde::Serialize;

use crate::models::{Device, Embedding, EmbeddingResult};

/// Information about a loaded model
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    /// Model name
    pub name: String,
    /// Device the model is bound to
    pub device: Device,
    /// Embedding dimension, when known before the first encode
    pub dimension: Option<usize>,
    /// Maximum sequence length in tokens
    pub max_sequence_length: usize,
}

/// Core embedding model trait
#[async_trait]
pub trait EmbeddingModel: Send {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Generate the embedding of a single text
    async fn embed_text(&mut self, text: &str) -> EmbeddingResult<Embedding>;

    /// Generate embeddings for a batch of texts, one per text, in order
    async fn embed_batch(&mut self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>>;

    /// Get the embedding dimension
    fn dimension(&self) -> Option<usize> {
        self.info().dimension
    }
}

/// Builds a model bound to a device
#[async_trait]
pub trait ModelFactory: Send + Sync {
    async fn create_model(&self, model_name: &str, device: Device) -> EmbeddingResult<Box<dyn EmbeddingModel>>;
}

/// ONNX-based embedding model implementation
pub mod onnx {
    use super::*;
    use crate::models::config::{EmbeddingModelsConfig, ModelConfig};
    use crate::onnx::{OnnxConfig, OnnxEmbeddingEngine};
    use std::path::PathBuf;
    use tracing::info;

    /// ONNX embedding model
    pub struct OnnxEmbeddingModel {
        info: ModelInfo,
        engine: OnnxEmbeddingEngine,
    }

    impl OnnxEmbeddingModel {
        /// Load the model described by `config` onto `device`
        pub fn load(config: &ModelConfig, device: Device, onnx_config: &OnnxConfig) -> EmbeddingResult<Self> {
            config.check_files()?;
            let engine = OnnxEmbeddingEngine::new(config, device, onnx_config)?;
            let info = ModelInfo {
                name: config.name.clone(),
                device,
                dimension: config.embedding_dimension,
                max_sequence_length: config.max_sequence_length,
            };
            Ok(Self { info, engine })
        }
    }

    #[async_trait]
    impl EmbeddingModel for OnnxEmbeddingModel {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        async fn embed_text(&mut self, text: &str) -> EmbeddingResult<Embedding> {
            self.engine
                .embed_one(text)
                .map_err(|e| crate::models::EmbeddingError::InferenceError {
                    model_name: self.info.name.clone(),
                    error: e.to_string(),
                })
        }

        async fn embed_batch(&mut self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>> {
            self.engine
                .embed_texts(texts)
                .map_err(|e| crate::models::EmbeddingError::InferenceError {
                    model_name: self.info.name.clone(),
                    error: e.to_string(),
                })
        }
    }

    /// Factory resolving model names through the catalog and loading them with ONNX Runtime
    #[derive(Debug, Clone)]
    pub struct OnnxModelFactory {
        catalog: EmbeddingModelsConfig,
        models_dir: PathBuf,
        onnx_config: OnnxConfig,
    }

    impl OnnxModelFactory {
        pub fn new(catalog: EmbeddingModelsConfig, models_dir: impl Into<PathBuf>, onnx_config: OnnxConfig) -> Self {
            Self {
                catalog,
                models_dir: models_dir.into(),
                onnx_config,
            }
        }
    }

    #[async_trait]
    impl ModelFactory for OnnxModelFactory {
        async fn create_model(&self, model_name: &str, device: Device) -> EmbeddingResult<Box<dyn EmbeddingModel>> {
            let config = self.catalog.resolve(model_name, &self.models_dir)?;
            info!(model = %config.name, path = %config.model_path.display(), %device, "loading ONNX model");
            let model = OnnxEmbeddingModel::load(&config, device, &self.onnx_config)?;
            Ok(Box::new(model))
        }
    }
}
