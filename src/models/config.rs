//! Configuration module for embedding models
//!
//! This module handles loading and parsing the embeddingmodels.toml catalog
//! and resolving a model name to the files it is loaded from.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// File name of the ONNX graph inside a model directory
pub const MODEL_FILE: &str = "model.onnx";

/// File name of the HuggingFace tokenizer inside a model directory
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Catalog of known embedding models
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbeddingModelsConfig {
    /// Model-specific configurations, keyed by an arbitrary table name
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
}

/// How token embeddings are reduced to one sentence vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolingMode {
    /// Average over attended tokens
    #[default]
    Mean,
    /// First token
    Cls,
}

/// Configuration for a specific model
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Name requests and the CLI refer to
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,

    #[serde(default = "default_max_sequence_length")]
    pub max_sequence_length: usize,
    /// Known output dimension, if any
    #[serde(default)]
    pub embedding_dimension: Option<usize>,
    #[serde(default)]
    pub pooling_mode: PoolingMode,
    /// L2-normalize the pooled vector
    #[serde(default = "default_normalize")]
    pub normalize: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_max_sequence_length() -> usize {
    256
}

fn default_normalize() -> bool {
    true
}

impl ModelConfig {
    /// Describe a model stored as `model.onnx` + `tokenizer.json` in `dir`
    pub fn from_directory(name: &str, dir: &Path) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            model_path: dir.join(MODEL_FILE),
            tokenizer_path: dir.join(TOKENIZER_FILE),
            max_sequence_length: default_max_sequence_length(),
            embedding_dimension: None,
            pooling_mode: PoolingMode::default(),
            normalize: default_normalize(),
        }
    }

    /// Check that the files this model needs exist
    pub fn check_files(&self) -> Result<(), crate::models::EmbeddingError> {
        for path in [&self.model_path, &self.tokenizer_path] {
            if !path.is_file() {
                return Err(crate::models::EmbeddingError::ModelLoadError {
                    model_name: self.name.clone(),
                    error: format!("missing file {}", path.display()),
                });
            }
        }
        Ok(())
    }
}

impl EmbeddingModelsConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, crate::models::EmbeddingError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from string
    pub fn from_toml(content: &str) -> Result<Self, crate::models::EmbeddingError> {
        let config: EmbeddingModelsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get model by name
    pub fn get_model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.values().find(|model| model.name == name)
    }

    /// Resolve a model name to its configuration.
    ///
    /// Lookup order: enabled catalog entry, then `name` itself as a model
    /// directory, then `<models_dir>/<name>`.
    pub fn resolve(&self, name: &str, models_dir: &Path) -> Result<ModelConfig, crate::models::EmbeddingError> {
        if let Some(model) = self.get_model(name) {
            if !model.enabled {
                return Err(crate::models::EmbeddingError::ConfigError {
                    message: format!("Model '{}' is not enabled", name),
                });
            }
            return Ok(model.clone());
        }

        let direct = Path::new(name);
        let candidates = [direct.to_path_buf(), models_dir.join(name)];
        candidates
            .iter()
            .find(|dir| dir.join(MODEL_FILE).is_file())
            .map(|dir| ModelConfig::from_directory(name, dir))
            .ok_or_else(|| crate::models::EmbeddingError::ModelNotFound {
                model_name: name.to_string(),
            })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::models::EmbeddingError> {
        let mut seen = HashSet::new();
        for (key, model) in &self.models {
            if !seen.insert(model.name.as_str()) {
                return Err(crate::models::EmbeddingError::ConfigError {
                    message: format!("Model name '{}' is declared more than once", model.name),
                });
            }
            if model.max_sequence_length == 0 {
                return Err(crate::models::EmbeddingError::ConfigError {
                    message: format!("Model '{}' has max_sequence_length = 0", key),
                });
            }
            if model.embedding_dimension == Some(0) {
                return Err(crate::models::EmbeddingError::ConfigError {
                    message: format!("Model '{}' has embedding_dimension = 0", key),
                });
            }
        }
        Ok(())
    }
}
