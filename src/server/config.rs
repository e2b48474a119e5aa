//! Embedding Service Configuration
//!
//! Loaded from an optional TOML file; every field has a default, and the
//! command line overrides the model and device settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::server::ServiceError;

/// Default embedding model
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Default device preference
pub const DEFAULT_DEVICE: &str = "cuda";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub model: ModelSettings,
    pub protocol: ProtocolConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Catalog name or model directory
    pub name: String,
    /// Preferred device: `cuda`, `mps` or `cpu`
    pub device: String,
    /// Directory searched for `<name>/model.onnx`
    pub models_dir: PathBuf,
    /// Optional embeddingmodels.toml catalog
    pub catalog: Option<PathBuf>,
    /// Intra-op threads for CPU inference
    pub intra_threads: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Attach a `traceback` to encoding failures
    pub include_traceback: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL.to_string(),
            device: DEFAULT_DEVICE.to_string(),
            models_dir: PathBuf::from("models"),
            catalog: None,
            intra_threads: 4,
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            include_traceback: true,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ServiceError> {
        let config: ServiceConfig =
            toml::from_str(content).map_err(|e| ServiceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.model.name.trim().is_empty() {
            return Err(ServiceError::Config("model name must not be empty".to_string()));
        }
        if self.model.intra_threads == 0 {
            return Err(ServiceError::Config("intra_threads must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Crate-scoped tracing filter for the configured level
    pub fn log_filter(&self) -> String {
        match self.monitoring.log_level.to_lowercase().as_str() {
            "trace" => "embedding_service=trace,warn".to_string(),
            "debug" => "embedding_service=debug,warn".to_string(),
            "info" => "embedding_service=info,warn".to_string(),
            "error" => "embedding_service=error,error".to_string(),
            "off" => "off".to_string(),
            _ => "embedding_service=warn,warn".to_string(),
        }
    }
}
