//! Embedding Service Library
//!
//! Line-delimited JSON embedding service: chunk batches in on stdin,
//! embedding batches out on stdout, lifecycle events on stderr.

pub mod models;
pub mod onnx;
pub mod protocol;
pub mod server;

// Re-exports
pub use models::{Device, DeviceResolver, Embedding, EmbeddingError, EmbeddingModel, ModelFactory};
pub use protocol::{EmbedRequest, EmbedResponse, StatusEvent};
pub use server::{run, EmbeddingService, ServiceConfig, ServiceError};
