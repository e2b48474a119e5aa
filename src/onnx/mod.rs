//! ONNX Runtime backend
//!
//! Session construction, execution-provider probing and pooling for
//! ONNX-exported sentence embedding models.

pub mod onnx_engine;
pub mod providers;

pub use onnx_engine::{OnnxConfig, OnnxEmbeddingEngine};
pub use providers::{execution_provider, runtime_device_resolver, CoreMlProbe, CudaProbe};
