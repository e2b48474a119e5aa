//! Execution providers
//!
//! `cuda` maps to the CUDA execution provider and `mps` to CoreML, the
//! ONNX Runtime route to Apple GPUs and the Neural Engine.

use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider, ExecutionProviderDispatch,
};

use crate::models::{AcceleratorProbe, Device, DeviceResolver, EmbeddingResult, NoAccelerator};

/// Asks ONNX Runtime whether the CUDA provider can run on this host
#[derive(Debug, Clone, Copy, Default)]
pub struct CudaProbe;

impl AcceleratorProbe for CudaProbe {
    fn is_available(&self) -> EmbeddingResult<bool> {
        Ok(CUDAExecutionProvider::default().is_available()?)
    }
}

/// Asks ONNX Runtime whether the CoreML provider can run on this host
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreMlProbe;

impl AcceleratorProbe for CoreMlProbe {
    fn is_available(&self) -> EmbeddingResult<bool> {
        Ok(CoreMLExecutionProvider::default().is_available()?)
    }
}

/// Resolver backed by the ONNX Runtime provider probes for this platform
pub fn runtime_device_resolver() -> DeviceResolver {
    let mps: Box<dyn AcceleratorProbe> = if cfg!(target_vendor = "apple") {
        Box::new(CoreMlProbe)
    } else {
        Box::new(NoAccelerator)
    };
    DeviceResolver::new(Box::new(CudaProbe), mps)
}

/// Execution provider to register for `device`; `None` means the default CPU provider
pub fn execution_provider(device: Device) -> Option<ExecutionProviderDispatch> {
    match device {
        Device::Cuda => Some(CUDAExecutionProvider::default().build().error_on_failure()),
        Device::Mps => Some(CoreMLExecutionProvider::default().build().error_on_failure()),
        Device::Cpu => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_uses_default_provider() {
        assert!(execution_provider(Device::Cpu).is_none());
        assert!(execution_provider(Device::Cuda).is_some());
        assert!(execution_provider(Device::Mps).is_some());
    }

    #[test]
    fn test_runtime_resolver_cpu_skips_probing() {
        assert_eq!(runtime_device_resolver().resolve("cpu"), Device::Cpu);
    }
}
