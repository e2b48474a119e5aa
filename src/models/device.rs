//! Device selection
//!
//! Maps a device preference (`cuda`, `mps`, `cpu`, or anything else) to a
//! device the model can actually be bound to. Resolution is total: probe
//! errors and probe panics both count as "not available", and `cpu` is
//! always usable.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{panic_message, EmbeddingResult};

/// A device the model runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    /// NVIDIA GPU through CUDA
    Cuda,
    /// Apple GPU / Neural Engine
    Mps,
    /// General-purpose processor, always available
    Cpu,
}

impl Device {
    /// Token used on the command line and in status events
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cuda => "cuda",
            Device::Mps => "mps",
            Device::Cpu => "cpu",
        }
    }

    /// Parse a recognized preference token. Tokens are matched exactly.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "cuda" => Some(Device::Cuda),
            "mps" => Some(Device::Mps),
            "cpu" => Some(Device::Cpu),
            _ => None,
        }
    }
}

impl Serialize for Device {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime availability check for one accelerator class
pub trait AcceleratorProbe: Send + Sync {
    /// Whether the accelerator can be used on this host.
    ///
    /// The default reports unavailable, which is the right answer on any
    /// platform that lacks the accelerator entirely.
    fn is_available(&self) -> EmbeddingResult<bool> {
        Ok(false)
    }
}

/// Probe for an accelerator this build or platform does not have
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAccelerator;

impl AcceleratorProbe for NoAccelerator {}

/// Chooses the device a model is loaded onto
pub struct DeviceResolver {
    cuda: Box<dyn AcceleratorProbe>,
    mps: Box<dyn AcceleratorProbe>,
}

impl DeviceResolver {
    pub fn new(cuda: Box<dyn AcceleratorProbe>, mps: Box<dyn AcceleratorProbe>) -> Self {
        Self { cuda, mps }
    }

    /// Resolver that never selects an accelerator
    pub fn cpu_only() -> Self {
        Self::new(Box::new(NoAccelerator), Box::new(NoAccelerator))
    }

    /// Resolve a preference token to a usable device
    pub fn resolve(&self, preference: &str) -> Device {
        let device = match Device::from_token(preference) {
            Some(Device::Cuda) if probe(Device::Cuda, self.cuda.as_ref()) => Device::Cuda,
            Some(Device::Mps) if probe(Device::Mps, self.mps.as_ref()) => Device::Mps,
            _ => Device::Cpu,
        };
        debug!(preference, %device, "resolved device");
        device
    }
}

impl fmt::Debug for DeviceResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceResolver").finish_non_exhaustive()
    }
}

// Runtime bindings may panic when the native library cannot be loaded.
fn probe(device: Device, probe: &dyn AcceleratorProbe) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| probe.is_available())) {
        Ok(Ok(available)) => available,
        Ok(Err(e)) => {
            warn!(%device, error = %e, "accelerator probe failed, treating as unavailable");
            false
        }
        Err(payload) => {
            warn!(
                %device,
                panic = %panic_message(payload.as_ref()),
                "accelerator probe panicked, treating as unavailable"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmbeddingError;

    struct Available;
    impl AcceleratorProbe for Available {
        fn is_available(&self) -> EmbeddingResult<bool> {
            Ok(true)
        }
    }

    struct Failing;
    impl AcceleratorProbe for Failing {
        fn is_available(&self) -> EmbeddingResult<bool> {
            Err(EmbeddingError::ModelLoadFailed {
                error: "driver not loaded".to_string(),
            })
        }
    }

    struct Panicking;
    impl AcceleratorProbe for Panicking {
        fn is_available(&self) -> EmbeddingResult<bool> {
            panic!("libonnxruntime.so: cannot open shared object file")
        }
    }

    fn resolver(cuda: impl AcceleratorProbe + 'static, mps: impl AcceleratorProbe + 'static) -> DeviceResolver {
        DeviceResolver::new(Box::new(cuda), Box::new(mps))
    }

    #[test]
    fn test_accelerator_selected_when_available() {
        let r = resolver(Available, Available);
        assert_eq!(r.resolve("cuda"), Device::Cuda);
        assert_eq!(r.resolve("mps"), Device::Mps);
        assert_eq!(r.resolve("cpu"), Device::Cpu);
    }

    #[test]
    fn test_preference_is_not_upgraded() {
        // Only the preferred class is probed, never the other one.
        let r = resolver(NoAccelerator, Available);
        assert_eq!(r.resolve("cuda"), Device::Cpu);
        let r = resolver(Available, NoAccelerator);
        assert_eq!(r.resolve("mps"), Device::Cpu);
    }

    #[test]
    fn test_resolution_is_total() {
        fn outcome(i: usize) -> Box<dyn AcceleratorProbe> {
            match i {
                0 => Box::new(Available),
                1 => Box::new(NoAccelerator),
                2 => Box::new(Failing),
                _ => Box::new(Panicking),
            }
        }

        for cuda in 0..4 {
            for mps in 0..4 {
                let r = DeviceResolver::new(outcome(cuda), outcome(mps));
                for token in ["cuda", "mps", "cpu"] {
                    let device = r.resolve(token);
                    assert!(device == Device::Cpu || device.as_str() == token);
                }
            }
        }
    }

    #[test]
    fn test_probe_failures_fall_back_to_cpu() {
        let r = resolver(Failing, Panicking);
        assert_eq!(r.resolve("cuda"), Device::Cpu);
        assert_eq!(r.resolve("mps"), Device::Cpu);
    }

    #[test]
    fn test_unrecognized_tokens_fall_back_to_cpu() {
        let r = resolver(Available, Available);
        assert_eq!(r.resolve("tpu"), Device::Cpu);
        assert_eq!(r.resolve(""), Device::Cpu);
        assert_eq!(r.resolve(" CUDA "), Device::Cpu);
        assert_eq!(r.resolve("Mps"), Device::Cpu);
    }

    #[test]
    fn test_default_probe_reports_unavailable() {
        assert!(!NoAccelerator.is_available().unwrap());
        assert_eq!(DeviceResolver::cpu_only().resolve("cuda"), Device::Cpu);
    }

    #[test]
    fn test_device_tokens() {
        for device in [Device::Cuda, Device::Mps, Device::Cpu] {
            assert_eq!(Device::from_token(device.as_str()), Some(device));
            assert_eq!(device.to_string(), device.as_str());
        }
    }
}
