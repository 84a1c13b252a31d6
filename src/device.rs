//! # Inference Device Selection
//!
//! Resolves the configured device preference ("auto", "cpu", "cuda",
//! "metal") to a Candle device, falling back to CPU when the requested
//! accelerator is unavailable. Both models share the one selected device.

use candle_core::Device;
use tracing::{info, warn};

/// Device preference for model inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "automatic" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" => Ok(DevicePreference::Metal),
            _ => Err(format!("Unknown device preference: {}", s)),
        }
    }
}

/// Resolve a preference to a concrete device.
pub fn select_device(preference: DevicePreference) -> Device {
    match preference {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => cuda_or_cpu(),
        DevicePreference::Metal => metal_or_cpu(),
        DevicePreference::Auto => {
            if candle_core::utils::cuda_is_available() {
                cuda_or_cpu()
            } else if candle_core::utils::metal_is_available() {
                metal_or_cpu()
            } else {
                info!("No accelerator available, using CPU for inference");
                Device::Cpu
            }
        }
    }
}

fn cuda_or_cpu() -> Device {
    match Device::new_cuda(0) {
        Ok(device) => {
            info!("Using CUDA device 0 for inference");
            device
        }
        Err(e) => {
            warn!("CUDA unavailable ({}), falling back to CPU", e);
            Device::Cpu
        }
    }
}

fn metal_or_cpu() -> Device {
    match Device::new_metal(0) {
        Ok(device) => {
            info!("Using Metal device 0 for inference");
            device
        }
        Err(e) => {
            warn!("Metal unavailable ({}), falling back to CPU", e);
            Device::Cpu
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_parsing() {
        assert_eq!("cpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert_eq!("GPU".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda);
        assert_eq!("auto".parse::<DevicePreference>().unwrap(), DevicePreference::Auto);
        assert!("quantum".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_cpu_preference_is_always_honored() {
        assert!(matches!(select_device(DevicePreference::Cpu), Device::Cpu));
    }
}
