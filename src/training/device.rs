//! Compute device selection.

use anyhow::Result;
use candle_core::Device;
use serde::{Deserialize, Serialize};

/// Requested compute device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    Cuda,
    Metal,
    Cpu,
    #[default]
    Auto,
}

impl std::str::FromStr for DevicePreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cuda" | "gpu" => Ok(Self::Cuda),
            "metal" => Ok(Self::Metal),
            "cpu" => Ok(Self::Cpu),
            "auto" => Ok(Self::Auto),
            other => Err(anyhow::anyhow!(
                "Invalid device '{}'. Valid options: cuda, metal, cpu, auto",
                other
            )),
        }
    }
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cuda => write!(f, "cuda"),
            Self::Metal => write!(f, "metal"),
            Self::Cpu => write!(f, "cpu"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Select a device, falling back to CPU when the requested accelerator is
/// unavailable or not compiled in.
pub fn select_device(preference: DevicePreference) -> Result<Device> {
    match preference {
        DevicePreference::Cuda => {
            #[cfg(feature = "cuda")]
            {
                match Device::new_cuda(0) {
                    Ok(device) => {
                        tracing::info!("CUDA device selected");
                        return Ok(device);
                    }
                    Err(e) => tracing::warn!("CUDA init failed ({}), falling back to CPU", e),
                }
            }
            #[cfg(not(feature = "cuda"))]
            tracing::warn!("CUDA requested but not compiled in (--features cuda); using CPU");
            Ok(Device::Cpu)
        }

        DevicePreference::Metal => {
            #[cfg(feature = "metal")]
            {
                match Device::new_metal(0) {
                    Ok(device) => {
                        tracing::info!("Metal device selected");
                        return Ok(device);
                    }
                    Err(e) => tracing::warn!("Metal init failed ({}), falling back to CPU", e),
                }
            }
            #[cfg(not(feature = "metal"))]
            tracing::warn!("Metal requested but not compiled in (--features metal); using CPU");
            Ok(Device::Cpu)
        }

        DevicePreference::Cpu => Ok(Device::Cpu),

        DevicePreference::Auto => {
            #[cfg(feature = "cuda")]
            if let Ok(device) = Device::new_cuda(0) {
                tracing::info!("Auto-selected CUDA");
                return Ok(device);
            }
            #[cfg(feature = "metal")]
            if let Ok(device) = Device::new_metal(0) {
                tracing::info!("Auto-selected Metal");
                return Ok(device);
            }
            tracing::info!("Auto-selected CPU");
            Ok(Device::Cpu)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("cuda".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda);
        assert_eq!("gpu".parse::<DevicePreference>().unwrap(), DevicePreference::Cuda);
        assert_eq!("CPU".parse::<DevicePreference>().unwrap(), DevicePreference::Cpu);
        assert!("tpu".parse::<DevicePreference>().is_err());
    }

    #[test]
    fn test_cpu_always_available() {
        assert!(select_device(DevicePreference::Cpu).is_ok());
    }
}
