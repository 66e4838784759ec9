use anyhow::{Context, Result};
use candle_core::Device;
use serde::Deserialize;

/// The tensor-execution engine the process runs on. Only its identity
/// matters to model selection.
pub trait Engine: Send + Sync {
    fn identity(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Cuda,
    Metal,
}

impl std::str::FromStr for DeviceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(DeviceKind::Cpu),
            "cuda" => Ok(DeviceKind::Cuda),
            "metal" => Ok(DeviceKind::Metal),
            other => anyhow::bail!("unknown device: {other}"),
        }
    }
}

/// candle, bound to one device.
pub struct CandleEngine {
    device: Device,
}

impl CandleEngine {
    pub fn new(kind: DeviceKind) -> Result<Self> {
        let device = match kind {
            DeviceKind::Cpu => Device::Cpu,
            DeviceKind::Cuda => Device::new_cuda(0).context("cuda device unavailable")?,
            DeviceKind::Metal => Device::new_metal(0).context("metal device unavailable")?,
        };
        Ok(Self { device })
    }

    pub fn cpu() -> Self {
        Self { device: Device::Cpu }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl Engine for CandleEngine {
    fn identity(&self) -> &str {
        if self.device.is_cuda() {
            "cuda"
        } else if self.device.is_metal() {
            "metal"
        } else {
            "cpu"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_identity() {
        assert_eq!(CandleEngine::cpu().identity(), "cpu");
        assert_eq!(CandleEngine::new(DeviceKind::Cpu).unwrap().identity(), "cpu");
    }

    #[test]
    fn test_parse_device() {
        assert_eq!("CUDA".parse::<DeviceKind>().unwrap(), DeviceKind::Cuda);
        assert!("tpu".parse::<DeviceKind>().is_err());
    }
}
