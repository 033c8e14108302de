// ============================================================
// Layer 5 — Backend Selection
// ============================================================
// One place that decides which burn backend the pipeline runs
// on. Training uses Autodiff<Inner>; evaluation, export and
// scoring use Inner directly (what model.valid() returns).
//
//   default build     → NdArray (CPU)
//   --features wgpu   → Wgpu    (GPU, falls back to CPU adapter)

use serde::{Deserialize, Serialize};

#[cfg(not(feature = "wgpu"))]
pub type InnerBackend = burn::backend::NdArray;

#[cfg(feature = "wgpu")]
pub type InnerBackend = burn::backend::Wgpu;

pub type TrainBackend = burn::backend::Autodiff<InnerBackend>;

pub type Device = <InnerBackend as burn::tensor::backend::Backend>::Device;

/// Requested execution device, as written in `train_config.json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionDevice {
    #[default]
    Cpu,
    Gpu,
}

impl ExecutionDevice {
    #[cfg(not(feature = "wgpu"))]
    pub fn resolve(self) -> Device {
        if self == ExecutionDevice::Gpu {
            tracing::warn!("Built without the 'wgpu' feature, running on the CPU");
        }
        burn::backend::ndarray::NdArrayDevice::Cpu
    }

    #[cfg(feature = "wgpu")]
    pub fn resolve(self) -> Device {
        use burn::backend::wgpu::WgpuDevice;
        match self {
            ExecutionDevice::Cpu => WgpuDevice::Cpu,
            ExecutionDevice::Gpu => WgpuDevice::default(),
        }
    }
}

impl std::str::FromStr for ExecutionDevice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpu"          => Ok(ExecutionDevice::Cpu),
            "gpu" | "cuda" => Ok(ExecutionDevice::Gpu),
            other          => anyhow::bail!("unknown device '{other}' (expected cpu or gpu)"),
        }
    }
}
