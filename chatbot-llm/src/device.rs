//! Picking the compute device generation runs on.
use crate::{LLMError, Result};
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{DType, Device};
use clap::ValueEnum;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum DeviceKind {
    Metal,
    Cuda,
    Cpu,
}

/// Apple GPU first, then CUDA, then the CPU.
pub const DEFAULT_PRIORITY: [DeviceKind; 3] =
    [DeviceKind::Metal, DeviceKind::Cuda, DeviceKind::Cpu];

impl DeviceKind {
    /// Half precision on accelerators, full precision on the CPU.
    pub fn default_dtype(&self) -> DType {
        match self {
            DeviceKind::Metal | DeviceKind::Cuda => DType::F16,
            DeviceKind::Cpu => DType::F32,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum DtypeChoice {
    F16,
    Bf16,
    F32,
}

impl From<DtypeChoice> for DType {
    fn from(choice: DtypeChoice) -> Self {
        match choice {
            DtypeChoice::F16 => DType::F16,
            DtypeChoice::Bf16 => DType::BF16,
            DtypeChoice::F32 => DType::F32,
        }
    }
}

/// Try to open `kind`. Accelerators only succeed when candle was built with their feature.
pub fn probe(kind: DeviceKind) -> Option<Device> {
    let device = match kind {
        DeviceKind::Metal if metal_is_available() => Device::new_metal(0),
        DeviceKind::Cuda if cuda_is_available() => Device::new_cuda(0),
        DeviceKind::Cpu => Ok(Device::Cpu),
        _ => return None,
    };
    match device {
        Ok(device) => Some(device),
        Err(err) => {
            log::warn!("{kind:?} is available but failed to open: {err}");
            None
        }
    }
}

pub fn select_device(candidates: &[DeviceKind]) -> Result<(DeviceKind, Device)> {
    select_device_with(candidates, probe)
}

/// First candidate, in order, for which `probe` yields a device.
pub fn select_device_with<F>(
    candidates: &[DeviceKind],
    mut probe: F,
) -> Result<(DeviceKind, Device)>
where
    F: FnMut(DeviceKind) -> Option<Device>,
{
    for &kind in candidates {
        if let Some(device) = probe(kind) {
            log::info!("Available device is {kind:?}");
            return Ok((kind, device));
        }
        log::debug!("{kind:?} unavailable");
    }
    Err(LLMError::NoDevice(format!("{candidates:?}")))
}
