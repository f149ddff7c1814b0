//! Error types for cinder.
//!
//! Most failures in this crate are not errors at all: allocation failure and
//! missing GPU capability degrade an emitter to a weaker mode instead of
//! propagating. The types here cover the cases where a caller genuinely needs
//! to know that a resource could not be created.

use std::fmt;

/// Errors that can occur while acquiring a GPU context.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter(wgpu::RequestAdapterError),
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter(e) => write!(
                f,
                "No compatible GPU adapter found ({}). Ensure your system has a GPU with Vulkan/Metal/DX12 support.",
                e
            ),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::NoAdapter(e) => Some(e),
            GpuError::DeviceCreation(e) => Some(e),
        }
    }
}

impl From<wgpu::RequestAdapterError> for GpuError {
    fn from(e: wgpu::RequestAdapterError) -> Self {
        GpuError::NoAdapter(e)
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors that can occur when creating a particle pool.
///
/// These are signals for the caller to degrade (pooled -> standalone -> CPU),
/// not to abort. See the mode state machine in [`crate::emitter`].
#[derive(Debug)]
pub enum PoolError {
    /// Requested capacity exceeds the hard pool ceiling.
    CapacityCeiling { requested: u32, ceiling: u32 },
    /// The slot buffers would exceed a device buffer-size limit.
    DeviceLimit { required_bytes: u64, limit_bytes: u64 },
    /// Capacity of zero slots was requested.
    ZeroCapacity,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::CapacityCeiling { requested, ceiling } => write!(
                f,
                "Pool capacity {} exceeds the hard ceiling of {} slots",
                requested, ceiling
            ),
            PoolError::DeviceLimit {
                required_bytes,
                limit_bytes,
            } => write!(
                f,
                "Slot buffers need {} bytes but the device limit is {} bytes",
                required_bytes, limit_bytes
            ),
            PoolError::ZeroCapacity => write!(f, "Pool capacity must be at least one slot"),
        }
    }
}

impl std::error::Error for PoolError {}
