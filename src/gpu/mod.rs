//! GPU device plumbing.
//!
//! [`GpuContext`] owns the instance, adapter, device, and queue. It is
//! headless: surface creation and presentation belong to the render layer,
//! which borrows the device from here. Acquisition is fallible on purpose so
//! callers can fall back to the CPU path instead of panicking on machines
//! without a usable adapter.

mod pool;

pub use pool::{step_shader_source, ParticlePool, MAX_POOL_CAPACITY, MAX_SPAWN_REQUESTS};

use crate::error::GpuError;

pub const WORKGROUP_SIZE: u32 = 256;

pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    adapter: wgpu::Adapter,
}

impl GpuContext {
    /// Acquire an adapter and device, preferring a discrete GPU.
    pub async fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        Self::from_instance(&instance, None).await
    }

    /// Acquire a device compatible with an existing surface. The render
    /// layer uses this so presentation and compute share one device.
    pub async fn from_instance(
        instance: &wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, GpuError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await?;

        log::info!("acquired adapter: {}", adapter.get_info().name);

        Ok(Self {
            device,
            queue,
            adapter,
        })
    }

    /// Blocking variant of [`GpuContext::new`] for non-async callers.
    pub fn new_blocking() -> Result<Self, GpuError> {
        pollster::block_on(Self::new())
    }

    /// Whether the adapter can run compute passes at all. Some downlevel
    /// (GL-backed) adapters cannot, and those machines use the CPU path.
    pub fn supports_compute(&self) -> bool {
        self.adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }
}
