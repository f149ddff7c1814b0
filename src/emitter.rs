//! Emitters and the mode state machine.
//!
//! An [`Emitter`] is the user-facing handle: one visual effect with one
//! configuration. Internally it runs in one of four modes, resolved at
//! creation and degraded in order when a stronger mode is unavailable:
//!
//! 1. **Pooled**: a slot range inside the shared GPU pool.
//! 2. **Standalone**: a private GPU pool, used when the shared pool has no
//!    room for the emitter's capacity.
//! 3. **Cpu**: the plain-Rust fallback, used without a compute-capable
//!    device (unless the config demands a GPU).
//! 4. **Disabled**: no simulation, empty output.
//!
//! All mutable collaborators (allocator, shared pool, GPU context) are passed
//! in by the caller; the emitter owns nothing shared.

use crate::alloc::{RangeHandle, SlotAllocator, SlotRange};
use crate::config::EmitterConfig;
use crate::cpu::{CpuEmitter, QuadVertex};
use crate::gpu::{GpuContext, ParticlePool};
use crate::spawn::SpawnRequest;
use crate::visuals::FillUniform;
use glam::Vec2;

/// The mode an emitter resolved to. See the module docs for the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterMode {
    Pooled,
    Standalone,
    Cpu,
    Disabled,
}

enum Backend {
    Pooled(RangeHandle),
    Standalone(ParticlePool),
    Cpu(CpuEmitter),
    None,
}

/// Where the renderer should read this emitter's particles from.
pub enum DrawSource<'a> {
    /// Instanced draw over a range of the shared pool's current buffer.
    PooledRange(SlotRange),
    /// Instanced draw over a private pool's whole buffer.
    Standalone {
        buffer: &'a wgpu::Buffer,
        count: u32,
    },
    /// Pre-built quad vertices, uploaded fresh each frame.
    CpuQuads(&'a [QuadVertex]),
}

pub struct Emitter {
    config: Option<EmitterConfig>,
    mode: EmitterMode,
    backend: Backend,
    fill: FillUniform,
    origin: Vec2,
    rotation: f32,
    /// Seconds since the current config was attached.
    age: f32,
}

impl Emitter {
    /// Create an emitter, resolving the strongest available mode.
    ///
    /// `gpu` is `None` when no device could be acquired. Pooled allocation
    /// failure is not an error; the emitter degrades and keeps working.
    pub fn new(
        config: EmitterConfig,
        gpu: Option<&GpuContext>,
        allocator: &mut SlotAllocator,
    ) -> Self {
        let fill = config.fill.to_uniform(config.fade_start_frac());
        let (mode, backend) = Self::resolve_backend(&config, gpu, allocator);
        log::debug!("emitter created in {:?} mode", mode);
        Self {
            config: Some(config),
            mode,
            backend,
            fill,
            origin: Vec2::ZERO,
            rotation: 0.0,
            age: 0.0,
        }
    }

    fn resolve_backend(
        config: &EmitterConfig,
        gpu: Option<&GpuContext>,
        allocator: &mut SlotAllocator,
    ) -> (EmitterMode, Backend) {
        // An inert config produces nothing; give it the cheapest backend
        // instead of reserving GPU resources it will never touch.
        if config.is_inert() {
            return (EmitterMode::Cpu, Backend::Cpu(CpuEmitter::new(config.clone())));
        }

        let capacity = config.derived_capacity();
        let compute = gpu.map(|g| g.supports_compute()).unwrap_or(false);

        if compute {
            let gpu = gpu.unwrap();
            if let Some(handle) = allocator.allocate(capacity) {
                return (EmitterMode::Pooled, Backend::Pooled(handle));
            }
            match ParticlePool::new(gpu, capacity) {
                Ok(pool) => {
                    log::info!(
                        "shared pool exhausted, emitter falling back to a private pool of {} slots",
                        capacity
                    );
                    return (EmitterMode::Standalone, Backend::Standalone(pool));
                }
                Err(err) => log::warn!("standalone pool creation failed: {}", err),
            }
        }

        if config.gpu_required {
            log::warn!("emitter requires a compute-capable GPU, disabling");
            return (EmitterMode::Disabled, Backend::None);
        }
        (EmitterMode::Cpu, Backend::Cpu(CpuEmitter::new(config.clone())))
    }

    pub fn mode(&self) -> EmitterMode {
        self.mode
    }

    pub fn config(&self) -> Option<&EmitterConfig> {
        self.config.as_ref()
    }

    /// Move the emitter. Takes effect for particles spawned afterwards.
    pub fn set_transform(&mut self, origin: Vec2, rotation: f32) {
        self.origin = origin;
        self.rotation = rotation;
    }

    /// Swap in a new configuration, or `None` to stop the emitter entirely.
    ///
    /// Slots and private pools are released synchronously, so the next frame
    /// after a `None` swap renders nothing from this emitter. When the new
    /// config needs a different capacity the backend is rebuilt, which drops
    /// live particles.
    pub fn set_config(
        &mut self,
        config: Option<EmitterConfig>,
        gpu: Option<&GpuContext>,
        allocator: &mut SlotAllocator,
        shared_pool: Option<&mut ParticlePool>,
    ) {
        let same_capacity = match (&self.config, &config) {
            (Some(old), Some(new)) => old.derived_capacity() == new.derived_capacity(),
            _ => false,
        };

        let Some(new_config) = config else {
            self.release(gpu, allocator, shared_pool);
            self.config = None;
            self.mode = EmitterMode::Disabled;
            self.age = 0.0;
            return;
        };

        self.fill = new_config.fill.to_uniform(new_config.fade_start_frac());
        self.age = 0.0;
        if same_capacity {
            if let Backend::Cpu(cpu) = &mut self.backend {
                *cpu = CpuEmitter::new(new_config.clone());
            }
            self.config = Some(new_config);
            return;
        }

        self.release(gpu, allocator, shared_pool);
        let (mode, backend) = Self::resolve_backend(&new_config, gpu, allocator);
        self.mode = mode;
        self.backend = backend;
        self.config = Some(new_config);
    }

    /// Release all owned resources. Equivalent to `set_config(None, ..)`.
    pub fn dispose(
        &mut self,
        gpu: Option<&GpuContext>,
        allocator: &mut SlotAllocator,
        shared_pool: Option<&mut ParticlePool>,
    ) {
        self.set_config(None, gpu, allocator, shared_pool);
    }

    fn release(
        &mut self,
        gpu: Option<&GpuContext>,
        allocator: &mut SlotAllocator,
        shared_pool: Option<&mut ParticlePool>,
    ) {
        match std::mem::replace(&mut self.backend, Backend::None) {
            Backend::Pooled(handle) => {
                // Stale live particles must not leak to the range's next owner.
                if let (Some(gpu), Some(pool)) = (gpu, shared_pool) {
                    let range = handle.range();
                    pool.deactivate_range(gpu, range.start, range.count);
                }
                allocator.free(handle);
            }
            Backend::Standalone(_) | Backend::Cpu(_) | Backend::None => {}
        }
    }

    /// Advance one frame.
    ///
    /// Pooled emitters only queue a spawn request here; the shared pool is
    /// stepped once per frame by its owner. Standalone emitters step their
    /// private pool immediately.
    pub fn update(
        &mut self,
        delta: f32,
        seed_millis: u32,
        gpu: Option<&GpuContext>,
        shared_pool: Option<&mut ParticlePool>,
    ) {
        let Some(config) = &self.config else {
            return;
        };
        if config.is_inert() {
            return;
        }

        // Emission stops at the cutoff; live particles keep aging.
        let emitting_secs = match config.emission_duration {
            Some(cutoff) => (cutoff - self.age).clamp(0.0, delta),
            None => delta,
        };
        self.age += delta;
        let spawn_count = config.rate * emitting_secs;

        match &mut self.backend {
            Backend::Pooled(handle) => {
                if spawn_count > 0.0 {
                    if let Some(pool) = shared_pool {
                        pool.queue_spawn(SpawnRequest::from_config(
                            config,
                            handle.range(),
                            spawn_count,
                            self.origin,
                            self.rotation,
                        ));
                    }
                }
            }
            Backend::Standalone(pool) => {
                if let Some(gpu) = gpu {
                    if spawn_count > 0.0 {
                        let range = SlotRange {
                            start: 0,
                            count: pool.capacity(),
                        };
                        pool.queue_spawn(SpawnRequest::from_config(
                            config,
                            range,
                            spawn_count,
                            self.origin,
                            self.rotation,
                        ));
                    }
                    pool.step(gpu, delta, seed_millis);
                }
            }
            Backend::Cpu(cpu) => cpu.update(delta, self.origin, self.rotation),
            Backend::None => {}
        }
    }

    /// Where to draw from this frame, or `None` for an empty emitter.
    pub fn draw_source(&mut self) -> Option<DrawSource<'_>> {
        match &mut self.backend {
            Backend::Pooled(handle) => Some(DrawSource::PooledRange(handle.range())),
            Backend::Standalone(pool) => Some(DrawSource::Standalone {
                count: pool.capacity(),
                buffer: pool.current_buffer(),
            }),
            Backend::Cpu(cpu) => Some(DrawSource::CpuQuads(cpu.geometry())),
            Backend::None => None,
        }
    }

    pub fn fill_uniform(&self) -> FillUniform {
        self.fill
    }

    #[cfg(test)]
    pub(crate) fn cpu_emitter(&self) -> Option<&CpuEmitter> {
        match &self.backend {
            Backend::Cpu(cpu) => Some(cpu),
            _ => None,
        }
    }
}

/// Mode resolution as a pure function of the four inputs, for the tests.
/// `Emitter::resolve_backend` follows exactly this table.
#[cfg(test)]
pub(crate) fn resolve_mode(
    compute_available: bool,
    pooled_ok: bool,
    standalone_ok: bool,
    gpu_required: bool,
) -> EmitterMode {
    if compute_available {
        if pooled_ok {
            return EmitterMode::Pooled;
        }
        if standalone_ok {
            return EmitterMode::Standalone;
        }
    }
    if gpu_required {
        EmitterMode::Disabled
    } else {
        EmitterMode::Cpu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_ladder() {
        use EmitterMode::*;
        // (compute, pooled, standalone, gpu_required) -> mode
        let table = [
            ((true, true, true, false), Pooled),
            ((true, true, true, true), Pooled),
            ((true, false, true, false), Standalone),
            ((true, false, false, false), Cpu),
            ((true, false, false, true), Disabled),
            ((false, false, false, false), Cpu),
            ((false, false, false, true), Disabled),
        ];
        for ((compute, pooled, standalone, required), expected) in table {
            assert_eq!(
                resolve_mode(compute, pooled, standalone, required),
                expected,
                "compute={} pooled={} standalone={} required={}",
                compute,
                pooled,
                standalone,
                required
            );
        }
    }

    #[test]
    fn no_gpu_resolves_to_cpu() {
        let mut allocator = SlotAllocator::new(1024);
        let emitter = Emitter::new(EmitterConfig::new(10.0, 1.0), None, &mut allocator);
        assert_eq!(emitter.mode(), EmitterMode::Cpu);
        // The shared allocator is untouched by a CPU emitter.
        assert_eq!(allocator.stats().allocated, 0);
    }

    #[test]
    fn no_gpu_with_gpu_required_disables() {
        let mut allocator = SlotAllocator::new(1024);
        let config = EmitterConfig::new(10.0, 1.0).gpu_required();
        let mut emitter = Emitter::new(config, None, &mut allocator);
        assert_eq!(emitter.mode(), EmitterMode::Disabled);
        assert!(emitter.draw_source().is_none());
    }

    #[test]
    fn cpu_emitter_simulates_through_update() {
        let mut allocator = SlotAllocator::new(16);
        let mut emitter = Emitter::new(EmitterConfig::new(100.0, 1.0), None, &mut allocator);
        emitter.set_transform(Vec2::new(1.0, 0.0), 0.0);
        for _ in 0..10 {
            emitter.update(0.05, 0, None, None);
        }
        let cpu = emitter.cpu_emitter().unwrap();
        assert!(cpu.active_count() > 0);
    }

    #[test]
    fn clearing_config_empties_output_immediately() {
        let mut allocator = SlotAllocator::new(16);
        let mut emitter = Emitter::new(EmitterConfig::new(100.0, 1.0), None, &mut allocator);
        emitter.update(0.1, 0, None, None);
        assert!(emitter.draw_source().is_some());

        emitter.set_config(None, None, &mut allocator, None);
        assert_eq!(emitter.mode(), EmitterMode::Disabled);
        assert!(emitter.draw_source().is_none());
        // Further updates are no-ops rather than panics.
        emitter.update(0.1, 0, None, None);
    }

    #[test]
    fn config_swap_restarts_emission_clock() {
        let mut allocator = SlotAllocator::new(64);
        let config = EmitterConfig::new(100.0, 10.0).emission_duration(0.2);
        let mut emitter = Emitter::new(config.clone(), None, &mut allocator);
        for _ in 0..10 {
            emitter.update(0.1, 0, None, None);
        }
        let stalled = emitter.cpu_emitter().unwrap().active_count();

        // Re-attaching a config restarts the cutoff clock.
        emitter.set_config(Some(config), None, &mut allocator, None);
        emitter.update(0.1, 0, None, None);
        let restarted = emitter.cpu_emitter().unwrap().active_count();
        assert!(restarted > 0);
        let _ = stalled;
    }

    #[test]
    fn inert_config_spawns_nothing() {
        let mut allocator = SlotAllocator::new(16);
        let mut emitter = Emitter::new(EmitterConfig::new(0.0, 1.0), None, &mut allocator);
        for _ in 0..5 {
            emitter.update(0.1, 0, None, None);
        }
        assert_eq!(emitter.cpu_emitter().unwrap().active_count(), 0);
    }
}
