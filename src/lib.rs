//! # Cinder
//!
//! GPU-pooled 2D particle effects: many emitters, one pair of device buffers,
//! one compute dispatch per frame.
//!
//! Emitters don't own particle storage. A [`SlotAllocator`] hands each one a
//! contiguous range of slots inside a shared [`ParticlePool`], and the pool's
//! double-buffered compute kernel advances every slot and spawns new particles
//! in the same pass. Spawning is probabilistic: an emitter asks for "12.8
//! particles this frame" and each inactive slot in its range rolls a
//! deterministic die, so no per-particle CPU bookkeeping survives into the
//! hot path.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cinder::{Emitter, EmitterConfig, FillStyle, GpuContext, ParticlePool, SlotAllocator};
//!
//! let gpu = GpuContext::new_blocking().ok();
//! let mut allocator = SlotAllocator::new(65_536);
//! let mut pool = gpu
//!     .as_ref()
//!     .map(|g| ParticlePool::new(g, allocator.capacity()).unwrap());
//!
//! let mut sparks = Emitter::new(
//!     EmitterConfig::new(400.0, 1.2)
//!         .size_range(0.005, 0.015)
//!         .speed(0.6, 0.3)
//!         .fill(FillStyle::spark()),
//!     gpu.as_ref(),
//!     &mut allocator,
//! );
//!
//! // Per frame:
//! // sparks.update(delta, clock.seed_millis(), gpu.as_ref(), pool.as_mut());
//! // pool.step(gpu, delta, clock.seed_millis());
//! ```
//!
//! ## Degradation ladder
//!
//! Creating an emitter never fails. When the shared pool has no room it gets
//! a private pool; without a compute-capable device it simulates on the CPU;
//! a config that insists on the GPU disables itself instead. See
//! [`EmitterMode`].
//!
//! ## Determinism
//!
//! The in-kernel RNG is a pure integer hash of `(slot index, frame time)`.
//! [`sim`] carries the same rules in plain Rust, so the kernel's behavior is
//! testable without a device.

mod alloc;
mod config;
pub mod cpu;
mod emitter;
mod error;
mod gpu;
mod render;
pub mod sim;
mod slot;
mod spawn;
pub mod time;
pub mod visuals;

pub use alloc::{PoolStats, RangeHandle, SlotAllocator, SlotRange, WRITE_ALIGN};
pub use config::{EmitterConfig, MAX_EMITTER_PARTICLES};
pub use cpu::{CpuEmitter, Integrator, LinearIntegrator, QuadVertex};
pub use emitter::{DrawSource, Emitter, EmitterMode};
pub use error::{GpuError, PoolError};
pub use glam::{Vec2, Vec4};
pub use gpu::{GpuContext, ParticlePool, MAX_POOL_CAPACITY, MAX_SPAWN_REQUESTS};
pub use render::{EmitterBinding, Renderer};
pub use slot::{Slot, SLOT_STRIDE};
pub use spawn::SpawnRequest;
pub use time::FrameClock;
pub use visuals::{ColorStop, FillStyle, FillUniform, GradientKind, MAX_STOPS};

// Shader sources are exported for offline validation.
pub use gpu::step_shader_source;
pub use render::render_shader_source;
