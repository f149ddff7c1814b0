//! Per-frame spawn requests and the deterministic spawn RNG.
//!
//! A pooled emitter never touches slots directly. Each frame it submits one
//! [`SpawnRequest`] describing how many particles it wants and how they should
//! be initialized; the compute kernel decides per slot, using a hash seeded by
//! `(slot index, frame time)` so the scheme needs no CPU-side free list.
//!
//! The hash here is bit-identical to the one embedded in the generated WGSL
//! (see [`crate::gpu::pool`]); the reference step in [`crate::sim`] relies on
//! that to reproduce kernel decisions on the CPU.

use crate::alloc::SlotRange;
use crate::config::EmitterConfig;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use std::f32::consts::TAU;

/// One emitter's spawn work for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    /// The slot range owned by the requesting emitter.
    pub range: SlotRange,
    /// Spawn budget for this frame. Fractional budgets are allowed; the
    /// admission probability is `spawn_count / range.count`.
    pub spawn_count: f32,
    /// Emitter origin in world space.
    pub origin: Vec2,
    /// Emitter rotation in radians, added to every spawn angle.
    pub rotation: f32,
    pub lifetime: f32,
    pub speed_base: f32,
    pub speed_variation: f32,
    pub size_min: f32,
    pub size_max: f32,
    pub spawn_radius_min: f32,
    pub spawn_radius_max: f32,
    pub arc: f32,
    pub direction: f32,
    pub spread: f32,
    pub radial_velocity: bool,
}

impl SpawnRequest {
    /// Build a request from an emitter's config and current transform.
    pub fn from_config(
        config: &EmitterConfig,
        range: SlotRange,
        spawn_count: f32,
        origin: Vec2,
        rotation: f32,
    ) -> Self {
        Self {
            range,
            spawn_count,
            origin,
            rotation,
            lifetime: config.lifetime,
            speed_base: config.speed_base,
            speed_variation: config.speed_variation,
            size_min: config.size_min,
            size_max: config.size_max,
            spawn_radius_min: config.spawn_radius_min,
            spawn_radius_max: config.spawn_radius_max,
            arc: config.arc,
            direction: config.direction,
            spread: config.spread,
            radial_velocity: config.radial_velocity,
        }
    }

    /// Admission probability per inactive slot in the range.
    pub fn admission_probability(&self) -> f32 {
        if self.range.count == 0 {
            return 0.0;
        }
        (self.spawn_count / self.range.count as f32).clamp(0.0, 1.0)
    }

    pub fn to_gpu(&self) -> SpawnRequestGpu {
        SpawnRequestGpu {
            origin: self.origin.to_array(),
            range_start: self.range.start,
            range_count: self.range.count,
            spawn_count: self.spawn_count,
            lifetime: self.lifetime,
            speed_base: self.speed_base,
            speed_variation: self.speed_variation,
            size_min: self.size_min,
            size_max: self.size_max,
            radius_min: self.spawn_radius_min,
            radius_max: self.spawn_radius_max,
            arc: self.arc,
            direction: self.direction,
            spread: self.spread,
            rotation: self.rotation,
            use_radial: self.radial_velocity as u32,
            _pad: [0; 3],
        }
    }
}

/// GPU mirror of [`SpawnRequest`]. 80 bytes, matches the WGSL struct in the
/// generated compute shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SpawnRequestGpu {
    pub origin: [f32; 2],
    pub range_start: u32,
    pub range_count: u32,
    pub spawn_count: f32,
    pub lifetime: f32,
    pub speed_base: f32,
    pub speed_variation: f32,
    pub size_min: f32,
    pub size_max: f32,
    pub radius_min: f32,
    pub radius_max: f32,
    pub arc: f32,
    pub direction: f32,
    pub spread: f32,
    pub rotation: f32,
    pub use_radial: u32,
    pub _pad: [u32; 3],
}

/// WGSL mirror of [`SpawnRequestGpu`].
pub const SPAWN_REQUEST_WGSL: &str = r#"struct SpawnRequest {
    origin: vec2<f32>,
    range_start: u32,
    range_count: u32,
    spawn_count: f32,
    lifetime: f32,
    speed_base: f32,
    speed_variation: f32,
    size_min: f32,
    size_max: f32,
    radius_min: f32,
    radius_max: f32,
    arc: f32,
    direction: f32,
    spread: f32,
    rotation: f32,
    use_radial: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}"#;

// ============================================================================
// Deterministic spawn RNG (CPU mirror of the kernel's hash)
// ============================================================================

/// Integer hash, identical to the `hash` function in the generated WGSL.
pub fn hash(n: u32) -> u32 {
    let mut x = n;
    x ^= x >> 17;
    x = x.wrapping_mul(0xed5a_d4bb);
    x ^= x >> 11;
    x = x.wrapping_mul(0xac4c_1b51);
    x ^= x >> 15;
    x = x.wrapping_mul(0x3184_8bab);
    x ^= x >> 14;
    x
}

/// Uniform value in `[0, 1]` from a seed, identical to the WGSL `rand`.
pub fn rand01(seed: u32) -> f32 {
    hash(seed) as f32 / u32::MAX as f32
}

/// Seed for one slot's spawn decision on one frame.
pub fn slot_seed(slot_index: u32, frame_millis: u32) -> u32 {
    slot_index ^ hash(frame_millis)
}

/// Spawn angle rule: full circle when the arc covers it, otherwise a fan
/// around `direction` using `spread` when set and the arc width otherwise.
pub fn spawn_angle(arc: f32, direction: f32, spread: f32, r: f32) -> f32 {
    const FULL_CIRCLE: f32 = TAU - 1e-3;
    if arc >= FULL_CIRCLE {
        r * TAU
    } else if spread > 0.0 {
        direction + (r - 0.5) * spread
    } else {
        direction + (r - 0.5) * arc
    }
}

/// Linear interpolation used by the sampling helpers.
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Speed sample: base plus uniform jitter in `[-variation, variation]`,
/// floored at zero.
pub fn sample_speed(base: f32, variation: f32, r: f32) -> f32 {
    (base + (r * 2.0 - 1.0) * variation).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_spreads() {
        assert_eq!(hash(12345), hash(12345));
        assert_ne!(hash(1), hash(2));
        // Outputs cover both halves of the u32 range over a small sample.
        let mut high = 0;
        for i in 0..1000 {
            if hash(i) > u32::MAX / 2 {
                high += 1;
            }
        }
        assert!(high > 300 && high < 700);
    }

    #[test]
    fn rand01_in_unit_interval() {
        for i in 0..10_000 {
            let r = rand01(i);
            assert!((0.0..=1.0).contains(&r));
        }
    }

    #[test]
    fn admission_probability_clamps() {
        let range = SlotRange { start: 0, count: 10 };
        let config = EmitterConfig::new(10.0, 1.0);
        let mut req = SpawnRequest::from_config(&config, range, 5.0, Vec2::ZERO, 0.0);
        assert!((req.admission_probability() - 0.5).abs() < 1e-6);
        req.spawn_count = 100.0;
        assert_eq!(req.admission_probability(), 1.0);
        req.spawn_count = -1.0;
        assert_eq!(req.admission_probability(), 0.0);
    }

    #[test]
    fn full_arc_ignores_direction() {
        let a = spawn_angle(TAU, 9.0, 0.5, 0.25);
        assert!((a - 0.25 * TAU).abs() < 1e-5);
    }

    #[test]
    fn fan_uses_spread_when_set() {
        let a = spawn_angle(1.0, 2.0, 0.5, 1.0);
        assert!((a - 2.25).abs() < 1e-5);

        // Without spread the arc supplies the fan width.
        let a = spawn_angle(1.0, 2.0, 0.0, 0.0);
        assert!((a - 1.5).abs() < 1e-5);
    }

    #[test]
    fn speed_never_negative() {
        assert_eq!(sample_speed(0.1, 5.0, 0.0), 0.0);
        assert!((sample_speed(1.0, 0.5, 1.0) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn gpu_request_layout() {
        assert_eq!(std::mem::size_of::<SpawnRequestGpu>(), 80);
    }
}
