//! CPU fallback emitter.
//!
//! When no compute-capable device exists (or an emitter opts out of pooling),
//! particles are simulated in plain Rust: an ordered, compactable list of
//! records, an exact spawn accumulator instead of stochastic admission, and a
//! flat quad-geometry output the renderer can upload as ordinary vertices.
//!
//! The output length is always `capacity * 6` vertices: live particles first,
//! then a transparent "inactive tail" quad replicated across the unused
//! capacity. The tail is cached and rebuilt only when origin, fill, or
//! capacity actually change.

use crate::config::EmitterConfig;
use crate::spawn::{hash, lerp, rand01, sample_speed, spawn_angle};
use crate::visuals::FillUniform;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// One live CPU particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuParticle {
    pub position: Vec2,
    pub velocity: Vec2,
    pub age: f32,
    pub lifetime: f32,
    pub size: f32,
}

/// Per-particle motion hook for the CPU path.
///
/// The compute kernel has no equivalent: its integrator is fixed. This
/// asymmetry is deliberate - a per-particle callback is only affordable where
/// the particles already live on the CPU.
pub trait Integrator {
    fn integrate(&self, particle: &mut CpuParticle, delta: f32);
}

/// Default integrator: straight-line motion, matching the compute kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearIntegrator;

impl Integrator for LinearIntegrator {
    fn integrate(&self, particle: &mut CpuParticle, delta: f32) {
        particle.position += particle.velocity * delta;
    }
}

/// One output vertex. Six per quad, `capacity * 6` per emitter.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    /// Quad-local corner in `[-1, 1]^2`, used for gradient lookup.
    pub corner: [f32; 2],
    pub alpha: f32,
}

pub const QUAD_VERTEX_STRIDE: usize = std::mem::size_of::<QuadVertex>();

const QUAD_CORNERS: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [-1.0, 1.0],
    [-1.0, 1.0],
    [1.0, -1.0],
    [1.0, 1.0],
];

/// Alpha fade: opaque until `fade_start`, then a linear ramp to zero at
/// `lifetime`. Never negative, never above one.
pub fn fade_alpha(age: f32, lifetime: f32, fade_start: f32) -> f32 {
    if age <= fade_start {
        return 1.0;
    }
    let span = (lifetime - fade_start).max(1e-3);
    1.0 - ((age - fade_start) / span).clamp(0.0, 1.0)
}

/// Self-contained CPU particle emitter.
pub struct CpuEmitter {
    config: EmitterConfig,
    capacity: u32,
    particles: Vec<CpuParticle>,
    integrator: Box<dyn Integrator>,
    accumulator: f32,
    /// Seconds since this emitter started, for the emission-duration cutoff.
    emitter_age: f32,
    /// Counter feeding the deterministic spawn RNG.
    spawn_serial: u32,
    origin: Vec2,
    rotation: f32,
    fill: FillUniform,
    geometry: Vec<QuadVertex>,
    tail: Vec<QuadVertex>,
    tail_dirty: bool,
    tail_rebuilds: u32,
}

impl CpuEmitter {
    pub fn new(config: EmitterConfig) -> Self {
        let capacity = config.derived_capacity();
        let fill = config.fill.to_uniform(config.fade_start_frac());
        Self {
            config,
            capacity,
            particles: Vec::with_capacity(capacity as usize),
            integrator: Box::new(LinearIntegrator),
            accumulator: 0.0,
            emitter_age: 0.0,
            spawn_serial: 0,
            origin: Vec2::ZERO,
            rotation: 0.0,
            fill,
            geometry: Vec::new(),
            tail: Vec::new(),
            tail_dirty: true,
            tail_rebuilds: 0,
        }
    }

    /// Replace the motion integrator.
    pub fn with_integrator(mut self, integrator: Box<dyn Integrator>) -> Self {
        self.integrator = integrator;
        self
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn active_count(&self) -> usize {
        self.particles.len()
    }

    pub fn particles(&self) -> &[CpuParticle] {
        &self.particles
    }

    /// Advance one frame: age and integrate live particles, compact out the
    /// dead, then spawn from the accumulator budget.
    pub fn update(&mut self, delta: f32, origin: Vec2, rotation: f32) {
        if origin != self.origin {
            self.origin = origin;
            self.tail_dirty = true;
        }
        self.rotation = rotation;

        // Age and integrate, compacting in place. Order is preserved so the
        // oldest particles stay at the front of the draw order.
        let mut write = 0;
        for read in 0..self.particles.len() {
            let mut p = self.particles[read];
            p.age += delta;
            if p.age >= p.lifetime {
                continue;
            }
            self.integrator.integrate(&mut p, delta);
            self.particles[write] = p;
            write += 1;
        }
        self.particles.truncate(write);

        // Emission stops contributing once the cutoff passes, but particles
        // already alive keep living out their lifetime.
        let previous_age = self.emitter_age;
        self.emitter_age += delta;
        let emitting_secs = match self.config.emission_duration {
            Some(cutoff) => (cutoff - previous_age).clamp(0.0, delta),
            None => delta,
        };

        self.accumulator += self.config.rate * emitting_secs;
        let available = self.capacity as usize - self.particles.len();
        let budget = (self.accumulator.floor() as usize).min(available);
        for _ in 0..budget {
            self.spawn_one();
        }
        self.accumulator -= budget as f32;
        // Backpressure: a starved emitter must not bank unbounded credit.
        let available = self.capacity as usize - self.particles.len();
        self.accumulator = self.accumulator.min(available as f32);
    }

    fn spawn_one(&mut self) {
        let seed = hash(self.spawn_serial);
        self.spawn_serial = self.spawn_serial.wrapping_add(1);
        let c = &self.config;

        let theta = spawn_angle(c.arc, c.direction, c.spread, rand01(seed)) + self.rotation;
        let speed = sample_speed(c.speed_base, c.speed_variation, rand01(seed.wrapping_add(1)));
        let size = lerp(c.size_min, c.size_max, rand01(seed.wrapping_add(2)));
        let radius = lerp(
            c.spawn_radius_min,
            c.spawn_radius_max,
            rand01(seed.wrapping_add(3)),
        );
        let vel_angle = if c.radial_velocity {
            theta
        } else {
            c.direction + self.rotation
        };

        self.particles.push(CpuParticle {
            position: self.origin + radius * Vec2::new(theta.cos(), theta.sin()),
            velocity: speed * Vec2::new(vel_angle.cos(), vel_angle.sin()),
            age: 0.0,
            lifetime: c.lifetime,
            size,
        });
    }

    /// Flat quad geometry for the current frame: one quad per live particle
    /// followed by the cached transparent tail for every unused slot.
    pub fn geometry(&mut self) -> &[QuadVertex] {
        if self.tail_dirty {
            self.rebuild_tail();
        }

        self.geometry.clear();
        for p in &self.particles {
            let alpha = fade_alpha(p.age, p.lifetime, self.config.fade_start);
            for corner in QUAD_CORNERS {
                self.geometry.push(QuadVertex {
                    position: [
                        p.position.x + corner[0] * p.size,
                        p.position.y + corner[1] * p.size,
                    ],
                    corner,
                    alpha,
                });
            }
        }
        let unused = self.capacity as usize - self.particles.len();
        self.geometry.extend_from_slice(&self.tail[..unused * 6]);
        &self.geometry
    }

    /// The render uniform for this emitter's fill.
    pub fn fill_uniform(&self) -> FillUniform {
        self.fill
    }

    fn rebuild_tail(&mut self) {
        self.tail.clear();
        for _ in 0..self.capacity {
            for corner in QUAD_CORNERS {
                self.tail.push(QuadVertex {
                    position: self.origin.to_array(),
                    corner,
                    alpha: 0.0,
                });
            }
        }
        self.tail_dirty = false;
        self.tail_rebuilds += 1;
    }

    #[cfg(test)]
    fn tail_rebuild_count(&self) -> u32 {
        self.tail_rebuilds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rate: f32, lifetime: f32) -> EmitterConfig {
        EmitterConfig::new(rate, lifetime).speed(1.0, 0.0)
    }

    #[test]
    fn ages_increase_and_particles_die_once() {
        let mut e = CpuEmitter::new(config(1.0, 0.1));
        // Force one particle and watch it through its whole life.
        e.update(1.0, Vec2::ZERO, 0.0);
        assert_eq!(e.active_count(), 1);

        let mut last_age = e.particles()[0].age;
        let mut frames_alive = 0;
        for _ in 0..20 {
            e.update(0.016, Vec2::ZERO, 0.0);
            // Cap further spawning by rate: 1/sec over 16ms accrues < 1.
            if let Some(p) = e.particles().first() {
                assert!(p.age > last_age, "age must strictly increase");
                last_age = p.age;
                frames_alive += 1;
            } else {
                break;
            }
        }
        // 0.1s lifetime at 16ms steps: dead on the 7th frame at the latest.
        assert!(frames_alive <= 7);
        assert_eq!(e.active_count(), 0);
    }

    #[test]
    fn active_count_never_exceeds_capacity() {
        let mut e = CpuEmitter::new(config(100_000.0, 10.0).max_particles(64));
        assert_eq!(e.capacity(), 64);
        for _ in 0..50 {
            e.update(0.1, Vec2::ZERO, 0.0);
            assert!(e.active_count() <= 64);
        }
        assert_eq!(e.active_count(), 64);
    }

    #[test]
    fn steady_state_approaches_rate_times_lifetime() {
        // capacity 100, rate 50/s, lifetime 1s, dt 16ms: active count settles
        // at ~50 and stays there.
        let mut e = CpuEmitter::new(config(50.0, 1.0).max_particles(100));
        for _ in 0..62 {
            e.update(0.016, Vec2::ZERO, 0.0);
        }
        let after_1s = e.active_count();
        assert!(
            (45..=51).contains(&after_1s),
            "after 1s: {} active",
            after_1s
        );

        for _ in 0..200 {
            e.update(0.016, Vec2::ZERO, 0.0);
            let n = e.active_count();
            assert!((45..=51).contains(&n), "steady state drifted: {}", n);
        }
    }

    #[test]
    fn emission_cutoff_stops_spawning_but_not_living() {
        let cfg = config(100.0, 2.0).emission_duration(0.5);
        let mut e = CpuEmitter::new(cfg);
        for _ in 0..40 {
            e.update(0.025, Vec2::ZERO, 0.0); // 1.0s total
        }
        let at_cutoff = e.active_count();
        assert!(at_cutoff > 0);

        // No new spawns past the cutoff; survivors keep aging.
        e.update(0.025, Vec2::ZERO, 0.0);
        assert!(e.active_count() <= at_cutoff);

        // All particles are gone once the last spawn's lifetime passes.
        for _ in 0..100 {
            e.update(0.025, Vec2::ZERO, 0.0);
        }
        assert_eq!(e.active_count(), 0);
    }

    #[test]
    fn fade_alpha_rule() {
        // Opaque through fade_start.
        assert_eq!(fade_alpha(0.0, 2.0, 1.0), 1.0);
        assert_eq!(fade_alpha(1.0, 2.0, 1.0), 1.0);
        // Linear ramp to zero at lifetime.
        assert!((fade_alpha(1.5, 2.0, 1.0) - 0.5).abs() < 1e-5);
        assert!(fade_alpha(2.0, 2.0, 1.0).abs() < 1e-5);
        // Never negative, never above one.
        assert_eq!(fade_alpha(10.0, 2.0, 1.0), 0.0);
        assert_eq!(fade_alpha(0.0, 2.0, 0.0), 1.0);
    }

    #[test]
    fn geometry_spans_full_capacity() {
        let mut e = CpuEmitter::new(config(10.0, 1.0).max_particles(8));
        let capacity = e.capacity() as usize;
        e.update(0.5, Vec2::new(1.0, 2.0), 0.0);
        let active = e.active_count();
        let verts = e.geometry();
        assert_eq!(verts.len(), capacity * 6);
        // Tail vertices are fully transparent.
        for v in &verts[active * 6..] {
            assert_eq!(v.alpha, 0.0);
        }
    }

    #[test]
    fn tail_is_cached_until_origin_moves() {
        let mut e = CpuEmitter::new(config(10.0, 1.0).max_particles(8));
        e.update(0.016, Vec2::ZERO, 0.0);
        e.geometry();
        e.update(0.016, Vec2::ZERO, 0.0);
        e.geometry();
        assert_eq!(e.tail_rebuild_count(), 1);

        e.update(0.016, Vec2::new(5.0, 0.0), 0.0);
        e.geometry();
        assert_eq!(e.tail_rebuild_count(), 2);
    }

    #[test]
    fn custom_integrator_is_applied() {
        struct Sinker;
        impl Integrator for Sinker {
            fn integrate(&self, particle: &mut CpuParticle, delta: f32) {
                particle.velocity.y -= 10.0 * delta;
                particle.position += particle.velocity * delta;
            }
        }

        let mut e = CpuEmitter::new(config(1.0, 5.0)).with_integrator(Box::new(Sinker));
        e.update(1.0, Vec2::ZERO, 0.0); // spawns one particle
        e.update(0.1, Vec2::ZERO, 0.0);
        let p = e.particles()[0];
        assert!(p.velocity.y < 0.0);
    }
}
