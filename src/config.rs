//! Emitter configuration.
//!
//! One [`EmitterConfig`] describes a spawn session: how fast particles appear,
//! how long they live, how they look, and where they come from. The config is
//! immutable once attached to an emitter; changing behavior means swapping the
//! whole config, which may re-create the emitter's GPU resources.

use crate::visuals::FillStyle;
use std::f32::consts::TAU;

/// Hard cap on any single emitter's derived capacity.
pub const MAX_EMITTER_PARTICLES: u32 = 65_536;

/// Configuration for one particle emitter. Build with the chained methods:
///
/// ```ignore
/// let config = EmitterConfig::new(120.0, 1.5)
///     .size_range(0.01, 0.03)
///     .speed(0.8, 0.3)
///     .arc(TAU)                     // full circle
///     .fill(FillStyle::ember());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EmitterConfig {
    /// Particles per second.
    pub rate: f32,
    /// Seconds each particle lives.
    pub lifetime: f32,
    /// Seconds into a particle's life at which alpha starts fading. Clamped
    /// to `lifetime`.
    pub fade_start: f32,
    /// Minimum rendered half-extent.
    pub size_min: f32,
    /// Maximum rendered half-extent.
    pub size_max: f32,
    /// Base outward speed.
    pub speed_base: f32,
    /// Uniform speed jitter: actual speed is `base + uniform(-1,1) * variation`,
    /// floored at zero.
    pub speed_variation: f32,
    /// Minimum spawn distance from the emitter origin.
    pub spawn_radius_min: f32,
    /// Maximum spawn distance from the emitter origin.
    pub spawn_radius_max: f32,
    /// Angular extent of the emission fan in radians. `TAU` means a full
    /// circle and ignores `direction`/`spread`.
    pub arc: f32,
    /// Center angle of the emission fan, radians, emitter-local.
    pub direction: f32,
    /// Jitter around `direction`. When zero, the `arc` supplies the jitter.
    pub spread: f32,
    /// Velocity points away from the origin when true; along `direction`
    /// otherwise.
    pub radial_velocity: bool,
    /// Stop emitting (but let live particles finish) after this many seconds.
    /// `None` emits forever.
    pub emission_duration: Option<f32>,
    /// Upper bound on this emitter's particle count.
    pub max_particles: u32,
    /// Refuse the CPU fallback: without a compute-capable device this emitter
    /// is disabled instead.
    pub gpu_required: bool,
    /// Opaque visual fill, forwarded to the renderer.
    pub fill: FillStyle,
}

impl EmitterConfig {
    /// A config emitting `rate` particles per second, each living `lifetime`
    /// seconds. Everything else starts at sensible defaults.
    pub fn new(rate: f32, lifetime: f32) -> Self {
        Self {
            rate,
            lifetime,
            fade_start: 0.0,
            size_min: 0.01,
            size_max: 0.02,
            speed_base: 1.0,
            speed_variation: 0.0,
            spawn_radius_min: 0.0,
            spawn_radius_max: 0.0,
            arc: TAU,
            direction: 0.0,
            spread: 0.0,
            radial_velocity: true,
            emission_duration: None,
            max_particles: MAX_EMITTER_PARTICLES,
            gpu_required: false,
            fill: FillStyle::default(),
        }
    }

    pub fn fade_start(mut self, seconds: f32) -> Self {
        self.fade_start = seconds.max(0.0);
        self
    }

    pub fn size_range(mut self, min: f32, max: f32) -> Self {
        self.size_min = min.max(0.0);
        self.size_max = max.max(self.size_min);
        self
    }

    pub fn speed(mut self, base: f32, variation: f32) -> Self {
        self.speed_base = base;
        self.speed_variation = variation.max(0.0);
        self
    }

    pub fn spawn_radius(mut self, min: f32, max: f32) -> Self {
        self.spawn_radius_min = min.max(0.0);
        self.spawn_radius_max = max.max(self.spawn_radius_min);
        self
    }

    /// Emit across an arc of `radians`. `TAU` restores the full circle.
    pub fn arc(mut self, radians: f32) -> Self {
        self.arc = radians.clamp(0.0, TAU);
        self
    }

    /// Emit in a fan of `spread` radians centered on `direction`.
    pub fn directed(mut self, direction: f32, spread: f32) -> Self {
        self.direction = direction;
        self.spread = spread.max(0.0);
        self.arc = 0.0;
        self
    }

    /// Velocity along `direction` instead of radially outward.
    pub fn linear_velocity(mut self) -> Self {
        self.radial_velocity = false;
        self
    }

    pub fn emission_duration(mut self, seconds: f32) -> Self {
        self.emission_duration = Some(seconds.max(0.0));
        self
    }

    pub fn max_particles(mut self, max: u32) -> Self {
        self.max_particles = max.min(MAX_EMITTER_PARTICLES);
        self
    }

    pub fn gpu_required(mut self) -> Self {
        self.gpu_required = true;
        self
    }

    pub fn fill(mut self, fill: FillStyle) -> Self {
        self.fill = fill;
        self
    }

    /// Slots this emitter needs: enough to hold one lifetime's worth of
    /// production at the configured rate, plus one for rounding, capped by
    /// `max_particles`.
    pub fn derived_capacity(&self) -> u32 {
        if self.is_inert() {
            return 0;
        }
        let steady = (self.rate * self.lifetime).ceil() as u32 + 1;
        steady.min(self.max_particles)
    }

    /// Zero rate or zero lifetime produces nothing; the emitter resolves to a
    /// benign no-op instead of an error.
    pub fn is_inert(&self) -> bool {
        self.rate <= 0.0 || self.lifetime <= 0.0 || self.max_particles == 0
    }

    /// Fade start as a fraction of lifetime, for the render uniform.
    pub fn fade_start_frac(&self) -> f32 {
        if self.lifetime <= 0.0 {
            0.0
        } else {
            (self.fade_start / self.lifetime).clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_capacity_matches_rate_times_lifetime() {
        let config = EmitterConfig::new(50.0, 1.0);
        assert_eq!(config.derived_capacity(), 51);

        let config = EmitterConfig::new(1000.0, 2.0).max_particles(100);
        assert_eq!(config.derived_capacity(), 100);
    }

    #[test]
    fn inert_configs() {
        assert!(EmitterConfig::new(0.0, 1.0).is_inert());
        assert!(EmitterConfig::new(10.0, 0.0).is_inert());
        assert!(EmitterConfig::new(10.0, 1.0).max_particles(0).is_inert());
        assert!(!EmitterConfig::new(10.0, 1.0).is_inert());
        assert_eq!(EmitterConfig::new(0.0, 1.0).derived_capacity(), 0);
    }

    #[test]
    fn builder_clamps() {
        let config = EmitterConfig::new(10.0, 1.0)
            .size_range(0.05, 0.01)
            .spawn_radius(0.2, 0.1)
            .arc(100.0);
        assert!(config.size_max >= config.size_min);
        assert!(config.spawn_radius_max >= config.spawn_radius_min);
        assert!(config.arc <= TAU);
    }

    #[test]
    fn fade_start_fraction() {
        let config = EmitterConfig::new(10.0, 2.0).fade_start(0.5);
        assert!((config.fade_start_frac() - 0.25).abs() < 1e-6);

        let config = EmitterConfig::new(10.0, 2.0).fade_start(10.0);
        assert_eq!(config.fade_start_frac(), 1.0);
    }
}
