//! Fill styles for particle rendering.
//!
//! A fill describes how one emitter's particles are colored: a solid color or
//! a gradient with up to [`MAX_STOPS`] stops, plus optional procedural noise
//! and filament streaking. The simulation never interprets any of this; it is
//! packed into a uniform and handed to the renderer as-is.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

/// Maximum number of gradient color stops.
pub const MAX_STOPS: usize = 5;

/// Gradient geometry of a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradientKind {
    /// Single color, stops beyond the first ignored.
    #[default]
    Solid,
    /// Blend along the quad's local X axis.
    Linear,
    /// Blend outward from the quad center.
    Radial,
    /// Blend along the L1 distance from the quad center.
    Diamond,
}

impl GradientKind {
    fn index(self) -> u32 {
        match self {
            GradientKind::Solid => 0,
            GradientKind::Linear => 1,
            GradientKind::Radial => 2,
            GradientKind::Diamond => 3,
        }
    }
}

/// One gradient stop: RGBA color at a normalized offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub offset: f32,
    pub color: [f32; 4],
}

/// Visual fill configuration for one emitter.
#[derive(Debug, Clone, PartialEq)]
pub struct FillStyle {
    pub kind: GradientKind,
    /// Up to [`MAX_STOPS`] stops, sorted by offset. Extra stops are dropped.
    pub stops: Vec<ColorStop>,
    /// 0 = smooth gradient, 1 = fully noise-perturbed lookup.
    pub noise: f32,
    /// Streaks the radial falloff into thin filaments. 0 disables.
    pub filament: f32,
}

impl Default for FillStyle {
    fn default() -> Self {
        Self::solid([1.0, 1.0, 1.0, 1.0])
    }
}

impl FillStyle {
    pub fn solid(color: [f32; 4]) -> Self {
        Self {
            kind: GradientKind::Solid,
            stops: vec![ColorStop { offset: 0.0, color }],
            noise: 0.0,
            filament: 0.0,
        }
    }

    pub fn gradient(kind: GradientKind, stops: Vec<ColorStop>) -> Self {
        Self {
            kind,
            stops,
            noise: 0.0,
            filament: 0.0,
        }
    }

    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise.clamp(0.0, 1.0);
        self
    }

    pub fn with_filament(mut self, filament: f32) -> Self {
        self.filament = filament.max(0.0);
        self
    }

    // =========================================================================
    // PRESETS
    // =========================================================================

    /// Warm ember gradient: white core through orange to transparent red.
    pub fn ember() -> Self {
        Self::gradient(
            GradientKind::Radial,
            vec![
                ColorStop { offset: 0.0, color: [1.0, 0.95, 0.8, 1.0] },
                ColorStop { offset: 0.3, color: [1.0, 0.7, 0.2, 1.0] },
                ColorStop { offset: 0.6, color: [0.9, 0.3, 0.05, 0.8] },
                ColorStop { offset: 0.85, color: [0.5, 0.1, 0.0, 0.4] },
                ColorStop { offset: 1.0, color: [0.2, 0.0, 0.0, 0.0] },
            ],
        )
    }

    /// Soft gray smoke puff.
    pub fn smoke() -> Self {
        Self::gradient(
            GradientKind::Radial,
            vec![
                ColorStop { offset: 0.0, color: [0.5, 0.5, 0.5, 0.7] },
                ColorStop { offset: 0.6, color: [0.3, 0.3, 0.3, 0.4] },
                ColorStop { offset: 1.0, color: [0.15, 0.15, 0.15, 0.0] },
            ],
        )
        .with_noise(0.4)
    }

    /// Hard white spark with a blue fringe.
    pub fn spark() -> Self {
        Self::gradient(
            GradientKind::Radial,
            vec![
                ColorStop { offset: 0.0, color: [1.0, 1.0, 1.0, 1.0] },
                ColorStop { offset: 0.5, color: [0.7, 0.8, 1.0, 0.9] },
                ColorStop { offset: 1.0, color: [0.3, 0.4, 1.0, 0.0] },
            ],
        )
        .with_filament(2.0)
    }

    /// Pack this fill plus the fade-start fraction into the render uniform.
    ///
    /// `fade_start_frac` is the fraction of a particle's lifetime at which
    /// alpha starts ramping down (see the CPU fade rule in [`crate::cpu`]).
    pub fn to_uniform(&self, fade_start_frac: f32) -> FillUniform {
        let mut colors = [[0.0f32; 4]; MAX_STOPS];
        let mut offsets = [0.0f32; MAX_STOPS];
        let count = self.stops.len().min(MAX_STOPS);

        for (i, stop) in self.stops.iter().take(MAX_STOPS).enumerate() {
            colors[i] = stop.color;
            offsets[i] = stop.offset.clamp(0.0, 1.0);
        }
        // Degenerate fill: render opaque white rather than nothing.
        if count == 0 {
            colors[0] = [1.0; 4];
        }

        FillUniform {
            colors,
            offsets_a: [offsets[0], offsets[1], offsets[2], offsets[3]],
            params: [
                offsets[4],
                count.max(1) as f32,
                self.kind.index() as f32,
                self.noise,
            ],
            extra: [self.filament, fade_start_frac.clamp(0.0, 1.0), 0.0, 0.0],
        }
    }
}

/// GPU uniform encoding of a [`FillStyle`]. 128 bytes, std140-compatible.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct FillUniform {
    /// RGBA color per stop.
    pub colors: [[f32; 4]; MAX_STOPS],
    /// Offsets of stops 0..4.
    pub offsets_a: [f32; 4],
    /// x = offset of stop 4, y = stop count, z = gradient kind, w = noise.
    pub params: [f32; 4],
    /// x = filament strength, y = fade-start fraction.
    pub extra: [f32; 4],
}

impl FillUniform {
    /// Evaluate the gradient at normalized position `t` on the CPU.
    ///
    /// All rendered colors come from the WGSL `gradient` function in the
    /// render shader; this is its CPU counterpart, kept in lockstep so the
    /// lookup can be inspected and tested without a device.
    pub fn sample(&self, t: f32) -> Vec4 {
        let count = self.params[1] as usize;
        let t = t.clamp(0.0, 1.0);
        if count <= 1 || self.params[2] == 0.0 {
            return Vec4::from_array(self.colors[0]);
        }

        let offset = |i: usize| -> f32 {
            if i < 4 {
                self.offsets_a[i]
            } else {
                self.params[0]
            }
        };

        if t <= offset(0) {
            return Vec4::from_array(self.colors[0]);
        }
        for i in 1..count {
            let (o0, o1) = (offset(i - 1), offset(i));
            if t <= o1 {
                let span = (o1 - o0).max(1e-6);
                let f = (t - o0) / span;
                let a = Vec4::from_array(self.colors[i - 1]);
                let b = Vec4::from_array(self.colors[i]);
                return a.lerp(b, f);
            }
        }
        Vec4::from_array(self.colors[count - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layout() {
        assert_eq!(std::mem::size_of::<FillUniform>(), 128);
        assert_eq!(std::mem::size_of::<FillUniform>() % 16, 0);
    }

    #[test]
    fn solid_samples_constant() {
        let u = FillStyle::solid([0.2, 0.4, 0.6, 1.0]).to_uniform(0.5);
        for t in [0.0, 0.3, 1.0] {
            let c = u.sample(t);
            assert!((c.x - 0.2).abs() < 1e-6);
            assert!((c.w - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn gradient_interpolates_between_stops() {
        let fill = FillStyle::gradient(
            GradientKind::Linear,
            vec![
                ColorStop { offset: 0.0, color: [0.0, 0.0, 0.0, 0.0] },
                ColorStop { offset: 1.0, color: [1.0, 1.0, 1.0, 1.0] },
            ],
        );
        let u = fill.to_uniform(1.0);
        let mid = u.sample(0.5);
        assert!((mid.x - 0.5).abs() < 1e-5);
        assert!((mid.w - 0.5).abs() < 1e-5);
    }

    #[test]
    fn extra_stops_are_dropped() {
        let stops: Vec<ColorStop> = (0..8)
            .map(|i| ColorStop {
                offset: i as f32 / 7.0,
                color: [1.0; 4],
            })
            .collect();
        let u = FillStyle::gradient(GradientKind::Radial, stops).to_uniform(0.0);
        assert_eq!(u.params[1] as usize, MAX_STOPS);
    }

    #[test]
    fn presets_fit_stop_budget() {
        for fill in [FillStyle::ember(), FillStyle::smoke(), FillStyle::spark()] {
            assert!(fill.stops.len() <= MAX_STOPS);
        }
    }
}
