//! The particle slot record shared by every simulation path.
//!
//! A slot is one potential particle, active or not. Both GPU buffers and the
//! WGSL kernel see exactly this layout, so the struct is `#[repr(C)]` Pod and
//! the WGSL mirror below must be kept in lockstep with it.

use bytemuck::{Pod, Zeroable};

/// One particle slot: 8 scalar fields, 32 bytes.
///
/// While `active == 1`, `age < lifetime` holds. An inactive slot's other
/// fields are unspecified until the slot is reused.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Slot {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    /// Seconds since activation.
    pub age: f32,
    /// Seconds this particle lives once activated.
    pub lifetime: f32,
    /// World-space half-extent of the rendered quad.
    pub size: f32,
    /// 1 = active, 0 = inactive.
    pub active: u32,
}

impl Slot {
    /// An inactive slot with zeroed fields, used to seed fresh buffers.
    pub const INACTIVE: Slot = Slot {
        position: [0.0; 2],
        velocity: [0.0; 2],
        age: 0.0,
        lifetime: 0.0,
        size: 0.0,
        active: 0,
    };

    /// Normalized age in `[0, 1]`.
    pub fn age_ratio(&self) -> f32 {
        if self.lifetime <= 0.0 {
            1.0
        } else {
            (self.age / self.lifetime).min(1.0)
        }
    }
}

/// Size of one slot in bytes. Pinned by a test below.
pub const SLOT_STRIDE: usize = std::mem::size_of::<Slot>();

/// WGSL mirror of [`Slot`]. Included verbatim in generated shaders.
///
/// The activity flag is spelled `alive` on the WGSL side because `active`
/// is a reserved word there. Layout is what matters; names are per-language.
pub const SLOT_WGSL: &str = r#"struct Slot {
    position: vec2<f32>,
    velocity: vec2<f32>,
    age: f32,
    lifetime: f32,
    size: f32,
    alive: u32,
}"#;

/// Byte offset of `age` within the slot, for vertex attribute setup.
pub const AGE_OFFSET: u32 = 16;
/// Byte offset of `lifetime`.
pub const LIFETIME_OFFSET: u32 = 20;
/// Byte offset of `size`.
pub const SIZE_OFFSET: u32 = 24;
/// Byte offset of `active`.
pub const ACTIVE_OFFSET: u32 = 28;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_layout() {
        assert_eq!(std::mem::size_of::<Slot>(), 32);
        assert_eq!(std::mem::align_of::<Slot>(), 4);
        assert_eq!(SLOT_STRIDE, 32);
    }

    #[test]
    fn slot_field_offsets() {
        let s = Slot::INACTIVE;
        let base = &s as *const Slot as usize;
        assert_eq!(&s.age as *const f32 as usize - base, AGE_OFFSET as usize);
        assert_eq!(
            &s.lifetime as *const f32 as usize - base,
            LIFETIME_OFFSET as usize
        );
        assert_eq!(&s.size as *const f32 as usize - base, SIZE_OFFSET as usize);
        assert_eq!(
            &s.active as *const u32 as usize - base,
            ACTIVE_OFFSET as usize
        );
    }

    #[test]
    fn wgsl_mirror_avoids_reserved_names() {
        // `active` is reserved in WGSL; the mirror spells the flag `alive`.
        assert!(SLOT_WGSL.contains("alive: u32"));
        assert!(!SLOT_WGSL.contains("active"));
    }

    #[test]
    fn age_ratio_clamps() {
        let mut s = Slot::INACTIVE;
        s.lifetime = 2.0;
        s.age = 1.0;
        assert!((s.age_ratio() - 0.5).abs() < 1e-6);
        s.age = 5.0;
        assert_eq!(s.age_ratio(), 1.0);
        s.lifetime = 0.0;
        assert_eq!(s.age_ratio(), 1.0);
    }
}
