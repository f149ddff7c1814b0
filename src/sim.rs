//! Reference semantics of the simulation kernel.
//!
//! The compute shader in [`crate::gpu::pool`] is generated from the rules in
//! this module: advance every slot, then stochastically admit new particles
//! into inactive slots covered by a spawn request. Keeping the rules here in
//! plain Rust pins down the contract (and its edge cases) where tests can
//! reach it without a GPU; the WGSL uses the same hash, so both paths make
//! the same decisions given the same inputs.
//!
//! The admission scheme is stochastic by design: a request for N particles
//! yields N only in expectation across a mostly-empty range, and fewer as the
//! range fills up. That bias is accepted; it is what removes per-particle
//! CPU bookkeeping from the hot path.

use crate::slot::Slot;
use crate::spawn::{lerp, rand01, sample_speed, slot_seed, spawn_angle, SpawnRequest};

/// Advance one slot by `delta` seconds.
///
/// Active slots age; a slot whose age reaches its lifetime deactivates (age
/// reset to zero) in the same step, otherwise its position integrates.
/// Inactive slots are untouched.
pub fn advance(slot: &mut Slot, delta: f32) {
    if slot.active == 0 {
        return;
    }
    slot.age += delta;
    if slot.age >= slot.lifetime {
        slot.active = 0;
        slot.age = 0.0;
    } else {
        slot.position[0] += slot.velocity[0] * delta;
        slot.position[1] += slot.velocity[1] * delta;
    }
}

/// Attempt stochastic admission of a new particle into an inactive slot.
///
/// Draws a deterministic uniform value seeded by `(slot index, frame time)`
/// and admits when it falls under `spawn_count / range_capacity`. Returns
/// whether the slot was activated.
pub fn try_admit(
    slot: &mut Slot,
    slot_index: u32,
    request: &SpawnRequest,
    frame_millis: u32,
) -> bool {
    let p = request.admission_probability();
    if p <= 0.0 {
        return false;
    }
    let seed = slot_seed(slot_index, frame_millis);
    if rand01(seed) >= p {
        return false;
    }
    activate(slot, seed, request);
    true
}

/// Initialize a freshly admitted particle. The draw order (angle, speed,
/// size, radius) matches the generated WGSL exactly.
fn activate(slot: &mut Slot, seed: u32, request: &SpawnRequest) {
    let theta = spawn_angle(
        request.arc,
        request.direction,
        request.spread,
        rand01(seed.wrapping_add(1)),
    ) + request.rotation;
    let speed = sample_speed(
        request.speed_base,
        request.speed_variation,
        rand01(seed.wrapping_add(2)),
    );
    let size = lerp(
        request.size_min,
        request.size_max,
        rand01(seed.wrapping_add(3)),
    );
    let radius = lerp(
        request.spawn_radius_min,
        request.spawn_radius_max,
        rand01(seed.wrapping_add(4)),
    );

    let vel_angle = if request.radial_velocity {
        theta
    } else {
        request.direction + request.rotation
    };

    slot.position = [
        request.origin.x + radius * theta.cos(),
        request.origin.y + radius * theta.sin(),
    ];
    slot.velocity = [speed * vel_angle.cos(), speed * vel_angle.sin()];
    slot.age = 0.0;
    slot.lifetime = request.lifetime;
    slot.size = size;
    slot.active = 1;
}

/// One full double-buffered step: read every slot from `src`, write its
/// post-step state to `dst`. This is the whole-pool pass; idle ranges
/// advance (trivially) together with active ones.
pub fn step(
    src: &[Slot],
    dst: &mut [Slot],
    delta: f32,
    requests: &[SpawnRequest],
    frame_millis: u32,
) {
    debug_assert_eq!(src.len(), dst.len());
    for (i, out) in dst.iter_mut().enumerate() {
        let mut slot = src[i];
        advance(&mut slot, delta);
        if slot.active == 0 {
            for request in requests {
                if request.spawn_count > 0.0
                    && request.range.contains(i as u32)
                    && try_admit(&mut slot, i as u32, request, frame_millis)
                {
                    break;
                }
            }
        }
        *out = slot;
    }
}
