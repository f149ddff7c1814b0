//! GPU-resident particle pool.
//!
//! Two storage buffers of [`Slot`] records, double-buffered: every frame one
//! compute dispatch reads each slot from the source buffer, advances it, and
//! writes the result to the destination buffer, which then becomes the vertex
//! buffer for rendering. Spawning happens inside the same kernel: emitters
//! queue [`SpawnRequest`]s, and each inactive slot inside a requested range
//! rolls a deterministic die to decide whether to come alive this frame.
//!
//! The pool knows nothing about emitters or ranges beyond the requests it is
//! handed; range ownership lives in [`crate::alloc::SlotAllocator`].

use crate::error::PoolError;
use crate::gpu::{GpuContext, WORKGROUP_SIZE};
use crate::slot::{Slot, SLOT_STRIDE, SLOT_WGSL};
use crate::spawn::{SpawnRequest, SpawnRequestGpu, SPAWN_REQUEST_WGSL};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

/// Hard ceiling on pool capacity, independent of device limits.
pub const MAX_POOL_CAPACITY: u32 = 200_000;

/// Spawn requests accepted per frame. Extras are dropped with a warning.
pub const MAX_SPAWN_REQUESTS: usize = 32;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct StepUniforms {
    delta_time: f32,
    seed: u32,
    request_count: u32,
    slot_count: u32,
}

pub struct ParticlePool {
    capacity: u32,
    buffers: [wgpu::Buffer; 2],
    /// Index of the buffer holding the most recent step's output.
    current: usize,
    uniform_buffer: wgpu::Buffer,
    request_buffer: wgpu::Buffer,
    bind_groups: [wgpu::BindGroup; 2],
    pipeline: wgpu::ComputePipeline,
    pending: Vec<SpawnRequest>,
    dropped_this_frame: u32,
}

impl ParticlePool {
    /// Create a pool of `capacity` slots, all inactive.
    pub fn new(ctx: &GpuContext, capacity: u32) -> Result<Self, PoolError> {
        validate_capacity(capacity, &ctx.limits())?;

        let seed_slots = vec![Slot::INACTIVE; capacity as usize];
        let buffers = [0, 1].map(|i| {
            ctx.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("Slot Buffer {}", i)),
                    contents: bytemuck::cast_slice(&seed_slots),
                    usage: wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::VERTEX
                        | wgpu::BufferUsages::COPY_DST,
                })
        });

        let uniform_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Step Uniforms"),
                contents: bytemuck::bytes_of(&StepUniforms {
                    delta_time: 0.0,
                    seed: 0,
                    request_count: 0,
                    slot_count: capacity,
                }),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let request_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Spawn Requests"),
            size: (MAX_SPAWN_REQUESTS * std::mem::size_of::<SpawnRequestGpu>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let shader = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Pool Step Shader"),
                source: wgpu::ShaderSource::Wgsl(step_shader_source().into()),
            });

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Pool Step Bind Group Layout"),
                    entries: &[
                        storage_entry(0, true),
                        storage_entry(1, false),
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                        storage_entry(3, true),
                    ],
                });

        // One bind group per flip direction, so stepping only swaps an index.
        let bind_groups = [0usize, 1].map(|src| {
            ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Pool Step Bind Group"),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffers[src].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: buffers[1 - src].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: request_buffer.as_entire_binding(),
                    },
                ],
            })
        });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Pool Step Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = ctx
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Pool Step Pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader,
                entry_point: Some("step"),
                compilation_options: Default::default(),
                cache: None,
            });

        Ok(Self {
            capacity,
            buffers,
            current: 0,
            uniform_buffer,
            request_buffer,
            bind_groups,
            pipeline,
            pending: Vec::with_capacity(MAX_SPAWN_REQUESTS),
            dropped_this_frame: 0,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The buffer holding the latest simulation output. Valid as a vertex
    /// buffer until the next [`ParticlePool::step`].
    pub fn current_buffer(&self) -> &wgpu::Buffer {
        &self.buffers[self.current]
    }

    /// Queue a spawn request for the next step. The per-frame list is
    /// bounded; requests past the bound are dropped.
    pub fn queue_spawn(&mut self, request: SpawnRequest) {
        if self.pending.len() >= MAX_SPAWN_REQUESTS {
            if self.dropped_this_frame == 0 {
                log::warn!(
                    "spawn request list full ({} per frame), dropping extras",
                    MAX_SPAWN_REQUESTS
                );
            }
            self.dropped_this_frame += 1;
            return;
        }
        self.pending.push(request);
    }

    /// Run one simulation step over the whole pool.
    ///
    /// `seed_millis` feeds the in-kernel RNG; pass whole milliseconds of
    /// elapsed time so consecutive frames draw independent values.
    pub fn step(&mut self, ctx: &GpuContext, delta: f32, seed_millis: u32) {
        let uniforms = StepUniforms {
            delta_time: delta,
            seed: seed_millis,
            request_count: self.pending.len() as u32,
            slot_count: self.capacity,
        };
        ctx.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        if !self.pending.is_empty() {
            let gpu_requests: Vec<SpawnRequestGpu> =
                self.pending.iter().map(SpawnRequest::to_gpu).collect();
            ctx.queue
                .write_buffer(&self.request_buffer, 0, bytemuck::cast_slice(&gpu_requests));
        }

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Pool Step Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Pool Step"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_groups[self.current], &[]);
            pass.dispatch_workgroups(self.capacity.div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        ctx.queue.submit(Some(encoder.finish()));

        self.current = 1 - self.current;
        self.pending.clear();
        self.dropped_this_frame = 0;
    }

    /// Overwrite a slot range with inactive slots in both buffers.
    ///
    /// Called when an allocator range is released, so a later owner of the
    /// same range never inherits live particles.
    pub fn deactivate_range(&self, ctx: &GpuContext, start: u32, count: u32) {
        let end = (start + count).min(self.capacity);
        if start >= end {
            return;
        }
        let blanks = vec![Slot::INACTIVE; (end - start) as usize];
        let offset = start as u64 * SLOT_STRIDE as u64;
        for buffer in &self.buffers {
            ctx.queue
                .write_buffer(buffer, offset, bytemuck::cast_slice(&blanks));
        }
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Capacity checks that would otherwise surface as device loss.
fn validate_capacity(capacity: u32, limits: &wgpu::Limits) -> Result<(), PoolError> {
    if capacity == 0 {
        return Err(PoolError::ZeroCapacity);
    }
    if capacity > MAX_POOL_CAPACITY {
        return Err(PoolError::CapacityCeiling {
            requested: capacity,
            ceiling: MAX_POOL_CAPACITY,
        });
    }
    let required_bytes = capacity as u64 * SLOT_STRIDE as u64;
    let limit_bytes = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    if required_bytes > limit_bytes {
        return Err(PoolError::DeviceLimit {
            required_bytes,
            limit_bytes,
        });
    }
    Ok(())
}

/// WGSL source of the step kernel.
///
/// The hash, seeding, and per-value draw order are mirrored bit for bit by
/// [`crate::sim`]; any change here must land there too.
pub fn step_shader_source() -> String {
    format!(
        r#"{slot_struct}

{request_struct}

struct StepUniforms {{
    delta_time: f32,
    seed: u32,
    request_count: u32,
    slot_count: u32,
}}

@group(0) @binding(0)
var<storage, read> src: array<Slot>;

@group(0) @binding(1)
var<storage, read_write> dst: array<Slot>;

@group(0) @binding(2)
var<uniform> uniforms: StepUniforms;

@group(0) @binding(3)
var<storage, read> requests: array<SpawnRequest>;

fn hash(n: u32) -> u32 {{
    var x = n;
    x ^= x >> 17u;
    x *= 0xed5ad4bbu;
    x ^= x >> 11u;
    x *= 0xac4c1b51u;
    x ^= x >> 15u;
    x *= 0x31848babu;
    x ^= x >> 14u;
    return x;
}}

fn rand01(seed: u32) -> f32 {{
    return f32(hash(seed)) / 4294967295.0;
}}

fn spawn_angle(arc: f32, direction: f32, spread: f32, r: f32) -> f32 {{
    if arc >= 6.2831855 - 0.001 {{
        return r * 6.2831855;
    }}
    if spread > 0.0 {{
        return direction + (r - 0.5) * spread;
    }}
    return direction + (r - 0.5) * arc;
}}

fn sample_speed(base: f32, variation: f32, r: f32) -> f32 {{
    return max(base + (r * 2.0 - 1.0) * variation, 0.0);
}}

@compute @workgroup_size({workgroup_size})
fn step(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let index = global_id.x;
    if index >= uniforms.slot_count {{
        return;
    }}

    var slot = src[index];

    if slot.alive == 1u {{
        slot.age += uniforms.delta_time;
        if slot.age >= slot.lifetime {{
            slot.alive = 0u;
            slot.age = 0.0;
        }} else {{
            slot.position += slot.velocity * uniforms.delta_time;
        }}
    }}

    if slot.alive == 0u {{
        for (var r = 0u; r < uniforms.request_count; r = r + 1u) {{
            let req = requests[r];
            if req.spawn_count <= 0.0 {{
                continue;
            }}
            if index < req.range_start || index >= req.range_start + req.range_count {{
                continue;
            }}
            let p = min(req.spawn_count / f32(req.range_count), 1.0);
            let seed = index ^ hash(uniforms.seed);
            if rand01(seed) >= p {{
                continue;
            }}

            let theta = spawn_angle(req.arc, req.direction, req.spread, rand01(seed + 1u))
                + req.rotation;
            let speed = sample_speed(req.speed_base, req.speed_variation, rand01(seed + 2u));
            let size = mix(req.size_min, req.size_max, rand01(seed + 3u));
            let radius = mix(req.radius_min, req.radius_max, rand01(seed + 4u));
            var vel_angle = req.direction + req.rotation;
            if req.use_radial == 1u {{
                vel_angle = theta;
            }}

            slot.position = req.origin + radius * vec2<f32>(cos(theta), sin(theta));
            slot.velocity = speed * vec2<f32>(cos(vel_angle), sin(vel_angle));
            slot.age = 0.0;
            slot.lifetime = req.lifetime;
            slot.size = size;
            slot.alive = 1u;
            break;
        }}
    }}

    dst[index] = slot;
}}
"#,
        slot_struct = SLOT_WGSL,
        request_struct = SPAWN_REQUEST_WGSL,
        workgroup_size = WORKGROUP_SIZE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_bytes: u64) -> wgpu::Limits {
        wgpu::Limits {
            max_storage_buffer_binding_size: max_bytes.min(u32::MAX as u64) as u32,
            max_buffer_size: max_bytes,
            ..wgpu::Limits::default()
        }
    }

    #[test]
    fn capacity_validation() {
        let generous = limits(1 << 30);
        assert!(validate_capacity(1, &generous).is_ok());
        assert!(validate_capacity(MAX_POOL_CAPACITY, &generous).is_ok());

        assert!(matches!(
            validate_capacity(0, &generous),
            Err(PoolError::ZeroCapacity)
        ));
        assert!(matches!(
            validate_capacity(MAX_POOL_CAPACITY + 1, &generous),
            Err(PoolError::CapacityCeiling { .. })
        ));
    }

    #[test]
    fn capacity_validation_respects_device_limits() {
        // 1000 slots of 32 bytes need 32000 bytes.
        let tight = limits(31_999);
        match validate_capacity(1000, &tight) {
            Err(PoolError::DeviceLimit {
                required_bytes,
                limit_bytes,
            }) => {
                assert_eq!(required_bytes, 32_000);
                assert_eq!(limit_bytes, 31_999);
            }
            other => panic!("expected DeviceLimit, got {:?}", other.err()),
        }
        assert!(validate_capacity(999, &tight).is_ok());
    }

    #[test]
    fn step_shader_embeds_shared_structs() {
        let src = step_shader_source();
        assert!(src.contains("struct Slot"));
        assert!(src.contains("struct SpawnRequest"));
        assert!(src.contains("@workgroup_size(256)"));
    }
}
