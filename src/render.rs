//! Rendering adapter.
//!
//! One surface, one shader module, two pipelines: an instanced pipeline that
//! reads slot records straight out of a pool buffer, and a plain vertex
//! pipeline for the CPU fallback's pre-built quads. Inactive slots collapse
//! to zero-area quads in the vertex stage, so pooled draws never need the CPU
//! to know which slots are live.
//!
//! Fill gradients are evaluated in the fragment shader from a per-emitter
//! [`FillUniform`]; the CPU-side [`FillUniform::sample`] mirror exists so the
//! fallback path and tests agree with it.

use crate::cpu::{QuadVertex, QUAD_VERTEX_STRIDE};
use crate::emitter::DrawSource;
use crate::gpu::{GpuContext, ParticlePool};
use crate::slot::{ACTIVE_OFFSET, AGE_OFFSET, LIFETIME_OFFSET, SIZE_OFFSET, SLOT_STRIDE};
use crate::visuals::FillUniform;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use wgpu::util::DeviceExt;

/// World-to-clip transform for the 2D view.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct ViewUniform {
    scale: [f32; 2],
    offset: [f32; 2],
}

/// Per-emitter GPU state the renderer needs: the fill uniform and, for CPU
/// emitters, a reusable vertex buffer.
pub struct EmitterBinding {
    fill_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    quad_buffer: Option<wgpu::Buffer>,
    quad_buffer_bytes: u64,
}

pub struct Renderer {
    surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
    view_buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    pool_pipeline: wgpu::RenderPipeline,
    quad_pipeline: wgpu::RenderPipeline,
    clear_color: wgpu::Color,
}

impl Renderer {
    /// Build the renderer for an already-created surface.
    pub fn new(
        ctx: &GpuContext,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
    ) -> Self {
        let surface_caps = surface.get_capabilities(ctx.adapter());
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&ctx.device, &config);

        let view_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("View Uniform"),
                contents: bytemuck::bytes_of(&ViewUniform {
                    scale: [1.0, 1.0],
                    offset: [0.0, 0.0],
                }),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Render Bind Group Layout"),
                    entries: &[
                        uniform_entry(0, wgpu::ShaderStages::VERTEX),
                        uniform_entry(1, wgpu::ShaderStages::VERTEX_FRAGMENT),
                    ],
                });

        let shader = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Render Shader"),
                source: wgpu::ShaderSource::Wgsl(render_shader_source().into()),
            });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Render Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        // Slot records straight from the pool, stepped per instance.
        let slot_attributes = [
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2, // position
            },
            wgpu::VertexAttribute {
                offset: AGE_OFFSET as wgpu::BufferAddress,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32,
            },
            wgpu::VertexAttribute {
                offset: LIFETIME_OFFSET as wgpu::BufferAddress,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32,
            },
            wgpu::VertexAttribute {
                offset: SIZE_OFFSET as wgpu::BufferAddress,
                shader_location: 3,
                format: wgpu::VertexFormat::Float32,
            },
            wgpu::VertexAttribute {
                offset: ACTIVE_OFFSET as wgpu::BufferAddress,
                shader_location: 4,
                format: wgpu::VertexFormat::Uint32,
            },
        ];

        let pool_pipeline = create_pipeline(
            &ctx.device,
            &pipeline_layout,
            &shader,
            "vs_pool",
            surface_format,
            wgpu::VertexBufferLayout {
                array_stride: SLOT_STRIDE as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &slot_attributes,
            },
        );

        let quad_attributes = [
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2, // position
            },
            wgpu::VertexAttribute {
                offset: 8,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x2, // corner
            },
            wgpu::VertexAttribute {
                offset: 16,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32, // alpha
            },
        ];

        let quad_pipeline = create_pipeline(
            &ctx.device,
            &pipeline_layout,
            &shader,
            "vs_quads",
            surface_format,
            wgpu::VertexBufferLayout {
                array_stride: QUAD_VERTEX_STRIDE as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &quad_attributes,
            },
        );

        Self {
            surface,
            config,
            view_buffer,
            bind_group_layout,
            pool_pipeline,
            quad_pipeline,
            clear_color: wgpu::Color {
                r: 0.02,
                g: 0.02,
                b: 0.05,
                a: 1.0,
            },
        }
    }

    pub fn resize(&mut self, ctx: &GpuContext, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&ctx.device, &self.config);
        }
    }

    /// Set the visible world rectangle: `center` plus/minus `half_extents`.
    pub fn set_view(&self, ctx: &GpuContext, center: Vec2, half_extents: Vec2) {
        let view = ViewUniform {
            scale: [1.0 / half_extents.x.max(1e-6), 1.0 / half_extents.y.max(1e-6)],
            offset: [-center.x, -center.y],
        };
        ctx.queue
            .write_buffer(&self.view_buffer, 0, bytemuck::bytes_of(&view));
    }

    /// Create the per-emitter binding for a fill.
    pub fn bind_fill(&self, ctx: &GpuContext, fill: &FillUniform) -> EmitterBinding {
        let fill_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Fill Uniform"),
                contents: bytemuck::bytes_of(fill),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Emitter Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.view_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: fill_buffer.as_entire_binding(),
                },
            ],
        });
        EmitterBinding {
            fill_buffer,
            bind_group,
            quad_buffer: None,
            quad_buffer_bytes: 0,
        }
    }

    /// Push a changed fill into an existing binding.
    pub fn update_fill(&self, ctx: &GpuContext, binding: &EmitterBinding, fill: &FillUniform) {
        ctx.queue
            .write_buffer(&binding.fill_buffer, 0, bytemuck::bytes_of(fill));
    }

    /// Draw one frame.
    ///
    /// `pool` supplies the vertex buffer for pooled draw sources; emitters
    /// that resolved to other modes carry their own data.
    pub fn render<'a>(
        &mut self,
        ctx: &GpuContext,
        pool: Option<&ParticlePool>,
        draws: impl IntoIterator<Item = (DrawSource<'a>, &'a mut EmitterBinding)>,
    ) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        // CPU geometry uploads happen before the pass is open.
        let draws: Vec<_> = draws
            .into_iter()
            .map(|(source, binding)| {
                if let DrawSource::CpuQuads(verts) = &source {
                    upload_quads(ctx, binding, verts);
                }
                (source, binding)
            })
            .collect();

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for (source, binding) in &draws {
                pass.set_bind_group(0, &binding.bind_group, &[]);
                match source {
                    DrawSource::PooledRange(range) => {
                        let Some(pool) = pool else { continue };
                        let offset = range.start as u64 * SLOT_STRIDE as u64;
                        let end = range.end() as u64 * SLOT_STRIDE as u64;
                        pass.set_pipeline(&self.pool_pipeline);
                        pass.set_vertex_buffer(0, pool.current_buffer().slice(offset..end));
                        pass.draw(0..6, 0..range.count);
                    }
                    DrawSource::Standalone { buffer, count } => {
                        pass.set_pipeline(&self.pool_pipeline);
                        pass.set_vertex_buffer(0, buffer.slice(..));
                        pass.draw(0..6, 0..*count);
                    }
                    DrawSource::CpuQuads(verts) => {
                        let Some(buffer) = &binding.quad_buffer else {
                            continue;
                        };
                        let bytes = (verts.len() * QUAD_VERTEX_STRIDE) as u64;
                        pass.set_pipeline(&self.quad_pipeline);
                        pass.set_vertex_buffer(0, buffer.slice(..bytes));
                        pass.draw(0..verts.len() as u32, 0..1);
                    }
                }
            }
        }

        ctx.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn upload_quads(ctx: &GpuContext, binding: &mut EmitterBinding, verts: &[QuadVertex]) {
    let bytes = (verts.len() * QUAD_VERTEX_STRIDE) as u64;
    if bytes == 0 {
        return;
    }
    if binding.quad_buffer.is_none() || binding.quad_buffer_bytes < bytes {
        binding.quad_buffer = Some(ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Quad Vertices"),
            size: bytes,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));
        binding.quad_buffer_bytes = bytes;
    }
    if let Some(buffer) = &binding.quad_buffer {
        ctx.queue.write_buffer(buffer, 0, bytemuck::cast_slice(verts));
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    vertex_entry: &str,
    format: wgpu::TextureFormat,
    buffer_layout: wgpu::VertexBufferLayout<'_>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(vertex_entry),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some(vertex_entry),
            buffers: &[buffer_layout],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// WGSL source shared by both render pipelines.
///
/// The gradient lookup mirrors [`FillUniform::sample`]; the fade in `vs_pool`
/// mirrors the CPU fade rule, expressed over the age/lifetime ratio.
pub fn render_shader_source() -> String {
    r#"struct ViewUniform {
    scale: vec2<f32>,
    offset: vec2<f32>,
}

struct FillUniform {
    colors: array<vec4<f32>, 5>,
    offsets_a: vec4<f32>,
    params: vec4<f32>,
    extra: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> view: ViewUniform;

@group(0) @binding(1)
var<uniform> fill: FillUniform;

struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) corner: vec2<f32>,
    @location(1) alpha: f32,
}

fn to_clip(world: vec2<f32>) -> vec4<f32> {
    return vec4<f32>((world + view.offset) * view.scale, 0.0, 1.0);
}

fn fade(ratio: f32) -> f32 {
    let start = fill.extra.y;
    if ratio <= start {
        return 1.0;
    }
    return 1.0 - clamp((ratio - start) / max(1.0 - start, 1e-3), 0.0, 1.0);
}

@vertex
fn vs_pool(
    @builtin(vertex_index) vi: u32,
    @location(0) position: vec2<f32>,
    @location(1) age: f32,
    @location(2) lifetime: f32,
    @location(3) size: f32,
    @location(4) alive: u32,
) -> VsOut {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
    );
    let corner = corners[vi];

    // Inactive slots collapse to a point and rasterize nothing.
    let extent = size * f32(alive);
    let ratio = clamp(age / max(lifetime, 1e-6), 0.0, 1.0);

    var out: VsOut;
    out.clip = to_clip(position + corner * extent);
    out.corner = corner;
    out.alpha = fade(ratio) * f32(alive);
    return out;
}

@vertex
fn vs_quads(
    @location(0) position: vec2<f32>,
    @location(1) corner: vec2<f32>,
    @location(2) alpha: f32,
) -> VsOut {
    var out: VsOut;
    out.clip = to_clip(position);
    out.corner = corner;
    out.alpha = alpha;
    return out;
}

fn stop_offset(i: u32) -> f32 {
    if i < 4u {
        return fill.offsets_a[i];
    }
    return fill.params.x;
}

fn gradient(t: f32) -> vec4<f32> {
    let count = u32(fill.params.y);
    let tc = clamp(t, 0.0, 1.0);
    if count <= 1u || fill.params.z == 0.0 {
        return fill.colors[0];
    }
    if tc <= stop_offset(0u) {
        return fill.colors[0];
    }
    for (var i = 1u; i < count; i = i + 1u) {
        let o0 = stop_offset(i - 1u);
        let o1 = stop_offset(i);
        if tc <= o1 {
            let f = (tc - o0) / max(o1 - o0, 1e-6);
            return mix(fill.colors[i - 1u], fill.colors[i], f);
        }
    }
    return fill.colors[count - 1u];
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let kind = fill.params.z;
    var t = 0.0;
    if kind == 1.0 {
        t = (in.corner.x + 1.0) * 0.5;
    } else if kind == 2.0 {
        t = min(length(in.corner), 1.0);
    } else if kind == 3.0 {
        t = min(abs(in.corner.x) + abs(in.corner.y), 1.0);
    }

    var color = gradient(t);
    color.a = color.a * in.alpha;

    let noise = fill.params.w;
    if noise > 0.0 {
        let n = fract(sin(dot(in.corner, vec2<f32>(12.9898, 78.233))) * 43758.5453);
        color.a = color.a * (1.0 - noise * n);
    }

    let filament = fill.extra.x;
    if filament > 0.0 {
        let streak = pow(1.0 - min(abs(in.corner.x), abs(in.corner.y)), filament);
        color = vec4<f32>(color.rgb * (0.5 + streak), color.a * streak);
    }

    return color;
}
"#
    .to_string()
}
