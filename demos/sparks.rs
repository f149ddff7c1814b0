//! Pooled emitters demo: an ember fountain plus a spark emitter that follows
//! the cursor. Run with `cargo run --example sparks`.

use std::f32::consts::{FRAC_PI_2, TAU};
use std::sync::Arc;

use cinder::{
    Emitter, EmitterBinding, EmitterConfig, FillStyle, FrameClock, GpuContext, ParticlePool,
    Renderer, SlotAllocator, Vec2,
};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

const POOL_SLOTS: u32 = 65_536;

struct Scene {
    gpu: GpuContext,
    renderer: Renderer,
    allocator: SlotAllocator,
    pool: ParticlePool,
    clock: FrameClock,
    emitters: Vec<(Emitter, EmitterBinding)>,
}

impl Scene {
    fn new(gpu: GpuContext, renderer: Renderer) -> Self {
        let mut allocator = SlotAllocator::new(POOL_SLOTS);
        let pool = ParticlePool::new(&gpu, POOL_SLOTS).unwrap();

        let embers = EmitterConfig::new(300.0, 2.0)
            .fade_start(0.8)
            .size_range(0.006, 0.02)
            .speed(0.5, 0.2)
            .directed(FRAC_PI_2, 0.6)
            .linear_velocity()
            .fill(FillStyle::ember());
        let sparks = EmitterConfig::new(800.0, 0.8)
            .size_range(0.003, 0.008)
            .speed(0.9, 0.5)
            .arc(TAU)
            .fill(FillStyle::spark());

        let mut emitters = Vec::new();
        for config in [embers, sparks] {
            let fill = config.fill.to_uniform(config.fade_start_frac());
            let mut emitter = Emitter::new(config, Some(&gpu), &mut allocator);
            if emitters.is_empty() {
                emitter.set_transform(Vec2::new(0.0, -0.9), 0.0);
            }
            let binding = renderer.bind_fill(&gpu, &fill);
            emitters.push((emitter, binding));
        }

        Self {
            gpu,
            renderer,
            allocator,
            pool,
            clock: FrameClock::new(),
            emitters,
        }
    }

    fn frame(&mut self) -> Result<(), wgpu::SurfaceError> {
        let delta = self.clock.tick();
        let seed = self.clock.seed_millis();

        for (emitter, _) in &mut self.emitters {
            emitter.update(delta, seed, Some(&self.gpu), Some(&mut self.pool));
        }
        self.pool.step(&self.gpu, delta, seed);

        let draws = self
            .emitters
            .iter_mut()
            .filter_map(|(emitter, binding)| Some((emitter.draw_source()?, binding)));
        self.renderer.render(&self.gpu, Some(&self.pool), draws)
    }

    fn aspect(&self) -> f32 {
        self.renderer.config.width as f32 / self.renderer.config.height.max(1) as f32
    }
}

#[derive(Default)]
struct App {
    window: Option<Arc<Window>>,
    scene: Option<Scene>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window_attrs = Window::default_attributes()
            .with_title("cinder - sparks")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
        let window = Arc::new(event_loop.create_window(window_attrs).unwrap());
        self.window = Some(window.clone());

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(window.clone()).unwrap();
        let gpu = pollster::block_on(GpuContext::from_instance(&instance, Some(&surface))).unwrap();

        let size = window.inner_size();
        let renderer = Renderer::new(&gpu, surface, size.width, size.height);
        let scene = Scene::new(gpu, renderer);
        scene.renderer.set_view(
            &scene.gpu,
            Vec2::ZERO,
            Vec2::new(scene.aspect(), 1.0),
        );
        self.scene = Some(scene);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(scene) = &mut self.scene else { return };
        match event {
            WindowEvent::CloseRequested => {
                log::info!("exiting with {:?}", scene.allocator.stats());
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                scene.renderer.resize(&scene.gpu, size.width, size.height);
                let aspect = scene.aspect();
                scene
                    .renderer
                    .set_view(&scene.gpu, Vec2::ZERO, Vec2::new(aspect, 1.0));
            }
            WindowEvent::CursorMoved { position, .. } => {
                let (w, h) = (
                    scene.renderer.config.width as f32,
                    scene.renderer.config.height as f32,
                );
                let world = Vec2::new(
                    (position.x as f32 / w * 2.0 - 1.0) * scene.aspect(),
                    1.0 - position.y as f32 / h * 2.0,
                );
                // The second emitter trails the cursor.
                if let Some((emitter, _)) = scene.emitters.get_mut(1) {
                    emitter.set_transform(world, 0.0);
                }
            }
            WindowEvent::RedrawRequested => {
                match scene.frame() {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => {
                        let (w, h) = (scene.renderer.config.width, scene.renderer.config.height);
                        scene.renderer.resize(&scene.gpu, w, h);
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                    Err(e) => eprintln!("Render error: {:?}", e),
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

fn main() {
    env_logger::init();

    let event_loop = EventLoop::new().unwrap();
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    event_loop.run_app(&mut app).unwrap();
}
