use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::coords::Vec2;
use crate::core::{App, AppControl, FrameCtx};
use crate::device::{Gpu, GpuInit, SurfaceErrorAction};
use crate::render::{DeviceConfig, GraphicsDevice, WgpuBackend};
use crate::scene::Level;
use crate::time::{FrameClock, FrameTime};

/// Window and frame-loop configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub graphics: DeviceConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "tableau".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            graphics: DeviceConfig::default(),
        }
    }
}

/// Requests from the app, applied after the current callback returns.
#[derive(Debug, Default)]
pub struct RuntimeCtx {
    commands: Vec<Command>,
}

impl RuntimeCtx {
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.commands.push(Command::SetTitle(title.into()));
    }

    pub fn exit(&mut self) {
        self.commands.push(Command::Exit);
    }
}

#[derive(Debug)]
enum Command {
    SetTitle(String),
    Exit,
}

/// Entry point: opens one window and drives `app` until it exits.
pub struct Runtime;

impl Runtime {
    pub fn run<A>(config: RuntimeConfig, gpu_init: GpuInit, app: A) -> Result<()>
    where
        A: App + 'static,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config, gpu_init, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        state.error.map_or(Ok(()), Err)
    }
}

#[self_referencing]
struct WindowEntry {
    clock: FrameClock,

    window: Window,

    #[borrows(window)]
    #[covariant]
    gpu: Gpu<'this>,
}

/// Scene-side state; lives as long as the window.
struct Stage {
    level: Level,
    graphics: GraphicsDevice,
    backend: WgpuBackend,
}

struct AppState<A>
where
    A: App + 'static,
{
    config: RuntimeConfig,
    gpu_init: GpuInit,
    app: A,

    window: Option<WindowEntry>,
    stage: Option<Stage>,
    exit_requested: bool,
    error: Option<anyhow::Error>,
}

fn logical_size(window: &Window, size: PhysicalSize<u32>) -> Vec2 {
    let logical: LogicalSize<f64> = size.to_logical(window.scale_factor());
    Vec2::new(logical.width as f32, logical.height as f32)
}

impl<A> AppState<A>
where
    A: App + 'static,
{
    fn new(config: RuntimeConfig, gpu_init: GpuInit, app: A) -> Self {
        Self {
            config,
            gpu_init,
            app,
            window: None,
            stage: None,
            exit_requested: false,
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.error = Some(err);
        self.exit_requested = true;
        event_loop.exit();
    }

    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let gpu_init = self.gpu_init.clone();
        let entry = WindowEntryTryBuilder {
            clock: FrameClock::default(),
            window,
            gpu_builder: |w| pollster::block_on(Gpu::new(w, gpu_init)),
        }
        .try_build()
        .context("GPU initialization failed")?;

        let stage = entry.with(|fields| -> Result<Stage> {
            let size = fields.gpu.size();
            let mut backend = WgpuBackend::new(
                fields.gpu.device(),
                fields.gpu.queue(),
                fields.gpu.surface_format(),
                size.width,
                size.height,
            );
            let graphics = GraphicsDevice::new(&mut backend, self.config.graphics)
                .context("failed to create graphics device")?;
            let level = Level::new(logical_size(fields.window, size));
            Ok(Stage { level, graphics, backend })
        })?;

        self.window = Some(entry);
        self.stage = Some(stage);
        Ok(())
    }

    fn start(&mut self) {
        let (Some(stage), mut runtime) = (self.stage.as_mut(), RuntimeCtx::default()) else {
            return;
        };
        let mut ctx = FrameCtx {
            level: &mut stage.level,
            graphics: &mut stage.graphics,
            backend: &mut stage.backend,
            time: FrameTime::start(),
            runtime: &mut runtime,
        };
        self.app.on_start(&mut ctx);
        if let Some(entry) = self.window.as_mut() {
            entry.with_clock_mut(|clock| clock.reset());
        }
        self.apply_commands(runtime);
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        let (Some(entry), Some(stage)) = (self.window.as_mut(), self.stage.as_mut()) else {
            return;
        };
        entry.with_gpu_mut(|gpu| gpu.resize(new_size));
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        stage.backend.resize(new_size.width, new_size.height);
        let view_size = entry.with_window(|w| logical_size(w, new_size));
        stage.level.fit_default_view(view_size);
        entry.with_window(|w| w.request_redraw());
    }

    /// Tick, batch, encode, present, sweep.
    fn redraw(&mut self) {
        let (Some(entry), Some(stage)) = (self.window.as_mut(), self.stage.as_mut()) else {
            return;
        };
        let app = &mut self.app;
        let mut runtime = RuntimeCtx::default();
        let mut control = AppControl::Continue;

        entry.with_mut(|fields| {
            let time = fields.clock.tick();
            {
                let mut ctx = FrameCtx {
                    level: &mut stage.level,
                    graphics: &mut stage.graphics,
                    backend: &mut stage.backend,
                    time,
                    runtime: &mut runtime,
                };
                control = app.on_tick(&mut ctx);
            }

            let stats = stage.graphics.draw_batches(&mut stage.level, &mut stage.backend);
            log::trace!("frame {}: {stats:?}", time.frame_index);

            match fields.gpu.begin_frame() {
                Ok(mut frame) => {
                    stage.backend.encode(&mut frame.encoder, &frame.view);
                    fields.window.pre_present_notify();
                    fields.gpu.submit(frame);
                }
                Err(err) => {
                    stage.backend.discard_frame();
                    log::warn!("surface error: {err}");
                    if fields.gpu.handle_surface_error(err) == SurfaceErrorAction::Fatal {
                        control = AppControl::Exit;
                    }
                }
            }

            stage.level.sweep_destroyed();
        });

        if control == AppControl::Exit {
            runtime.exit();
        }
        self.apply_commands(runtime);
    }

    fn apply_commands(&mut self, mut ctx: RuntimeCtx) {
        for cmd in ctx.commands.drain(..) {
            match cmd {
                Command::SetTitle(title) => {
                    if let Some(entry) = self.window.as_ref() {
                        entry.with_window(|w| w.set_title(&title));
                    }
                }
                Command::Exit => self.exit_requested = true,
            }
        }
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: App + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.create_window(event_loop) {
            self.fail(event_loop, err);
            return;
        }
        self.start();
        if let Some(entry) = self.window.as_ref() {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        // Continuous redraw.
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(entry) = self.window.as_ref() {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if self.app.on_window_event(&event) == AppControl::Exit {
            self.exit_requested = true;
        }

        match event {
            WindowEvent::CloseRequested => self.exit_requested = true,
            WindowEvent::Resized(new_size) => self.resize(new_size),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(size) = self.window.as_ref().map(|e| e.with_window(|w| w.inner_size())) {
                    self.resize(size);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }

        if self.exit_requested {
            self.window = None;
            self.stage = None;
            event_loop.exit();
        }
    }
}
