//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vesper_gpu::{FrameConfig, FrameOrchestrator, GpuContextBuilder};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::VesperApp;
use crate::context::AppContext;
use crate::frame::FrameInfo;
use crate::surface::WindowSurface;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Number of frames the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Vesper".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
            frames_in_flight: FrameConfig::default().frames_in_flight,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }

    /// Frame layer configuration derived from this config.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig::default()
            .with_frames_in_flight(self.frames_in_flight)
            .with_vsync(self.vsync)
    }

    /// Sleep target per frame, if pacing is enabled.
    pub fn target_frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}

/// Run a [`VesperApp`] with the given configuration.
///
/// Initializes logging, creates the window, device and frame orchestrator,
/// and runs the event loop until the window closes or a fatal error occurs.
pub fn run_app<A: VesperApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    config.frame_config().validate()?;
    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        fatal: None,
    };

    event_loop.run_app(&mut runner)?;

    match runner.fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Internal application runner that implements winit's `ApplicationHandler`.
struct AppRunner<A: VesperApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    /// First fatal error; returned from [`run_app`].
    fatal: Option<anyhow::Error>,
}

/// Internal application state. The app drops before the context.
struct AppState<A: VesperApp> {
    app: A,
    ctx: AppContext,
    target_frame_time: Option<Duration>,
    stats: FrameStats,
}

impl<A: VesperApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready!");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.fatal = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Let the app handle the event first
        if let Some(state) = &mut self.state {
            if state.app.on_event(&event) {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                match state.render_frame() {
                    Ok(()) => state.ctx.window.request_redraw(),
                    Err(e) => {
                        error!("Fatal render error: {e:#}");
                        self.fatal = Some(e);
                        self.shutdown(event_loop);
                    }
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    if let Err(e) = state.handle_resize(size.width, size.height) {
                        error!("Resize error: {e:#}");
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: VesperApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = Arc::new(
            GpuContextBuilder::new()
                .app_name(&self.config.title)
                .validation(self.config.validation)
                .build_with_window(window.as_ref())?,
        );
        info!("GPU: {}", gpu.capabilities().summary());

        let size = window.inner_size();
        let surface = Arc::new(WindowSurface::new(size.width, size.height));
        let frames = FrameOrchestrator::new(
            gpu.clone(),
            surface.clone(),
            self.config.frame_config(),
        )?;

        let mut ctx = AppContext::new(window, gpu, surface, frames);
        let app = A::init(&mut ctx)?;

        Ok(AppState {
            app,
            ctx,
            target_frame_time: self.config.target_frame_time(),
            stats: FrameStats::default(),
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }
}

impl<A: VesperApp> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let _span = tracing::trace_span!("frame", number = self.ctx.frame_count()).entered();
        let frame_start = Instant::now();

        let now = Instant::now();
        let dt = now.duration_since(self.ctx.last_frame_time).as_secs_f32();
        self.ctx.last_frame_time = now;
        self.stats.record(dt);

        self.app.update(&self.ctx, dt);

        if let Some(command_buffer) = self.ctx.frames.begin_frame()? {
            let frame = FrameInfo {
                command_buffer,
                frame_index: self.ctx.frames.frame_index(),
                dt,
                frame_number: self.ctx.frames.frame_count(),
            };

            self.ctx.frames.begin_render_pass(command_buffer);
            let rendered = self.app.render(&self.ctx, &frame);
            self.ctx.frames.end_render_pass(command_buffer);
            // The frame is closed even when recording failed so the orchestrator stays consistent.
            self.ctx.frames.end_frame()?;
            rendered?;
        }

        // Frame pacing
        if let Some(target) = self.target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        self.ctx.surface.resize(width, height);
        if width == 0 || height == 0 {
            return Ok(());
        }

        self.app.on_resize(&mut self.ctx, width, height)?;
        info!("Resized to {}x{}", width, height);
        Ok(())
    }

    fn cleanup(&mut self) {
        if let Some(summary) = self.stats.summary() {
            info!("FPS Statistics:");
            info!("  Min: {:.1}", summary.min);
            info!("  Max: {:.1}", summary.max);
            info!("  Avg: {:.1}", summary.average);
            info!("  Total frames: {}", summary.frames);
        }

        info!("Starting cleanup...");
        if let Err(e) = self.ctx.frames.wait_idle() {
            error!("Failed to wait idle: {e}");
        }
        self.app.cleanup(&mut self.ctx);
        info!("Cleanup complete");
    }
}

/// Running frame rate statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameStats {
    frames: u64,
    min_fps: Option<f64>,
    max_fps: f64,
    fps_sum: f64,
}

/// Summary of [`FrameStats`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FpsSummary {
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub frames: u64,
}

impl FrameStats {
    /// Record one frame that took `dt` seconds. Zero-length frames are ignored.
    pub fn record(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let fps = 1.0 / f64::from(dt);
        self.frames += 1;
        self.min_fps = Some(self.min_fps.map_or(fps, |min| min.min(fps)));
        self.max_fps = self.max_fps.max(fps);
        self.fps_sum += fps;
    }

    /// Summary over all recorded frames, or `None` if nothing was recorded.
    pub fn summary(&self) -> Option<FpsSummary> {
        let min = self.min_fps?;
        Some(FpsSummary {
            min,
            max: self.max_fps,
            average: self.fps_sum / self.frames as f64,
            frames: self.frames,
        })
    }
}
