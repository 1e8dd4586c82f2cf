//! Application runner and event loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use flint_core::constants::{ENGINE_NAME, FRAMES_IN_FLIGHT, WINDOW_HEIGHT, WINDOW_WIDTH};
use flint_gpu::{DeviceTypePolicy, GpuContextBuilder, ValidationMode};
use flint_platform::{create_window, PlatformConfig, PlatformError, SurfaceWindow};
use flint_render::{FrameEngine, FrameStatus, Renderer};
use flint_shaders::{ShaderSet, DEFAULT_SHADER_DIR};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::app::RenderApp;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title, also used as the Vulkan application name.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// How validation layers are requested (default: debug builds only).
    pub validation: ValidationMode,
    /// Which physical device types are acceptable.
    pub device_policy: DeviceTypePolicy,
    /// Directory holding the compiled SPIR-V shaders.
    pub shader_dir: PathBuf,
    /// Number of frame slots.
    pub frames_in_flight: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: ENGINE_NAME.to_string(),
            width: WINDOW_WIDTH,
            height: WINDOW_HEIGHT,
            validation: ValidationMode::for_build(),
            device_policy: DeviceTypePolicy::default(),
            shader_dir: PathBuf::from(DEFAULT_SHADER_DIR),
            frames_in_flight: FRAMES_IN_FLIGHT,
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

    pub fn with_validation(mut self, validation: ValidationMode) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_device_policy(mut self, policy: DeviceTypePolicy) -> Self {
        self.device_policy = policy;
        self
    }

    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    fn platform(&self) -> PlatformConfig {
        PlatformConfig {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            resizable: true,
        }
    }
}

/// Install the global `tracing` subscriber.
///
/// Honours `RUST_LOG`, defaulting to `info`. Later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

/// Run a `RenderApp` with the given configuration.
///
/// Returns once the window is closed, or with the first unrecoverable error.
pub fn run_app<A: RenderApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    init_logging();
    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()
        .map_err(PlatformError::from)
        .context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        error: None,
    };

    event_loop
        .run_app(&mut runner)
        .map_err(PlatformError::from)
        .context("Event loop terminated abnormally")?;

    runner.error.map_or(Ok(()), Err)
}

/// Frame time statistics collected over the run.
#[derive(Debug, Clone, Copy)]
pub struct FrameStats {
    pub frames: u64,
    pub min_fps: f64,
    pub max_fps: f64,
    fps_sum: f64,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            frames: 0,
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
        }
    }
}

impl FrameStats {
    /// Record a frame that took `dt` seconds. Non-positive times are ignored.
    pub fn record(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let fps = 1.0 / f64::from(dt);
        self.min_fps = self.min_fps.min(fps);
        self.max_fps = self.max_fps.max(fps);
        self.fps_sum += fps;
        self.frames += 1;
    }

    pub fn average_fps(&self) -> Option<f64> {
        (self.frames > 0).then(|| self.fps_sum / self.frames as f64)
    }
}

struct AppRunner<A: RenderApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    error: Option<anyhow::Error>,
}

/// Drops the engine (which idles the device) before the window.
struct AppState<A: RenderApp> {
    engine: FrameEngine<Renderer>,
    app: A,
    window: Arc<Window>,
    last_frame_time: Instant,
    stats: FrameStats,
}

impl<A: RenderApp + 'static> ApplicationHandler for AppRunner<A> {
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
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
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
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                info!("Escape pressed");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state.engine.request_recreate();
                    state.app.on_resize(size.width, size.height);
                    tracing::debug!(width = size.width, height = size.height, "Window resized");
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                if let Err(e) = state.render_frame() {
                    error!("Render error: {e:#}");
                    self.error = Some(e);
                    self.shutdown(event_loop);
                    return;
                }
                state.window.request_redraw();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

impl<A: RenderApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window = create_window(event_loop, &self.config.platform())?;

        let app = A::init(&self.config)?;
        let scene = app.scene();

        let shaders = ShaderSet::load(&self.config.shader_dir, scene.texture.is_some())
            .with_context(|| {
                format!(
                    "Failed to load shaders from {}",
                    self.config.shader_dir.display()
                )
            })?;

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .device_policy(self.config.device_policy)
            .build_for_window(window.as_ref())
            .context("Failed to create GPU context")?;

        info!("GPU: {}", gpu.capabilities().summary());

        let surface_window: Arc<dyn SurfaceWindow> = window.clone();
        let renderer = Renderer::new(
            gpu,
            surface_window,
            &scene,
            &shaders,
            self.config.frames_in_flight,
        )
        .context("Failed to create renderer")?;
        let engine = FrameEngine::new(renderer)?;

        Ok(AppState {
            engine,
            app,
            window,
            last_frame_time: Instant::now(),
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

impl<A: RenderApp> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        // Minimized: nothing to draw into
        if !self.window.is_drawable() {
            return Ok(());
        }

        self.stats.record(dt);
        self.app.update(dt);

        let app = &self.app;
        let status = self
            .engine
            .render_frame(|frame| app.frame_uniforms(frame))
            .context("Frame failed")?;

        if let FrameStatus::Presented(report) = status {
            if report.suboptimal {
                tracing::trace!(slot = report.slot, "Presented to a suboptimal swapchain");
            }
        }

        Ok(())
    }

    fn cleanup(&mut self) {
        if let Some(avg_fps) = self.stats.average_fps() {
            info!("FPS Statistics:");
            info!("  Min: {:.1}", self.stats.min_fps);
            info!("  Max: {:.1}", self.stats.max_fps);
            info!("  Avg: {avg_fps:.1}");
            info!("  Total frames: {}", self.engine.frame_counter());
            info!("  Dropped frames: {}", self.engine.dropped_frames());
            info!("  Swapchain recreations: {}", self.engine.recreations());
        }

        info!("Starting cleanup...");
        if let Err(e) = self.engine.wait_idle() {
            error!("Failed to wait idle: {e}");
        }
        self.app.cleanup();
        info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_compiled_in_values() {
        let config = AppConfig::default();
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.frames_in_flight, 4);
        assert_eq!(config.shader_dir, PathBuf::from("shaders"));
        assert_eq!(config.device_policy, DeviceTypePolicy::PreferDiscrete);
    }

    #[test]
    fn builders_override_fields() {
        let config = AppConfig::new("Quad")
            .with_size(320, 240)
            .with_validation(ValidationMode::Disabled)
            .with_device_policy(DeviceTypePolicy::Any)
            .with_shader_dir("assets/spv")
            .with_frames_in_flight(2);

        assert_eq!(config.title, "Quad");
        assert_eq!((config.width, config.height), (320, 240));
        assert_eq!(config.validation, ValidationMode::Disabled);
        assert_eq!(config.device_policy, DeviceTypePolicy::Any);
        assert_eq!(config.shader_dir, PathBuf::from("assets/spv"));
        assert_eq!(config.frames_in_flight, 2);
    }

    #[test]
    fn platform_config_follows_app_config() {
        let platform = AppConfig::new("Quad").with_size(640, 480).platform();
        assert_eq!(platform.title, "Quad");
        assert_eq!((platform.width, platform.height), (640, 480));
        assert!(platform.resizable);
    }

    #[test]
    fn frame_stats_track_extremes() {
        let mut stats = FrameStats::default();
        assert!(stats.average_fps().is_none());

        stats.record(0.01);
        stats.record(0.02);
        stats.record(0.0);

        assert_eq!(stats.frames, 2);
        assert!((stats.max_fps - 100.0).abs() < 1e-3);
        assert!((stats.min_fps - 50.0).abs() < 1e-3);
        assert!((stats.average_fps().unwrap() - 75.0).abs() < 1e-3);
    }
}
