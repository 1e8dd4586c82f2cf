//! `RenderApp` trait definition.

use flint_core::FrameUniforms;
use flint_render::{FrameInfo, RenderScene};
use winit::event::WindowEvent;

use crate::runner::AppConfig;

/// Trait for applications driven by the Flint runner.
///
/// The runner owns the window, GPU context and frame engine. The application
/// supplies the scene once and the uniform values for every frame.
pub trait RenderApp: Sized {
    /// Initialize the application.
    ///
    /// Called once on startup, before any GPU work.
    fn init(config: &AppConfig) -> anyhow::Result<Self>;

    /// The mesh and optional texture to upload.
    fn scene(&self) -> RenderScene;

    /// Advance application state by `dt` seconds.
    fn update(&mut self, dt: f32);

    /// Uniform values for the frame about to be recorded.
    ///
    /// Called after the frame slot's fence has signalled.
    fn frame_uniforms(&self, frame: &FrameInfo) -> FrameUniforms;

    /// Handle window resize.
    ///
    /// The swapchain is recreated by the runner on the next frame.
    #[allow(unused_variables)]
    fn on_resize(&mut self, width: u32, height: u32) {}

    /// Handle window events. Return `true` to stop further processing.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Called before shutdown, with the GPU idle.
    fn cleanup(&mut self) {}
}
