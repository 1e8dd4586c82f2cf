//! Application framework for the Flint renderer.
//!
//! This crate handles the boilerplate around a [`RenderApp`]:
//! - Logging setup
//! - Window creation and the winit event loop
//! - GPU context, renderer and frame engine construction
//! - Resize handling and shutdown
//!
//! # Example
//!
//! ```no_run
//! use flint_app::{run_app, AppConfig, FrameInfo, FrameUniforms, RenderApp, RenderScene};
//!
//! struct MyApp;
//!
//! impl RenderApp for MyApp {
//!     fn init(_config: &AppConfig) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn scene(&self) -> RenderScene {
//!         RenderScene::default()
//!     }
//!
//!     fn update(&mut self, _dt: f32) {}
//!
//!     fn frame_uniforms(&self, _frame: &FrameInfo) -> FrameUniforms {
//!         FrameUniforms::default()
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod runner;

pub use app::RenderApp;
pub use runner::{init_logging, run_app, AppConfig, FrameStats};

// Re-export commonly used types for convenience
pub use flint_core::{FrameUniforms, MeshData, TextureData};
pub use flint_gpu::{DeviceTypePolicy, ValidationMode};
pub use flint_render::{FrameInfo, RenderScene};
pub use winit::event::WindowEvent;
