//! Core types and math for the Flint renderer.
//!
//! This crate provides the data that flows into the GPU layer:
//! - Vertex and mesh data, including the built-in quad
//! - Per-frame uniform and push constant layouts
//! - Transform math for the spinning quad
//! - Engine-wide constants

pub mod error;
pub mod math;
pub mod mesh;
pub mod texture;
pub mod uniforms;

pub use error::{Error, Result};
pub use mesh::{MeshData, Vertex, QUAD_INDICES, QUAD_VERTICES};
pub use texture::TextureData;
pub use uniforms::{DrawPushConstants, FrameUniforms};

/// Engine-wide constants
pub mod constants {
    /// Initial window width in pixels
    pub const WINDOW_WIDTH: u32 = 800;
    /// Initial window height in pixels
    pub const WINDOW_HEIGHT: u32 = 600;
    /// Number of frames the CPU may record ahead of the GPU
    pub const FRAMES_IN_FLIGHT: usize = 4;
    /// Engine name reported to the Vulkan driver
    pub const ENGINE_NAME: &str = "Flint";
}
