//! Frame engine and indexed-mesh renderer for the Flint engine.
//!
//! This crate provides:
//! - The per-slot frame state machine and its proof tokens
//! - [`FrameEngine`], which drives any [`FrameBackend`] through acquire, record, submit and present
//! - [`Renderer`], the Vulkan backend that draws a uniform-transformed mesh

pub mod backend;
pub mod engine;
pub mod frames;
pub mod mesh;
pub mod mesh_pipeline;
pub mod renderer;
pub mod slot;

pub use backend::{FrameBackend, FrameInfo};
pub use engine::{FrameEngine, FrameReport, FrameStatus};
pub use mesh::GpuMesh;
pub use mesh_pipeline::{MeshBindings, MeshPipeline};
pub use renderer::{RenderScene, Renderer};
pub use slot::{
    AcquiredFrame, FenceSignaled, RecordedFrame, RecordingFrame, SlotState, SubmittedFrame,
};
