//! Test harness for the Flint renderer.
//!
//! Provides a simulated frame backend for exercising the frame engine
//! without a GPU, and a headless device for tests that need real hardware.

pub mod headless;
pub mod simulated;

pub use headless::HeadlessGpu;
pub use simulated::{SimEvent, SimulatedConfig, SimulatedGpu};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestError {
    #[error("GPU error: {0}")]
    Gpu(#[from] flint_gpu::GpuError),
    #[error("Round trip mismatch: {0}")]
    Mismatch(String),
}

pub type Result<T> = std::result::Result<T, TestError>;
