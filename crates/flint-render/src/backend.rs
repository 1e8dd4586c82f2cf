//! The seam between the frame engine and whatever executes frames.

use ash::vk;
use flint_core::FrameUniforms;
use flint_gpu::{AcquireOutcome, PresentOutcome, Result};

use crate::slot::{AcquiredFrame, FenceSignaled, RecordedFrame, RecordingFrame, SubmittedFrame};

/// Per-frame values handed to the uniform producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub slot: usize,
    pub frame_number: u64,
    pub image_index: u32,
    pub extent: vk::Extent2D,
}

/// Operations the frame engine drives, one slot at a time.
///
/// Every step after the fence wait takes the token for the state the slot
/// must be in, so implementations never see out-of-order calls.
pub trait FrameBackend {
    /// Number of frame slots.
    fn frames_in_flight(&self) -> usize;

    /// Current drawable extent of the swapchain.
    fn extent(&self) -> vk::Extent2D;

    /// Block until the slot's previous submission has finished.
    fn wait_for_fence(&mut self, slot: usize) -> Result<()>;

    /// Acquire the next swapchain image using the slot's image-acquired semaphore.
    fn acquire_next_image(&mut self, frame: &FenceSignaled) -> Result<AcquireOutcome>;

    /// Reset the slot's fence and command buffer.
    fn reset_frame(&mut self, frame: &AcquiredFrame) -> Result<()>;

    /// Write this frame's uniform values into the slot's buffer.
    fn write_uniforms(&mut self, frame: &RecordingFrame, uniforms: &FrameUniforms) -> Result<()>;

    /// Record the slot's command buffer for the acquired image.
    ///
    /// The engine turns the recording token into a [`RecordedFrame`] only
    /// after this returns `Ok`.
    fn record(&mut self, frame: &RecordingFrame) -> Result<()>;

    /// Submit the recorded commands, signalling the slot fence on completion.
    fn submit(&mut self, frame: &RecordedFrame) -> Result<()>;

    /// Queue the rendered image for presentation.
    fn present(&mut self, frame: &SubmittedFrame) -> Result<PresentOutcome>;

    /// Replace the swapchain after a resize or an out-of-date report.
    ///
    /// Returns `false` when the surface has no drawable area yet and the
    /// recreation should be retried on a later frame.
    fn recreate_swapchain(&mut self) -> Result<bool>;

    /// Block until all submitted work has finished.
    fn wait_idle(&mut self) -> Result<()>;
}
