//! A frame backend that models fences and a GPU timeline in software.
//!
//! Each submission completes `latency` ticks after it is queued; the CPU
//! clock advances one tick per submission and jumps forward when a fence
//! wait has to block. Misuse the real driver would not report (writing a
//! slot that is still in flight, resetting an unsignalled fence) is
//! collected as a violation instead of failing the call.

use ash::vk;
use flint_core::FrameUniforms;
use flint_gpu::{AcquireOutcome, GpuError, PresentOutcome, Result};
use flint_render::{
    AcquiredFrame, FenceSignaled, FrameBackend, RecordedFrame, RecordingFrame, SubmittedFrame,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Pending { completes_at: u64 },
}

/// Something the simulated backend observed, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    FenceWait { slot: usize, clock: u64 },
    Acquire { slot: usize, image_index: Option<u32> },
    UniformWrite { slot: usize, frame_number: u64 },
    Record { slot: usize, frame_number: u64 },
    Submit { slot: usize, frame_number: u64, completes_at: u64 },
    Present { slot: usize, image_index: u32, out_of_date: bool },
    Recreate { extent: vk::Extent2D },
    RecreateDeferred,
    Idle { clock: u64 },
}

/// Shape of the simulated device and surface.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedConfig {
    pub frames_in_flight: usize,
    pub image_count: u32,
    /// Ticks between a submission and its fence signalling.
    pub latency: u64,
    pub extent: vk::Extent2D,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: flint_core::constants::FRAMES_IN_FLIGHT,
            image_count: 3,
            latency: 2,
            extent: vk::Extent2D {
                width: flint_core::constants::WINDOW_WIDTH,
                height: flint_core::constants::WINDOW_HEIGHT,
            },
        }
    }
}

/// Software [`FrameBackend`].
pub struct SimulatedGpu {
    config: SimulatedConfig,
    clock: u64,
    fences: Vec<FenceState>,
    waited: Vec<bool>,
    acquired: Vec<Option<u32>>,
    uniforms: Vec<Option<FrameUniforms>>,
    surface_extent: vk::Extent2D,
    swapchain_extent: vk::Extent2D,
    next_image: u32,
    acquire_out_of_date: u32,
    present_out_of_date: u32,
    recreations: u64,
    max_outstanding: usize,
    violations: Vec<String>,
    events: Vec<SimEvent>,
}

impl Default for SimulatedGpu {
    fn default() -> Self {
        Self::new(SimulatedConfig::default())
    }
}

impl SimulatedGpu {
    pub fn new(config: SimulatedConfig) -> Self {
        let slots = config.frames_in_flight;
        Self {
            config,
            clock: 0,
            fences: vec![FenceState::Signaled; slots],
            waited: vec![false; slots],
            acquired: vec![None; slots],
            uniforms: vec![None; slots],
            surface_extent: config.extent,
            swapchain_extent: config.extent,
            next_image: 0,
            acquire_out_of_date: 0,
            present_out_of_date: 0,
            recreations: 0,
            max_outstanding: 0,
            violations: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Change the surface size. The swapchain goes out of date until recreated.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface_extent = vk::Extent2D { width, height };
    }

    /// Make the next `count` acquires report an out-of-date surface.
    pub fn script_acquire_out_of_date(&mut self, count: u32) {
        self.acquire_out_of_date += count;
    }

    /// Make the next `count` presents report an out-of-date surface.
    pub fn script_present_out_of_date(&mut self, count: u32) {
        self.present_out_of_date += count;
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Submissions whose fence has not signalled yet.
    pub fn outstanding(&self) -> usize {
        self.fences
            .iter()
            .filter(|f| matches!(f, FenceState::Pending { completes_at } if *completes_at > self.clock))
            .count()
    }

    /// Highest `outstanding()` seen right after a submission.
    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding
    }

    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    /// Last uniforms written to `slot`.
    pub fn uniforms(&self, slot: usize) -> Option<&FrameUniforms> {
        self.uniforms.get(slot).and_then(Option::as_ref)
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    fn slot_index(&self, slot: usize) -> Result<usize> {
        if slot < self.fences.len() {
            Ok(slot)
        } else {
            Err(GpuError::InvalidState(format!("no simulated slot {slot}")))
        }
    }

    fn violation(&mut self, message: String) {
        tracing::warn!("{message}");
        self.violations.push(message);
    }

    fn drain(&mut self) {
        for fence in &mut self.fences {
            if let FenceState::Pending { completes_at } = *fence {
                self.clock = self.clock.max(completes_at);
                *fence = FenceState::Signaled;
            }
        }
    }
}

impl FrameBackend for SimulatedGpu {
    fn frames_in_flight(&self) -> usize {
        self.config.frames_in_flight
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    fn wait_for_fence(&mut self, slot: usize) -> Result<()> {
        let slot = self.slot_index(slot)?;
        match self.fences[slot] {
            FenceState::Signaled => {}
            FenceState::Pending { completes_at } => {
                self.clock = self.clock.max(completes_at);
                self.fences[slot] = FenceState::Signaled;
            }
            FenceState::Unsignaled => {
                return Err(GpuError::InvalidState(format!(
                    "slot {slot} fence was reset but never submitted"
                )));
            }
        }
        self.waited[slot] = true;
        self.events.push(SimEvent::FenceWait {
            slot,
            clock: self.clock,
        });
        Ok(())
    }

    fn acquire_next_image(&mut self, frame: &FenceSignaled) -> Result<AcquireOutcome> {
        let slot = self.slot_index(frame.slot())?;
        if !self.waited[slot] {
            self.violation(format!("slot {slot} acquired before its fence wait"));
        }

        let out_of_date = if self.acquire_out_of_date > 0 {
            self.acquire_out_of_date -= 1;
            true
        } else {
            self.surface_extent != self.swapchain_extent
        };
        if out_of_date {
            self.events.push(SimEvent::Acquire {
                slot,
                image_index: None,
            });
            return Ok(AcquireOutcome::OutOfDate);
        }

        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.config.image_count;
        self.acquired[slot] = Some(image_index);
        self.events.push(SimEvent::Acquire {
            slot,
            image_index: Some(image_index),
        });
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn reset_frame(&mut self, frame: &AcquiredFrame) -> Result<()> {
        let slot = self.slot_index(frame.slot())?;
        if self.fences[slot] != FenceState::Signaled {
            self.violation(format!("slot {slot} fence reset while not signalled"));
        }
        self.fences[slot] = FenceState::Unsignaled;
        Ok(())
    }

    fn write_uniforms(&mut self, frame: &RecordingFrame, uniforms: &FrameUniforms) -> Result<()> {
        let slot = self.slot_index(frame.slot())?;
        if !self.waited[slot] || matches!(self.fences[slot], FenceState::Pending { .. }) {
            self.violation(format!(
                "slot {slot} uniforms written while its previous frame may be in flight"
            ));
        }
        self.uniforms[slot] = Some(*uniforms);
        self.events.push(SimEvent::UniformWrite {
            slot,
            frame_number: frame.frame_number(),
        });
        Ok(())
    }

    fn record(&mut self, frame: &RecordingFrame) -> Result<()> {
        let slot = self.slot_index(frame.slot())?;
        if self.acquired[slot] != Some(frame.image_index()) {
            self.violation(format!(
                "slot {slot} recorded for image {} it did not acquire",
                frame.image_index()
            ));
        }
        self.events.push(SimEvent::Record {
            slot,
            frame_number: frame.frame_number(),
        });
        Ok(())
    }

    fn submit(&mut self, frame: &RecordedFrame) -> Result<()> {
        let slot = self.slot_index(frame.slot())?;
        if self.fences[slot] != FenceState::Unsignaled {
            self.violation(format!("slot {slot} submitted without a fence reset"));
        }

        let completes_at = self.clock + self.config.latency;
        self.fences[slot] = FenceState::Pending { completes_at };
        self.waited[slot] = false;
        self.max_outstanding = self.max_outstanding.max(self.outstanding());
        self.events.push(SimEvent::Submit {
            slot,
            frame_number: frame.frame_number(),
            completes_at,
        });
        self.clock += 1;
        Ok(())
    }

    fn present(&mut self, frame: &SubmittedFrame) -> Result<PresentOutcome> {
        let slot = self.slot_index(frame.slot())?;
        let image_index = frame.image_index();
        if self.acquired[slot].take() != Some(image_index) {
            self.violation(format!("slot {slot} presented image {image_index} it did not acquire"));
        }

        let out_of_date = self.present_out_of_date > 0;
        if out_of_date {
            self.present_out_of_date -= 1;
        }
        self.events.push(SimEvent::Present {
            slot,
            image_index,
            out_of_date,
        });

        Ok(if out_of_date {
            PresentOutcome::OutOfDate
        } else {
            PresentOutcome::Presented { suboptimal: false }
        })
    }

    fn recreate_swapchain(&mut self) -> Result<bool> {
        if self.surface_extent.width == 0 || self.surface_extent.height == 0 {
            self.events.push(SimEvent::RecreateDeferred);
            return Ok(false);
        }

        self.drain();
        self.swapchain_extent = self.surface_extent;
        self.next_image = 0;
        self.recreations += 1;
        self.events.push(SimEvent::Recreate {
            extent: self.swapchain_extent,
        });
        Ok(true)
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.drain();
        self.events.push(SimEvent::Idle { clock: self.clock });
        Ok(())
    }
}
