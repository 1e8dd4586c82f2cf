//! The frame loop: one iteration per call, round-robin over frame slots.

use flint_core::FrameUniforms;
use flint_gpu::{AcquireOutcome, GpuError, PresentOutcome, Result};

use crate::backend::{FrameBackend, FrameInfo};
use crate::slot::{FenceSignaled, SlotState};

/// What happened to a presented frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub slot: usize,
    pub frame_number: u64,
    pub image_index: u32,
    pub suboptimal: bool,
    /// The swapchain was recreated after this frame's present.
    pub swapchain_recreated: bool,
}

/// Result of one [`FrameEngine::render_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented(FrameReport),
    /// The surface was out of date at acquire. The swapchain was recreated
    /// (or the recreation left pending) and the frame counter did not advance.
    Dropped,
}

/// Drives a [`FrameBackend`] through the per-slot state machine.
pub struct FrameEngine<B: FrameBackend> {
    backend: B,
    slots: Vec<SlotState>,
    frame_counter: u64,
    recreate_requested: bool,
    recreations: u64,
    dropped_frames: u64,
}

impl<B: FrameBackend> FrameEngine<B> {
    /// Wrap `backend`; it must expose at least one frame slot.
    pub fn new(backend: B) -> Result<Self> {
        let frames_in_flight = backend.frames_in_flight();
        if frames_in_flight == 0 {
            return Err(GpuError::InvalidState(
                "frames in flight must be at least 1".to_string(),
            ));
        }
        tracing::debug!(frames_in_flight, "Created frame engine");
        Ok(Self {
            backend,
            slots: vec![SlotState::Idle; frames_in_flight],
            frame_counter: 0,
            recreate_requested: false,
            recreations: 0,
            dropped_frames: 0,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Frames presented so far.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Slot the next call will use.
    pub fn current_slot(&self) -> usize {
        (self.frame_counter % self.slots.len() as u64) as usize
    }

    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).copied()
    }

    /// Swapchain recreations performed so far.
    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Ask for the swapchain to be recreated before the next acquire.
    ///
    /// Repeated requests before the next frame collapse into one recreation.
    pub fn request_recreate(&mut self) {
        self.recreate_requested = true;
    }

    pub fn recreate_pending(&self) -> bool {
        self.recreate_requested
    }

    /// Recreate the swapchain now, or keep the request pending if the
    /// backend defers it. Returns whether a new swapchain was created.
    pub fn recreate(&mut self) -> Result<bool> {
        if !self.backend.recreate_swapchain()? {
            tracing::debug!("Swapchain recreation deferred");
            self.recreate_requested = true;
            return Ok(false);
        }
        self.recreate_requested = false;
        self.recreations += 1;
        Ok(true)
    }

    /// Run one frame on the current slot.
    ///
    /// `uniforms` is called once the slot's fence has signalled and an image
    /// has been acquired; its result is written into the slot's buffer.
    pub fn render_frame<F>(&mut self, uniforms: F) -> Result<FrameStatus>
    where
        F: FnOnce(&FrameInfo) -> FrameUniforms,
    {
        let slot = self.current_slot();
        let frame_number = self.frame_counter;
        let _span = tracing::trace_span!("frame", slot, frame_number).entered();

        self.set_state(slot, SlotState::WaitingOnFence)?;
        self.backend.wait_for_fence(slot)?;
        let signaled = FenceSignaled::new(slot, frame_number);

        self.set_state(slot, SlotState::Acquiring)?;
        if self.recreate_requested {
            self.recreate()?;
        }

        let acquired = match self.backend.acquire_next_image(&signaled)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => signaled.acquired(image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                tracing::debug!(slot, "Swapchain out of date at acquire");
                self.set_state(slot, SlotState::Idle)?;
                self.recreate()?;
                self.dropped_frames += 1;
                return Ok(FrameStatus::Dropped);
            }
        };

        self.backend.reset_frame(&acquired)?;
        let recording = acquired.begin_recording();
        self.set_state(slot, SlotState::Recording)?;

        let info = FrameInfo {
            slot,
            frame_number,
            image_index: recording.image_index(),
            extent: self.backend.extent(),
        };
        let values = uniforms(&info);
        self.backend.write_uniforms(&recording, &values)?;
        self.backend.record(&recording)?;
        let recorded = recording.recorded();

        self.backend.submit(&recorded)?;
        let submitted = recorded.submitted();
        self.set_state(slot, SlotState::Submitted)?;

        let outcome = self.backend.present(&submitted)?;
        self.set_state(slot, SlotState::Presented)?;

        let (suboptimal, swapchain_recreated) = match outcome {
            PresentOutcome::Presented { suboptimal } => {
                (suboptimal || submitted.suboptimal(), false)
            }
            PresentOutcome::OutOfDate => {
                tracing::debug!(slot, "Swapchain out of date at present");
                (false, self.recreate()?)
            }
        };

        self.set_state(slot, SlotState::Idle)?;
        self.frame_counter += 1;

        Ok(FrameStatus::Presented(FrameReport {
            slot,
            frame_number,
            image_index: submitted.image_index(),
            suboptimal,
            swapchain_recreated,
        }))
    }

    /// Block until the backend has no work in flight.
    pub fn wait_idle(&mut self) -> Result<()> {
        self.backend.wait_idle()
    }

    fn set_state(&mut self, slot: usize, next: SlotState) -> Result<()> {
        let state = self
            .slots
            .get_mut(slot)
            .ok_or_else(|| GpuError::InvalidState(format!("no frame slot {slot}")))?;
        state.transition(next)
    }
}

impl<B: FrameBackend> Drop for FrameEngine<B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.wait_idle() {
            tracing::error!("Failed to idle before shutdown: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::{AcquiredFrame, RecordedFrame, RecordingFrame, SubmittedFrame};
    use ash::vk;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Uniforms(usize),
        Record(usize),
        Submit(usize),
        Present(usize),
        Recreate,
        Idle,
    }

    #[derive(Default)]
    struct Scripted {
        calls: Vec<Call>,
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<PresentOutcome>,
        fail_record: bool,
        defer_recreate: bool,
        recorded: Option<u64>,
    }

    impl FrameBackend for Scripted {
        fn frames_in_flight(&self) -> usize {
            3
        }

        fn extent(&self) -> vk::Extent2D {
            vk::Extent2D {
                width: 800,
                height: 600,
            }
        }

        fn wait_for_fence(&mut self, slot: usize) -> Result<()> {
            self.calls.push(Call::Wait(slot));
            Ok(())
        }

        fn acquire_next_image(&mut self, frame: &FenceSignaled) -> Result<AcquireOutcome> {
            self.calls.push(Call::Acquire(frame.slot()));
            Ok(self.acquires.pop_front().unwrap_or(AcquireOutcome::Acquired {
                image_index: 0,
                suboptimal: false,
            }))
        }

        fn reset_frame(&mut self, frame: &AcquiredFrame) -> Result<()> {
            self.calls.push(Call::Reset(frame.slot()));
            Ok(())
        }

        fn write_uniforms(&mut self, frame: &RecordingFrame, _: &FrameUniforms) -> Result<()> {
            self.calls.push(Call::Uniforms(frame.slot()));
            Ok(())
        }

        fn record(&mut self, frame: &RecordingFrame) -> Result<()> {
            if self.fail_record {
                return Err(GpuError::vulkan(
                    "vkBeginCommandBuffer",
                    vk::Result::ERROR_DEVICE_LOST,
                ));
            }
            self.calls.push(Call::Record(frame.slot()));
            self.recorded = Some(frame.frame_number());
            Ok(())
        }

        fn submit(&mut self, frame: &RecordedFrame) -> Result<()> {
            assert_eq!(self.recorded.take(), Some(frame.frame_number()));
            self.calls.push(Call::Submit(frame.slot()));
            Ok(())
        }

        fn present(&mut self, frame: &SubmittedFrame) -> Result<PresentOutcome> {
            self.calls.push(Call::Present(frame.slot()));
            Ok(self
                .presents
                .pop_front()
                .unwrap_or(PresentOutcome::Presented { suboptimal: false }))
        }

        fn recreate_swapchain(&mut self) -> Result<bool> {
            self.calls.push(Call::Recreate);
            Ok(!self.defer_recreate)
        }

        fn wait_idle(&mut self) -> Result<()> {
            self.calls.push(Call::Idle);
            Ok(())
        }
    }

    fn identity(_: &FrameInfo) -> FrameUniforms {
        FrameUniforms::default()
    }

    #[test]
    fn steps_run_in_order() {
        let mut engine = FrameEngine::new(Scripted::default()).unwrap();
        let status = engine.render_frame(identity).unwrap();

        assert!(matches!(status, FrameStatus::Presented(r) if r.slot == 0 && r.frame_number == 0));
        assert_eq!(
            engine.backend().calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Reset(0),
                Call::Uniforms(0),
                Call::Record(0),
                Call::Submit(0),
                Call::Present(0),
            ]
        );
        assert_eq!(engine.slot_state(0), Some(SlotState::Idle));
    }

    #[test]
    fn slots_rotate_round_robin() {
        let mut engine = FrameEngine::new(Scripted::default()).unwrap();
        let mut seen = Vec::new();
        for _ in 0..7 {
            if let FrameStatus::Presented(report) = engine.render_frame(identity).unwrap() {
                seen.push(report.slot);
            }
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(engine.frame_counter(), 7);
        assert_eq!(engine.current_slot(), 1);
    }

    #[test]
    fn uniform_producer_sees_acquired_image() {
        let backend = Scripted {
            acquires: VecDeque::from([AcquireOutcome::Acquired {
                image_index: 2,
                suboptimal: false,
            }]),
            ..Scripted::default()
        };
        let mut engine = FrameEngine::new(backend).unwrap();
        let mut info = None;
        engine
            .render_frame(|i| {
                info = Some(*i);
                FrameUniforms::default()
            })
            .unwrap();

        let info = info.unwrap();
        assert_eq!(info.image_index, 2);
        assert_eq!(info.extent.width, 800);
    }

    #[test]
    fn out_of_date_acquire_drops_frame_without_advancing() {
        let backend = Scripted {
            acquires: VecDeque::from([AcquireOutcome::OutOfDate]),
            ..Scripted::default()
        };
        let mut engine = FrameEngine::new(backend).unwrap();

        assert_eq!(engine.render_frame(identity).unwrap(), FrameStatus::Dropped);
        assert_eq!(engine.frame_counter(), 0);
        assert_eq!(engine.recreations(), 1);
        assert_eq!(engine.dropped_frames(), 1);
        assert_eq!(engine.slot_state(0), Some(SlotState::Idle));

        let status = engine.render_frame(identity).unwrap();
        assert!(matches!(status, FrameStatus::Presented(r) if r.slot == 0));
        assert!(!engine.backend().calls.contains(&Call::Reset(1)));
    }

    #[test]
    fn out_of_date_present_recreates_and_advances() {
        let backend = Scripted {
            presents: VecDeque::from([PresentOutcome::OutOfDate]),
            ..Scripted::default()
        };
        let mut engine = FrameEngine::new(backend).unwrap();

        let status = engine.render_frame(identity).unwrap();
        assert!(matches!(status, FrameStatus::Presented(r) if r.swapchain_recreated));
        assert_eq!(engine.frame_counter(), 1);
        assert_eq!(engine.recreations(), 1);
    }

    #[test]
    fn suboptimal_acquire_proceeds() {
        let backend = Scripted {
            acquires: VecDeque::from([AcquireOutcome::Acquired {
                image_index: 1,
                suboptimal: true,
            }]),
            ..Scripted::default()
        };
        let mut engine = FrameEngine::new(backend).unwrap();

        let status = engine.render_frame(identity).unwrap();
        assert!(matches!(status, FrameStatus::Presented(r) if r.suboptimal && !r.swapchain_recreated));
        assert_eq!(engine.recreations(), 0);
    }

    #[test]
    fn repeated_resize_requests_recreate_once_before_acquire() {
        let mut engine = FrameEngine::new(Scripted::default()).unwrap();
        engine.request_recreate();
        engine.request_recreate();
        engine.render_frame(identity).unwrap();

        assert_eq!(engine.recreations(), 1);
        assert!(!engine.recreate_pending());
        let calls = &engine.backend().calls;
        assert_eq!(&calls[..3], &[Call::Wait(0), Call::Recreate, Call::Acquire(0)]);
    }

    #[test]
    fn deferred_recreation_stays_pending() {
        let backend = Scripted {
            defer_recreate: true,
            ..Scripted::default()
        };
        let mut engine = FrameEngine::new(backend).unwrap();
        engine.request_recreate();

        let status = engine.render_frame(identity).unwrap();
        assert!(matches!(status, FrameStatus::Presented(_)));
        assert_eq!(engine.recreations(), 0);
        assert!(engine.recreate_pending());

        engine.backend_mut().defer_recreate = false;
        engine.render_frame(identity).unwrap();
        assert_eq!(engine.recreations(), 1);
        assert!(!engine.recreate_pending());
    }

    #[test]
    fn fatal_error_propagates() {
        let backend = Scripted {
            fail_record: true,
            ..Scripted::default()
        };
        let mut engine = FrameEngine::new(backend).unwrap();
        let err = engine.render_frame(identity).unwrap_err();
        assert_eq!(err.class(), flint_gpu::ErrorClass::FatalGpu);
        assert_eq!(engine.frame_counter(), 0);
    }

    #[test]
    fn failed_record_never_submits() {
        let backend = Scripted {
            fail_record: true,
            ..Scripted::default()
        };
        let mut engine = FrameEngine::new(backend).unwrap();
        assert!(engine.render_frame(identity).is_err());

        let calls = &engine.backend().calls;
        assert!(!calls.iter().any(|c| matches!(c, Call::Submit(_) | Call::Present(_))));
        assert_eq!(calls.last(), Some(&Call::Uniforms(0)));
    }

    #[test]
    fn each_submit_follows_its_own_record() {
        let mut engine = FrameEngine::new(Scripted::default()).unwrap();
        for _ in 0..5 {
            engine.render_frame(identity).unwrap();
        }
        let calls = &engine.backend().calls;
        let records = calls.iter().filter(|c| matches!(c, Call::Record(_))).count();
        let submits = calls.iter().filter(|c| matches!(c, Call::Submit(_))).count();
        assert_eq!((records, submits), (5, 5));
        assert!(engine.backend().recorded.is_none());
    }

    #[test]
    fn zero_slots_is_rejected() {
        struct Empty(Scripted);
        impl FrameBackend for Empty {
            fn frames_in_flight(&self) -> usize {
                0
            }
            fn extent(&self) -> vk::Extent2D {
                self.0.extent()
            }
            fn wait_for_fence(&mut self, slot: usize) -> Result<()> {
                self.0.wait_for_fence(slot)
            }
            fn acquire_next_image(&mut self, f: &FenceSignaled) -> Result<AcquireOutcome> {
                self.0.acquire_next_image(f)
            }
            fn reset_frame(&mut self, f: &AcquiredFrame) -> Result<()> {
                self.0.reset_frame(f)
            }
            fn write_uniforms(&mut self, f: &RecordingFrame, u: &FrameUniforms) -> Result<()> {
                self.0.write_uniforms(f, u)
            }
            fn record(&mut self, f: &RecordingFrame) -> Result<()> {
                self.0.record(f)
            }
            fn submit(&mut self, f: &RecordedFrame) -> Result<()> {
                self.0.submit(f)
            }
            fn present(&mut self, f: &SubmittedFrame) -> Result<PresentOutcome> {
                self.0.present(f)
            }
            fn recreate_swapchain(&mut self) -> Result<bool> {
                self.0.recreate_swapchain()
            }
            fn wait_idle(&mut self) -> Result<()> {
                self.0.wait_idle()
            }
        }

        assert!(FrameEngine::new(Empty(Scripted::default())).is_err());
    }

    #[test]
    fn wait_idle_reaches_backend() {
        let mut engine = FrameEngine::new(Scripted::default()).unwrap();
        engine.render_frame(identity).unwrap();
        assert!(!engine.backend().calls.contains(&Call::Idle));
        engine.wait_idle().unwrap();
        assert_eq!(engine.backend().calls.last(), Some(&Call::Idle));
    }
}
