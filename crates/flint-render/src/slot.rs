//! Frame slot states and the tokens that prove a slot reached them.
//!
//! A slot moves `Idle → WaitingOnFence → Acquiring → Recording → Submitted →
//! Presented → Idle`, or back to `Idle` from `Acquiring` when the surface is
//! out of date. Tokens are minted only by this crate, so a backend can only
//! record into a slot whose fence has been waited on, and only submit a slot
//! whose commands have been recorded.

use flint_gpu::{GpuError, Result};

/// Where a frame slot is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Idle,
    WaitingOnFence,
    Acquiring,
    Recording,
    Submitted,
    Presented,
}

impl SlotState {
    /// Whether moving from `self` to `next` is allowed.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::WaitingOnFence)
                | (Self::WaitingOnFence, Self::Acquiring)
                | (Self::Acquiring, Self::Recording | Self::Idle)
                | (Self::Recording, Self::Submitted)
                | (Self::Submitted, Self::Presented)
                | (Self::Presented, Self::Idle)
        )
    }

    /// Move to `next`, or fail with `InvalidState` leaving `self` untouched.
    pub fn transition(&mut self, next: Self) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(GpuError::InvalidState(format!(
                "illegal frame slot transition {self:?} -> {next:?}"
            )));
        }
        *self = next;
        Ok(())
    }
}

/// The slot's fence has signalled; its resources are free to reuse.
#[derive(Debug)]
pub struct FenceSignaled {
    slot: usize,
    frame_number: u64,
}

impl FenceSignaled {
    pub(crate) const fn new(slot: usize, frame_number: u64) -> Self {
        Self { slot, frame_number }
    }

    pub const fn slot(&self) -> usize {
        self.slot
    }

    pub const fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub(crate) const fn acquired(self, image_index: u32, suboptimal: bool) -> AcquiredFrame {
        AcquiredFrame {
            slot: self.slot,
            frame_number: self.frame_number,
            image_index,
            suboptimal,
        }
    }
}

/// A swapchain image has been acquired for the slot.
#[derive(Debug)]
pub struct AcquiredFrame {
    slot: usize,
    frame_number: u64,
    image_index: u32,
    suboptimal: bool,
}

impl AcquiredFrame {
    pub const fn slot(&self) -> usize {
        self.slot
    }

    pub const fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub const fn image_index(&self) -> u32 {
        self.image_index
    }

    /// The acquire succeeded but the surface no longer matches exactly.
    pub const fn suboptimal(&self) -> bool {
        self.suboptimal
    }

    pub(crate) const fn begin_recording(self) -> RecordingFrame {
        RecordingFrame {
            slot: self.slot,
            frame_number: self.frame_number,
            image_index: self.image_index,
            suboptimal: self.suboptimal,
        }
    }
}

/// The slot's fence and command buffer are reset; recording may begin.
#[derive(Debug)]
pub struct RecordingFrame {
    slot: usize,
    frame_number: u64,
    image_index: u32,
    suboptimal: bool,
}

impl RecordingFrame {
    pub const fn slot(&self) -> usize {
        self.slot
    }

    pub const fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub const fn image_index(&self) -> u32 {
        self.image_index
    }

    pub(crate) const fn recorded(self) -> RecordedFrame {
        RecordedFrame {
            slot: self.slot,
            frame_number: self.frame_number,
            image_index: self.image_index,
            suboptimal: self.suboptimal,
        }
    }
}

/// The slot's command buffer is recorded and ready to submit.
#[derive(Debug)]
pub struct RecordedFrame {
    slot: usize,
    frame_number: u64,
    image_index: u32,
    suboptimal: bool,
}

impl RecordedFrame {
    pub const fn slot(&self) -> usize {
        self.slot
    }

    pub const fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub const fn image_index(&self) -> u32 {
        self.image_index
    }

    pub(crate) const fn submitted(self) -> SubmittedFrame {
        SubmittedFrame {
            slot: self.slot,
            frame_number: self.frame_number,
            image_index: self.image_index,
            suboptimal: self.suboptimal,
        }
    }
}

/// The slot's work is on the graphics queue.
#[derive(Debug)]
pub struct SubmittedFrame {
    slot: usize,
    frame_number: u64,
    image_index: u32,
    suboptimal: bool,
}

impl SubmittedFrame {
    pub const fn slot(&self) -> usize {
        self.slot
    }

    pub const fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub const fn image_index(&self) -> u32 {
        self.image_index
    }

    pub(crate) const fn suboptimal(&self) -> bool {
        self.suboptimal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle_is_allowed() {
        let mut state = SlotState::Idle;
        for next in [
            SlotState::WaitingOnFence,
            SlotState::Acquiring,
            SlotState::Recording,
            SlotState::Submitted,
            SlotState::Presented,
            SlotState::Idle,
        ] {
            state.transition(next).unwrap();
        }
        assert_eq!(state, SlotState::Idle);
    }

    #[test]
    fn out_of_date_acquire_returns_to_idle() {
        let mut state = SlotState::Acquiring;
        state.transition(SlotState::Idle).unwrap();
        assert_eq!(state, SlotState::Idle);
    }

    #[test]
    fn recording_before_fence_wait_is_rejected() {
        let mut state = SlotState::Idle;
        let err = state.transition(SlotState::Recording).unwrap_err();
        assert!(matches!(err, GpuError::InvalidState(_)));
        assert_eq!(state, SlotState::Idle);
    }

    #[test]
    fn submitted_cannot_skip_present() {
        assert!(!SlotState::Submitted.can_transition_to(SlotState::Idle));
        assert!(!SlotState::Recording.can_transition_to(SlotState::Idle));
        assert!(!SlotState::Presented.can_transition_to(SlotState::WaitingOnFence));
    }

    #[test]
    fn tokens_carry_frame_identity() {
        let signaled = FenceSignaled::new(2, 6);
        let acquired = signaled.acquired(1, true);
        assert_eq!(acquired.image_index(), 1);
        assert!(acquired.suboptimal());

        let recorded = acquired.begin_recording().recorded();
        assert_eq!(recorded.image_index(), 1);

        let submitted = recorded.submitted();
        assert_eq!(submitted.slot(), 2);
        assert_eq!(submitted.frame_number(), 6);
        assert_eq!(submitted.image_index(), 1);
        assert!(submitted.suboptimal());
    }
}
