//! Synchronization primitives.

use crate::error::{Result, VkResultExt};
use ash::vk;
use std::sync::Arc;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    unsafe { device.create_semaphore(&create_info, None) }.op("vkCreateSemaphore")
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    unsafe { device.create_fence(&create_info, None) }.op("vkCreateFence")
}

/// Wait without timeout for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
#[tracing::instrument(level = "trace", skip_all)]
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.wait_for_fences(&[fence], true, u64::MAX) }.op("vkWaitForFences")
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.reset_fences(&[fence]) }.op("vkResetFences")
}

/// Owned fence.
pub struct Fence {
    device: Arc<ash::Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled.
    pub fn new(device: Arc<ash::Device>, signaled: bool) -> Result<Self> {
        let fence = unsafe { create_fence(&device, signaled) }?;
        Ok(Self { device, fence })
    }

    /// Get the raw fence handle.
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Block until signaled.
    pub fn wait(&self) -> Result<()> {
        unsafe { wait_for_fence(&self.device, self.fence) }
    }

    /// Return to the unsignaled state.
    pub fn reset(&self) -> Result<()> {
        unsafe { reset_fence(&self.device, self.fence) }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.destroy_fence(self.fence, None) };
    }
}

/// Synchronization for one frame slot.
pub struct FrameSync {
    device: Arc<ash::Device>,
    /// Signaled when the acquired swapchain image is ready
    pub image_acquired: vk::Semaphore,
    /// Signaled when this slot's rendering is complete
    pub render_complete: vk::Semaphore,
    /// Signaled when this slot's submission has finished on the GPU
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// Create the primitives, with the fence signaled so the first wait returns.
    pub fn new(device: Arc<ash::Device>) -> Result<Self> {
        unsafe {
            let image_acquired = create_semaphore(&device)?;
            let render_complete = match create_semaphore(&device) {
                Ok(s) => s,
                Err(e) => {
                    device.destroy_semaphore(image_acquired, None);
                    return Err(e);
                }
            };
            let in_flight = match create_fence(&device, true) {
                Ok(f) => f,
                Err(e) => {
                    device.destroy_semaphore(image_acquired, None);
                    device.destroy_semaphore(render_complete, None);
                    return Err(e);
                }
            };
            Ok(Self {
                device,
                image_acquired,
                render_complete,
                in_flight,
            })
        }
    }

    /// Wait for this slot's previous submission.
    pub fn wait(&self) -> Result<()> {
        unsafe { wait_for_fence(&self.device, self.in_flight) }
    }

    /// Reset the fence before the next submission.
    pub fn reset(&self) -> Result<()> {
        unsafe { reset_fence(&self.device, self.in_flight) }
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.image_acquired, None);
            self.device.destroy_semaphore(self.render_complete, None);
            self.device.destroy_fence(self.in_flight, None);
        }
    }
}
