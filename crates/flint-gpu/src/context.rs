//! GPU context management.

use crate::capabilities::{DeviceTypePolicy, GpuCapabilities};
use crate::device::{select_physical_device, DeviceContext};
use crate::error::{GpuError, Result};
use crate::instance::{ValidationMode, VulkanInstance};
use crate::memory::DeviceAllocator;
use crate::queue::QueueFamilyIndices;
use crate::surface::{SurfaceContext, SurfaceSupport};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

/// Instance, optional surface, device and allocator, built in that order.
///
/// Fields drop top to bottom, which is the reverse of construction.
pub struct GpuContext {
    allocator: DeviceAllocator,
    device: DeviceContext,
    surface: Option<SurfaceContext>,
    instance: VulkanInstance,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &Arc<ash::Device> {
        self.device.device()
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.device.physical_device()
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        self.device.capabilities()
    }

    /// Get the Vulkan instance.
    pub fn instance(&self) -> &VulkanInstance {
        &self.instance
    }

    /// The presentation surface, absent for headless contexts.
    pub fn surface(&self) -> Option<&SurfaceContext> {
        self.surface.as_ref()
    }

    /// Current surface capabilities, formats and present modes.
    pub fn surface_support(&self) -> Result<SurfaceSupport> {
        self.surface
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("headless context has no surface".to_string()))?
            .support(self.physical_device())
    }

    /// Queue family indices.
    pub fn families(&self) -> QueueFamilyIndices {
        self.device.families()
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue()
    }

    /// Get the present queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue()
    }

    /// Get the transfer queue.
    pub fn transfer_queue(&self) -> vk::Queue {
        self.device.transfer_queue()
    }

    /// Get the device memory allocator.
    pub fn allocator(&self) -> &DeviceAllocator {
        &self.allocator
    }

    /// Wait for device to be idle.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        let stats = self.allocator.stats();
        if stats.live_allocations > 0 {
            tracing::warn!(
                allocations = stats.live_allocations,
                bytes = stats.live_bytes,
                "GPU memory still allocated at shutdown"
            );
        } else {
            tracing::debug!(peak_bytes = stats.peak_bytes, "GPU context destroyed");
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    validation: ValidationMode,
    device_policy: DeviceTypePolicy,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: flint_core::constants::ENGINE_NAME.to_string(),
            validation: ValidationMode::for_build(),
            device_policy: DeviceTypePolicy::default(),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Set how validation layers are requested.
    pub fn validation(mut self, mode: ValidationMode) -> Self {
        self.validation = mode;
        self
    }

    /// Set which device types are acceptable.
    pub fn device_policy(mut self, policy: DeviceTypePolicy) -> Self {
        self.device_policy = policy;
        self
    }

    /// Build a context without a surface.
    pub fn build_headless(self) -> Result<GpuContext> {
        let instance = VulkanInstance::new(&self.app_name, self.validation, None)?;
        Self::finish(instance, None, self.device_policy)
    }

    /// Build a context that presents to `window`.
    pub fn build_for_window<W>(self, window: &W) -> Result<GpuContext>
    where
        W: HasDisplayHandle + HasWindowHandle + ?Sized,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?
            .as_raw();
        let instance = VulkanInstance::new(&self.app_name, self.validation, Some(display))?;
        let surface = SurfaceContext::new(&instance, window)?;
        Self::finish(instance, Some(surface), self.device_policy)
    }

    fn finish(
        instance: VulkanInstance,
        surface: Option<SurfaceContext>,
        policy: DeviceTypePolicy,
    ) -> Result<GpuContext> {
        let selected = select_physical_device(&instance, surface.as_ref(), policy)?;
        let device = DeviceContext::new(&instance, selected, surface.is_some())?;
        let allocator = DeviceAllocator::new(device.device().clone(), *device.memory_properties());

        Ok(GpuContext {
            allocator,
            device,
            surface,
            instance,
        })
    }
}
