//! Surface management for windowed rendering.
//!
//! Wraps the Vulkan surface and hides the raw-window-handle plumbing from
//! application code.

use crate::error::{GpuError, Result, VkResultExt};
use crate::instance::VulkanInstance;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Owned Vulkan surface for a window.
pub struct SurfaceContext {
    surface: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl SurfaceContext {
    /// Create a surface for a window.
    ///
    /// The surface must be dropped before `instance`, and `window` must outlive it.
    pub fn new<W>(instance: &VulkanInstance, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle + ?Sized,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        let surface = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.handle(),
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .op("vkCreateSurfaceKHR")?;

        let loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        Ok(Self { surface, loader })
    }

    /// Get the raw surface handle.
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Whether a queue family of `physical_device` can present to this surface.
    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, family: u32) -> Result<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, family, self.surface)
        }
        .op("vkGetPhysicalDeviceSurfaceSupportKHR")
    }

    /// Query what the surface supports on a physical device.
    pub fn support(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        unsafe {
            let capabilities = self
                .loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .op("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;

            let formats = self
                .loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .op("vkGetPhysicalDeviceSurfaceFormatsKHR")?;

            let present_modes = self
                .loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .op("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }
}

impl Drop for SurfaceContext {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
    }
}

/// Surface capabilities query result.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// A swapchain can be created only with at least one format and one mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}
