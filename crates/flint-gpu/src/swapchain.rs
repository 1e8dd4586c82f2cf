//! Swapchain creation, recreation and presentation.

use crate::context::GpuContext;
use crate::error::{GpuError, Result, VkResultExt};
use crate::surface::SurfaceSupport;
use ash::vk;
use std::sync::Arc;

/// Result of acquiring a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired; `suboptimal` images may still be rendered to.
    Acquired { image_index: u32, suboptimal: bool },
    /// The surface changed and no image was acquired.
    OutOfDate,
}

/// Result of presenting a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The image was queued for presentation.
    Presented { suboptimal: bool },
    /// The surface changed; the swapchain must be recreated.
    OutOfDate,
}

/// Surface format and present mode preferences.
#[derive(Debug, Clone)]
pub struct SwapchainPreferences {
    /// Format used when the surface supports it.
    pub format: vk::SurfaceFormatKHR,
    /// Present modes in order of preference.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl Default for SwapchainPreferences {
    fn default() -> Self {
        Self {
            format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_modes: vec![vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE],
        }
    }
}

/// Select the surface format: the preferred one if supported, else the first.
pub fn select_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
        .or_else(|| available.first())
        .copied()
}

/// Select the present mode: the first preferred mode supported, else the
/// first mode the surface reports.
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: &[vk::PresentModeKHR],
) -> Option<vk::PresentModeKHR> {
    preferred
        .iter()
        .find(|mode| available.contains(mode))
        .or_else(|| available.first())
        .copied()
}

/// Calculate swapchain extent.
///
/// A fixed `current_extent` is used verbatim; `u32::MAX` means the surface
/// follows the swapchain, so the drawable size is clamped into range.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    drawable: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: drawable.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: drawable.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Extent a swapchain would get from `support`, or `None` while the surface
/// has no drawable area (minimised, or mid-resize on some platforms).
pub fn drawable_swapchain_extent(
    support: &SurfaceSupport,
    drawable: vk::Extent2D,
) -> Option<vk::Extent2D> {
    let extent = calculate_extent(&support.capabilities, drawable);
    (extent.width > 0 && extent.height > 0).then_some(extent)
}

/// One more than the minimum, capped by the maximum when it is bounded.
pub fn image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Swapchain handle with its images and views.
pub struct Swapchain {
    device: Arc<ash::Device>,
    loader: ash::khr::swapchain::Device,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for the context's surface.
    ///
    /// Fails with `InvalidState` when the surface has no drawable area;
    /// callers that can wait check [`drawable_swapchain_extent`] first.
    pub fn new(
        gpu: &GpuContext,
        loader: &ash::khr::swapchain::Device,
        support: &SurfaceSupport,
        preferences: &SwapchainPreferences,
        drawable: vk::Extent2D,
    ) -> Result<Self> {
        let surface = gpu
            .surface()
            .ok_or_else(|| GpuError::InvalidState("swapchain needs a surface".to_string()))?;

        let format = select_surface_format(&support.formats, preferences.format)
            .ok_or_else(|| GpuError::InvalidState("surface reports no formats".to_string()))?;
        let present_mode = select_present_mode(&support.present_modes, &preferences.present_modes)
            .ok_or_else(|| GpuError::InvalidState("surface reports no present modes".to_string()))?;
        let extent = drawable_swapchain_extent(support, drawable).ok_or_else(|| {
            GpuError::InvalidState(format!(
                "zero-sized swapchain for drawable {}x{}",
                drawable.width, drawable.height
            ))
        })?;

        let (sharing_mode, queue_families) = gpu.families().sharing();

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(image_count(&support.capabilities))
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&queue_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let device = gpu.device().clone();
        let handle =
            unsafe { loader.create_swapchain(&create_info, None) }.op("vkCreateSwapchainKHR")?;

        // From here on, Drop cleans up whatever has been created
        let mut swapchain = Self {
            device,
            loader: loader.clone(),
            handle,
            images: Vec::new(),
            image_views: Vec::new(),
            format,
            present_mode,
            extent,
        };

        swapchain.images =
            unsafe { loader.get_swapchain_images(handle) }.op("vkGetSwapchainImagesKHR")?;

        for &image in &swapchain.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );
            let view = unsafe { swapchain.device.create_image_view(&view_info, None) }
                .op("vkCreateImageView")?;
            swapchain.image_views.push(view);
        }

        tracing::info!(
            width = extent.width,
            height = extent.height,
            format = ?format.format,
            present_mode = ?present_mode,
            images = swapchain.images.len(),
            sharing = ?sharing_mode,
            "Created swapchain"
        );

        Ok(swapchain)
    }

    /// Get the raw swapchain handle.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// Swapchain images in presentation-engine order.
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// One view per image.
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Chosen surface format.
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Chosen present mode.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Image extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

/// Owns the current swapchain and replaces it when the surface changes.
pub struct SwapchainManager {
    loader: ash::khr::swapchain::Device,
    preferences: SwapchainPreferences,
    current: Option<Swapchain>,
    generation: u64,
}

impl SwapchainManager {
    /// Create the manager and its first swapchain.
    pub fn new(
        gpu: &GpuContext,
        preferences: SwapchainPreferences,
        drawable: vk::Extent2D,
    ) -> Result<Self> {
        let loader = ash::khr::swapchain::Device::new(gpu.instance().handle(), gpu.device());
        let support = gpu.surface_support()?;
        let swapchain = Swapchain::new(gpu, &loader, &support, &preferences, drawable)?;
        Ok(Self {
            loader,
            preferences,
            current: Some(swapchain),
            generation: 0,
        })
    }

    /// The live swapchain.
    pub fn current(&self) -> Result<&Swapchain> {
        self.current
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("no live swapchain".to_string()))
    }

    /// Number of completed recreations.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the device to go idle, destroy the old swapchain and create a new one.
    ///
    /// Returns `Ok(false)` without touching the live swapchain when the
    /// surface currently has no drawable area; the caller retries later.
    /// Safe to call repeatedly: the old swapchain is dropped exactly once,
    /// and a failed creation leaves no live swapchain rather than a dangling one.
    pub fn recreate(&mut self, gpu: &GpuContext, drawable: vk::Extent2D) -> Result<bool> {
        let support = gpu.surface_support()?;
        if drawable_swapchain_extent(&support, drawable).is_none() {
            tracing::debug!(
                width = drawable.width,
                height = drawable.height,
                "Surface has no drawable area, deferring swapchain recreation"
            );
            return Ok(false);
        }

        gpu.wait_idle()?;
        drop(self.current.take());

        let swapchain = Swapchain::new(gpu, &self.loader, &support, &self.preferences, drawable)?;
        self.current = Some(swapchain);
        self.generation += 1;
        tracing::info!(generation = self.generation, "Recreated swapchain");
        Ok(true)
    }

    /// Acquire the next image, signalling `semaphore` when it is ready.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<AcquireOutcome> {
        let swapchain = self.current()?;
        let result = unsafe {
            self.loader
                .acquire_next_image(swapchain.handle, u64::MAX, semaphore, vk::Fence::null())
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(GpuError::vulkan("vkAcquireNextImageKHR", e)),
        }
    }

    /// Queue `image_index` for presentation once `wait` is signalled.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        let swapchains = [self.current()?.handle];
        let image_indices = [image_index];
        let wait_semaphores = [wait];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(PresentOutcome::Presented { suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(GpuError::vulkan("vkQueuePresentKHR", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn preferred_format_wins_when_present() {
        let preferred = SwapchainPreferences::default().format;
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            preferred,
        ];
        assert_eq!(select_surface_format(&available, preferred), Some(preferred));
    }

    #[test]
    fn format_falls_back_to_first() {
        let preferred = SwapchainPreferences::default().format;
        let first = format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        // Right format, wrong colour space is not a match
        let near_miss = format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT);
        assert_eq!(select_surface_format(&[first, near_miss], preferred), Some(first));
        assert_eq!(select_surface_format(&[], preferred), None);
    }

    #[test]
    fn present_mode_prefers_low_latency() {
        let prefs = SwapchainPreferences::default().present_modes;
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(select_present_mode(&all, &prefs), Some(vk::PresentModeKHR::MAILBOX));
        let no_mailbox = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            select_present_mode(&no_mailbox, &prefs),
            Some(vk::PresentModeKHR::IMMEDIATE)
        );
    }

    #[test]
    fn present_mode_falls_back_to_first_reported() {
        let prefs = SwapchainPreferences::default().present_modes;
        let modes = [vk::PresentModeKHR::FIFO_RELAXED, vk::PresentModeKHR::FIFO];
        assert_eq!(
            select_present_mode(&modes, &prefs),
            Some(vk::PresentModeKHR::FIFO_RELAXED)
        );
        assert_eq!(select_present_mode(&[], &prefs), None);
    }

    #[test]
    fn fixed_extent_is_used_verbatim() {
        let c = caps((1024, 768), (1, 1), (4096, 4096));
        let drawable = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(
            calculate_extent(&c, drawable),
            vk::Extent2D {
                width: 1024,
                height: 768
            }
        );
    }

    #[test]
    fn undefined_extent_clamps_drawable() {
        let c = caps((u32::MAX, u32::MAX), (100, 100), (1920, 1080));
        let huge = vk::Extent2D {
            width: 5000,
            height: 50,
        };
        assert_eq!(
            calculate_extent(&c, huge),
            vk::Extent2D {
                width: 1920,
                height: 100
            }
        );
        let fits = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(calculate_extent(&c, fits), fits);
    }

    fn support(capabilities: vk::SurfaceCapabilitiesKHR) -> SurfaceSupport {
        SurfaceSupport {
            capabilities,
            formats: vec![SwapchainPreferences::default().format],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    #[test]
    fn zero_current_extent_has_no_drawable_swapchain() {
        // Window still reports a size but the surface is already 0x0
        let minimised = support(caps((0, 0), (0, 0), (4096, 4096)));
        let drawable = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(drawable_swapchain_extent(&minimised, drawable), None);

        let collapsed = support(caps((1280, 0), (0, 0), (4096, 4096)));
        assert_eq!(drawable_swapchain_extent(&collapsed, drawable), None);
    }

    #[test]
    fn zero_drawable_on_following_surface_has_no_swapchain() {
        let following = support(caps((u32::MAX, u32::MAX), (0, 0), (4096, 4096)));
        let zero = vk::Extent2D {
            width: 0,
            height: 600,
        };
        assert_eq!(drawable_swapchain_extent(&following, zero), None);

        let sized = vk::Extent2D {
            width: 640,
            height: 480,
        };
        assert_eq!(drawable_swapchain_extent(&following, sized), Some(sized));
    }

    #[test]
    fn image_count_is_min_plus_one_capped() {
        let mut c = caps((1, 1), (1, 1), (1, 1));
        c.min_image_count = 2;
        c.max_image_count = 0;
        assert_eq!(image_count(&c), 3);
        c.max_image_count = 2;
        assert_eq!(image_count(&c), 2);
        c.max_image_count = 8;
        assert_eq!(image_count(&c), 3);
    }
}
