//! Sampled textures.

use crate::error::{GpuError, Result, VkResultExt};
use crate::memory::{DeviceAllocator, GpuImage};
use crate::upload::Uploader;
use ash::vk;
use flint_core::TextureData;
use std::sync::Arc;

/// Format used for RGBA8 texture data.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// A device-local image with a view and sampler, ready for shader reads.
pub struct Texture {
    device: Arc<ash::Device>,
    sampler: vk::Sampler,
    view: vk::ImageView,
    image: GpuImage,
}

impl Texture {
    /// Upload `data` and create its view and sampler.
    pub fn upload(
        device: Arc<ash::Device>,
        allocator: &DeviceAllocator,
        uploader: &Uploader,
        data: &TextureData,
    ) -> Result<Self> {
        let extent = vk::Extent2D {
            width: data.width(),
            height: data.height(),
        };
        let image = uploader.upload_image(allocator, extent, TEXTURE_FORMAT, data.pixels())?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.handle())
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );
        let view = unsafe { device.create_image_view(&view_info, None) }.op("vkCreateImageView")?;

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .max_lod(0.0);
        let sampler = match unsafe { device.create_sampler(&sampler_info, None) } {
            Ok(s) => s,
            Err(e) => {
                unsafe { device.destroy_image_view(view, None) };
                return Err(GpuError::vulkan("vkCreateSampler", e));
            }
        };

        Ok(Self {
            device,
            sampler,
            view,
            image,
        })
    }

    /// Image view for descriptor writes.
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Sampler for descriptor writes.
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Size in texels.
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
            self.device.destroy_image_view(self.view, None);
        }
    }
}
