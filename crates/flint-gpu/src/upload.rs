//! Host-to-device transfers on the transfer queue.
//!
//! [`Uploader`] owns a command pool and a fence that nothing else touches, so
//! uploads never contend with frame-slot resources. Every transfer blocks
//! until the copy has finished on the GPU.

use crate::command::CommandPool;
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::{BufferDesc, DeviceAllocator, GpuBuffer, GpuImage, ImageDesc};
use crate::queue::QueueFamilyIndices;
use crate::sync::Fence;
use ash::vk;

const STAGING_MEMORY: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Synchronous staging uploader.
pub struct Uploader {
    fence: Fence,
    pool: CommandPool,
    queue: vk::Queue,
    families: QueueFamilyIndices,
}

impl Uploader {
    /// Create the uploader's pool and fence on the transfer family.
    pub fn new(gpu: &GpuContext) -> Result<Self> {
        let families = gpu.families();
        let pool = CommandPool::new(
            gpu.device().clone(),
            families.transfer,
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;
        let fence = Fence::new(gpu.device().clone(), false)?;
        Ok(Self {
            fence,
            pool,
            queue: gpu.transfer_queue(),
            families,
        })
    }

    fn staging(allocator: &DeviceAllocator, size: u64, usage: vk::BufferUsageFlags) -> Result<GpuBuffer> {
        allocator.create_buffer(&BufferDesc {
            size,
            usage,
            memory: STAGING_MEMORY,
            queue_families: &[],
        })
    }

    /// Copy `data` into a new device-local buffer.
    ///
    /// `TRANSFER_DST` is added to `usage`. The buffer is shared between the
    /// transfer and graphics families when they differ.
    #[tracing::instrument(level = "debug", skip(self, allocator, data), fields(bytes = data.len()))]
    pub fn upload_buffer(
        &self,
        allocator: &DeviceAllocator,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> Result<GpuBuffer> {
        if data.is_empty() {
            return Err(GpuError::InvalidState("cannot upload an empty buffer".to_string()));
        }
        let size = data.len() as u64;

        let staging = Self::staging(allocator, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
        staging.write_bytes(0, data)?;

        let (_, queue_families) = self.families.upload_sharing();
        let buffer = allocator.create_buffer(&BufferDesc {
            size,
            usage: usage | vk::BufferUsageFlags::TRANSFER_DST,
            memory: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            queue_families: &queue_families,
        })?;

        self.pool.submit_and_wait(self.queue, &self.fence, |device, cmd| {
            let region = vk::BufferCopy::default().size(size);
            unsafe { device.cmd_copy_buffer(cmd, staging.handle(), buffer.handle(), &[region]) };
        })?;

        Ok(buffer)
    }

    /// Copy RGBA8 `pixels` into a new device-local sampled image.
    ///
    /// The image ends in `SHADER_READ_ONLY_OPTIMAL`.
    #[tracing::instrument(level = "debug", skip(self, allocator, pixels), fields(width = extent.width, height = extent.height))]
    pub fn upload_image(
        &self,
        allocator: &DeviceAllocator,
        extent: vk::Extent2D,
        format: vk::Format,
        pixels: &[u8],
    ) -> Result<GpuImage> {
        let expected = u64::from(extent.width) * u64::from(extent.height) * 4;
        if pixels.is_empty() || pixels.len() as u64 != expected {
            return Err(GpuError::InvalidState(format!(
                "expected {expected} bytes of pixel data, got {}",
                pixels.len()
            )));
        }

        let staging = Self::staging(allocator, expected, vk::BufferUsageFlags::TRANSFER_SRC)?;
        staging.write_bytes(0, pixels)?;

        let (_, queue_families) = self.families.upload_sharing();
        let image = allocator.create_image(
            &ImageDesc {
                extent,
                format,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                queue_families: &queue_families,
            },
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };

        self.pool.submit_and_wait(self.queue, &self.fence, |device, cmd| unsafe {
            let to_transfer = [vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::NONE)
                .src_access_mask(vk::AccessFlags2::NONE)
                .dst_stage_mask(vk::PipelineStageFlags2::COPY)
                .dst_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .image(image.handle())
                .subresource_range(range)];
            device.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default().image_memory_barriers(&to_transfer),
            );

            let region = vk::BufferImageCopy::default()
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                });
            device.cmd_copy_buffer_to_image(
                cmd,
                staging.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );

            // Transfer queues may not name graphics stages; the fence wait covers visibility
            let to_shader = [vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::COPY)
                .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
                .dst_access_mask(vk::AccessFlags2::NONE)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .image(image.handle())
                .subresource_range(range)];
            device.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default().image_memory_barriers(&to_shader),
            );
        })?;

        Ok(image)
    }

    /// Copy a device buffer back to host memory.
    ///
    /// The buffer must have been created with `TRANSFER_SRC`.
    pub fn read_back(&self, allocator: &DeviceAllocator, buffer: &GpuBuffer) -> Result<Vec<u8>> {
        if !buffer.usage().contains(vk::BufferUsageFlags::TRANSFER_SRC) {
            return Err(GpuError::InvalidState(
                "read-back source lacks TRANSFER_SRC".to_string(),
            ));
        }
        let size = buffer.size();
        let staging = Self::staging(allocator, size, vk::BufferUsageFlags::TRANSFER_DST)?;

        self.pool.submit_and_wait(self.queue, &self.fence, |device, cmd| {
            let region = vk::BufferCopy::default().size(size);
            unsafe { device.cmd_copy_buffer(cmd, buffer.handle(), staging.handle(), &[region]) };
        })?;

        staging.read_bytes(0, size as usize)
    }
}
