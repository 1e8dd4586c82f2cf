//! Vulkan frame backend: draws one indexed mesh into the swapchain.

use ash::vk;
use flint_core::{DrawPushConstants, FrameUniforms, MeshData, TextureData};
use flint_gpu::{
    command, AcquireOutcome, GpuContext, GpuError, PresentOutcome, Result, SwapchainManager,
    SwapchainPreferences, Texture, Uploader, VkResultExt,
};
use flint_platform::SurfaceWindow;
use flint_shaders::ShaderSet;
use std::sync::Arc;

use crate::backend::FrameBackend;
use crate::frames::FrameSlots;
use crate::mesh::GpuMesh;
use crate::mesh_pipeline::{MeshBindings, MeshPipeline};
use crate::slot::{AcquiredFrame, FenceSignaled, RecordedFrame, RecordingFrame, SubmittedFrame};

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

const COLOR_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// What the renderer draws.
#[derive(Debug, Clone)]
pub struct RenderScene {
    pub mesh: MeshData,
    pub texture: Option<TextureData>,
}

impl Default for RenderScene {
    fn default() -> Self {
        Self {
            mesh: MeshData::quad(),
            texture: None,
        }
    }
}

fn drawable_extent(window: &dyn SurfaceWindow) -> vk::Extent2D {
    let (width, height) = window.framebuffer_size();
    vk::Extent2D { width, height }
}

/// Frame backend that owns every GPU resource of the mesh renderer.
///
/// Fields drop top to bottom: per-slot resources, descriptors and pipeline,
/// scene buffers, the swapchain, then the context and finally the window the
/// surface was created from.
pub struct Renderer {
    frames: FrameSlots,
    pipeline: MeshPipeline,
    bindings: MeshBindings,
    mesh: GpuMesh,
    texture: Option<Texture>,
    swapchain: SwapchainManager,
    gpu: GpuContext,
    window: Arc<dyn SurfaceWindow>,
}

impl Renderer {
    /// Build the swapchain, upload `scene` and create `frames_in_flight` slots.
    ///
    /// `gpu` must have been built for `window`.
    pub fn new(
        gpu: GpuContext,
        window: Arc<dyn SurfaceWindow>,
        scene: &RenderScene,
        shaders: &ShaderSet,
        frames_in_flight: usize,
    ) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(GpuError::InvalidState(
                "frames in flight must be at least 1".to_string(),
            ));
        }

        let swapchain = SwapchainManager::new(
            &gpu,
            SwapchainPreferences::default(),
            drawable_extent(window.as_ref()),
        )?;

        let (mesh, texture) = {
            let uploader = Uploader::new(&gpu)?;
            let mesh = GpuMesh::upload(&gpu, &uploader, &scene.mesh)?;
            let texture = scene
                .texture
                .as_ref()
                .map(|data| Texture::upload(gpu.device().clone(), gpu.allocator(), &uploader, data))
                .transpose()?;
            (mesh, texture)
        };

        let frames = FrameSlots::new(&gpu, frames_in_flight)?;
        let uniform_buffers: Vec<_> = frames.iter().map(|slot| &slot.uniforms).collect();
        let bindings = MeshBindings::new(gpu.device().clone(), &uniform_buffers, texture.as_ref())?;

        let color_format = swapchain.current()?.format().format;
        let pipeline = MeshPipeline::new(
            gpu.device().clone(),
            shaders,
            color_format,
            bindings.layout(),
        )?;

        tracing::info!(
            frames_in_flight,
            indices = mesh.index_count(),
            textured = texture.is_some(),
            "Renderer ready"
        );

        Ok(Self {
            frames,
            pipeline,
            bindings,
            mesh,
            texture,
            swapchain,
            gpu,
            window,
        })
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn swapchain(&self) -> &SwapchainManager {
        &self.swapchain
    }

    pub fn mesh(&self) -> &GpuMesh {
        &self.mesh
    }

    pub fn is_textured(&self) -> bool {
        self.texture.is_some()
    }

    /// Record the draw into `cmd` for swapchain image `image_index`.
    ///
    /// # Safety
    /// `cmd` must belong to `slot` and be in the initial state.
    unsafe fn record_draw(&self, cmd: vk::CommandBuffer, slot: usize, image_index: u32) -> Result<()> {
        let device = self.gpu.device();
        let swapchain = self.swapchain.current()?;
        let index = image_index as usize;
        let (image, view) = match (swapchain.images().get(index), swapchain.image_views().get(index)) {
            (Some(&image), Some(&view)) => (image, view),
            _ => {
                return Err(GpuError::InvalidState(format!(
                    "swapchain image {image_index} out of range"
                )))
            }
        };
        let extent = swapchain.extent();
        let descriptor_set = self.bindings.set(slot)?;

        unsafe {
            command::begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

            let to_attachment = vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags2::NONE)
                .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
                .dst_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(COLOR_RANGE);
            device.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default()
                    .image_memory_barriers(std::slice::from_ref(&to_attachment)),
            );

            let color_attachment = vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: CLEAR_COLOR,
                    },
                });
            let rendering_info = vk::RenderingInfo::default()
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D::default(),
                    extent,
                })
                .layer_count(1)
                .color_attachments(std::slice::from_ref(&color_attachment));
            device.cmd_begin_rendering(cmd, &rendering_info);

            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
            device.cmd_bind_index_buffer(
                cmd,
                self.mesh.index_buffer().handle(),
                0,
                vk::IndexType::UINT32,
            );
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout(),
                0,
                &[descriptor_set],
                &[],
            );

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(
                cmd,
                0,
                &[vk::Rect2D {
                    offset: vk::Offset2D::default(),
                    extent,
                }],
            );

            let push = DrawPushConstants {
                vertex_buffer: self.mesh.vertex_address(),
            };
            device.cmd_push_constants(
                cmd,
                self.pipeline.layout(),
                vk::ShaderStageFlags::VERTEX,
                0,
                push.as_bytes(),
            );
            device.cmd_draw_indexed(cmd, self.mesh.index_count(), 1, 0, 0, 0);
            device.cmd_end_rendering(cmd);

            // Stays inside COLOR_ATTACHMENT_OUTPUT so the render-complete signal covers it
            let to_present = vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
                .dst_access_mask(vk::AccessFlags2::NONE)
                .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(COLOR_RANGE);
            device.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default()
                    .image_memory_barriers(std::slice::from_ref(&to_present)),
            );

            command::end_command_buffer(device, cmd)
        }
    }
}

impl FrameBackend for Renderer {
    fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain
            .current()
            .map(|s| s.extent())
            .unwrap_or_default()
    }

    fn wait_for_fence(&mut self, slot: usize) -> Result<()> {
        self.frames.get(slot)?.sync.wait()
    }

    fn acquire_next_image(&mut self, frame: &FenceSignaled) -> Result<AcquireOutcome> {
        let semaphore = self.frames.get(frame.slot())?.sync.image_acquired;
        self.swapchain.acquire_next_image(semaphore)
    }

    fn reset_frame(&mut self, frame: &AcquiredFrame) -> Result<()> {
        let slot = self.frames.get(frame.slot())?;
        slot.sync.reset()?;
        unsafe {
            self.gpu
                .device()
                .reset_command_buffer(slot.command_buffer, vk::CommandBufferResetFlags::empty())
        }
        .op("vkResetCommandBuffer")
    }

    fn write_uniforms(&mut self, frame: &RecordingFrame, uniforms: &FrameUniforms) -> Result<()> {
        self.frames
            .get(frame.slot())?
            .uniforms
            .write_bytes(0, uniforms.as_bytes())
    }

    fn record(&mut self, frame: &RecordingFrame) -> Result<()> {
        let cmd = self.frames.get(frame.slot())?.command_buffer;
        unsafe { self.record_draw(cmd, frame.slot(), frame.image_index()) }
    }

    fn submit(&mut self, frame: &RecordedFrame) -> Result<()> {
        let slot = self.frames.get(frame.slot())?;

        let wait = [vk::SemaphoreSubmitInfo::default()
            .semaphore(slot.sync.image_acquired)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let signal = [vk::SemaphoreSubmitInfo::default()
            .semaphore(slot.sync.render_complete)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let commands = [vk::CommandBufferSubmitInfo::default().command_buffer(slot.command_buffer)];
        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait)
            .command_buffer_infos(&commands)
            .signal_semaphore_infos(&signal);

        unsafe {
            self.gpu
                .device()
                .queue_submit2(self.gpu.graphics_queue(), &[submit], slot.sync.in_flight)
        }
        .op("vkQueueSubmit2")
    }

    fn present(&mut self, frame: &SubmittedFrame) -> Result<PresentOutcome> {
        let wait = self.frames.get(frame.slot())?.sync.render_complete;
        self.swapchain
            .present(self.gpu.present_queue(), frame.image_index(), wait)
    }

    fn recreate_swapchain(&mut self) -> Result<bool> {
        if !self.window.is_drawable() {
            return Ok(false);
        }
        let drawable = drawable_extent(self.window.as_ref());
        if !self.swapchain.recreate(&self.gpu, drawable)? {
            return Ok(false);
        }
        let format = self.swapchain.current()?.format().format;
        self.pipeline.ensure_format(format)?;
        Ok(true)
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.gpu.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.wait_idle() {
            tracing::error!("Failed to idle device before destroying renderer: {e}");
        }
        tracing::info!("Renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedWindow;

    impl raw_window_handle::HasDisplayHandle for FixedWindow {
        fn display_handle(
            &self,
        ) -> std::result::Result<raw_window_handle::DisplayHandle<'_>, raw_window_handle::HandleError>
        {
            Err(raw_window_handle::HandleError::Unavailable)
        }
    }

    impl raw_window_handle::HasWindowHandle for FixedWindow {
        fn window_handle(
            &self,
        ) -> std::result::Result<raw_window_handle::WindowHandle<'_>, raw_window_handle::HandleError>
        {
            Err(raw_window_handle::HandleError::Unavailable)
        }
    }

    impl SurfaceWindow for FixedWindow {
        fn framebuffer_size(&self) -> (u32, u32) {
            (1024, 0)
        }
    }

    #[test]
    fn default_scene_is_untextured_quad() {
        let scene = RenderScene::default();
        assert_eq!(scene.mesh.index_count(), 6);
        assert!(scene.texture.is_none());
    }

    #[test]
    fn drawable_extent_follows_window() {
        let extent = drawable_extent(&FixedWindow);
        assert_eq!(extent.width, 1024);
        assert_eq!(extent.height, 0);
        assert!(!FixedWindow.is_drawable());
    }
}
