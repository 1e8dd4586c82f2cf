//! Pipeline and descriptor sets for drawing a [`GpuMesh`](crate::GpuMesh).

use ash::vk;
use flint_core::{DrawPushConstants, FrameUniforms};
use flint_gpu::{
    write_combined_image_sampler, write_uniform_buffer, DescriptorPool, DescriptorSetLayout,
    DescriptorSetLayoutBuilder, GpuBuffer, GraphicsPipeline, GraphicsPipelineConfig, GpuError,
    Result, Texture,
};
use flint_shaders::ShaderSet;
use std::sync::Arc;

/// Binding of the per-frame uniform buffer.
pub const UNIFORM_BINDING: u32 = 0;
/// Binding of the optional texture.
pub const TEXTURE_BINDING: u32 = 1;

fn layout_builder<'a>(textured: bool) -> DescriptorSetLayoutBuilder<'a> {
    let builder =
        DescriptorSetLayoutBuilder::new().uniform_buffer(UNIFORM_BINDING, vk::ShaderStageFlags::VERTEX);
    if textured {
        builder.sampled_image(TEXTURE_BINDING, vk::ShaderStageFlags::FRAGMENT)
    } else {
        builder
    }
}

/// One descriptor set per frame slot, written once at creation.
///
/// The pool holds exactly as many sets and descriptors as there are slots.
pub struct MeshBindings {
    sets: Vec<vk::DescriptorSet>,
    pool: DescriptorPool,
    layout: DescriptorSetLayout,
    textured: bool,
}

impl MeshBindings {
    /// Create and write a set for each buffer in `uniform_buffers`.
    pub fn new(
        device: Arc<ash::Device>,
        uniform_buffers: &[&GpuBuffer],
        texture: Option<&Texture>,
    ) -> Result<Self> {
        if uniform_buffers.is_empty() {
            return Err(GpuError::InvalidState(
                "mesh bindings need at least one uniform buffer".to_string(),
            ));
        }
        let textured = texture.is_some();
        let set_count = uniform_buffers.len() as u32;

        let builder = layout_builder(textured);
        let layout = builder.build(device.clone())?;
        let pool = DescriptorPool::new(device.clone(), set_count, &builder.pool_sizes(set_count))?;

        let layouts = vec![layout.handle(); uniform_buffers.len()];
        let sets = pool.allocate(&layouts)?;

        for (&set, buffer) in sets.iter().zip(uniform_buffers) {
            unsafe {
                write_uniform_buffer(
                    &device,
                    set,
                    UNIFORM_BINDING,
                    buffer.handle(),
                    0,
                    FrameUniforms::SIZE,
                );
                if let Some(texture) = texture {
                    write_combined_image_sampler(
                        &device,
                        set,
                        TEXTURE_BINDING,
                        texture.view(),
                        texture.sampler(),
                    );
                }
            }
        }

        Ok(Self {
            sets,
            pool,
            layout,
            textured,
        })
    }

    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout.handle()
    }

    pub fn set(&self, slot: usize) -> Result<vk::DescriptorSet> {
        self.sets
            .get(slot)
            .copied()
            .ok_or_else(|| GpuError::InvalidState(format!("no descriptor set for slot {slot}")))
    }

    pub fn is_textured(&self) -> bool {
        self.textured
    }

    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }
}

/// Push constant range carrying the vertex buffer address.
pub fn push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::VERTEX)
        .offset(0)
        .size(DrawPushConstants::SIZE)
}

/// Fixed pipeline configuration for the mesh shaders.
///
/// Vertices are pulled through a device address, so there is no vertex input state.
pub fn pipeline_config(shaders: &ShaderSet, color_format: vk::Format) -> GraphicsPipelineConfig {
    GraphicsPipelineConfig {
        vertex_shader: shaders.vertex.clone(),
        fragment_shader: shaders.fragment.clone(),
        color_format,
        ..GraphicsPipelineConfig::default()
    }
}

/// The mesh graphics pipeline, rebuilt when the swapchain format changes.
pub struct MeshPipeline {
    pipeline: GraphicsPipeline,
    config: GraphicsPipelineConfig,
    set_layout: vk::DescriptorSetLayout,
    device: Arc<ash::Device>,
}

impl MeshPipeline {
    pub fn new(
        device: Arc<ash::Device>,
        shaders: &ShaderSet,
        color_format: vk::Format,
        set_layout: vk::DescriptorSetLayout,
    ) -> Result<Self> {
        let config = pipeline_config(shaders, color_format);
        let pipeline = GraphicsPipeline::new(
            device.clone(),
            &config,
            &[set_layout],
            &[push_constant_range()],
        )?;
        tracing::debug!(?color_format, "Created mesh pipeline");
        Ok(Self {
            pipeline,
            config,
            set_layout,
            device,
        })
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.pipeline.layout()
    }

    pub fn color_format(&self) -> vk::Format {
        self.config.color_format
    }

    /// Rebuild for `color_format` if the key changed. Returns whether it did.
    ///
    /// The device must be idle.
    pub fn ensure_format(&mut self, color_format: vk::Format) -> Result<bool> {
        let mut config = self.config.clone();
        config.color_format = color_format;
        if config.key() == self.pipeline.key() {
            return Ok(false);
        }

        let pipeline = GraphicsPipeline::new(
            self.device.clone(),
            &config,
            &[self.set_layout],
            &[push_constant_range()],
        )?;
        self.pipeline = pipeline;
        self.config = config;
        tracing::info!(?color_format, "Rebuilt mesh pipeline for new surface format");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shaders() -> ShaderSet {
        ShaderSet {
            vertex: vec![0x0723_0203, 1, 2],
            fragment: vec![0x0723_0203, 3],
        }
    }

    #[test]
    fn pool_is_sized_to_slot_count() {
        let sizes = layout_builder(false).pool_sizes(4);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 4);
    }

    #[test]
    fn textured_layout_adds_sampler() {
        let sizes = layout_builder(true).pool_sizes(4);
        assert_eq!(sizes.len(), 2);
        let sampler = sizes
            .iter()
            .find(|s| s.ty == vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .unwrap();
        assert_eq!(sampler.descriptor_count, 4);
    }

    #[test]
    fn push_range_matches_draw_constants() {
        let range = push_constant_range();
        assert_eq!(range.size, 8);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn config_has_no_vertex_input() {
        let config = pipeline_config(&shaders(), vk::Format::B8G8R8A8_SRGB);
        assert!(config.vertex_bindings.is_empty());
        assert!(config.vertex_attributes.is_empty());
        assert_eq!(config.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
    }

    #[test]
    fn key_changes_only_with_format() {
        let srgb = pipeline_config(&shaders(), vk::Format::B8G8R8A8_SRGB);
        let same = pipeline_config(&shaders(), vk::Format::B8G8R8A8_SRGB);
        let unorm = pipeline_config(&shaders(), vk::Format::B8G8R8A8_UNORM);
        assert_eq!(srgb.key(), same.key());
        assert_ne!(srgb.key(), unorm.key());
        assert_eq!(srgb.key().shaders, unorm.key().shaders);
    }
}
