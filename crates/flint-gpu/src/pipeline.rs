//! Graphics pipeline creation.

use crate::error::{GpuError, Result, VkResultExt};
use ash::vk;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity of a pipeline: what forces a rebuild when it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub color_format: vk::Format,
    pub vertex_layout: u64,
    pub shaders: u64,
}

/// Graphics pipeline configuration.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub color_format: vk::Format,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            vertex_shader: Vec::new(),
            fragment_shader: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            color_format: vk::Format::B8G8R8A8_SRGB,
        }
    }
}

impl GraphicsPipelineConfig {
    /// Key derived from the colour format, vertex layout and shader code.
    pub fn key(&self) -> PipelineKey {
        let mut layout = DefaultHasher::new();
        for b in &self.vertex_bindings {
            (b.binding, b.stride, b.input_rate.as_raw()).hash(&mut layout);
        }
        for a in &self.vertex_attributes {
            (a.location, a.binding, a.format.as_raw(), a.offset).hash(&mut layout);
        }

        let mut shaders = DefaultHasher::new();
        self.vertex_shader.hash(&mut shaders);
        self.fragment_shader.hash(&mut shaders);

        PipelineKey {
            color_format: self.color_format,
            vertex_layout: layout.finish(),
            shaders: shaders.finish(),
        }
    }
}

/// Graphics pipeline wrapper.
pub struct GraphicsPipeline {
    device: Arc<ash::Device>,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    key: PipelineKey,
}

struct ShaderModule<'a> {
    device: &'a ash::Device,
    module: vk::ShaderModule,
}

impl<'a> ShaderModule<'a> {
    fn new(device: &'a ash::Device, code: &[u32], stage: &str) -> Result<Self> {
        if code.is_empty() {
            return Err(GpuError::InvalidShader(format!("{stage} shader is empty")));
        }
        let info = vk::ShaderModuleCreateInfo::default().code(code);
        let module =
            unsafe { device.create_shader_module(&info, None) }.op("vkCreateShaderModule")?;
        Ok(Self { device, module })
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}

impl GraphicsPipeline {
    /// Create a graphics pipeline using dynamic rendering (Vulkan 1.3).
    ///
    /// Viewport and scissor are dynamic; everything else is fixed at creation.
    pub fn new(
        device: Arc<ash::Device>,
        config: &GraphicsPipelineConfig,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let vert_module = ShaderModule::new(&device, &config.vertex_shader, "vertex")?;
        let frag_module = ShaderModule::new(&device, &config.fragment_shader, "fragment")?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module.module)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module.module)
                .name(c"main"),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&config.vertex_bindings)
            .vertex_attribute_descriptions(&config.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);

        // Viewport (dynamic)
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];

        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
            .op("vkCreatePipelineLayout")?;

        // Dynamic rendering info (Vulkan 1.3)
        let color_formats = [config.color_format];
        let mut rendering_info =
            vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipeline = match unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        } {
            Ok(pipelines) => pipelines[0],
            Err((_, e)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(GpuError::vulkan("vkCreateGraphicsPipelines", e));
            }
        };

        drop(vert_module);
        drop(frag_module);

        Ok(Self {
            device,
            pipeline,
            layout,
            key: config.key(),
        })
    }

    /// Get the raw pipeline handle.
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get the pipeline layout.
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Key the pipeline was built for.
    pub fn key(&self) -> PipelineKey {
        self.key
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GraphicsPipelineConfig {
        GraphicsPipelineConfig {
            vertex_shader: vec![0x0723_0203, 1, 2],
            fragment_shader: vec![0x0723_0203, 3, 4],
            ..Default::default()
        }
    }

    #[test]
    fn key_is_stable() {
        assert_eq!(config().key(), config().key());
    }

    #[test]
    fn key_tracks_color_format() {
        let a = config();
        let mut b = config();
        b.color_format = vk::Format::R8G8B8A8_UNORM;
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key().shaders, b.key().shaders);
    }

    #[test]
    fn key_tracks_shader_code() {
        let a = config();
        let mut b = config();
        b.fragment_shader.push(5);
        assert_ne!(a.key().shaders, b.key().shaders);
        assert_eq!(a.key().vertex_layout, b.key().vertex_layout);
    }

    #[test]
    fn key_tracks_vertex_layout() {
        let a = config();
        let mut b = config();
        b.vertex_bindings.push(vk::VertexInputBindingDescription {
            binding: 0,
            stride: 16,
            input_rate: vk::VertexInputRate::VERTEX,
        });
        assert_ne!(a.key().vertex_layout, b.key().vertex_layout);
    }

    #[test]
    fn defaults_cull_back_faces_counter_clockwise() {
        let c = GraphicsPipelineConfig::default();
        assert_eq!(c.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(c.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(c.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
    }
}
