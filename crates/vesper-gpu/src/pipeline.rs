//! Pipeline creation and management.
//!
//! Graphics pipelines always declare viewport and scissor as dynamic state, so
//! they only depend on the render pass, never on the swap chain extent.

use crate::descriptors::DescriptorSetLayout;
use crate::device::SharedDevice;
use crate::error::Result;
use ash::vk;

/// SPIR-V magic number, first word of every module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

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
    pub depth_test: bool,
    pub depth_write: bool,
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
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            depth_test: true,
            depth_write: true,
        }
    }
}

/// Pipeline layout together with the set layouts it was declared with.
pub struct PipelineLayout {
    layout: vk::PipelineLayout,
    push_constant_ranges: Vec<vk::PushConstantRange>,
    device: SharedDevice,
}

impl PipelineLayout {
    /// Create a pipeline layout.
    pub fn new(
        device: SharedDevice,
        set_layouts: &[&DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let handles: Vec<_> = set_layouts.iter().map(|l| l.handle()).collect();
        let layout = device.create_pipeline_layout(&handles, push_constant_ranges)?;
        Ok(Self {
            layout,
            push_constant_ranges: push_constant_ranges.to_vec(),
            device,
        })
    }

    /// Get the raw layout handle.
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Declared push constant ranges.
    pub fn push_constant_ranges(&self) -> &[vk::PushConstantRange] {
        &self.push_constant_ranges
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        self.device.destroy_pipeline_layout(self.layout);
    }
}

/// Graphics pipeline built against one render pass.
pub struct GraphicsPipeline {
    pipeline: vk::Pipeline,
    render_pass: vk::RenderPass,
    device: SharedDevice,
}

impl GraphicsPipeline {
    /// Create a graphics pipeline for subpass 0 of `render_pass`.
    pub fn new(
        device: SharedDevice,
        config: &GraphicsPipelineConfig,
        layout: &PipelineLayout,
        render_pass: vk::RenderPass,
    ) -> Result<Self> {
        let pipeline = device.create_graphics_pipeline(config, layout.handle(), render_pass)?;
        tracing::debug!(?render_pass, "Graphics pipeline created");
        Ok(Self {
            pipeline,
            render_pass,
            device,
        })
    }

    /// Get the raw pipeline handle.
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// The render pass this pipeline is compatible with.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Bind the pipeline.
    pub fn bind(&self, cmd: vk::CommandBuffer) {
        self.device.cmd_bind_pipeline(cmd, self.pipeline);
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.pipeline);
    }
}

/// Whether `code` starts with the SPIR-V magic number.
pub fn is_spirv(code: &[u32]) -> bool {
    code.first() == Some(&SPIRV_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::DescriptorSetLayoutConfig;
    use crate::device::RenderPassDesc;
    use crate::error::GpuError;
    use crate::headless::HeadlessDevice;
    use std::sync::Arc;

    fn test_config() -> GraphicsPipelineConfig {
        GraphicsPipelineConfig {
            vertex_shader: vec![SPIRV_MAGIC, 0x0001_0000],
            fragment_shader: vec![SPIRV_MAGIC, 0x0001_0000],
            ..Default::default()
        }
    }

    #[test]
    fn spirv_magic() {
        assert!(is_spirv(&[SPIRV_MAGIC, 1, 2]));
        assert!(!is_spirv(&[]));
        assert!(!is_spirv(&[0x0302_2307]));
    }

    #[test]
    fn pipeline_lifecycle() {
        let headless = Arc::new(HeadlessDevice::new());
        let device: SharedDevice = headless.clone();
        let set_layout = DescriptorSetLayout::new(
            device.clone(),
            &DescriptorSetLayoutConfig::new().uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS),
        )
        .unwrap();
        let render_pass = device
            .create_render_pass(&RenderPassDesc {
                color_format: vk::Format::B8G8R8A8_SRGB,
                depth_format: vk::Format::D32_SFLOAT,
            })
            .unwrap();

        {
            let layout = PipelineLayout::new(device.clone(), &[&set_layout], &[]).unwrap();
            let pipeline =
                GraphicsPipeline::new(device.clone(), &test_config(), &layout, render_pass)
                    .unwrap();
            assert_eq!(pipeline.render_pass(), render_pass);
            assert_eq!(headless.live_pipelines(), 1);
        }

        assert_eq!(headless.live_pipelines(), 0);
        device.destroy_render_pass(render_pass);
        assert!(headless.validation_errors().is_empty());
    }

    #[test]
    fn invalid_shader_rejected() {
        let device: SharedDevice = Arc::new(HeadlessDevice::new());
        let render_pass = device
            .create_render_pass(&RenderPassDesc {
                color_format: vk::Format::B8G8R8A8_SRGB,
                depth_format: vk::Format::D32_SFLOAT,
            })
            .unwrap();
        let layout = PipelineLayout::new(device.clone(), &[], &[]).unwrap();
        let config = GraphicsPipelineConfig {
            fragment_shader: Vec::new(),
            ..test_config()
        };
        let result = GraphicsPipeline::new(device.clone(), &config, &layout, render_pass);
        assert!(matches!(result, Err(GpuError::ShaderCompilation(_))));
        device.destroy_render_pass(render_pass);
    }
}
