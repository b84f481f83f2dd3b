//! Render systems record draws into an open frame.

use ash::vk;
use glam::{Mat3, Mat4, Vec3};
use vesper_gpu::{
    DescriptorSetLayout, GraphicsPipeline, GraphicsPipelineConfig, PipelineLayout, Result,
    SharedDevice,
};

use crate::frame::FrameContext;
use crate::global::GLOBAL_SET;
use crate::mesh::Vertex;

/// Something that draws into the swap chain render pass.
pub trait RenderSystem {
    /// Record draws for `frame`. Called between `begin_render_pass` and
    /// `end_render_pass`.
    fn render(&mut self, frame: &FrameContext<'_>) -> Result<()>;
}

/// Per-draw constants for the simple shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SimplePushConstants {
    pub model_matrix: [[f32; 4]; 4],
    /// Upper 3x3 is the normal matrix. The unused fourth column carries the
    /// object color in xyz, keeping the block within 128 bytes.
    pub normal_matrix: [[f32; 4]; 4],
}

impl SimplePushConstants {
    pub fn new(model: Mat4, normal: Mat3, color: Vec3) -> Self {
        let mut normal_matrix = Mat4::from_mat3(normal).to_cols_array_2d();
        normal_matrix[3] = color.extend(1.0).to_array();
        Self {
            model_matrix: model.to_cols_array_2d(),
            normal_matrix,
        }
    }

    pub fn color(&self) -> Vec3 {
        let [r, g, b, _] = self.normal_matrix[3];
        Vec3::new(r, g, b)
    }

    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;
    pub const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
        vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
    );
}

/// Draws every scene object that has a mesh with the lit simple shader.
pub struct SimpleRenderSystem {
    pipeline: GraphicsPipeline,
    layout: PipelineLayout,
    config: GraphicsPipelineConfig,
    device: SharedDevice,
}

impl SimpleRenderSystem {
    /// Build the pipeline layout (global set + push constants) and a pipeline for `render_pass`.
    pub fn new(
        device: SharedDevice,
        render_pass: vk::RenderPass,
        global_layout: &DescriptorSetLayout,
        vertex_shader: &[u32],
        fragment_shader: &[u32],
    ) -> Result<Self> {
        let push_constants = vk::PushConstantRange {
            stage_flags: SimplePushConstants::STAGES,
            offset: 0,
            size: SimplePushConstants::SIZE,
        };
        let layout = PipelineLayout::new(device.clone(), &[global_layout], &[push_constants])?;

        let config = GraphicsPipelineConfig {
            vertex_shader: vertex_shader.to_vec(),
            fragment_shader: fragment_shader.to_vec(),
            vertex_bindings: Vertex::binding_descriptions(),
            vertex_attributes: Vertex::attribute_descriptions(),
            ..Default::default()
        };
        let pipeline = GraphicsPipeline::new(device.clone(), &config, &layout, render_pass)?;

        Ok(Self {
            pipeline,
            layout,
            config,
            device,
        })
    }

    /// Rebuild the pipeline if `render_pass` differs from the one it was built for.
    ///
    /// Returns the retired pipeline so the caller can park it until in-flight
    /// frames have finished with it.
    pub fn sync_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
    ) -> Result<Option<GraphicsPipeline>> {
        if self.pipeline.render_pass() == render_pass {
            return Ok(None);
        }
        let pipeline =
            GraphicsPipeline::new(self.device.clone(), &self.config, &self.layout, render_pass)?;
        tracing::info!(?render_pass, "Simple render system pipeline rebuilt");
        Ok(Some(std::mem::replace(&mut self.pipeline, pipeline)))
    }

    pub fn pipeline(&self) -> &GraphicsPipeline {
        &self.pipeline
    }

    pub fn pipeline_layout(&self) -> &PipelineLayout {
        &self.layout
    }
}

impl RenderSystem for SimpleRenderSystem {
    fn render(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        // A render pass change only comes out of a recreation that waited on
        // every frame fence, so the retired pipeline is already idle.
        drop(self.sync_render_pass(frame.render_pass)?);

        let cmd = frame.command_buffer;
        self.pipeline.bind(cmd);
        self.device.cmd_bind_descriptor_set(
            cmd,
            self.layout.handle(),
            GLOBAL_SET,
            frame.global_descriptor_set,
        );

        for object in frame.scene.iter() {
            let Some(mesh) = &object.mesh else {
                continue;
            };
            let push = SimplePushConstants::new(
                object.transform.matrix(),
                object.transform.normal_matrix(),
                object.color,
            );
            self.device.cmd_push_constants(
                cmd,
                self.layout.handle(),
                SimplePushConstants::STAGES,
                0,
                bytemuck::bytes_of(&push),
            );
            mesh.bind(cmd);
            mesh.draw(cmd);
        }
        Ok(())
    }
}
