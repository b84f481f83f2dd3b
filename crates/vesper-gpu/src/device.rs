//! Device abstraction used by the frame layer.
//!
//! [`GpuDevice`] is the complete set of device, queue and surface operations
//! the swap chain, frame orchestrator, descriptor manager and uniform ring
//! issue. [`crate::vulkan::VulkanDevice`] implements it on top of `ash`; the
//! `headless` feature adds an in-memory implementation for tests.
//!
//! All handles passed to a device must have been created by that same device.

use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;

use crate::descriptors::DescriptorBinding;
use crate::error::Result;
use crate::memory::{BufferDesc, BufferRegion, GpuBuffer, GpuImage};
use crate::pipeline::GraphicsPipelineConfig;
use crate::surface::SurfaceCapabilities;

/// Shared handle to a device.
pub type SharedDevice = Arc<dyn GpuDevice>;

/// Fence timeout for waits that must not expire.
pub const WAIT_FOREVER: u64 = u64::MAX;

/// Device limits the frame layer depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Required alignment for uniform buffer offsets and sizes.
    pub min_uniform_buffer_offset_alignment: u64,
    /// Granularity of flushes to non-coherent mapped memory.
    pub non_coherent_atom_size: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_uniform_buffer_offset_alignment: 256,
            non_coherent_atom_size: 64,
        }
    }
}

/// Parameters for swapchain creation.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainDesc {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// Outgoing swapchain, or null. Lets the driver hand over images without a flash.
    pub old_swapchain: vk::SwapchainKHR,
}

/// Single-subpass render pass with one color and one depth attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
}

/// Render pass begin parameters.
#[derive(Clone, Copy, Debug)]
pub struct RenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
}

/// One queue submission.
#[derive(Clone, Copy, Debug)]
pub struct SubmitDesc {
    pub command_buffer: vk::CommandBuffer,
    pub wait_semaphore: vk::Semaphore,
    pub wait_stage: vk::PipelineStageFlags,
    pub signal_semaphore: vk::Semaphore,
    pub fence: vk::Fence,
}

/// Device, queue and surface operations.
pub trait GpuDevice: Send + Sync {
    /// Device limits.
    fn limits(&self) -> DeviceLimits;

    /// Wait until the device has finished all submitted work.
    fn wait_idle(&self) -> Result<()>;

    // Synchronization

    fn create_semaphore(&self) -> Result<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> Result<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Wait for all `fences`. Returns `Ok(false)` if `timeout_ns` expired first,
    /// which never happens for [`WAIT_FOREVER`].
    fn wait_for_fences(&self, fences: &[vk::Fence], timeout_ns: u64) -> Result<bool>;
    fn reset_fences(&self, fences: &[vk::Fence]) -> Result<()>;

    // Commands

    /// Create a pool for the graphics queue family whose buffers can be reset individually.
    fn create_command_pool(&self) -> Result<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>>;
    /// Reset `cmd` and begin one-time-submit recording.
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()>;
    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBegin);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport);
    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D);
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
    );
    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32);
    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32);

    // Queues

    fn queue_submit(&self, submit: &SubmitDesc) -> Result<()>;

    // Surface and swapchain

    fn surface_capabilities(&self) -> Result<SurfaceCapabilities>;
    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>>;
    /// Raw acquire: `Ok((index, suboptimal))` or the driver's error code.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    /// Raw present: `Ok(suboptimal)` or the driver's error code.
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool>;

    // Images, render passes and framebuffers

    /// First depth format from `candidates` usable as an optimal-tiling depth attachment.
    fn find_depth_format(&self, candidates: &[vk::Format]) -> Result<vk::Format>;
    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> Result<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    /// Device-local 2D image for use as a render target attachment.
    fn create_attachment_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<GpuImage>;
    fn destroy_image(&self, image: &mut GpuImage);
    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // Memory

    /// Create a buffer. Host-visible locations are persistently mapped.
    fn create_buffer(&self, desc: &BufferDesc) -> Result<GpuBuffer>;
    fn destroy_buffer(&self, buffer: &mut GpuBuffer);
    /// Copy `data` into the buffer's mapped memory at `offset`.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> Result<()>;
    /// Make host writes in `[offset, offset + size)` visible to the device.
    fn flush_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Result<()>;

    // Descriptors

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> Result<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet>;
    fn write_buffer_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        kind: vk::DescriptorType,
        region: BufferRegion,
    );

    // Pipelines

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn create_graphics_pipeline(
        &self,
        config: &GraphicsPipelineConfig,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
    ) -> Result<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);
}
