//! In-memory device for tests and tooling that run without a GPU.
//!
//! [`HeadlessDevice`] implements [`GpuDevice`] by simulating the objects the
//! frame layer creates. Submitted work stays pending until its fence is waited
//! on (or the device is idled), which makes in-flight hazards observable.
//! Misuse that a validation layer would flag is recorded instead of aborting;
//! tests assert on [`HeadlessDevice::validation_errors`].
//!
//! Mapped buffers keep a host copy and a device-visible copy. Unless the
//! device is built with coherent memory, writes only reach the device copy
//! through [`GpuDevice::flush_buffer`].

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::Mutex;

use crate::descriptors::DescriptorBinding;
use crate::device::{
    DeviceLimits, GpuDevice, RenderPassBegin, RenderPassDesc, SubmitDesc, SwapchainDesc,
    WAIT_FOREVER,
};
use crate::error::{GpuError, Result};
use crate::memory::{BufferDesc, BufferRegion, GpuBuffer, GpuImage, MemoryLocation};
use crate::pipeline::{is_spirv, GraphicsPipelineConfig};
use crate::surface::{PresentationSurface, SurfaceCapabilities};

/// A command as recorded into a headless command buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCommand {
    BeginRenderPass {
        framebuffer: vk::Framebuffer,
        width: u32,
        height: u32,
        clear_color: [f32; 4],
    },
    EndRenderPass,
    SetViewport {
        width: f32,
        height: f32,
    },
    SetScissor {
        width: u32,
        height: u32,
    },
    BindPipeline(vk::Pipeline),
    BindDescriptorSet {
        set_index: u32,
        set: vk::DescriptorSet,
    },
    PushConstants {
        offset: u32,
        data: Vec<u8>,
    },
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    Draw {
        vertex_count: u32,
    },
    DrawIndexed {
        index_count: u32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Semaphore,
    Fence,
    CommandPool,
    CommandBuffer,
    Swapchain,
    SwapchainImage,
    Image,
    ImageView,
    RenderPass,
    Framebuffer,
    Buffer,
    DescriptorSetLayout,
    DescriptorPool,
    DescriptorSet,
    PipelineLayout,
    Pipeline,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum CmdStatus {
    #[default]
    Initial,
    Recording,
    Executable,
    Pending,
}

#[derive(Default)]
struct CommandBufferState {
    pool: u64,
    status: CmdStatus,
    render_pass: Option<u64>,
    viewport_set: bool,
    scissor_set: bool,
    pipeline: Option<u64>,
    bound_sets: BTreeMap<u32, u64>,
    vertex_buffer: Option<u64>,
    index_buffer: Option<u64>,
    refs: HashSet<u64>,
    commands: Vec<RecordedCommand>,
}

struct SwapchainState {
    images: Vec<u64>,
    retired: bool,
    next: u32,
    acquired: HashSet<u32>,
}

struct BufferState {
    size: u64,
    host: Vec<u8>,
    device: Vec<u8>,
    mapped: bool,
}

struct PoolState {
    remaining_sets: u32,
    remaining: Vec<(vk::DescriptorType, u32)>,
    sets: Vec<u64>,
}

struct SetState {
    bindings: Vec<DescriptorBinding>,
    writes: BTreeMap<u32, BufferRegion>,
}

struct PipelineLayoutState {
    set_layouts: Vec<Vec<DescriptorBinding>>,
    push_constants: Vec<vk::PushConstantRange>,
}

struct PipelineState {
    layout: u64,
    render_pass: u64,
    vertex_input: bool,
}

struct Submission {
    fence: u64,
    cmd: u64,
    refs: HashSet<u64>,
}

#[derive(Default)]
struct State {
    next_handle: u64,
    live: HashMap<u64, Kind>,
    semaphores: HashMap<u64, bool>,
    fences: HashMap<u64, bool>,
    command_buffers: HashMap<u64, CommandBufferState>,
    swapchains: HashMap<u64, SwapchainState>,
    buffers: HashMap<u64, BufferState>,
    set_layouts: HashMap<u64, Vec<DescriptorBinding>>,
    pools: HashMap<u64, PoolState>,
    sets: HashMap<u64, SetState>,
    pipeline_layouts: HashMap<u64, PipelineLayoutState>,
    pipelines: HashMap<u64, PipelineState>,
    pending: VecDeque<Submission>,
    acquire_script: VecDeque<vk::Result>,
    present_script: VecDeque<vk::Result>,
    surface_formats: Vec<vk::SurfaceFormatKHR>,
    /// `None` lets the swapchain pick its extent from the window.
    current_extent: Option<vk::Extent2D>,
    stalled: bool,
    errors: Vec<String>,
    submissions: usize,
    presents: usize,
    flushes: usize,
    swapchains_created: usize,
    last_old_swapchain: u64,
}

impl State {
    fn alloc(&mut self, kind: Kind) -> u64 {
        self.next_handle += 1;
        self.live.insert(self.next_handle, kind);
        self.next_handle
    }

    fn is_live(&self, raw: u64, kind: Kind) -> bool {
        self.live.get(&raw) == Some(&kind)
    }

    fn count(&self, kind: Kind) -> usize {
        self.live.values().filter(|&&k| k == kind).count()
    }

    fn in_use(&self, raw: u64) -> bool {
        self.pending.iter().any(|s| s.refs.contains(&raw))
    }

    fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("headless validation: {message}");
        self.errors.push(message);
    }

    /// Remove `raw` from the live table. Null handles are ignored.
    fn destroy(&mut self, kind: Kind, raw: u64) -> bool {
        if raw == 0 {
            return false;
        }
        if self.in_use(raw) {
            self.error(format!("{kind:?} destroyed while in use by the GPU"));
        }
        match self.live.get(&raw) {
            Some(&k) if k == kind => {
                self.live.remove(&raw);
                true
            }
            Some(&other) => {
                self.error(format!("{other:?} handle destroyed as {kind:?}"));
                false
            }
            None => {
                self.error(format!("double destroy of {kind:?}"));
                false
            }
        }
    }

    fn complete_front(&mut self) {
        if let Some(submission) = self.pending.pop_front() {
            if submission.fence != 0 {
                self.fences.insert(submission.fence, true);
            }
            if let Some(cmd) = self.command_buffers.get_mut(&submission.cmd) {
                if cmd.status == CmdStatus::Pending {
                    cmd.status = CmdStatus::Executable;
                }
            }
        }
    }

    /// Complete queue work in order up to the submission signaling `fence`.
    fn complete_fence(&mut self, fence: u64) -> bool {
        let Some(position) = self.pending.iter().position(|s| s.fence == fence) else {
            return false;
        };
        for _ in 0..=position {
            self.complete_front();
        }
        true
    }

    fn signal_semaphore(&mut self, raw: u64) {
        if raw == 0 {
            return;
        }
        match self.semaphores.get_mut(&raw) {
            Some(signaled) if *signaled => {
                self.error("signal of an already signaled semaphore");
            }
            Some(signaled) => *signaled = true,
            None => self.error("signal of an unknown semaphore"),
        }
    }

    fn consume_semaphore(&mut self, raw: u64) {
        if raw == 0 {
            return;
        }
        match self.semaphores.get_mut(&raw) {
            Some(signaled) if *signaled => *signaled = false,
            Some(_) => self.error("wait on an unsignaled semaphore"),
            None => self.error("wait on an unknown semaphore"),
        }
    }

    fn recording(&mut self, cmd: vk::CommandBuffer, what: &str) -> Option<&mut CommandBufferState> {
        let raw = cmd.as_raw();
        let recording = self
            .command_buffers
            .get(&raw)
            .is_some_and(|c| c.status == CmdStatus::Recording);
        if !recording {
            self.error(format!("{what} recorded into a command buffer that is not recording"));
            return None;
        }
        self.command_buffers.get_mut(&raw)
    }

    fn validate_draw(&mut self, cmd: vk::CommandBuffer, indexed: bool) {
        let Some(state) = self.command_buffers.get(&cmd.as_raw()) else {
            return;
        };
        let mut problems: Vec<String> = Vec::new();
        if state.render_pass.is_none() {
            problems.push("draw outside a render pass".to_string());
        }
        if !state.viewport_set || !state.scissor_set {
            problems.push("draw without dynamic viewport and scissor".to_string());
        }
        if indexed && state.index_buffer.is_none() {
            problems.push("indexed draw without an index buffer".to_string());
        }
        match state.pipeline.and_then(|p| self.pipelines.get(&p)) {
            None => problems.push("draw without a bound pipeline".to_string()),
            Some(pipeline) => {
                if pipeline.vertex_input && state.vertex_buffer.is_none() {
                    problems.push("draw without a vertex buffer".to_string());
                }
                if let Some(layout) = self.pipeline_layouts.get(&pipeline.layout) {
                    for (index, expected) in layout.set_layouts.iter().enumerate() {
                        let bound = state
                            .bound_sets
                            .get(&(index as u32))
                            .and_then(|s| self.sets.get(s));
                        match bound {
                            None => problems.push(format!("descriptor set {index} not bound")),
                            Some(set) if set.bindings != *expected => problems.push(format!(
                                "descriptor set layout mismatch at set {index}"
                            )),
                            Some(set) => {
                                for b in expected.iter().filter(|b| b.is_buffer()) {
                                    if !set.writes.contains_key(&b.binding) {
                                        problems.push(format!(
                                            "descriptor set {index} binding {} never written",
                                            b.binding
                                        ));
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        for problem in problems {
            self.error(problem);
        }
    }
}

/// Simulated device.
pub struct HeadlessDevice {
    state: Mutex<State>,
    limits: DeviceLimits,
    coherent: bool,
    min_image_count: u32,
    max_image_count: u32,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Non-coherent memory, default limits, surface with 2..unbounded images.
    pub fn new() -> Self {
        let state = State {
            surface_formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
            limits: DeviceLimits::default(),
            coherent: false,
            min_image_count: 2,
            max_image_count: 0,
        }
    }

    /// Override device limits.
    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Make mapped memory host-coherent.
    pub fn with_coherent_memory(mut self, coherent: bool) -> Self {
        self.coherent = coherent;
        self
    }

    /// Surface image count bounds. `max == 0` means unbounded.
    pub fn with_image_count(mut self, min: u32, max: u32) -> Self {
        self.min_image_count = min;
        self.max_image_count = max;
        self
    }

    /// Replace the formats the surface reports.
    pub fn set_surface_formats(&self, formats: Vec<vk::SurfaceFormatKHR>) {
        self.state.lock().surface_formats = formats;
    }

    /// Fix the extent the surface reports, as a real window system does.
    /// `None` reports the `u32::MAX` sentinel.
    pub fn set_current_extent(&self, extent: Option<vk::Extent2D>) {
        self.state.lock().current_extent = extent;
    }

    /// Make the next acquire return `result`. `SUBOPTIMAL_KHR` acquires an
    /// image and reports it suboptimal.
    pub fn push_acquire_result(&self, result: vk::Result) {
        self.state.lock().acquire_script.push_back(result);
    }

    /// Make the next present return `result`.
    pub fn push_present_result(&self, result: vk::Result) {
        self.state.lock().present_script.push_back(result);
    }

    /// While stalled, bounded fence waits time out without completing any
    /// work. Waits with [`WAIT_FOREVER`] and `wait_idle` still drain the queue.
    pub fn set_stalled(&self, stalled: bool) {
        self.state.lock().stalled = stalled;
    }

    /// Whether `fence` is signaled. Unlike a wait, never completes work.
    pub fn is_fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state.lock().fences.get(&fence.as_raw()) == Some(&true)
    }

    /// Validation errors recorded so far.
    pub fn validation_errors(&self) -> Vec<String> {
        self.state.lock().errors.clone()
    }

    /// Number of queue submissions.
    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions
    }

    /// Number of presents, including failed ones.
    pub fn present_count(&self) -> usize {
        self.state.lock().presents
    }

    /// Number of flush calls.
    pub fn flush_count(&self) -> usize {
        self.state.lock().flushes
    }

    /// Number of swapchains created.
    pub fn swapchains_created(&self) -> usize {
        self.state.lock().swapchains_created
    }

    /// `old_swapchain` passed to the most recent swapchain creation.
    pub fn last_old_swapchain(&self) -> vk::SwapchainKHR {
        vk::SwapchainKHR::from_raw(self.state.lock().last_old_swapchain)
    }

    pub fn live_semaphores(&self) -> usize {
        self.state.lock().count(Kind::Semaphore)
    }

    pub fn live_fences(&self) -> usize {
        self.state.lock().count(Kind::Fence)
    }

    pub fn live_command_pools(&self) -> usize {
        self.state.lock().count(Kind::CommandPool)
    }

    pub fn live_swapchains(&self) -> usize {
        self.state.lock().count(Kind::Swapchain)
    }

    /// Attachment images, not counting swapchain-owned images.
    pub fn live_images(&self) -> usize {
        self.state.lock().count(Kind::Image)
    }

    pub fn live_image_views(&self) -> usize {
        self.state.lock().count(Kind::ImageView)
    }

    pub fn live_render_passes(&self) -> usize {
        self.state.lock().count(Kind::RenderPass)
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.lock().count(Kind::Framebuffer)
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().count(Kind::Buffer)
    }

    pub fn live_descriptor_pools(&self) -> usize {
        self.state.lock().count(Kind::DescriptorPool)
    }

    pub fn live_pipelines(&self) -> usize {
        self.state.lock().count(Kind::Pipeline)
    }

    /// Commands recorded into `cmd` since it last began recording.
    pub fn recorded_commands(&self, cmd: vk::CommandBuffer) -> Vec<RecordedCommand> {
        self.state
            .lock()
            .command_buffers
            .get(&cmd.as_raw())
            .map(|c| c.commands.clone())
            .unwrap_or_default()
    }

    /// Device-visible bytes of a buffer. Empty if the range is invalid.
    pub fn read_device_bytes(&self, buffer: vk::Buffer, offset: u64, len: u64) -> Vec<u8> {
        let state = self.state.lock();
        let Some(b) = state.buffers.get(&buffer.as_raw()) else {
            return Vec::new();
        };
        let (start, end) = (offset as usize, (offset + len) as usize);
        b.device.get(start..end).map(<[u8]>::to_vec).unwrap_or_default()
    }

    /// Region bound at `binding` of `set`.
    pub fn descriptor_region(&self, set: vk::DescriptorSet, binding: u32) -> Option<BufferRegion> {
        self.state
            .lock()
            .sets
            .get(&set.as_raw())
            .and_then(|s| s.writes.get(&binding).copied())
    }

    /// Device-visible bytes reachable through `binding` of `set`.
    pub fn read_descriptor_bytes(&self, set: vk::DescriptorSet, binding: u32) -> Option<Vec<u8>> {
        let region = self.descriptor_region(set, binding)?;
        Some(self.read_device_bytes(region.buffer, region.offset, region.range))
    }
}

impl GpuDevice for HeadlessDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn wait_idle(&self) -> Result<()> {
        let mut state = self.state.lock();
        while !state.pending.is_empty() {
            state.complete_front();
        }
        Ok(())
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let mut state = self.state.lock();
        let raw = state.alloc(Kind::Semaphore);
        state.semaphores.insert(raw, false);
        Ok(vk::Semaphore::from_raw(raw))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state.lock();
        if state.destroy(Kind::Semaphore, semaphore.as_raw()) {
            state.semaphores.remove(&semaphore.as_raw());
        }
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let mut state = self.state.lock();
        let raw = state.alloc(Kind::Fence);
        state.fences.insert(raw, signaled);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        let raw = fence.as_raw();
        if state.pending.iter().any(|s| s.fence == raw) {
            state.error("fence destroyed while its submission is pending");
        }
        if state.destroy(Kind::Fence, raw) {
            state.fences.remove(&raw);
        }
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout_ns: u64) -> Result<bool> {
        let mut state = self.state.lock();
        for fence in fences {
            let raw = fence.as_raw();
            match state.fences.get(&raw) {
                Some(true) => continue,
                Some(false) => {}
                None => {
                    state.error("wait on an unknown fence");
                    continue;
                }
            }
            // An unsubmitted unsignaled fence would block until the timeout.
            let stalled = state.stalled && timeout_ns != WAIT_FOREVER;
            if stalled || !state.complete_fence(raw) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> Result<()> {
        let mut state = self.state.lock();
        for fence in fences {
            let raw = fence.as_raw();
            if state.pending.iter().any(|s| s.fence == raw) {
                state.error("reset of a fence whose submission is pending");
            }
            match state.fences.get_mut(&raw) {
                Some(signaled) => *signaled = false,
                None => state.error("reset of an unknown fence"),
            }
        }
        Ok(())
    }

    fn create_command_pool(&self) -> Result<vk::CommandPool> {
        let raw = self.state.lock().alloc(Kind::CommandPool);
        Ok(vk::CommandPool::from_raw(raw))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.state.lock();
        let raw = pool.as_raw();
        let owned: Vec<u64> = state
            .command_buffers
            .iter()
            .filter(|(_, c)| c.pool == raw)
            .map(|(&handle, _)| handle)
            .collect();
        for handle in owned {
            if state.command_buffers.get(&handle).map(|c| c.status) == Some(CmdStatus::Pending) {
                state.error("command pool destroyed while a command buffer is pending");
            }
            state.command_buffers.remove(&handle);
            state.live.remove(&handle);
        }
        state.destroy(Kind::CommandPool, raw);
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        if !state.is_live(pool.as_raw(), Kind::CommandPool) {
            return Err(GpuError::InvalidState("Unknown command pool".to_string()));
        }
        Ok((0..count)
            .map(|_| {
                let raw = state.alloc(Kind::CommandBuffer);
                state.command_buffers.insert(
                    raw,
                    CommandBufferState {
                        pool: pool.as_raw(),
                        ..Default::default()
                    },
                );
                vk::CommandBuffer::from_raw(raw)
            })
            .collect())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        let raw = cmd.as_raw();
        let Some(status) = state.command_buffers.get(&raw).map(|c| c.status) else {
            return Err(GpuError::InvalidState("Unknown command buffer".to_string()));
        };
        match status {
            CmdStatus::Pending => state.error("command buffer reset while pending"),
            CmdStatus::Recording => state.error("begin on a command buffer already recording"),
            CmdStatus::Initial | CmdStatus::Executable => {}
        }
        if let Some(c) = state.command_buffers.get_mut(&raw) {
            *c = CommandBufferState {
                pool: c.pool,
                status: CmdStatus::Recording,
                ..Default::default()
            };
        }
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        let Some(c) = state.recording(cmd, "end") else {
            return Ok(());
        };
        let inside_pass = c.render_pass.is_some();
        c.status = CmdStatus::Executable;
        if inside_pass {
            state.error("command buffer ended inside a render pass");
        }
        Ok(())
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        let mut state = self.state.lock();
        let framebuffer = begin.framebuffer.as_raw();
        let render_pass = begin.render_pass.as_raw();
        if !state.is_live(framebuffer, Kind::Framebuffer) {
            state.error("render pass begun with an invalid framebuffer");
        }
        let Some(c) = state.recording(cmd, "begin render pass") else {
            return;
        };
        let nested = c.render_pass.is_some();
        c.render_pass = Some(render_pass);
        c.refs.insert(framebuffer);
        c.refs.insert(render_pass);
        c.commands.push(RecordedCommand::BeginRenderPass {
            framebuffer: begin.framebuffer,
            width: begin.extent.width,
            height: begin.extent.height,
            clear_color: begin.clear_color,
        });
        if nested {
            state.error("render pass begun inside another render pass");
        }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        let mut state = self.state.lock();
        let Some(c) = state.recording(cmd, "end render pass") else {
            return;
        };
        let was_open = c.render_pass.take().is_some();
        c.commands.push(RecordedCommand::EndRenderPass);
        if !was_open {
            state.error("end render pass without a render pass");
        }
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        let mut state = self.state.lock();
        if let Some(c) = state.recording(cmd, "set viewport") {
            c.viewport_set = true;
            c.commands.push(RecordedCommand::SetViewport {
                width: viewport.width,
                height: viewport.height,
            });
        }
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        let mut state = self.state.lock();
        if let Some(c) = state.recording(cmd, "set scissor") {
            c.scissor_set = true;
            c.commands.push(RecordedCommand::SetScissor {
                width: scissor.extent.width,
                height: scissor.extent.height,
            });
        }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        let mut state = self.state.lock();
        let raw = pipeline.as_raw();
        let pipeline_pass = state.pipelines.get(&raw).map(|p| p.render_pass);
        let Some(c) = state.recording(cmd, "bind pipeline") else {
            return;
        };
        let current_pass = c.render_pass;
        c.pipeline = Some(raw);
        c.refs.insert(raw);
        c.commands.push(RecordedCommand::BindPipeline(pipeline));
        match (pipeline_pass, current_pass) {
            (None, _) => state.error("bind of an invalid pipeline"),
            (Some(p), Some(current)) if p != current => {
                state.error("pipeline built for a different render pass");
            }
            _ => {}
        }
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
    ) {
        let mut state = self.state.lock();
        let set_raw = set.as_raw();
        let declared = state
            .pipeline_layouts
            .get(&layout.as_raw())
            .and_then(|l| l.set_layouts.get(set_index as usize).cloned());
        let (actual, buffers): (Option<Vec<DescriptorBinding>>, Vec<u64>) =
            match state.sets.get(&set_raw) {
                Some(s) => (
                    Some(s.bindings.clone()),
                    s.writes.values().map(|r| r.buffer.as_raw()).collect(),
                ),
                None => (None, Vec::new()),
            };

        let Some(c) = state.recording(cmd, "bind descriptor set") else {
            return;
        };
        c.bound_sets.insert(set_index, set_raw);
        c.refs.insert(set_raw);
        c.refs.extend(buffers);
        c.commands.push(RecordedCommand::BindDescriptorSet { set_index, set });

        match (declared, actual) {
            (_, None) => state.error("bind of an invalid descriptor set"),
            (None, _) => state.error(format!(
                "pipeline layout declares no descriptor set {set_index}"
            )),
            (Some(declared), Some(actual)) if declared != actual => state.error(format!(
                "descriptor set layout mismatch at set {set_index}"
            )),
            _ => {}
        }
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        let mut state = self.state.lock();
        let size = data.len() as u32;
        let covered = state
            .pipeline_layouts
            .get(&layout.as_raw())
            .is_some_and(|l| {
                l.push_constants.iter().any(|r| {
                    r.stage_flags.contains(stages)
                        && offset >= r.offset
                        && offset + size <= r.offset + r.size
                })
            });
        if let Some(c) = state.recording(cmd, "push constants") {
            c.commands.push(RecordedCommand::PushConstants {
                offset,
                data: data.to_vec(),
            });
        }
        if !covered {
            state.error("push constants outside the declared ranges");
        }
    }

    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        let mut state = self.state.lock();
        let raw = buffer.as_raw();
        let valid = state.is_live(raw, Kind::Buffer);
        if let Some(c) = state.recording(cmd, "bind vertex buffer") {
            c.vertex_buffer = Some(raw);
            c.refs.insert(raw);
            c.commands.push(RecordedCommand::BindVertexBuffer(buffer));
        }
        if !valid {
            state.error("bind of an invalid vertex buffer");
        }
    }

    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        let mut state = self.state.lock();
        let raw = buffer.as_raw();
        let valid = state.is_live(raw, Kind::Buffer);
        if let Some(c) = state.recording(cmd, "bind index buffer") {
            c.index_buffer = Some(raw);
            c.refs.insert(raw);
            c.commands.push(RecordedCommand::BindIndexBuffer(buffer));
        }
        if !valid {
            state.error("bind of an invalid index buffer");
        }
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32) {
        let mut state = self.state.lock();
        if let Some(c) = state.recording(cmd, "draw") {
            c.commands.push(RecordedCommand::Draw { vertex_count });
            state.validate_draw(cmd, false);
        }
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32) {
        let mut state = self.state.lock();
        if let Some(c) = state.recording(cmd, "draw indexed") {
            c.commands.push(RecordedCommand::DrawIndexed { index_count });
            state.validate_draw(cmd, true);
        }
    }

    fn queue_submit(&self, submit: &SubmitDesc) -> Result<()> {
        let mut state = self.state.lock();
        let cmd = submit.command_buffer.as_raw();
        let fence = submit.fence.as_raw();

        let refs = match state.command_buffers.get_mut(&cmd) {
            Some(c) if c.status == CmdStatus::Executable => {
                c.status = CmdStatus::Pending;
                c.refs.clone()
            }
            Some(_) => {
                state.error("submitted command buffer is not executable");
                return Ok(());
            }
            None => return Err(GpuError::InvalidState("Unknown command buffer".to_string())),
        };

        state.consume_semaphore(submit.wait_semaphore.as_raw());
        state.signal_semaphore(submit.signal_semaphore.as_raw());

        if fence != 0 {
            if state.fences.get(&fence) == Some(&true) {
                state.error("submit with a fence that is already signaled");
            }
            if state.pending.iter().any(|s| s.fence == fence) {
                state.error("submit with a fence already in use");
            }
        }

        state.pending.push_back(Submission { fence, cmd, refs });
        state.submissions += 1;
        Ok(())
    }

    fn surface_capabilities(&self) -> Result<SurfaceCapabilities> {
        let state = self.state.lock();
        Ok(SurfaceCapabilities {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: self.min_image_count,
                max_image_count: self.max_image_count,
                current_extent: state.current_extent.unwrap_or(vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                }),
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 16384,
                    height: 16384,
                },
                max_image_array_layers: 1,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
                supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_DST,
            },
            formats: state.surface_formats.clone(),
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        })
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> Result<vk::SwapchainKHR> {
        let mut state = self.state.lock();
        if desc.extent.width == 0 || desc.extent.height == 0 {
            state.error("swapchain created with zero extent");
            return Err(GpuError::SwapchainCreation("Zero extent".to_string()));
        }
        if desc.image_count < self.min_image_count {
            state.error("swapchain image count below the surface minimum");
        }

        let old = desc.old_swapchain.as_raw();
        if old != 0 {
            match state.swapchains.get_mut(&old) {
                Some(chain) if !chain.retired => chain.retired = true,
                Some(_) => state.error("old_swapchain was already retired"),
                None => state.error("old_swapchain is not a live swapchain"),
            }
        }
        state.last_old_swapchain = old;

        let raw = state.alloc(Kind::Swapchain);
        let images = (0..desc.image_count)
            .map(|_| state.alloc(Kind::SwapchainImage))
            .collect();
        state.swapchains.insert(
            raw,
            SwapchainState {
                images,
                retired: false,
                next: 0,
                acquired: HashSet::new(),
            },
        );
        state.swapchains_created += 1;
        Ok(vk::SwapchainKHR::from_raw(raw))
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.lock();
        let raw = swapchain.as_raw();
        if state.destroy(Kind::Swapchain, raw) {
            if let Some(chain) = state.swapchains.remove(&raw) {
                for image in chain.images {
                    state.live.remove(&image);
                }
            }
        }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> Result<Vec<vk::Image>> {
        let state = self.state.lock();
        state
            .swapchains
            .get(&swapchain.as_raw())
            .map(|c| c.images.iter().map(|&i| vk::Image::from_raw(i)).collect())
            .ok_or_else(|| GpuError::InvalidState("Unknown swapchain".to_string()))
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let scripted = state.acquire_script.pop_front();
        if let Some(code) = scripted {
            if code != vk::Result::SUCCESS && code != vk::Result::SUBOPTIMAL_KHR {
                return Err(code);
            }
        }

        let Some(chain) = state.swapchains.get_mut(&swapchain.as_raw()) else {
            state.error("acquire from an unknown swapchain");
            return Err(vk::Result::ERROR_SURFACE_LOST_KHR);
        };
        if chain.retired {
            state.error("acquire from a retired swapchain");
            return Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        }
        let index = chain.next;
        chain.next = (index + 1) % chain.images.len().max(1) as u32;
        let fresh = chain.acquired.insert(index);
        if !fresh {
            state.error("acquired an image that was never presented");
        }
        state.signal_semaphore(semaphore.as_raw());

        Ok((index, scripted == Some(vk::Result::SUBOPTIMAL_KHR)))
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.consume_semaphore(wait_semaphore.as_raw());
        let released = state
            .swapchains
            .get_mut(&swapchain.as_raw())
            .is_some_and(|c| c.acquired.remove(&image_index));
        if !released {
            state.error("present of an image that was not acquired");
        }
        state.presents += 1;

        match state.present_script.pop_front() {
            None | Some(vk::Result::SUCCESS) => Ok(false),
            Some(vk::Result::SUBOPTIMAL_KHR) => Ok(true),
            Some(code) => Err(code),
        }
    }

    fn find_depth_format(&self, candidates: &[vk::Format]) -> Result<vk::Format> {
        candidates
            .first()
            .copied()
            .ok_or_else(|| GpuError::Other("No supported depth format".to_string()))
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
    ) -> Result<vk::ImageView> {
        let mut state = self.state.lock();
        let raw = image.as_raw();
        if !state.is_live(raw, Kind::Image) && !state.is_live(raw, Kind::SwapchainImage) {
            state.error("image view of an invalid image");
        }
        Ok(vk::ImageView::from_raw(state.alloc(Kind::ImageView)))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.lock().destroy(Kind::ImageView, view.as_raw());
    }

    fn create_attachment_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        _usage: vk::ImageUsageFlags,
    ) -> Result<GpuImage> {
        let mut state = self.state.lock();
        if extent.width == 0 || extent.height == 0 {
            state.error("image created with zero extent");
            return Err(GpuError::AllocationFailed("Zero extent".to_string()));
        }
        Ok(GpuImage {
            image: vk::Image::from_raw(state.alloc(Kind::Image)),
            format,
            extent,
        })
    }

    fn destroy_image(&self, image: &mut GpuImage) {
        self.state.lock().destroy(Kind::Image, image.image.as_raw());
        image.image = vk::Image::null();
    }

    fn create_render_pass(&self, _desc: &RenderPassDesc) -> Result<vk::RenderPass> {
        let raw = self.state.lock().alloc(Kind::RenderPass);
        Ok(vk::RenderPass::from_raw(raw))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state
            .lock()
            .destroy(Kind::RenderPass, render_pass.as_raw());
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer> {
        let mut state = self.state.lock();
        if !state.is_live(render_pass.as_raw(), Kind::RenderPass) {
            state.error("framebuffer for an invalid render pass");
        }
        if attachments
            .iter()
            .any(|v| !state.is_live(v.as_raw(), Kind::ImageView))
        {
            state.error("framebuffer with an invalid attachment");
        }
        if extent.width == 0 || extent.height == 0 {
            state.error("framebuffer with zero extent");
        }
        Ok(vk::Framebuffer::from_raw(state.alloc(Kind::Framebuffer)))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state
            .lock()
            .destroy(Kind::Framebuffer, framebuffer.as_raw());
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<GpuBuffer> {
        if desc.size == 0 {
            return Err(GpuError::AllocationFailed(format!(
                "Buffer '{}' has zero size",
                desc.name
            )));
        }
        let mut state = self.state.lock();
        let raw = state.alloc(Kind::Buffer);
        let mapped = desc.location != MemoryLocation::GpuOnly;
        state.buffers.insert(
            raw,
            BufferState {
                size: desc.size,
                host: vec![0; desc.size as usize],
                device: vec![0; desc.size as usize],
                mapped,
            },
        );
        Ok(GpuBuffer {
            buffer: vk::Buffer::from_raw(raw),
            size: desc.size,
            mapped,
            host_coherent: self.coherent,
        })
    }

    fn destroy_buffer(&self, buffer: &mut GpuBuffer) {
        let mut state = self.state.lock();
        let raw = buffer.buffer.as_raw();
        if state.destroy(Kind::Buffer, raw) {
            state.buffers.remove(&raw);
        }
        buffer.buffer = vk::Buffer::null();
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) -> Result<()> {
        buffer.check_range(offset, data.len() as u64)?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let raw = buffer.buffer.as_raw();
        if state.in_use(raw) {
            state.error("buffer written while in use by the GPU");
        }
        let Some(b) = state.buffers.get_mut(&raw) else {
            return Err(GpuError::InvalidState("Unknown buffer".to_string()));
        };
        if !b.mapped {
            return Err(GpuError::InvalidState(
                "Buffer is not host visible".to_string(),
            ));
        }
        let range = offset as usize..offset as usize + data.len();
        b.host[range.clone()].copy_from_slice(data);
        if self.coherent {
            b.device[range].copy_from_slice(data);
        }
        Ok(())
    }

    fn flush_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Result<()> {
        buffer.check_range(offset, size)?;
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.flushes += 1;

        let atom = self.limits.non_coherent_atom_size.max(1);
        let aligned = offset % atom == 0 && (size % atom == 0 || offset + size == buffer.size);
        if !self.coherent && !aligned {
            state.error("flush range not aligned to nonCoherentAtomSize");
        }
        let Some(b) = state.buffers.get_mut(&buffer.buffer.as_raw()) else {
            return Err(GpuError::InvalidState("Unknown buffer".to_string()));
        };
        let range = offset as usize..(offset + size).min(b.size) as usize;
        let host = b.host[range.clone()].to_vec();
        b.device[range].copy_from_slice(&host);
        Ok(())
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<vk::DescriptorSetLayout> {
        let mut state = self.state.lock();
        let mut sorted = bindings.to_vec();
        sorted.sort_by_key(|b| b.binding);
        if sorted.windows(2).any(|w| w[0].binding == w[1].binding) {
            state.error("descriptor set layout with duplicate bindings");
        }
        let raw = state.alloc(Kind::DescriptorSetLayout);
        state.set_layouts.insert(raw, sorted);
        Ok(vk::DescriptorSetLayout::from_raw(raw))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        let mut state = self.state.lock();
        if state.destroy(Kind::DescriptorSetLayout, layout.as_raw()) {
            state.set_layouts.remove(&layout.as_raw());
        }
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> Result<vk::DescriptorPool> {
        let mut state = self.state.lock();
        let raw = state.alloc(Kind::DescriptorPool);
        state.pools.insert(
            raw,
            PoolState {
                remaining_sets: max_sets,
                remaining: sizes.iter().map(|s| (s.ty, s.descriptor_count)).collect(),
                sets: Vec::new(),
            },
        );
        Ok(vk::DescriptorPool::from_raw(raw))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state.lock();
        let raw = pool.as_raw();
        if let Some(p) = state.pools.remove(&raw) {
            for set in p.sets {
                if state.in_use(set) {
                    state.error("descriptor pool destroyed while a set is in use");
                }
                state.sets.remove(&set);
                state.live.remove(&set);
            }
        }
        state.destroy(Kind::DescriptorPool, raw);
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(bindings) = state.set_layouts.get(&layout.as_raw()).cloned() else {
            return Err(GpuError::LayoutMismatch(
                "Unknown descriptor set layout".to_string(),
            ));
        };
        let Some(p) = state.pools.get_mut(&pool.as_raw()) else {
            return Err(GpuError::InvalidState("Unknown descriptor pool".to_string()));
        };

        let fits = p.remaining_sets > 0
            && bindings.iter().all(|b| {
                p.remaining
                    .iter()
                    .any(|&(kind, count)| kind == b.kind && count >= b.count)
            });
        if !fits {
            return Err(GpuError::DescriptorPoolExhausted(
                vk::Result::ERROR_OUT_OF_POOL_MEMORY.to_string(),
            ));
        }
        p.remaining_sets -= 1;
        for b in &bindings {
            if let Some((_, count)) = p.remaining.iter_mut().find(|(kind, _)| *kind == b.kind) {
                *count -= b.count;
            }
        }

        let raw = state.alloc(Kind::DescriptorSet);
        if let Some(p) = state.pools.get_mut(&pool.as_raw()) {
            p.sets.push(raw);
        }
        state.sets.insert(
            raw,
            SetState {
                bindings,
                writes: BTreeMap::new(),
            },
        );
        Ok(vk::DescriptorSet::from_raw(raw))
    }

    fn write_buffer_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        kind: vk::DescriptorType,
        region: BufferRegion,
    ) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let raw = set.as_raw();
        if state.in_use(raw) {
            state.error("descriptor set updated while in use by the GPU");
        }
        let region_valid = state
            .buffers
            .get(&region.buffer.as_raw())
            .is_some_and(|b| region.offset + region.range <= b.size);
        let Some(s) = state.sets.get_mut(&raw) else {
            state.error("write to an invalid descriptor set");
            return;
        };
        let matches_layout = s
            .bindings
            .iter()
            .any(|b| b.binding == binding && b.kind == kind);
        if matches_layout {
            s.writes.insert(binding, region);
        }
        if !matches_layout {
            state.error(format!(
                "descriptor write to binding {binding} does not match the set layout"
            ));
        }
        if !region_valid {
            state.error("descriptor write with an invalid buffer region");
        }
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<vk::PipelineLayout> {
        let mut state = self.state.lock();
        let mut layouts = Vec::with_capacity(set_layouts.len());
        for layout in set_layouts {
            match state.set_layouts.get(&layout.as_raw()) {
                Some(bindings) => layouts.push(bindings.clone()),
                None => {
                    return Err(GpuError::PipelineCreation(
                        "Invalid descriptor set layout".to_string(),
                    ))
                }
            }
        }
        let raw = state.alloc(Kind::PipelineLayout);
        state.pipeline_layouts.insert(
            raw,
            PipelineLayoutState {
                set_layouts: layouts,
                push_constants: push_constant_ranges.to_vec(),
            },
        );
        Ok(vk::PipelineLayout::from_raw(raw))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        let mut state = self.state.lock();
        if state.destroy(Kind::PipelineLayout, layout.as_raw()) {
            state.pipeline_layouts.remove(&layout.as_raw());
        }
    }

    fn create_graphics_pipeline(
        &self,
        config: &GraphicsPipelineConfig,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
    ) -> Result<vk::Pipeline> {
        if !is_spirv(&config.vertex_shader) {
            return Err(GpuError::ShaderCompilation(
                "Vertex: invalid SPIR-V".to_string(),
            ));
        }
        if !is_spirv(&config.fragment_shader) {
            return Err(GpuError::ShaderCompilation(
                "Fragment: invalid SPIR-V".to_string(),
            ));
        }
        let mut state = self.state.lock();
        if !state.is_live(layout.as_raw(), Kind::PipelineLayout) {
            return Err(GpuError::PipelineCreation(
                "Invalid pipeline layout".to_string(),
            ));
        }
        if !state.is_live(render_pass.as_raw(), Kind::RenderPass) {
            return Err(GpuError::PipelineCreation("Invalid render pass".to_string()));
        }
        let raw = state.alloc(Kind::Pipeline);
        state.pipelines.insert(
            raw,
            PipelineState {
                layout: layout.as_raw(),
                render_pass: render_pass.as_raw(),
                vertex_input: !config.vertex_bindings.is_empty(),
            },
        );
        Ok(vk::Pipeline::from_raw(raw))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        let mut state = self.state.lock();
        if state.destroy(Kind::Pipeline, pipeline.as_raw()) {
            state.pipelines.remove(&pipeline.as_raw());
        }
    }
}

/// Surface whose extent is set by the test.
pub struct HeadlessSurface {
    extent: Mutex<vk::Extent2D>,
    resized: AtomicBool,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            extent: Mutex::new(vk::Extent2D { width, height }),
            resized: AtomicBool::new(false),
        }
    }

    /// Change the extent and raise the resize flag.
    pub fn resize(&self, width: u32, height: u32) {
        *self.extent.lock() = vk::Extent2D { width, height };
        self.resized.store(true, Ordering::Release);
    }
}

impl PresentationSurface for HeadlessSurface {
    fn extent(&self) -> vk::Extent2D {
        *self.extent.lock()
    }

    fn take_resized(&self) -> bool {
        self.resized.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unflushed_write_stays_on_host() {
        let device = HeadlessDevice::new();
        let buffer = device
            .create_buffer(&BufferDesc {
                size: 64,
                usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
                location: MemoryLocation::CpuToGpu,
                name: "test",
            })
            .unwrap();
        device.write_buffer(&buffer, 0, &[1, 2, 3, 4]).unwrap();
        assert_eq!(device.read_device_bytes(buffer.buffer, 0, 4), vec![0; 4]);
        device.flush_buffer(&buffer, 0, 64).unwrap();
        assert_eq!(device.read_device_bytes(buffer.buffer, 0, 4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn unsubmitted_fence_times_out() {
        let device = HeadlessDevice::new();
        let fence = device.create_fence(false).unwrap();
        assert!(!device.wait_for_fences(&[fence], 1000).unwrap());
        device.destroy_fence(fence);
        assert!(device.validation_errors().is_empty());
    }

    #[test]
    fn stall_only_expires_bounded_waits() {
        let device = HeadlessDevice::new();
        let pool = device.create_command_pool().unwrap();
        let cmd = device.allocate_command_buffers(pool, 1).unwrap()[0];
        let fence = device.create_fence(false).unwrap();
        device.begin_command_buffer(cmd).unwrap();
        device.end_command_buffer(cmd).unwrap();
        device
            .queue_submit(&SubmitDesc {
                command_buffer: cmd,
                wait_semaphore: vk::Semaphore::null(),
                wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                signal_semaphore: vk::Semaphore::null(),
                fence,
            })
            .unwrap();

        device.set_stalled(true);
        assert!(!device.wait_for_fences(&[fence], 1000).unwrap());
        assert!(device.wait_for_fences(&[fence], WAIT_FOREVER).unwrap());
        device.destroy_fence(fence);
        device.destroy_command_pool(pool);
        assert!(device.validation_errors().is_empty());
    }

    #[test]
    fn double_destroy_recorded() {
        let device = HeadlessDevice::new();
        let semaphore = device.create_semaphore().unwrap();
        device.destroy_semaphore(semaphore);
        device.destroy_semaphore(semaphore);
        assert_eq!(device.validation_errors().len(), 1);
    }

    #[test]
    fn reset_while_pending_recorded() {
        let device = HeadlessDevice::new();
        let pool = device.create_command_pool().unwrap();
        let cmd = device.allocate_command_buffers(pool, 1).unwrap()[0];
        let fence = device.create_fence(false).unwrap();

        device.begin_command_buffer(cmd).unwrap();
        device.end_command_buffer(cmd).unwrap();
        device
            .queue_submit(&SubmitDesc {
                command_buffer: cmd,
                wait_semaphore: vk::Semaphore::null(),
                wait_stage: vk::PipelineStageFlags::ALL_COMMANDS,
                signal_semaphore: vk::Semaphore::null(),
                fence,
            })
            .unwrap();
        device.begin_command_buffer(cmd).unwrap();
        assert!(device
            .validation_errors()
            .iter()
            .any(|e| e.contains("reset while pending")));
    }

    #[test]
    fn draw_outside_render_pass_recorded() {
        let device = HeadlessDevice::new();
        let pool = device.create_command_pool().unwrap();
        let cmd = device.allocate_command_buffers(pool, 1).unwrap()[0];
        device.begin_command_buffer(cmd).unwrap();
        device.cmd_draw(cmd, 3);
        let errors = device.validation_errors();
        assert!(errors.iter().any(|e| e.contains("outside a render pass")));
        assert!(errors.iter().any(|e| e.contains("without a bound pipeline")));
    }

    #[test]
    fn surface_resize_flag_is_taken_once() {
        let surface = HeadlessSurface::new(10, 10);
        assert!(!surface.take_resized());
        surface.resize(20, 30);
        assert_eq!(surface.extent().width, 20);
        assert!(surface.take_resized());
        assert!(!surface.take_resized());
    }
}
