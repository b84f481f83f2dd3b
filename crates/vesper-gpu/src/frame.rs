//! Frame orchestration.
//!
//! [`FrameOrchestrator`] owns a fixed ring of frame slots and the swap chain
//! and sequences every frame as
//!
//! ```text
//! begin_frame ─ wait slot fence, acquire image, begin recording
//!   begin_render_pass ─ clear, set viewport + scissor from the current extent
//!   ... draws ...
//!   end_render_pass
//! end_frame ─ end recording, submit, present, recreate if stale, next slot
//! ```
//!
//! Staleness (out-of-date or suboptimal surfaces, timeouts, resizes) never
//! reaches the caller: the swap chain is rebuilt and at most one frame is
//! skipped, reported as `Ok(None)` from [`FrameOrchestrator::begin_frame`].

use std::sync::Arc;
use std::time::Duration;

use crate::command::{begin_command_buffer, end_command_buffer, CommandPool};
use crate::deferred::DeferredDestructionQueue;
use crate::device::{RenderPassBegin, SharedDevice};
use crate::error::{GpuError, Result};
use crate::surface::PresentationSurface;
use crate::swapchain::{AcquireStatus, RecreateOutcome, SwapChain};
use crate::sync::FrameSync;
use ash::vk;

/// Upper bound for [`FrameConfig::frames_in_flight`].
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Frame loop configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameConfig {
    /// Number of frames the host may record ahead of the GPU.
    pub frames_in_flight: usize,
    /// Present with FIFO.
    pub vsync: bool,
    /// Bound for fence waits and image acquisition.
    pub acquire_timeout: Duration,
    /// Color the render pass clears to.
    pub clear_color: [f32; 4],
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            vsync: false,
            acquire_timeout: Duration::from_secs(1),
            clear_color: [0.01, 0.01, 0.01, 1.0],
        }
    }
}

impl FrameConfig {
    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Set the fence and acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the clear color.
    pub fn with_clear_color(mut self, clear_color: [f32; 4]) -> Self {
        self.clear_color = clear_color;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(GpuError::InvalidConfig(format!(
                "frames_in_flight must be between 1 and {MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            )));
        }
        if self.acquire_timeout.is_zero() {
            return Err(GpuError::InvalidConfig(
                "acquire_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the frame loop is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    FrameOpen,
    /// Waiting for the surface to regain a non-zero extent.
    Recreating,
}

/// Per-slot resources, reused for the lifetime of the orchestrator.
pub struct FrameSlot {
    pub command_buffer: vk::CommandBuffer,
    pub sync: FrameSync,
}

/// Drives the render loop over a ring of frame slots.
pub struct FrameOrchestrator {
    slots: Vec<FrameSlot>,
    swapchain: SwapChain,
    deferred: DeferredDestructionQueue,
    command_pool: CommandPool,
    surface: Arc<dyn PresentationSurface>,
    device: SharedDevice,
    config: FrameConfig,
    state: FrameState,
    frame_index: usize,
    frame_count: u64,
    image_index: u32,
    acquire_suboptimal: bool,
    swapchain_generation: u64,
}

impl FrameOrchestrator {
    /// Create the swap chain and all frame slots.
    pub fn new(
        device: SharedDevice,
        surface: Arc<dyn PresentationSurface>,
        config: FrameConfig,
    ) -> Result<Self> {
        config.validate()?;

        // A window minimized at startup gets its images on the first
        // begin_frame after it regains area.
        let swapchain = SwapChain::new(
            device.clone(),
            surface.extent(),
            config.vsync,
            config.acquire_timeout,
        )?;
        let state = if swapchain.has_images() {
            FrameState::Idle
        } else {
            FrameState::Recreating
        };

        let command_pool = CommandPool::new(device.clone())?;
        let frames_in_flight = config.frames_in_flight;
        let command_buffers = command_pool.allocate(frames_in_flight as u32)?;
        let slots = command_buffers
            .into_iter()
            .map(|command_buffer| {
                Ok(FrameSlot {
                    command_buffer,
                    sync: FrameSync::new(device.clone())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            frames_in_flight,
            images = swapchain.image_count(),
            "Frame orchestrator ready"
        );

        Ok(Self {
            slots,
            swapchain,
            deferred: DeferredDestructionQueue::new(frames_in_flight),
            command_pool,
            surface,
            device,
            config,
            state,
            frame_index: 0,
            frame_count: 0,
            image_index: 0,
            acquire_suboptimal: false,
            swapchain_generation: 0,
        })
    }

    /// Open the next frame.
    ///
    /// Returns `Ok(None)` when no image could be acquired this frame; the
    /// caller skips rendering and tries again next frame.
    ///
    /// # Panics
    /// If a frame is already open.
    pub fn begin_frame(&mut self) -> Result<Option<vk::CommandBuffer>> {
        assert!(
            self.state != FrameState::FrameOpen,
            "frame already open: call end_frame first"
        );

        if self.state == FrameState::Recreating && !self.recreate_swapchain()? {
            return Ok(None);
        }

        let (image_index, status) = {
            let _span = tracing::trace_span!("frame.acquire").entered();
            self.swapchain
                .acquire_next_image(&mut self.slots[self.frame_index].sync)?
        };
        if status == AcquireStatus::OutOfDate {
            self.recreate_swapchain()?;
            return Ok(None);
        }

        // This slot's fence has signaled, so anything queued
        // frames_in_flight frames ago is unreferenced.
        self.deferred.process(self.frame_count);

        let cmd = self.slots[self.frame_index].command_buffer;
        begin_command_buffer(&self.device, cmd)?;

        self.image_index = image_index;
        self.acquire_suboptimal = status == AcquireStatus::Suboptimal;
        self.state = FrameState::FrameOpen;
        Ok(Some(cmd))
    }

    /// Begin the swap chain render pass on the open frame's command buffer.
    ///
    /// # Panics
    /// If no frame is open or `cmd` is not the open frame's command buffer.
    pub fn begin_render_pass(&self, cmd: vk::CommandBuffer) {
        self.assert_open_buffer(cmd);

        let extent = self.swapchain.extent();
        self.device.cmd_begin_render_pass(
            cmd,
            &RenderPassBegin {
                render_pass: self.swapchain.render_pass(),
                framebuffer: self.swapchain.framebuffer(self.image_index),
                extent,
                clear_color: self.config.clear_color,
                clear_depth: 1.0,
            },
        );
        self.device.cmd_set_viewport(
            cmd,
            vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
        );
        self.device.cmd_set_scissor(
            cmd,
            vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
        );
    }

    /// End the swap chain render pass.
    ///
    /// # Panics
    /// If no frame is open or `cmd` is not the open frame's command buffer.
    pub fn end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.assert_open_buffer(cmd);
        self.device.cmd_end_render_pass(cmd);
    }

    /// Submit and present the open frame, then advance to the next slot.
    ///
    /// # Panics
    /// If no frame is open.
    pub fn end_frame(&mut self) -> Result<()> {
        assert!(
            self.state == FrameState::FrameOpen,
            "no frame open: call begin_frame first"
        );
        self.state = FrameState::Idle;

        let slot = &self.slots[self.frame_index];
        end_command_buffer(&self.device, slot.command_buffer)?;
        let status = {
            let _span = tracing::trace_span!("frame.submit_present").entered();
            self.swapchain
                .submit_and_present(slot.command_buffer, &slot.sync, self.image_index)?
        };

        self.frame_index = (self.frame_index + 1) % self.slots.len();
        self.frame_count += 1;

        let resized = self.surface.take_resized();
        if status.is_stale() || self.acquire_suboptimal || resized {
            tracing::debug!(
                ?status,
                suboptimal = self.acquire_suboptimal,
                resized,
                "Swapchain stale after present"
            );
            self.acquire_suboptimal = false;
            self.recreate_swapchain()?;
        }
        Ok(())
    }

    /// Keep `resource` alive until every frame that may reference it has
    /// completed.
    pub fn defer_destroy<R: Send + 'static>(&mut self, resource: R) {
        self.deferred.queue(resource, self.frame_count);
    }

    /// Wait for all submitted work and release deferred resources.
    pub fn wait_idle(&mut self) -> Result<()> {
        self.device.wait_idle()?;
        self.deferred.flush();
        Ok(())
    }

    /// Slot index of the open frame.
    ///
    /// # Panics
    /// If no frame is open.
    pub fn frame_index(&self) -> usize {
        assert!(self.is_frame_in_progress(), "no frame open");
        self.frame_index
    }

    /// Command buffer of the open frame.
    ///
    /// # Panics
    /// If no frame is open.
    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        assert!(self.is_frame_in_progress(), "no frame open");
        self.slots[self.frame_index].command_buffer
    }

    /// Swap chain image acquired for the open frame.
    ///
    /// # Panics
    /// If no frame is open.
    pub fn image_index(&self) -> u32 {
        assert!(self.is_frame_in_progress(), "no frame open");
        self.image_index
    }

    /// Whether a frame is open.
    pub fn is_frame_in_progress(&self) -> bool {
        self.state == FrameState::FrameOpen
    }

    /// Current loop state.
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Render pass pipelines must be compatible with.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.swapchain.render_pass()
    }

    /// Aspect ratio of the current swap chain.
    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.aspect_ratio()
    }

    /// Current swap chain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Number of frame slots.
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Frames submitted so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Incremented on every successful swap chain recreation.
    pub fn swapchain_generation(&self) -> u64 {
        self.swapchain_generation
    }

    /// The swap chain.
    pub fn swapchain(&self) -> &SwapChain {
        &self.swapchain
    }

    /// The configuration in use.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Pool the slot command buffers were allocated from.
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool.handle()
    }

    /// The device frames are recorded on.
    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    /// Rebuild the swap chain for the surface's current extent.
    ///
    /// Returns `false` when recreation is deferred on a zero-area surface.
    fn recreate_swapchain(&mut self) -> Result<bool> {
        let _span = tracing::trace_span!("frame.recreate").entered();
        self.surface.take_resized();

        let fences: Vec<vk::Fence> = self.slots.iter().map(|s| s.sync.in_flight).collect();
        match self.swapchain.recreate(self.surface.extent(), &fences)? {
            RecreateOutcome::Deferred => {
                self.state = FrameState::Recreating;
                Ok(false)
            }
            RecreateOutcome::Recreated {
                render_pass_changed,
            } => {
                self.swapchain_generation += 1;
                if render_pass_changed {
                    tracing::info!(
                        generation = self.swapchain_generation,
                        "Render pass changed, dependent pipelines must be rebuilt"
                    );
                }
                self.state = FrameState::Idle;
                Ok(true)
            }
        }
    }

    fn assert_open_buffer(&self, cmd: vk::CommandBuffer) {
        assert!(self.is_frame_in_progress(), "no frame open");
        assert_eq!(
            cmd,
            self.slots[self.frame_index].command_buffer,
            "command buffer does not belong to the open frame"
        );
    }
}

impl Drop for FrameOrchestrator {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle: {e}");
        }
        self.deferred.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::{
        DescriptorPool, DescriptorPoolConfig, DescriptorSetLayout, DescriptorSetLayoutConfig,
        DescriptorWriter,
    };
    use crate::device::GpuDevice;
    use crate::headless::{HeadlessDevice, HeadlessSurface, RecordedCommand};
    use crate::pipeline::{GraphicsPipeline, GraphicsPipelineConfig, PipelineLayout, SPIRV_MAGIC};
    use crate::uniform::UniformBufferRing;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup(frames_in_flight: usize) -> (Arc<HeadlessDevice>, Arc<HeadlessSurface>, FrameOrchestrator) {
        let device = Arc::new(HeadlessDevice::new());
        let surface = Arc::new(HeadlessSurface::new(800, 600));
        let orchestrator = FrameOrchestrator::new(
            device.clone(),
            surface.clone(),
            FrameConfig::default().with_frames_in_flight(frames_in_flight),
        )
        .unwrap();
        (device, surface, orchestrator)
    }

    /// Run one frame with an empty render pass. Returns whether it was rendered.
    fn run_frame(orchestrator: &mut FrameOrchestrator) -> bool {
        let Some(cmd) = orchestrator.begin_frame().unwrap() else {
            return false;
        };
        orchestrator.begin_render_pass(cmd);
        orchestrator.end_render_pass(cmd);
        orchestrator.end_frame().unwrap();
        true
    }

    fn test_shaders() -> GraphicsPipelineConfig {
        GraphicsPipelineConfig {
            vertex_shader: vec![SPIRV_MAGIC, 0x0001_0000],
            fragment_shader: vec![SPIRV_MAGIC, 0x0001_0000],
            ..Default::default()
        }
    }

    #[test]
    fn config_validation() {
        assert!(FrameConfig::default().validate().is_ok());
        assert!(FrameConfig::default().with_frames_in_flight(4).validate().is_ok());
        assert!(matches!(
            FrameConfig::default().with_frames_in_flight(0).validate(),
            Err(GpuError::InvalidConfig(_))
        ));
        assert!(FrameConfig::default().with_frames_in_flight(5).validate().is_err());
        assert!(FrameConfig::default()
            .with_acquire_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn slot_index_cycles() {
        for frames_in_flight in 1..=MAX_FRAMES_IN_FLIGHT {
            let (device, _surface, mut orchestrator) = setup(frames_in_flight);
            for n in 0..12 {
                let cmd = orchestrator.begin_frame().unwrap().unwrap();
                assert_eq!(orchestrator.frame_index(), n % frames_in_flight);
                orchestrator.begin_render_pass(cmd);
                orchestrator.end_render_pass(cmd);
                orchestrator.end_frame().unwrap();
            }
            assert_eq!(orchestrator.frame_count(), 12);
            assert_eq!(device.submission_count(), 12);
            assert_eq!(device.present_count(), 12);
            assert!(device.validation_errors().is_empty());
        }
    }

    #[test]
    fn second_begin_panics_without_submitting() {
        let (device, _surface, mut orchestrator) = setup(2);
        orchestrator.begin_frame().unwrap().unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| orchestrator.begin_frame()));
        let panic = result.unwrap_err();
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap();
        assert!(message.contains("frame already open"));
        assert_eq!(device.submission_count(), 0);
    }

    #[test]
    #[should_panic(expected = "no frame open")]
    fn end_frame_without_begin_panics() {
        let (_device, _surface, mut orchestrator) = setup(2);
        let _ = orchestrator.end_frame();
    }

    #[test]
    #[should_panic(expected = "no frame open")]
    fn render_pass_outside_frame_panics() {
        let (_device, _surface, orchestrator) = setup(2);
        orchestrator.begin_render_pass(vk::CommandBuffer::null());
    }

    #[test]
    #[should_panic(expected = "does not belong to the open frame")]
    fn render_pass_on_foreign_buffer_panics() {
        let (_device, _surface, mut orchestrator) = setup(2);
        orchestrator.begin_frame().unwrap().unwrap();
        orchestrator.begin_render_pass(vk::CommandBuffer::null());
    }

    #[test]
    fn resize_recreates_exactly_once() {
        let (device, surface, mut orchestrator) = setup(2);
        assert!(run_frame(&mut orchestrator));
        let generation = orchestrator.swapchain_generation();

        surface.resize(1024, 768);
        assert!(run_frame(&mut orchestrator));
        assert_eq!(orchestrator.swapchain_generation(), generation + 1);
        assert_eq!(orchestrator.extent().width, 1024);
        assert_eq!(orchestrator.extent().height, 768);

        assert!(run_frame(&mut orchestrator));
        assert_eq!(orchestrator.swapchain_generation(), generation + 1);

        // Default headless surface: min 2 images, no max.
        assert_eq!(orchestrator.swapchain().image_count(), 3);
        assert_eq!(device.live_framebuffers(), 3);
        assert!(device.validation_errors().is_empty());
    }

    #[test]
    fn resize_and_out_of_date_recreate_once() {
        let (device, surface, mut orchestrator) = setup(2);
        assert!(run_frame(&mut orchestrator));
        let generation = orchestrator.swapchain_generation();

        surface.resize(640, 480);
        device.push_acquire_result(vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert!(!run_frame(&mut orchestrator));
        assert!(run_frame(&mut orchestrator));
        assert_eq!(orchestrator.swapchain_generation(), generation + 1);
    }

    #[test]
    fn hundred_resizes_leak_nothing() {
        let (device, surface, mut orchestrator) = setup(3);
        for i in 0..100u32 {
            surface.resize(640 + i, 480 + i % 7);
            assert!(run_frame(&mut orchestrator));
        }
        let images = orchestrator.swapchain().image_count();
        assert_eq!(orchestrator.swapchain_generation(), 100);
        assert_eq!(device.live_swapchains(), 1);
        assert_eq!(device.live_framebuffers(), images);
        assert_eq!(device.live_image_views(), images * 2);
        assert_eq!(device.live_images(), images);
        assert_eq!(device.live_render_passes(), 1);
        assert!(device.validation_errors().is_empty());
    }

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Sentinel {
        value: [u32; 4],
    }

    fn read_sentinel(device: &HeadlessDevice, set: vk::DescriptorSet) -> u32 {
        let bytes = device.read_descriptor_bytes(set, 0).unwrap();
        bytemuck::pod_read_unaligned::<u32>(&bytes[..4])
    }

    #[test]
    fn per_slot_uniforms_stay_isolated() {
        for frames_in_flight in [2usize, 3] {
            let (device, _surface, mut orchestrator) = setup(frames_in_flight);
            let shared: SharedDevice = device.clone();
            let layout = DescriptorSetLayout::new(
                shared.clone(),
                &DescriptorSetLayoutConfig::new()
                    .uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS),
            )
            .unwrap();
            let mut pool = DescriptorPool::new(
                shared.clone(),
                &DescriptorPoolConfig::for_layout(&layout, frames_in_flight as u32),
            )
            .unwrap();
            let ring =
                UniformBufferRing::<Sentinel>::new(shared.clone(), frames_in_flight, "sentinel")
                    .unwrap();
            let sets: Vec<_> = (0..frames_in_flight)
                .map(|slot| {
                    DescriptorWriter::new(&layout)
                        .buffer(0, ring.descriptor_region(slot))
                        .build(&mut pool)
                        .unwrap()
                })
                .collect();
            let pipeline_layout = PipelineLayout::new(shared.clone(), &[&layout], &[]).unwrap();

            for frame in 0..(10 * frames_in_flight) as u32 {
                let cmd = orchestrator.begin_frame().unwrap().unwrap();
                let slot = orchestrator.frame_index();
                let sentinel = 1000 + frame;
                ring.write(slot, &Sentinel { value: [sentinel; 4] }).unwrap();
                ring.flush(slot).unwrap();

                assert_eq!(read_sentinel(&device, sets[slot]), sentinel);
                let next = (slot + 1) % frames_in_flight;
                assert_ne!(read_sentinel(&device, sets[next]), sentinel);

                orchestrator.begin_render_pass(cmd);
                shared.cmd_bind_descriptor_set(cmd, pipeline_layout.handle(), 0, sets[slot]);
                orchestrator.end_render_pass(cmd);
                orchestrator.end_frame().unwrap();
            }
            orchestrator.wait_idle().unwrap();
            assert!(device.validation_errors().is_empty());
        }
    }

    #[test]
    fn out_of_date_acquire_skips_frame() {
        let (device, _surface, mut orchestrator) = setup(2);
        assert!(run_frame(&mut orchestrator));
        let generation = orchestrator.swapchain_generation();

        device.push_acquire_result(vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert!(orchestrator.begin_frame().unwrap().is_none());
        assert_eq!(orchestrator.state(), FrameState::Idle);
        assert_eq!(orchestrator.frame_count(), 1);
        assert_eq!(orchestrator.swapchain_generation(), generation + 1);
        assert_eq!(device.submission_count(), 1);

        orchestrator.begin_frame().unwrap().unwrap();
        assert_eq!(orchestrator.frame_index(), 1);
    }

    #[test]
    fn acquire_timeout_treated_as_out_of_date() {
        let (device, _surface, mut orchestrator) = setup(2);
        device.push_acquire_result(vk::Result::TIMEOUT);
        assert!(orchestrator.begin_frame().unwrap().is_none());
        assert_eq!(orchestrator.swapchain_generation(), 1);
        assert!(run_frame(&mut orchestrator));
        assert!(device.validation_errors().is_empty());
    }

    #[test]
    fn slot_fence_timeout_skips_frame_and_recreates() {
        let (device, _surface, mut orchestrator) = setup(2);
        assert!(run_frame(&mut orchestrator));
        assert!(run_frame(&mut orchestrator));

        device.set_stalled(true);
        assert!(orchestrator.begin_frame().unwrap().is_none());
        assert_eq!(orchestrator.state(), FrameState::Idle);
        assert_eq!(orchestrator.swapchain_generation(), 1);
        assert_eq!(orchestrator.frame_count(), 2);
        assert_eq!(device.submission_count(), 2);

        device.set_stalled(false);
        orchestrator.begin_frame().unwrap().unwrap();
        assert_eq!(orchestrator.frame_index(), 0);
        let cmd = orchestrator.current_command_buffer();
        orchestrator.begin_render_pass(cmd);
        orchestrator.end_render_pass(cmd);
        orchestrator.end_frame().unwrap();
        assert!(run_frame(&mut orchestrator));
        assert_eq!(device.validation_errors(), Vec::<String>::new());
    }

    #[test]
    fn guard_fence_timeout_abandons_image_and_recreates() {
        // Two slots over three images: after three frames slot 1 acquires
        // image 0, which slot 0's latest frame still guards.
        let (device, _surface, mut orchestrator) = setup(2);
        for _ in 0..3 {
            assert!(run_frame(&mut orchestrator));
        }
        let slot_fence = orchestrator.slots[1].sync.in_flight;
        assert!(device.wait_for_fences(&[slot_fence], 0).unwrap());
        let semaphore = orchestrator.slots[1].sync.image_available;

        device.set_stalled(true);
        assert!(orchestrator.begin_frame().unwrap().is_none());
        assert_eq!(orchestrator.state(), FrameState::Idle);
        assert_eq!(orchestrator.swapchain_generation(), 1);
        assert_eq!(orchestrator.frame_count(), 3);
        assert_ne!(orchestrator.slots[1].sync.image_available, semaphore);
        assert_eq!(device.live_semaphores(), 4);

        device.set_stalled(false);
        for _ in 0..4 {
            assert!(run_frame(&mut orchestrator));
        }
        assert_eq!(device.validation_errors(), Vec::<String>::new());
    }

    #[test]
    fn acquire_waits_for_frame_still_rendering_into_image() {
        let device = Arc::new(HeadlessDevice::new().with_image_count(1, 2));
        let surface = Arc::new(HeadlessSurface::new(800, 600));
        let mut orchestrator = FrameOrchestrator::new(
            device.clone(),
            surface,
            FrameConfig::default().with_frames_in_flight(3),
        )
        .unwrap();
        assert_eq!(orchestrator.swapchain().image_count(), 2);

        assert!(run_frame(&mut orchestrator));
        assert!(run_frame(&mut orchestrator));
        let first = orchestrator.slots[0].sync.in_flight;
        let second = orchestrator.slots[1].sync.in_flight;
        assert!(!device.is_fence_signaled(first));

        // Slot 2's own fence is fresh, but image 0 is still guarded by slot 0.
        let cmd = orchestrator.begin_frame().unwrap().unwrap();
        let image = orchestrator.image_index();
        assert_eq!(image, 0);
        assert!(device.is_fence_signaled(first));
        assert!(!device.is_fence_signaled(second));
        assert_eq!(
            orchestrator.swapchain().guard_fence(image),
            orchestrator.slots[2].sync.in_flight
        );
        orchestrator.begin_render_pass(cmd);
        orchestrator.end_render_pass(cmd);
        orchestrator.end_frame().unwrap();

        for _ in 0..9 {
            assert!(run_frame(&mut orchestrator));
        }
        assert_eq!(device.validation_errors(), Vec::<String>::new());
    }

    #[test]
    fn starts_minimized_and_builds_images_later() {
        let device = Arc::new(HeadlessDevice::new());
        device.set_current_extent(Some(vk::Extent2D {
            width: 0,
            height: 0,
        }));
        let surface = Arc::new(HeadlessSurface::new(0, 0));
        let mut orchestrator =
            FrameOrchestrator::new(device.clone(), surface.clone(), FrameConfig::default())
                .unwrap();
        assert_eq!(orchestrator.state(), FrameState::Recreating);
        let render_pass = orchestrator.render_pass();
        assert_ne!(render_pass, vk::RenderPass::null());

        for _ in 0..3 {
            assert!(orchestrator.begin_frame().unwrap().is_none());
        }
        assert_eq!(device.submission_count(), 0);

        device.set_current_extent(Some(vk::Extent2D {
            width: 1024,
            height: 768,
        }));
        surface.resize(1024, 768);
        assert!(run_frame(&mut orchestrator));
        assert_eq!(orchestrator.swapchain_generation(), 1);
        assert_eq!(orchestrator.extent().width, 1024);
        assert_eq!(orchestrator.render_pass(), render_pass);
        assert!(run_frame(&mut orchestrator));
        assert_eq!(device.validation_errors(), Vec::<String>::new());
    }

    #[test]
    fn zero_area_surface_defers_recreation() {
        let (device, surface, mut orchestrator) = setup(2);
        assert!(run_frame(&mut orchestrator));

        surface.resize(0, 0);
        assert!(run_frame(&mut orchestrator));
        assert_eq!(orchestrator.state(), FrameState::Recreating);
        assert_eq!(orchestrator.swapchain_generation(), 0);

        let submissions = device.submission_count();
        for _ in 0..5 {
            assert!(orchestrator.begin_frame().unwrap().is_none());
        }
        assert_eq!(device.submission_count(), submissions);

        surface.resize(1280, 720);
        let cmd = orchestrator.begin_frame().unwrap().unwrap();
        assert_eq!(orchestrator.swapchain_generation(), 1);
        assert_eq!(orchestrator.extent().width, 1280);
        orchestrator.begin_render_pass(cmd);
        orchestrator.end_render_pass(cmd);
        orchestrator.end_frame().unwrap();
        assert!(device.validation_errors().is_empty());
    }

    #[test]
    fn suboptimal_present_recreates_after_submit() {
        let (device, _surface, mut orchestrator) = setup(2);
        device.push_present_result(vk::Result::SUBOPTIMAL_KHR);
        assert!(run_frame(&mut orchestrator));
        assert_eq!(device.submission_count(), 1);
        assert_eq!(orchestrator.swapchain_generation(), 1);
        assert_eq!(orchestrator.frame_count(), 1);
    }

    #[test]
    fn out_of_date_present_recreates() {
        let (device, _surface, mut orchestrator) = setup(2);
        device.push_present_result(vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert!(run_frame(&mut orchestrator));
        assert_eq!(orchestrator.swapchain_generation(), 1);
        assert!(run_frame(&mut orchestrator));
        assert!(device.validation_errors().is_empty());
    }

    #[test]
    fn suboptimal_acquire_renders_then_recreates() {
        let (device, _surface, mut orchestrator) = setup(2);
        device.push_acquire_result(vk::Result::SUBOPTIMAL_KHR);
        assert!(run_frame(&mut orchestrator));
        assert_eq!(device.submission_count(), 1);
        assert_eq!(orchestrator.swapchain_generation(), 1);
    }

    #[test]
    fn viewport_follows_current_extent() {
        let (device, surface, mut orchestrator) = setup(2);
        assert!(run_frame(&mut orchestrator));
        surface.resize(1000, 500);
        assert!(run_frame(&mut orchestrator));

        let cmd = orchestrator.begin_frame().unwrap().unwrap();
        orchestrator.begin_render_pass(cmd);
        let commands = device.recorded_commands(cmd);
        assert!(commands.iter().any(|c| matches!(
            c,
            RecordedCommand::SetViewport { width, height } if *width == 1000.0 && *height == 500.0
        )));
        assert!(commands.iter().any(|c| matches!(
            c,
            RecordedCommand::BeginRenderPass { width: 1000, height: 500, .. }
        )));
        orchestrator.end_render_pass(cmd);
        orchestrator.end_frame().unwrap();
    }

    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn deferred_destruction_waits_for_frames_in_flight() {
        let (_device, _surface, mut orchestrator) = setup(2);
        let dropped = Arc::new(AtomicUsize::new(0));

        orchestrator.begin_frame().unwrap().unwrap();
        orchestrator.defer_destroy(Tracked(dropped.clone()));
        orchestrator.end_frame().unwrap();

        assert!(run_frame(&mut orchestrator));
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
        // Frame 2 reuses slot 0, whose fence covered frame 0.
        assert!(run_frame(&mut orchestrator));
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn end_to_end_draw_is_valid() {
        for frames_in_flight in [2usize, 3] {
            let (device, _surface, mut orchestrator) = setup(frames_in_flight);
            let shared: SharedDevice = device.clone();
            let layout = DescriptorSetLayout::new(
                shared.clone(),
                &DescriptorSetLayoutConfig::new()
                    .uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS),
            )
            .unwrap();
            let mut pool = DescriptorPool::new(
                shared.clone(),
                &DescriptorPoolConfig::for_layout(&layout, frames_in_flight as u32),
            )
            .unwrap();
            let ring =
                UniformBufferRing::<Sentinel>::new(shared.clone(), frames_in_flight, "globals")
                    .unwrap();
            let sets: Vec<_> = (0..frames_in_flight)
                .map(|slot| {
                    DescriptorWriter::new(&layout)
                        .buffer(0, ring.descriptor_region(slot))
                        .build(&mut pool)
                        .unwrap()
                })
                .collect();
            let pipeline_layout = PipelineLayout::new(shared.clone(), &[&layout], &[]).unwrap();
            let pipeline = GraphicsPipeline::new(
                shared.clone(),
                &test_shaders(),
                &pipeline_layout,
                orchestrator.render_pass(),
            )
            .unwrap();

            for frame in 0..8u32 {
                let cmd = orchestrator.begin_frame().unwrap().unwrap();
                let slot = orchestrator.frame_index();
                ring.write(slot, &Sentinel { value: [frame; 4] }).unwrap();
                ring.flush(slot).unwrap();

                orchestrator.begin_render_pass(cmd);
                pipeline.bind(cmd);
                shared.cmd_bind_descriptor_set(cmd, pipeline_layout.handle(), 0, sets[slot]);
                shared.cmd_draw(cmd, 3);
                orchestrator.end_render_pass(cmd);
                orchestrator.end_frame().unwrap();
            }
            orchestrator.wait_idle().unwrap();
            assert_eq!(device.validation_errors(), Vec::<String>::new());
        }
    }

    #[test]
    fn mismatched_pipeline_layout_is_reported() {
        let (device, _surface, mut orchestrator) = setup(2);
        let shared: SharedDevice = device.clone();
        let global = DescriptorSetLayout::new(
            shared.clone(),
            &DescriptorSetLayoutConfig::new().uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS),
        )
        .unwrap();
        let vertex_only = DescriptorSetLayout::new(
            shared.clone(),
            &DescriptorSetLayoutConfig::new().uniform_buffer(0, vk::ShaderStageFlags::VERTEX),
        )
        .unwrap();
        let mut pool =
            DescriptorPool::new(shared.clone(), &DescriptorPoolConfig::for_layout(&global, 1))
                .unwrap();
        let ring = UniformBufferRing::<Sentinel>::new(shared.clone(), 1, "globals").unwrap();
        let set = DescriptorWriter::new(&global)
            .buffer(0, ring.descriptor_region(0))
            .build(&mut pool)
            .unwrap();
        let pipeline_layout = PipelineLayout::new(shared.clone(), &[&vertex_only], &[]).unwrap();
        let pipeline = GraphicsPipeline::new(
            shared.clone(),
            &test_shaders(),
            &pipeline_layout,
            orchestrator.render_pass(),
        )
        .unwrap();

        let cmd = orchestrator.begin_frame().unwrap().unwrap();
        orchestrator.begin_render_pass(cmd);
        pipeline.bind(cmd);
        shared.cmd_bind_descriptor_set(cmd, pipeline_layout.handle(), 0, set);
        shared.cmd_draw(cmd, 3);
        orchestrator.end_render_pass(cmd);
        orchestrator.end_frame().unwrap();

        assert!(device
            .validation_errors()
            .iter()
            .any(|e| e.contains("layout mismatch")));
    }

    #[test]
    fn drop_releases_all_objects() {
        let (device, surface, mut orchestrator) = setup(3);
        for i in 0..5 {
            surface.resize(800 + i, 600);
            run_frame(&mut orchestrator);
        }
        drop(orchestrator);
        assert_eq!(device.live_semaphores(), 0);
        assert_eq!(device.live_fences(), 0);
        assert_eq!(device.live_framebuffers(), 0);
        assert_eq!(device.live_swapchains(), 0);
        assert_eq!(device.live_command_pools(), 0);
        assert!(device.validation_errors().is_empty());
    }
}
