//! Swapchain management.
//!
//! [`SwapChain`] owns the presentable images together with everything that is
//! sized by them: color views, depth attachments, framebuffers and the render
//! pass. Each image remembers the in-flight fence of the frame slot that last
//! acquired it, so a slot never records into an image another slot is still
//! rendering to.

use std::time::Duration;

use crate::device::{RenderPassDesc, SharedDevice, SubmitDesc, SwapchainDesc, WAIT_FOREVER};
use crate::error::{GpuError, Result};
use crate::memory::GpuImage;
use crate::sync::FrameSync;
use ash::vk;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Result of acquiring a presentable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireStatus {
    Success,
    /// Usable, but the swapchain no longer matches the surface exactly.
    Suboptimal,
    /// No image was acquired; the swapchain must be recreated.
    OutOfDate,
}

/// Result of presenting an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Success,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    /// Whether the swapchain should be recreated.
    pub fn is_stale(self) -> bool {
        !matches!(self, Self::Success)
    }
}

/// Result of [`SwapChain::recreate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecreateOutcome {
    Recreated {
        /// Color or depth format changed, so pipelines built against the old
        /// render pass must be rebuilt.
        render_pass_changed: bool,
    },
    /// The surface has zero area. Nothing was touched.
    Deferred,
}

/// One swapchain image and the attachments rendered into it.
struct PresentableImage {
    image: vk::Image,
    view: vk::ImageView,
    depth: Option<GpuImage>,
    depth_view: vk::ImageView,
    framebuffer: vk::Framebuffer,
    /// In-flight fence of the slot that last acquired this image.
    guard: vk::Fence,
}

impl PresentableImage {
    fn new(
        device: &SharedDevice,
        image: vk::Image,
        formats: (vk::Format, vk::Format),
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
    ) -> Result<Self> {
        let mut this = Self {
            image,
            view: vk::ImageView::null(),
            depth: None,
            depth_view: vk::ImageView::null(),
            framebuffer: vk::Framebuffer::null(),
            guard: vk::Fence::null(),
        };
        if let Err(e) = this.build(device, formats, extent, render_pass) {
            this.destroy(device);
            return Err(e);
        }
        Ok(this)
    }

    fn build(
        &mut self,
        device: &SharedDevice,
        (color_format, depth_format): (vk::Format, vk::Format),
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
    ) -> Result<()> {
        self.view = device.create_image_view(self.image, color_format, vk::ImageAspectFlags::COLOR)?;
        let depth = self.depth.insert(device.create_attachment_image(
            extent,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )?);
        self.depth_view =
            device.create_image_view(depth.image, depth_format, vk::ImageAspectFlags::DEPTH)?;
        self.framebuffer =
            device.create_framebuffer(render_pass, &[self.view, self.depth_view], extent)?;
        Ok(())
    }

    fn destroy(&mut self, device: &SharedDevice) {
        if self.framebuffer != vk::Framebuffer::null() {
            device.destroy_framebuffer(self.framebuffer);
        }
        if self.depth_view != vk::ImageView::null() {
            device.destroy_image_view(self.depth_view);
        }
        if let Some(mut depth) = self.depth.take() {
            device.destroy_image(&mut depth);
        }
        if self.view != vk::ImageView::null() {
            device.destroy_image_view(self.view);
        }
    }
}

/// Presentable image chain for one surface.
pub struct SwapChain {
    swapchain: vk::SwapchainKHR,
    images: Vec<PresentableImage>,
    render_pass: vk::RenderPass,
    surface_format: vk::SurfaceFormatKHR,
    depth_format: vk::Format,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    vsync: bool,
    timeout_ns: u64,
    device: SharedDevice,
}

impl SwapChain {
    /// Create a swapchain for a surface of `extent` window pixels.
    ///
    /// A zero-area surface yields a chain with a render pass but no images;
    /// [`SwapChain::recreate`] builds them once the surface has area again.
    pub fn new(
        device: SharedDevice,
        extent: vk::Extent2D,
        vsync: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let depth_format = device.find_depth_format(&DEPTH_FORMAT_CANDIDATES)?;
        let Some(chain) = Chain::create(&device, extent, vsync, vk::SwapchainKHR::null())? else {
            return Self::without_images(device, depth_format, vsync, timeout);
        };

        let render_pass = match device.create_render_pass(&RenderPassDesc {
            color_format: chain.surface_format.format,
            depth_format,
        }) {
            Ok(render_pass) => render_pass,
            Err(e) => {
                device.destroy_swapchain(chain.swapchain);
                return Err(e);
            }
        };
        let images = match create_images(&device, &chain, depth_format, render_pass) {
            Ok(images) => images,
            Err(e) => {
                device.destroy_render_pass(render_pass);
                device.destroy_swapchain(chain.swapchain);
                return Err(e);
            }
        };

        tracing::info!(
            "Swapchain created: {}x{} ({} images, {:?})",
            chain.extent.width,
            chain.extent.height,
            images.len(),
            chain.present_mode
        );

        Ok(Self {
            swapchain: chain.swapchain,
            images,
            render_pass,
            surface_format: chain.surface_format,
            depth_format,
            present_mode: chain.present_mode,
            extent: chain.extent,
            vsync,
            timeout_ns: duration_to_ns(timeout),
            device,
        })
    }

    /// Render pass only, for a surface that starts out minimized.
    fn without_images(
        device: SharedDevice,
        depth_format: vk::Format,
        vsync: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let caps = device.surface_capabilities()?;
        let surface_format = caps.recommended_format()?;
        let render_pass = device.create_render_pass(&RenderPassDesc {
            color_format: surface_format.format,
            depth_format,
        })?;
        tracing::debug!("Swapchain creation deferred: surface has zero area");

        Ok(Self {
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            render_pass,
            surface_format,
            depth_format,
            present_mode: caps.recommended_present_mode(vsync),
            extent: vk::Extent2D::default(),
            vsync,
            timeout_ns: duration_to_ns(timeout),
            device,
        })
    }

    /// Wait for the slot's fence, acquire an image, then wait for any other
    /// slot still rendering into that image.
    ///
    /// A timeout on any of the three waits reports `OutOfDate`. If the image
    /// had already been acquired it is abandoned: the device is drained and
    /// the slot gets a fresh image-available semaphore, since the old one
    /// stays signaled with nothing to consume it.
    pub fn acquire_next_image(&mut self, sync: &mut FrameSync) -> Result<(u32, AcquireStatus)> {
        if !sync.wait(self.timeout_ns)? {
            tracing::warn!("Timed out waiting for frame fence");
            return Ok((0, AcquireStatus::OutOfDate));
        }

        let (index, suboptimal) = match self.device.acquire_next_image(
            self.swapchain,
            self.timeout_ns,
            sync.image_available,
        ) {
            Ok(acquired) => acquired,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Ok((0, AcquireStatus::OutOfDate)),
            Err(code @ (vk::Result::TIMEOUT | vk::Result::NOT_READY)) => {
                tracing::warn!(?code, "Swapchain image acquire did not complete");
                return Ok((0, AcquireStatus::OutOfDate));
            }
            Err(e) => return Err(e.into()),
        };

        let image = self.images.get_mut(index as usize).ok_or_else(|| {
            GpuError::InvalidState(format!("Acquired image index {index} out of range"))
        })?;
        if image.guard != vk::Fence::null()
            && image.guard != sync.in_flight
            && !self
                .device
                .wait_for_fences(&[image.guard], self.timeout_ns)?
        {
            tracing::warn!(
                index,
                "Timed out waiting for the frame rendering into the acquired image"
            );
            self.device.wait_idle()?;
            sync.replace_image_available()?;
            return Ok((index, AcquireStatus::OutOfDate));
        }
        image.guard = sync.in_flight;

        let status = if suboptimal {
            AcquireStatus::Suboptimal
        } else {
            AcquireStatus::Success
        };
        Ok((index, status))
    }

    /// Submit `cmd` for the slot owning `sync` and present `image_index`.
    pub fn submit_and_present(
        &mut self,
        cmd: vk::CommandBuffer,
        sync: &FrameSync,
        image_index: u32,
    ) -> Result<PresentStatus> {
        sync.reset()?;
        self.device.queue_submit(&SubmitDesc {
            command_buffer: cmd,
            wait_semaphore: sync.image_available,
            wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal_semaphore: sync.render_finished,
            fence: sync.in_flight,
        })?;

        match self
            .device
            .queue_present(self.swapchain, image_index, sync.render_finished)
        {
            Ok(false) => Ok(PresentStatus::Success),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Rebuild the chain for `new_extent`.
    ///
    /// Waits without a timeout for every fence in `in_flight_fences` and
    /// every image guard first. The render pass survives unless the color or
    /// depth format changed.
    pub fn recreate(
        &mut self,
        new_extent: vk::Extent2D,
        in_flight_fences: &[vk::Fence],
    ) -> Result<RecreateOutcome> {
        if new_extent.width == 0 || new_extent.height == 0 {
            tracing::debug!("Swapchain recreation deferred: surface has zero area");
            return Ok(RecreateOutcome::Deferred);
        }

        let mut fences: Vec<vk::Fence> = in_flight_fences.to_vec();
        fences.extend(
            self.images
                .iter()
                .map(|i| i.guard)
                .filter(|&f| f != vk::Fence::null() && !in_flight_fences.contains(&f)),
        );
        if !fences.is_empty() && !self.device.wait_for_fences(&fences, WAIT_FOREVER)? {
            return Err(GpuError::Vulkan(vk::Result::TIMEOUT));
        }

        let Some(chain) = Chain::create(&self.device, new_extent, self.vsync, self.swapchain)?
        else {
            tracing::debug!("Swapchain recreation deferred: surface reports zero area");
            return Ok(RecreateOutcome::Deferred);
        };

        let depth_format = match self.device.find_depth_format(&DEPTH_FORMAT_CANDIDATES) {
            Ok(format) => format,
            Err(e) => {
                self.device.destroy_swapchain(chain.swapchain);
                return Err(e);
            }
        };
        let render_pass_changed = chain.surface_format.format != self.surface_format.format
            || depth_format != self.depth_format;
        let render_pass = if render_pass_changed {
            match self.device.create_render_pass(&RenderPassDesc {
                color_format: chain.surface_format.format,
                depth_format,
            }) {
                Ok(render_pass) => render_pass,
                Err(e) => {
                    self.device.destroy_swapchain(chain.swapchain);
                    return Err(e);
                }
            }
        } else {
            self.render_pass
        };

        let images = match create_images(&self.device, &chain, depth_format, render_pass) {
            Ok(images) => images,
            Err(e) => {
                if render_pass_changed {
                    self.device.destroy_render_pass(render_pass);
                }
                self.device.destroy_swapchain(chain.swapchain);
                return Err(e);
            }
        };

        // Old resources go only after the replacement chain exists.
        self.destroy_images();
        if render_pass_changed {
            self.device.destroy_render_pass(self.render_pass);
        }
        if self.swapchain != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(self.swapchain);
        }

        self.swapchain = chain.swapchain;
        self.images = images;
        self.render_pass = render_pass;
        self.surface_format = chain.surface_format;
        self.depth_format = depth_format;
        self.present_mode = chain.present_mode;
        self.extent = chain.extent;

        tracing::info!(
            "Swapchain recreated: {}x{} ({} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );

        Ok(RecreateOutcome::Recreated {
            render_pass_changed,
        })
    }

    /// Get the raw swapchain handle.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Render pass compatible with every framebuffer of the chain.
    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Current image extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Width divided by height, or 1 while the chain has no images.
    pub fn aspect_ratio(&self) -> f32 {
        if self.extent.height == 0 {
            return 1.0;
        }
        self.extent.width as f32 / self.extent.height as f32
    }

    /// Number of presentable images.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Whether images exist, which is false only until the first
    /// recreation of a chain created on a zero-area surface.
    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }

    /// Color format of the presentable images.
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    /// Format of the depth attachments.
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Present mode in use.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Framebuffer for `image_index`.
    pub fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.images[image_index as usize].framebuffer
    }

    /// The raw presentable image at `image_index`.
    pub fn image(&self, image_index: u32) -> vk::Image {
        self.images[image_index as usize].image
    }

    /// The fence currently guarding `image_index`, or null.
    pub fn guard_fence(&self, image_index: u32) -> vk::Fence {
        self.images[image_index as usize].guard
    }

    fn destroy_images(&mut self) {
        for mut image in self.images.drain(..) {
            image.destroy(&self.device);
        }
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        self.destroy_images();
        self.device.destroy_render_pass(self.render_pass);
        if self.swapchain != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(self.swapchain);
        }
    }
}

/// A freshly created swapchain before its attachments exist.
struct Chain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl Chain {
    /// Returns `None` when the surface resolves to zero area.
    fn create(
        device: &SharedDevice,
        window_extent: vk::Extent2D,
        vsync: bool,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Option<Self>> {
        let caps = device.surface_capabilities()?;
        let extent = calculate_extent(
            &caps.capabilities,
            window_extent.width,
            window_extent.height,
        );
        if extent.width == 0 || extent.height == 0 {
            return Ok(None);
        }

        let surface_format = caps.recommended_format()?;
        let present_mode = caps.recommended_present_mode(vsync);
        let swapchain = device
            .create_swapchain(&SwapchainDesc {
                surface_format,
                present_mode,
                extent,
                image_count: choose_image_count(&caps.capabilities),
                pre_transform: caps.capabilities.current_transform,
                old_swapchain,
            })
            .map_err(|e| match e {
                GpuError::Vulkan(code) => GpuError::SwapchainCreation(code.to_string()),
                other => other,
            })?;

        let images = match device.swapchain_images(swapchain) {
            Ok(images) => images,
            Err(e) => {
                device.destroy_swapchain(swapchain);
                return Err(e);
            }
        };

        Ok(Some(Self {
            swapchain,
            images,
            surface_format,
            present_mode,
            extent,
        }))
    }
}

fn create_images(
    device: &SharedDevice,
    chain: &Chain,
    depth_format: vk::Format,
    render_pass: vk::RenderPass,
) -> Result<Vec<PresentableImage>> {
    let mut images: Vec<PresentableImage> = Vec::with_capacity(chain.images.len());
    for &image in &chain.images {
        match PresentableImage::new(
            device,
            image,
            (chain.surface_format.format, depth_format),
            chain.extent,
            render_pass,
        ) {
            Ok(presentable) => images.push(presentable),
            Err(e) => {
                for mut built in images {
                    built.destroy(device);
                }
                return Err(e);
            }
        }
    }
    Ok(images)
}

fn duration_to_ns(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

/// Select the best surface format.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    // Prefer SRGB
    if let Some(format) = available.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_SRGB && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    }) {
        return Ok(*format);
    }

    available
        .first()
        .copied()
        .ok_or_else(|| GpuError::SwapchainCreation("Surface reports no formats".to_string()))
}

/// Select the best present mode.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        // FIFO is always supported
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else if desired_width == 0 || desired_height == 0 {
        vk::Extent2D {
            width: 0,
            height: 0,
        }
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One more than the minimum, clamped to the maximum when there is one.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use std::sync::Arc;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: extent(1, 1),
            max_image_extent: extent(4096, 4096),
            ..Default::default()
        }
    }

    fn swapchain(device: &Arc<HeadlessDevice>) -> SwapChain {
        SwapChain::new(device.clone(), extent(800, 600), true, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn surface_format_prefers_srgb() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(
            select_surface_format(&[unorm, srgb]).unwrap().format,
            vk::Format::B8G8R8A8_SRGB
        );
        assert_eq!(
            select_surface_format(&[unorm]).unwrap().format,
            vk::Format::B8G8R8A8_UNORM
        );
        assert!(select_surface_format(&[]).is_err());
    }

    #[test]
    fn present_mode_selection() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(select_present_mode(&all, true), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            select_present_mode(&all[..2], false),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_clamped_to_surface_limits() {
        let c = caps(2, 0);
        let e = calculate_extent(&c, 8000, 0);
        assert_eq!((e.width, e.height), (0, 0));
        let e = calculate_extent(&c, 8000, 300);
        assert_eq!((e.width, e.height), (4096, 300));

        let fixed = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(640, 480),
            ..c
        };
        let e = calculate_extent(&fixed, 8000, 300);
        assert_eq!((e.width, e.height), (640, 480));
    }

    #[test]
    fn image_count_is_min_plus_one_clamped() {
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
        assert_eq!(choose_image_count(&caps(3, 3)), 3);
    }

    #[test]
    fn creates_one_framebuffer_per_image() {
        let device = Arc::new(HeadlessDevice::new().with_image_count(2, 0));
        let chain = swapchain(&device);
        assert_eq!(chain.image_count(), 3);
        assert_eq!(device.live_framebuffers(), 3);
        assert_eq!(chain.format(), vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chain.depth_format(), vk::Format::D32_SFLOAT);
        approx::assert_relative_eq!(chain.aspect_ratio(), 800.0 / 600.0);
    }

    #[test]
    fn zero_area_recreation_is_deferred() {
        let device = Arc::new(HeadlessDevice::new());
        let mut chain = swapchain(&device);
        let handle = chain.handle();
        let created = device.swapchains_created();

        let outcome = chain.recreate(extent(0, 600), &[]).unwrap();
        assert_eq!(outcome, RecreateOutcome::Deferred);
        assert_eq!(chain.handle(), handle);
        assert_eq!(device.swapchains_created(), created);
    }

    #[test]
    fn minimized_surface_builds_render_pass_only() {
        let device = Arc::new(HeadlessDevice::new());
        device.set_current_extent(Some(extent(0, 0)));
        let mut chain = swapchain(&device);
        assert!(!chain.has_images());
        assert_eq!(chain.handle(), vk::SwapchainKHR::null());
        assert_ne!(chain.render_pass(), vk::RenderPass::null());
        assert_eq!(device.live_swapchains(), 0);
        approx::assert_relative_eq!(chain.aspect_ratio(), 1.0);

        device.set_current_extent(Some(extent(800, 600)));
        let render_pass = chain.render_pass();
        let outcome = chain.recreate(extent(800, 600), &[]).unwrap();
        assert_eq!(
            outcome,
            RecreateOutcome::Recreated {
                render_pass_changed: false
            }
        );
        assert!(chain.has_images());
        assert_eq!(chain.render_pass(), render_pass);
        assert_eq!(device.last_old_swapchain(), vk::SwapchainKHR::null());
        assert_eq!(device.live_framebuffers(), chain.image_count());

        drop(chain);
        assert_eq!(device.live_swapchains(), 0);
        assert_eq!(device.live_render_passes(), 0);
        assert!(device.validation_errors().is_empty());
    }

    #[test]
    fn recreate_reuses_render_pass_and_passes_old_chain() {
        let device = Arc::new(HeadlessDevice::new());
        let mut chain = swapchain(&device);
        let old = chain.handle();
        let render_pass = chain.render_pass();

        let outcome = chain.recreate(extent(1024, 768), &[]).unwrap();
        assert_eq!(
            outcome,
            RecreateOutcome::Recreated {
                render_pass_changed: false
            }
        );
        assert_eq!(chain.render_pass(), render_pass);
        assert_eq!(device.last_old_swapchain(), old);
        assert_eq!(chain.extent().width, 1024);
        assert_eq!(device.live_swapchains(), 1);
        assert_eq!(device.live_framebuffers(), chain.image_count());
    }

    #[test]
    fn format_change_rebuilds_render_pass() {
        let device = Arc::new(HeadlessDevice::new());
        let mut chain = swapchain(&device);
        let render_pass = chain.render_pass();

        device.set_surface_formats(vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }]);
        let outcome = chain.recreate(extent(800, 600), &[]).unwrap();
        assert_eq!(
            outcome,
            RecreateOutcome::Recreated {
                render_pass_changed: true
            }
        );
        assert_ne!(chain.render_pass(), render_pass);
        assert_eq!(device.live_render_passes(), 1);
    }

    #[test]
    fn drop_releases_everything() {
        let device = Arc::new(HeadlessDevice::new());
        {
            let mut chain = swapchain(&device);
            chain.recreate(extent(640, 480), &[]).unwrap();
        }
        assert_eq!(device.live_swapchains(), 0);
        assert_eq!(device.live_framebuffers(), 0);
        assert_eq!(device.live_image_views(), 0);
        assert_eq!(device.live_images(), 0);
        assert_eq!(device.live_render_passes(), 0);
        assert!(device.validation_errors().is_empty());
    }
}
