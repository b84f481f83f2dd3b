//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use vesper_gpu::{FrameOrchestrator, SharedDevice, VulkanDevice};
use winit::window::Window;

use crate::surface::WindowSurface;

/// Application context shared across all app methods.
///
/// Field order is drop order: the orchestrator goes first, the window last,
/// since the device's surface refers to the window.
pub struct AppContext {
    /// Frame orchestrator driving the swap chain.
    pub frames: FrameOrchestrator,
    /// Vulkan device, for capability queries.
    pub gpu: Arc<VulkanDevice>,
    /// The same device behind the `GpuDevice` seam.
    pub device: SharedDevice,
    pub(crate) surface: Arc<WindowSurface>,
    /// Time of last frame (for delta time calculation).
    pub(crate) last_frame_time: Instant,
    /// The window handle.
    pub window: Arc<Window>,
}

impl AppContext {
    pub(crate) fn new(
        window: Arc<Window>,
        gpu: Arc<VulkanDevice>,
        surface: Arc<WindowSurface>,
        frames: FrameOrchestrator,
    ) -> Self {
        let device: SharedDevice = gpu.clone();
        Self {
            frames,
            gpu,
            device,
            surface,
            last_frame_time: Instant::now(),
            window,
        }
    }

    /// Get the current swap chain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.frames.extent()
    }

    /// Get the aspect ratio (width / height) of the swap chain.
    pub fn aspect_ratio(&self) -> f32 {
        self.frames.aspect_ratio()
    }

    /// Get the number of frames in flight.
    pub fn frames_in_flight(&self) -> usize {
        self.frames.frames_in_flight()
    }

    /// Total frames submitted.
    pub fn frame_count(&self) -> u64 {
        self.frames.frame_count()
    }
}
