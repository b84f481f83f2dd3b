//! Window-backed presentation surface.

use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;
use parking_lot::Mutex;
use vesper_gpu::PresentationSurface;

/// Tracks the window's drawable size for the frame orchestrator.
///
/// The event loop calls [`WindowSurface::resize`] on every resize event; the
/// orchestrator polls the flag once per frame and rebuilds the swap chain.
pub struct WindowSurface {
    extent: Mutex<vk::Extent2D>,
    resized: AtomicBool,
}

impl WindowSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            extent: Mutex::new(vk::Extent2D { width, height }),
            resized: AtomicBool::new(false),
        }
    }

    /// Record a new drawable size. A zero dimension means minimized.
    pub fn resize(&self, width: u32, height: u32) {
        let mut extent = self.extent.lock();
        if extent.width == width && extent.height == height {
            return;
        }
        *extent = vk::Extent2D { width, height };
        self.resized.store(true, Ordering::Release);
    }
}

impl PresentationSurface for WindowSurface {
    fn extent(&self) -> vk::Extent2D {
        *self.extent.lock()
    }

    fn take_resized(&self) -> bool {
        self.resized.swap(false, Ordering::AcqRel)
    }
}
