//! Synchronization primitives.

use crate::device::{GpuDevice, SharedDevice};
use crate::error::Result;
use ash::vk;

/// Wait for a fence with a bounded timeout.
///
/// Returns `Ok(false)` if the timeout expired before the fence signaled.
pub fn wait_for_fence(device: &dyn GpuDevice, fence: vk::Fence, timeout_ns: u64) -> Result<bool> {
    device.wait_for_fences(&[fence], timeout_ns)
}

/// Synchronization resources of one frame slot.
///
/// Owns its semaphores and fence and releases them on drop. The fence is
/// created signaled so the first wait on a fresh slot returns immediately.
pub struct FrameSync {
    /// Semaphore signaled when the acquired image is available
    pub image_available: vk::Semaphore,
    /// Semaphore signaled when rendering is complete
    pub render_finished: vk::Semaphore,
    /// Fence signaled when the slot's submission completes
    pub in_flight: vk::Fence,
    device: SharedDevice,
}

impl FrameSync {
    /// Create frame synchronization resources.
    ///
    /// Anything created before a failure is released again.
    pub fn new(device: SharedDevice) -> Result<Self> {
        let image_available = device.create_semaphore()?;
        let render_finished = match device.create_semaphore() {
            Ok(s) => s,
            Err(e) => {
                device.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        let in_flight = match device.create_fence(true) {
            Ok(f) => f,
            Err(e) => {
                device.destroy_semaphore(image_available);
                device.destroy_semaphore(render_finished);
                return Err(e);
            }
        };

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
            device,
        })
    }

    /// Wait for this slot's previous submission, up to `timeout_ns`.
    pub fn wait(&self, timeout_ns: u64) -> Result<bool> {
        wait_for_fence(self.device.as_ref(), self.in_flight, timeout_ns)
    }

    /// Reset the fence ahead of the next submission.
    pub fn reset(&self) -> Result<()> {
        self.device.reset_fences(&[self.in_flight])
    }

    /// Swap in a fresh image-available semaphore.
    ///
    /// Used when an acquire signaled the current one but the image was
    /// abandoned, so no submission will ever wait on it. The device must be
    /// idle.
    pub fn replace_image_available(&mut self) -> Result<()> {
        let semaphore = self.device.create_semaphore()?;
        let old = std::mem::replace(&mut self.image_available, semaphore);
        self.device.destroy_semaphore(old);
        Ok(())
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.image_available);
        self.device.destroy_semaphore(self.render_finished);
        self.device.destroy_fence(self.in_flight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessDevice;
    use std::sync::Arc;

    #[test]
    fn fresh_slot_does_not_block() {
        let device = Arc::new(HeadlessDevice::new());
        let sync = FrameSync::new(device.clone()).unwrap();
        assert!(sync.wait(0).unwrap());
    }

    #[test]
    fn replacing_image_available_keeps_count() {
        let device = Arc::new(HeadlessDevice::new());
        let mut sync = FrameSync::new(device.clone()).unwrap();
        let old = sync.image_available;
        sync.replace_image_available().unwrap();
        assert_ne!(sync.image_available, old);
        assert_eq!(device.live_semaphores(), 2);
        drop(sync);
        assert_eq!(device.live_semaphores(), 0);
        assert!(device.validation_errors().is_empty());
    }

    #[test]
    fn drop_releases_primitives() {
        let device = Arc::new(HeadlessDevice::new());
        {
            let _sync = FrameSync::new(device.clone()).unwrap();
            assert_eq!(device.live_semaphores(), 2);
            assert_eq!(device.live_fences(), 1);
        }
        assert_eq!(device.live_semaphores(), 0);
        assert_eq!(device.live_fences(), 0);
        assert!(device.validation_errors().is_empty());
    }
}
