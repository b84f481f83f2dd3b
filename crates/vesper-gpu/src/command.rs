//! Command buffer management.

use crate::device::SharedDevice;
use crate::error::{GpuError, Result};
use ash::vk;

/// Command pool for the graphics queue family.
///
/// Buffers allocated from the pool can be reset individually and are freed
/// together with the pool on drop.
pub struct CommandPool {
    pool: vk::CommandPool,
    device: SharedDevice,
}

impl CommandPool {
    /// Create a new command pool.
    pub fn new(device: SharedDevice) -> Result<Self> {
        let pool = device
            .create_command_pool()
            .map_err(|e| GpuError::CommandRecording(format!("Failed to create command pool: {e}")))?;
        Ok(Self { pool, device })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Allocate `count` primary command buffers.
    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        self.device
            .allocate_command_buffers(self.pool, count)
            .map_err(|e| {
                GpuError::CommandRecording(format!("Failed to allocate command buffers: {e}"))
            })
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.pool);
    }
}

/// Begin recording a command buffer.
pub fn begin_command_buffer(device: &SharedDevice, cmd: vk::CommandBuffer) -> Result<()> {
    device
        .begin_command_buffer(cmd)
        .map_err(|e| GpuError::CommandRecording(format!("Failed to begin command buffer: {e}")))
}

/// End recording a command buffer.
pub fn end_command_buffer(device: &SharedDevice, cmd: vk::CommandBuffer) -> Result<()> {
    device
        .end_command_buffer(cmd)
        .map_err(|e| GpuError::CommandRecording(format!("Failed to end command buffer: {e}")))
}
