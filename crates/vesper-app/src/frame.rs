//! Per-frame information handed to the application.

use ash::vk;

/// The frame being recorded.
#[derive(Clone, Copy, Debug)]
pub struct FrameInfo {
    /// Command buffer with the swap chain render pass open.
    pub command_buffer: vk::CommandBuffer,
    /// Frame slot, in `[0, frames_in_flight)`.
    pub frame_index: usize,
    /// Delta time since last frame in seconds.
    pub dt: f32,
    /// Number of frames submitted before this one.
    pub frame_number: u64,
}
