//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
///
/// Every variant is fatal for the frame layer. Stale surfaces, timeouts and
/// zero-area windows are handled internally and never reach the caller.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader module creation failed.
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// Pipeline or pipeline layout creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Command buffer allocation or recording failed.
    #[error("Command recording failed: {0}")]
    CommandRecording(String),

    /// Descriptor pool has no room for another set.
    #[error("Descriptor pool exhausted: {0}")]
    DescriptorPoolExhausted(String),

    /// Descriptor layout declares the same binding twice.
    #[error("Duplicate descriptor binding {0}")]
    DuplicateBinding(u32),

    /// Descriptor write does not match the set's layout.
    #[error("Descriptor layout mismatch: {0}")]
    LayoutMismatch(String),

    /// Configuration rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
