//! Frame orchestration and GPU synchronization layer for the Vesper renderer.
//!
//! This crate provides:
//! - The [`GpuDevice`] seam with a Vulkan implementation (and an in-memory one
//!   behind the `headless` feature)
//! - Swap chain management with in-place recreation
//! - The frame orchestrator driving acquire, record, submit and present
//! - Descriptor layouts, pools and writers
//! - Per-frame uniform buffer rings and deferred resource destruction

pub mod capabilities;
pub mod command;
pub mod context;
pub mod deferred;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod frame;
#[cfg(any(test, feature = "headless"))]
pub mod headless;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod uniform;
pub mod vulkan;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::CommandPool;
pub use context::GpuContextBuilder;
pub use deferred::DeferredDestructionQueue;
pub use descriptors::{
    DescriptorBinding, DescriptorPool, DescriptorPoolConfig, DescriptorSetLayout,
    DescriptorSetLayoutConfig, DescriptorWriter,
};
pub use device::{DeviceLimits, GpuDevice, SharedDevice, WAIT_FOREVER};
pub use error::{GpuError, Result};
pub use frame::{FrameConfig, FrameOrchestrator, FrameState, MAX_FRAMES_IN_FLIGHT};
pub use memory::{BufferDesc, BufferRegion, GpuBuffer, GpuImage, MemoryLocation};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig, PipelineLayout};
pub use surface::{PresentationSurface, SurfaceCapabilities, SurfaceContext};
pub use swapchain::{AcquireStatus, PresentStatus, RecreateOutcome, SwapChain};
pub use sync::FrameSync;
pub use uniform::UniformBufferRing;
pub use vulkan::VulkanDevice;
