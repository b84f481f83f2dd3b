//! GPU memory management.

use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
pub use gpu_allocator::MemoryLocation;

/// Buffer creation parameters.
#[derive(Clone, Copy, Debug)]
pub struct BufferDesc<'a> {
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
    pub name: &'a str,
}

/// A range of a buffer, as bound to a descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferRegion {
    pub buffer: vk::Buffer,
    pub offset: u64,
    pub range: u64,
}

/// A GPU buffer. The backing memory is owned by the device that created it.
#[derive(Debug)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub size: u64,
    /// Whether the buffer is persistently mapped for host writes.
    pub mapped: bool,
    /// Whether host writes become visible without an explicit flush.
    pub host_coherent: bool,
}

impl GpuBuffer {
    /// Region covering the whole buffer.
    pub fn region(&self) -> BufferRegion {
        BufferRegion {
            buffer: self.buffer,
            offset: 0,
            range: self.size,
        }
    }

    /// Check that `[offset, offset + len)` lies inside the buffer.
    pub fn check_range(&self, offset: u64, len: u64) -> Result<()> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| GpuError::InvalidState("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::InvalidState(
                "Data range too large for buffer".to_string(),
            ));
        }
        Ok(())
    }
}

/// A GPU image. The backing memory is owned by the device that created it.
#[derive(Debug)]
pub struct GpuImage {
    pub image: vk::Image,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

/// GPU memory allocator wrapper used by the Vulkan device.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: ash::Device,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
            device: device.clone(),
        })
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator not initialized".to_string()))
    }

    /// Create a buffer and bind freshly allocated memory to it.
    ///
    /// The buffer is destroyed again if allocation or binding fails.
    pub fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<(vk::Buffer, Allocation)> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        // SAFETY: device is valid for the allocator's lifetime
        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = match self.inner().and_then(|allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: desc.name,
                    requirements,
                    location: desc.location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.free_buffer(buffer, allocation)?;
            return Err(e.into());
        }

        Ok((buffer, allocation))
    }

    /// Free a buffer and its allocation.
    pub fn free_buffer(&mut self, buffer: vk::Buffer, allocation: Allocation) -> Result<()> {
        let freed = self
            .inner()
            .and_then(|a| {
                a.free(allocation)
                    .map_err(|e| GpuError::AllocationFailed(e.to_string()))
            });
        unsafe { self.device.destroy_buffer(buffer, None) };
        freed
    }

    /// Create an image and bind freshly allocated device-local memory to it.
    pub fn create_image(
        &mut self,
        create_info: &vk::ImageCreateInfo,
        name: &str,
    ) -> Result<(vk::Image, Allocation)> {
        let image = unsafe { self.device.create_image(create_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match self.inner().and_then(|allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.free_image(image, allocation)?;
            return Err(e.into());
        }

        Ok((image, allocation))
    }

    /// Free an image and its allocation.
    pub fn free_image(&mut self, image: vk::Image, allocation: Allocation) -> Result<()> {
        let freed = self
            .inner()
            .and_then(|a| {
                a.free(allocation)
                    .map_err(|e| GpuError::AllocationFailed(e.to_string()))
            });
        unsafe { self.device.destroy_image(image, None) };
        freed
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    /// Any remaining allocations will be freed (and logged as leaks).
    pub fn shutdown(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            drop(allocator);
        }
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
