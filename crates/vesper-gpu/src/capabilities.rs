//! GPU capability detection.

use ash::vk;
use std::ffi::CStr;

use crate::device::DeviceLimits;

/// Lowest Vulkan version the renderer runs on.
pub const MIN_API_VERSION: u32 = vk::API_VERSION_1_2;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub driver_version: u32,
    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Limits the frame layer depends on.
    pub limits: DeviceLimits,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        // SAFETY: caller guarantees handle validity
        let (properties, memory_properties) = unsafe {
            (
                instance.get_physical_device_properties(physical_device),
                instance.get_physical_device_memory_properties(physical_device),
            )
        };

        let device_name = properties
            .device_name_as_c_str()
            .map(CStr::to_string_lossy)
            .map(|name| name.into_owned())
            .unwrap_or_else(|_| "Unknown device".to_string());

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            device_type: properties.device_type,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            device_local_memory_mb: device_local_memory_mb(&memory_properties),
            limits: DeviceLimits {
                min_uniform_buffer_offset_alignment: properties
                    .limits
                    .min_uniform_buffer_offset_alignment,
                non_coherent_atom_size: properties.limits.non_coherent_atom_size,
            },
        }
    }

    /// Check if the GPU meets minimum requirements for the renderer.
    pub fn meets_requirements(&self) -> bool {
        api_at_least(self.api_version, MIN_API_VERSION)
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

/// Sum of all device-local heaps in MB.
pub(crate) fn device_local_memory_mb(memory: &vk::PhysicalDeviceMemoryProperties) -> u64 {
    memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size / (1024 * 1024))
        .sum()
}

/// Whether `version` is at least `required`, ignoring the patch level.
pub(crate) fn api_at_least(version: u32, required: u32) -> bool {
    let have = (vk::api_version_major(version), vk::api_version_minor(version));
    let need = (vk::api_version_major(required), vk::api_version_minor(required));
    have >= need
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn api_version_comparison() {
        assert!(api_at_least(vk::API_VERSION_1_3, MIN_API_VERSION));
        assert!(api_at_least(vk::make_api_version(0, 1, 2, 190), MIN_API_VERSION));
        assert!(!api_at_least(vk::API_VERSION_1_1, MIN_API_VERSION));
        assert!(api_at_least(vk::make_api_version(0, 2, 0, 0), vk::API_VERSION_1_3));
    }

    #[test]
    fn heap_sum_counts_device_local_only() {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: 2,
            ..Default::default()
        };
        memory.memory_heaps[0] = vk::MemoryHeap {
            size: 4096 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        memory.memory_heaps[1] = vk::MemoryHeap {
            size: 8192 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::empty(),
        };
        assert_eq!(device_local_memory_mb(&memory), 4096);
    }
}
