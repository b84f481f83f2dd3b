//! GPU context creation.

use std::collections::HashMap;
use std::ffi::c_char;

use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, select_physical_device, SelectedDevice};
use crate::memory::GpuAllocator;
use crate::surface::SurfaceContext;
use crate::vulkan::VulkanDevice;

/// Builder for a [`VulkanDevice`] presenting to a window.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Vesper".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Create the instance, a surface for `window`, and a device that can present to it.
    ///
    /// The window must outlive the returned device.
    pub fn build_with_window<W>(self, window: &W) -> Result<VulkanDevice>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?
            .as_raw();

        let instance =
            unsafe { create_instance(&entry, &self.app_name, display, self.enable_validation) }?;

        let surface = match unsafe { SurfaceContext::from_window(&entry, &instance, window) } {
            Ok(surface) => surface,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };

        match unsafe { open_device(&instance, &surface) } {
            Ok(opened) => Ok(VulkanDevice {
                entry,
                instance,
                surface,
                physical_device: opened.selected.physical_device,
                device: opened.device,
                swapchain_loader: opened.swapchain_loader,
                queue: Mutex::new(opened.queue),
                queue_family: opened.selected.queue_family,
                capabilities: opened.capabilities,
                allocator: Mutex::new(opened.allocator),
                buffer_allocations: Mutex::new(HashMap::new()),
                image_allocations: Mutex::new(HashMap::new()),
            }),
            Err(e) => {
                unsafe {
                    surface.destroy();
                    instance.destroy_instance(None);
                }
                Err(e)
            }
        }
    }
}

struct OpenedDevice {
    selected: SelectedDevice,
    capabilities: GpuCapabilities,
    device: ash::Device,
    swapchain_loader: ash::khr::swapchain::Device,
    queue: vk::Queue,
    allocator: GpuAllocator,
}

/// Pick a physical device, create the logical device and its allocator.
///
/// # Safety
/// The instance must be valid and own `surface`.
unsafe fn open_device(instance: &ash::Instance, surface: &SurfaceContext) -> Result<OpenedDevice> {
    let selected = unsafe { select_physical_device(instance, surface) }?;
    let capabilities = unsafe { GpuCapabilities::query(instance, selected.physical_device) };
    if !capabilities.meets_requirements() {
        return Err(GpuError::NoSuitableDevice);
    }
    tracing::info!("Selected GPU: {}", capabilities.summary());

    let device = unsafe { create_device(instance, selected) }?;
    let queue = unsafe { device.get_device_queue(selected.queue_family, 0) };
    let swapchain_loader = ash::khr::swapchain::Device::new(instance, &device);

    let allocator = match unsafe { GpuAllocator::new(instance, &device, selected.physical_device) }
    {
        Ok(allocator) => allocator,
        Err(e) => {
            unsafe { device.destroy_device(None) };
            return Err(e);
        }
    };

    Ok(OpenedDevice {
        selected,
        capabilities,
        device,
        swapchain_loader,
        queue,
        allocator,
    })
}

/// Required device extensions.
fn required_device_extensions() -> Vec<*const c_char> {
    vec![
        ash::khr::swapchain::NAME.as_ptr(),
        #[cfg(target_os = "macos")]
        ash::khr::portability_subset::NAME.as_ptr(),
    ]
}

/// Create the logical device with one graphics/present queue.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(instance: &ash::Instance, selected: SelectedDevice) -> Result<ash::Device> {
    let queue_priority = 1.0_f32;
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(selected.queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority))];

    let extension_names = required_device_extensions();
    let features = vk::PhysicalDeviceFeatures::default();

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = unsafe { instance.create_device(selected.physical_device, &create_info, None) }
        .map_err(GpuError::from)?;
    Ok(device)
}
