//! Vulkan instance creation and physical device selection.

use crate::capabilities::{api_at_least, device_local_memory_mb, MIN_API_VERSION};
use crate::error::{GpuError, Result};
use crate::surface::SurfaceContext;
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};

/// Standard validation layer.
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Create a Vulkan instance with the extensions `display` needs for presentation.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    display: RawDisplayHandle,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Vesper")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(MIN_API_VERSION);

    let mut extension_names = ash_window::enumerate_required_extensions(display)?.to_vec();
    #[cfg(target_os = "macos")]
    extension_names.push(ash::khr::portability_enumeration::NAME.as_ptr());

    let layers: Vec<&CStr> = if enable_validation {
        // SAFETY: caller guarantees the entry is valid
        let available = unsafe { entry.enumerate_instance_layer_properties()? };
        let found = available
            .iter()
            .any(|props| props.layer_name_as_c_str() == Ok(VALIDATION_LAYER));
        if found {
            vec![VALIDATION_LAYER]
        } else {
            tracing::warn!(
                "Validation layer {} not available",
                VALIDATION_LAYER.to_string_lossy()
            );
            vec![]
        }
    } else {
        vec![]
    };
    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    // SAFETY: every pointer in create_info outlives this call
    let instance = unsafe { entry.create_instance(&create_info, None)? };
    Ok(instance)
}

/// A physical device together with the queue family used for graphics and present.
#[derive(Clone, Copy, Debug)]
pub struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub queue_family: u32,
}

/// Select the best physical device that can render to `surface`.
///
/// # Safety
/// The instance must be valid and own `surface`.
pub unsafe fn select_physical_device(
    instance: &ash::Instance,
    surface: &SurfaceContext,
) -> Result<SelectedDevice> {
    // SAFETY: caller guarantees the instance is valid
    let devices = unsafe { instance.enumerate_physical_devices()? };

    let mut best: Option<(i32, SelectedDevice)> = None;
    for physical_device in devices {
        // SAFETY: physical_device was enumerated from instance
        let Some(queue_family) =
            (unsafe { find_queue_family(instance, physical_device, surface) })
        else {
            continue;
        };
        // SAFETY: as above
        let score = unsafe { score_physical_device(instance, physical_device) };
        if score < 0 {
            continue;
        }
        if best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((
                score,
                SelectedDevice {
                    physical_device,
                    queue_family,
                },
            ));
        }
    }

    best.map(|(_, device)| device)
        .ok_or(GpuError::NoSuitableDevice)
}

/// First queue family with graphics support that can present to `surface`.
unsafe fn find_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface: &SurfaceContext,
) -> Option<u32> {
    // SAFETY: caller guarantees handle validity
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    families
        .iter()
        .enumerate()
        .filter(|(_, family)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(i, _)| i as u32)
        .find(|&i| unsafe { surface.supports_present(physical_device, i) })
}

/// Score a physical device for selection. Negative means unusable.
unsafe fn score_physical_device(instance: &ash::Instance, device: vk::PhysicalDevice) -> i32 {
    // SAFETY: caller guarantees handle validity
    let (properties, memory) = unsafe {
        (
            instance.get_physical_device_properties(device),
            instance.get_physical_device_memory_properties(device),
        )
    };

    if !api_at_least(properties.api_version, MIN_API_VERSION) {
        return -1;
    }

    let mut score = match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 0,
    };
    // +1 per GB
    score += (device_local_memory_mb(&memory) / 1024) as i32;
    score
}
