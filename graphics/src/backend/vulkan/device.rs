//! Vulkan physical and logical device management.

use ash::vk;

use crate::backend::QueueIndices;
use crate::error::GraphicsError;

/// Select the best physical device for rendering.
///
/// Prefers discrete GPUs over integrated GPUs. Devices without a graphics
/// queue are skipped.
pub fn select_physical_device(
    instance: &ash::Instance,
) -> Result<vk::PhysicalDevice, GraphicsError> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        GraphicsError::InitializationFailed(format!(
            "Failed to enumerate physical devices: {:?}",
            e
        ))
    })?;

    if devices.is_empty() {
        return Err(GraphicsError::InitializationFailed(
            "No Vulkan-capable GPU found".to_string(),
        ));
    }

    let mut best_device = None;
    let mut best_score = 0;

    for device in devices {
        if find_queue_families(instance, device).is_err() {
            continue;
        }

        let properties = unsafe { instance.get_physical_device_properties(device) };

        // Never zero, so any usable device beats "none"
        let mut score = 1;
        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 1000;
        } else if properties.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU {
            score += 100;
        }
        score += properties.limits.max_image_dimension2_d / 1024;

        log::info!(
            "Found GPU: {:?} (type: {:?}, score: {})",
            properties.device_name_as_c_str().unwrap_or(c"<unnamed>"),
            properties.device_type,
            score
        );

        if score > best_score {
            best_score = score;
            best_device = Some(device);
        }
    }

    best_device
        .ok_or_else(|| GraphicsError::InitializationFailed("No suitable GPU found".to_string()))
}

/// Pick the queue families the backend submits to.
///
/// The copy family is a transfer-only family when the device has one, and
/// the compute family a compute family without graphics; both fall back to
/// the graphics family.
pub fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<QueueIndices, GraphicsError> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let find = |wanted: vk::QueueFlags, unwanted: vk::QueueFlags| {
        families
            .iter()
            .position(|family| {
                family.queue_count > 0
                    && family.queue_flags.contains(wanted)
                    && !family.queue_flags.intersects(unwanted)
            })
            .map(|index| index as u32)
    };

    let graphics = find(vk::QueueFlags::GRAPHICS, vk::QueueFlags::empty()).ok_or_else(|| {
        GraphicsError::InitializationFailed("No graphics queue family found".to_string())
    })?;
    let copy = find(
        vk::QueueFlags::TRANSFER,
        vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
    )
    .unwrap_or(graphics);
    let compute = find(vk::QueueFlags::COMPUTE, vk::QueueFlags::GRAPHICS).unwrap_or(graphics);

    Ok(QueueIndices {
        graphics,
        copy,
        compute,
    })
}

/// Create a logical device with one queue per distinct family.
///
/// Tessellation and geometry shaders are enabled when the device supports
/// them; pipelines that use them fail to build otherwise.
pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queues: QueueIndices,
    enable_swapchain: bool,
) -> Result<ash::Device, GraphicsError> {
    let mut families = vec![queues.graphics, queues.copy, queues.compute];
    families.sort_unstable();
    families.dedup();

    let queue_priorities = [1.0f32];
    let queue_create_infos: Vec<_> = families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&queue_priorities)
        })
        .collect();

    let mut device_extensions = Vec::new();
    if enable_swapchain {
        device_extensions.push(ash::khr::swapchain::NAME.as_ptr());
    }
    #[cfg(target_os = "macos")]
    {
        device_extensions.push(ash::khr::portability_subset::NAME.as_ptr());
    }

    let supported = unsafe { instance.get_physical_device_features(physical_device) };
    let features = vk::PhysicalDeviceFeatures::default()
        .tessellation_shader(supported.tessellation_shader == vk::TRUE)
        .geometry_shader(supported.geometry_shader == vk::TRUE);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&device_extensions)
        .enabled_features(&features);

    unsafe { instance.create_device(physical_device, &create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create logical device: {:?}", e))
    })
}
