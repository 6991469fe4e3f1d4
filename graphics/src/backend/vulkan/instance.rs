//! Vulkan instance creation and configuration.

use std::ffi::{CStr, c_char};

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::error::GraphicsError;

use super::debug;

/// Render passes and pipelines are created through core 1.0 entry points;
/// 1.2 is requested so MoltenVK is covered too.
const REQUIRED_API_VERSION: u32 = vk::make_api_version(0, 1, 2, 0);

/// Validation layer name.
const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Debug messenger and the extension loader that owns it.
pub struct DebugMessenger {
    pub loader: ash::ext::debug_utils::Instance,
    pub messenger: vk::DebugUtilsMessengerEXT,
}

/// Create a Vulkan instance.
///
/// When `display` is given, the surface extensions it needs are enabled so
/// a swapchain can later be created for a window on that display.
pub fn create_instance(
    entry: &ash::Entry,
    validation_enabled: bool,
    display: Option<RawDisplayHandle>,
) -> Result<(ash::Instance, Option<DebugMessenger>), GraphicsError> {
    let validation_available = validation_enabled && check_validation_layer_support(entry);

    if validation_enabled && !validation_available {
        log::warn!("Validation layers requested but not available");
    }

    let app_info = vk::ApplicationInfo::default()
        .application_name(c"Nova")
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Nova Renderer")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(REQUIRED_API_VERSION);

    let mut extensions: Vec<*const c_char> = Vec::new();
    if let Some(display) = display {
        let surface_extensions = ash_window::enumerate_required_extensions(display)
            .map_err(|e| {
                GraphicsError::InitializationFailed(format!(
                    "Unsupported display for Vulkan surfaces: {:?}",
                    e
                ))
            })?;
        extensions.extend_from_slice(surface_extensions);
    }

    if validation_available {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
    }

    let layer_names: Vec<*const c_char> = if validation_available {
        vec![VALIDATION_LAYER_NAME.as_ptr()]
    } else {
        vec![]
    };

    #[allow(unused_mut)]
    let mut create_flags = vk::InstanceCreateFlags::empty();

    #[cfg(target_os = "macos")]
    {
        create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    let create_info = vk::InstanceCreateInfo::default()
        .flags(create_flags)
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);

    let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create Vulkan instance: {:?}", e))
    })?;

    let debug = if validation_available {
        let loader = ash::ext::debug_utils::Instance::new(entry, &instance);
        match debug::create_debug_messenger(&loader) {
            Ok(messenger) => Some(DebugMessenger { loader, messenger }),
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        }
    } else {
        None
    };

    log::debug!(
        "Vulkan instance created ({} extensions, validation: {})",
        extensions.len(),
        validation_available
    );

    Ok((instance, debug))
}

/// Check if the validation layer is available.
fn check_validation_layer_support(entry: &ash::Entry) -> bool {
    let Ok(available_layers) = (unsafe { entry.enumerate_instance_layer_properties() }) else {
        return false;
    };

    available_layers.iter().any(|layer| {
        layer
            .layer_name_as_c_str()
            .is_ok_and(|name| name == VALIDATION_LAYER_NAME)
    })
}
