//! GPU memory allocator integration using gpu-allocator.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use parking_lot::Mutex;

use crate::error::GraphicsError;

/// Allocator shared by the backend and every resource it created.
///
/// The backend takes the allocator out on drop; resources freed after that
/// leak their memory back to the device instead of touching a dead allocator.
pub type SharedAllocator = Arc<Mutex<Option<Allocator>>>;

/// Create a memory allocator for the Vulkan device.
pub fn create_allocator(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
) -> Result<SharedAllocator, GraphicsError> {
    let allocator = Allocator::new(&AllocatorCreateDesc {
        instance: instance.clone(),
        device,
        physical_device,
        debug_settings: Default::default(),
        buffer_device_address: false,
        allocation_sizes: gpu_allocator::AllocationSizes::default(),
    })
    .map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create memory allocator: {}", e))
    })?;

    Ok(Arc::new(Mutex::new(Some(allocator))))
}

/// Allocate memory for a buffer or image with the given requirements.
pub fn allocate(
    allocator: &SharedAllocator,
    name: &str,
    requirements: vk::MemoryRequirements,
    location: MemoryLocation,
    linear: bool,
) -> Result<Allocation, GraphicsError> {
    let mut guard = allocator.lock();
    let allocator = guard.as_mut().ok_or_else(|| {
        GraphicsError::Internal("memory allocator already destroyed".to_string())
    })?;

    allocator
        .allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to allocate '{name}': {e}"))
        })
}

/// Return an allocation to the allocator, logging failures.
pub fn free(allocator: &SharedAllocator, allocation: Allocation) {
    if let Some(allocator) = allocator.lock().as_mut()
        && let Err(e) = allocator.free(allocation)
    {
        log::warn!("Failed to free GPU memory: {}", e);
    }
}
