//! Vulkan command pool and buffer management.

use ash::vk;
use parking_lot::Mutex;

use crate::error::GraphicsError;

/// A command pool for one queue family.
///
/// Vulkan pools are externally synchronized, so every use goes through the
/// mutex. Command buffers hold an `Arc` to their pool and return themselves
/// on drop.
pub struct VulkanCommandPool {
    device: ash::Device,
    pool: Mutex<vk::CommandPool>,
    queue_family: u32,
}

impl VulkanCommandPool {
    /// Create a pool whose buffers can be reset individually.
    pub fn new(device: &ash::Device, queue_family: u32) -> Result<Self, GraphicsError> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to create command pool: {:?}", e))
        })?;

        Ok(Self {
            device: device.clone(),
            pool: Mutex::new(pool),
            queue_family,
        })
    }

    /// The device the pool belongs to.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Queue family the pool's buffers are submitted to.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate one primary command buffer.
    pub fn allocate(&self) -> Result<vk::CommandBuffer, GraphicsError> {
        let pool = self.pool.lock();
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!(
                "Failed to allocate command buffer: {:?}",
                e
            ))
        })?;

        buffers.into_iter().next().ok_or_else(|| {
            GraphicsError::ResourceCreationFailed("driver returned no command buffer".to_string())
        })
    }

    /// Reset `buffer` and record it for a single submission.
    ///
    /// The pool stays locked while `record` runs. The caller must ensure
    /// the buffer's previous submission has completed.
    pub fn record(
        &self,
        buffer: vk::CommandBuffer,
        record: impl FnOnce(&ash::Device, vk::CommandBuffer),
    ) -> Result<(), GraphicsError> {
        let _pool = self.pool.lock();
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .reset_command_buffer(buffer, vk::CommandBufferResetFlags::empty())
                .and_then(|()| self.device.begin_command_buffer(buffer, &begin_info))
        }
        .map_err(|e| GraphicsError::SubmissionFailed(format!("Failed to begin recording: {:?}", e)))?;

        record(&self.device, buffer);

        unsafe { self.device.end_command_buffer(buffer) }.map_err(|e| {
            GraphicsError::SubmissionFailed(format!("Failed to end recording: {:?}", e))
        })
    }

    /// Return a buffer to the pool.
    pub fn free(&self, buffer: vk::CommandBuffer) {
        let pool = self.pool.lock();
        unsafe {
            self.device.free_command_buffers(*pool, &[buffer]);
        }
    }
}

impl Drop for VulkanCommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(*self.pool.get_mut(), None);
        }
    }
}
