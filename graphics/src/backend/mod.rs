//! GPU backend abstraction layer.
//!
//! The rest of the crate talks to the device/queue provider exclusively
//! through the [`GpuBackend`] trait and the `Gpu*` handle enums defined here.
//!
//! # Available Backends
//!
//! - `dummy` (default): CPU simulation for tests. Buffers hold real bytes,
//!   recorded copies are executed on submit and fences signal immediately.
//! - `vulkan-backend` (default): native Vulkan backend using ash.
//!
//! Handles destroy their GPU object on drop. Every handle must be dropped
//! before the backend that created it.

pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

#[cfg(feature = "vulkan-backend")]
use ash::vk;
#[cfg(feature = "vulkan-backend")]
use gpu_allocator::vulkan::Allocation;
use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::graph::RenderPassLayout;
use crate::mesh::TransferBatch;
use crate::pipeline::{GraphicsPipelineDesc, ResourceBinding};
use crate::shader::ShaderStage;
use crate::swapchain::SwapchainImage;
use crate::types::{BufferDescriptor, TextureDescriptor};

pub use dummy::{
    DummyBackend, DummyEvent, DummyHandle, DummyJournal, DummySwapchain, ResourceKind,
};

#[cfg(feature = "vulkan-backend")]
use self::vulkan::{SharedAllocator, VulkanCommandPool};

/// Queue family indices exposed by the device/queue provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueIndices {
    /// Graphics queue family.
    pub graphics: u32,
    /// Copy (transfer) queue family. May equal `graphics`.
    pub copy: u32,
    /// Compute queue family. May equal `graphics`.
    pub compute: u32,
}

/// Pipeline stage at which a submission waits on a semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitStage {
    /// Before colour attachment writes.
    ColorAttachmentOutput,
    /// Before vertex attributes are fetched.
    VertexInput,
}

/// One graphics-queue submission for a frame slot.
#[derive(Debug)]
pub struct FrameSubmission<'a> {
    /// Command list owned by the frame slot.
    pub commands: &'a GpuCommandList,
    /// Swapchain image acquired for this frame.
    pub image: &'a SwapchainImage,
    /// Semaphores to wait on, with the stage that waits.
    pub wait: &'a [(&'a GpuSemaphore, WaitStage)],
    /// Semaphore signaled when rendering finishes.
    pub signal: &'a GpuSemaphore,
    /// Fence signaled when the submission completes.
    pub fence: &'a GpuFence,
    /// Number of compiled passes in the current frame graph.
    pub pass_count: usize,
}

// ============================================================================
// Resource handles
// ============================================================================

/// Handle to a GPU buffer resource.
#[allow(clippy::large_enum_variant)]
pub enum GpuBuffer {
    /// Dummy backend buffer backed by host memory.
    Dummy {
        handle: DummyHandle,
        data: Mutex<Vec<u8>>,
    },
    /// Vulkan backend buffer
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        buffer: vk::Buffer,
        allocation: Mutex<Option<Allocation>>,
        allocator: SharedAllocator,
        size: u64,
    },
}

impl GpuBuffer {
    /// Size of the buffer in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::Dummy { data, .. } => data.lock().len() as u64,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { size, .. } => *size,
        }
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { handle, .. } => f
                .debug_struct("GpuBuffer::Dummy")
                .field("id", &handle.id())
                .field("size", &self.size())
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { buffer, size, .. } => f
                .debug_struct("GpuBuffer::Vulkan")
                .field("buffer", buffer)
                .field("size", size)
                .finish_non_exhaustive(),
        }
    }
}

/// Handle to a GPU texture resource (image, view and memory).
#[allow(clippy::large_enum_variant)]
pub enum GpuTexture {
    /// Dummy backend texture
    Dummy { handle: DummyHandle },
    /// Vulkan backend texture
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        image: vk::Image,
        view: vk::ImageView,
        allocation: Mutex<Option<Allocation>>,
        allocator: SharedAllocator,
        format: vk::Format,
        extent: vk::Extent2D,
    },
}

impl std::fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { handle } => f
                .debug_struct("GpuTexture::Dummy")
                .field("id", &handle.id())
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan {
                image,
                view,
                format,
                extent,
                ..
            } => f
                .debug_struct("GpuTexture::Vulkan")
                .field("image", image)
                .field("view", view)
                .field("format", format)
                .field("extent", extent)
                .finish_non_exhaustive(),
        }
    }
}

/// Handle to a GPU fence for CPU-GPU synchronization.
pub enum GpuFence {
    /// Dummy backend fence
    Dummy {
        handle: DummyHandle,
        signaled: AtomicBool,
    },
    /// Vulkan backend fence
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        fence: vk::Fence,
    },
}

impl std::fmt::Debug for GpuFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { handle, signaled } => f
                .debug_struct("GpuFence::Dummy")
                .field("id", &handle.id())
                .field("signaled", signaled)
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { fence, .. } => f
                .debug_struct("GpuFence::Vulkan")
                .field("fence", fence)
                .finish_non_exhaustive(),
        }
    }
}

/// Handle to a GPU semaphore for GPU-GPU synchronization.
pub enum GpuSemaphore {
    /// Dummy backend semaphore
    Dummy { handle: DummyHandle },
    /// Vulkan backend semaphore
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        semaphore: vk::Semaphore,
    },
}

impl std::fmt::Debug for GpuSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { handle } => f
                .debug_struct("GpuSemaphore::Dummy")
                .field("id", &handle.id())
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { semaphore, .. } => f
                .debug_struct("GpuSemaphore::Vulkan")
                .field("semaphore", semaphore)
                .finish_non_exhaustive(),
        }
    }
}

/// Declares a handle enum that wraps a single device-owned Vulkan object.
macro_rules! device_object_handle {
    ($(#[$meta:meta])* $name:ident, $field:ident: $vk_ty:ty, $destroy:ident) => {
        $(#[$meta])*
        pub enum $name {
            /// Dummy backend object
            Dummy { handle: DummyHandle },
            /// Vulkan backend object
            #[cfg(feature = "vulkan-backend")]
            Vulkan {
                device: ash::Device,
                $field: $vk_ty,
            },
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    Self::Dummy { handle } => f
                        .debug_struct(concat!(stringify!($name), "::Dummy"))
                        .field("id", &handle.id())
                        .finish(),
                    #[cfg(feature = "vulkan-backend")]
                    Self::Vulkan { $field, .. } => f
                        .debug_struct(concat!(stringify!($name), "::Vulkan"))
                        .field(stringify!($field), $field)
                        .finish_non_exhaustive(),
                }
            }
        }

        #[cfg(feature = "vulkan-backend")]
        impl Drop for $name {
            fn drop(&mut self) {
                if let Self::Vulkan { device, $field } = self {
                    unsafe {
                        device.$destroy(*$field, None);
                    }
                }
            }
        }
    };
}

device_object_handle!(
    /// Handle to a compiled shader module.
    GpuShaderModule, module: vk::ShaderModule, destroy_shader_module
);
device_object_handle!(
    /// Handle to a render pass object.
    GpuRenderPass, render_pass: vk::RenderPass, destroy_render_pass
);
device_object_handle!(
    /// Handle to a descriptor set layout.
    GpuDescriptorSetLayout, layout: vk::DescriptorSetLayout, destroy_descriptor_set_layout
);
device_object_handle!(
    /// Handle to a pipeline layout.
    GpuPipelineLayout, layout: vk::PipelineLayout, destroy_pipeline_layout
);
device_object_handle!(
    /// Handle to a graphics pipeline.
    GpuPipeline, pipeline: vk::Pipeline, destroy_pipeline
);

/// A reusable command list owned by one frame slot.
pub enum GpuCommandList {
    /// Dummy backend command list
    Dummy { handle: DummyHandle },
    /// Vulkan backend command buffer
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        pool: Arc<VulkanCommandPool>,
        buffer: vk::CommandBuffer,
    },
}

impl std::fmt::Debug for GpuCommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { handle } => f
                .debug_struct("GpuCommandList::Dummy")
                .field("id", &handle.id())
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { buffer, .. } => f
                .debug_struct("GpuCommandList::Vulkan")
                .field("buffer", buffer)
                .finish_non_exhaustive(),
        }
    }
}

/// An in-flight transfer batch: its fence and the command buffer it used.
///
/// Dropping a submission waits for the GPU to finish it first.
pub enum GpuSubmission {
    /// Dummy backend submission (already complete)
    Dummy { handle: DummyHandle },
    /// Vulkan backend submission
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        pool: Arc<VulkanCommandPool>,
        buffer: vk::CommandBuffer,
        fence: vk::Fence,
    },
}

impl std::fmt::Debug for GpuSubmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { handle } => f
                .debug_struct("GpuSubmission::Dummy")
                .field("id", &handle.id())
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { fence, .. } => f
                .debug_struct("GpuSubmission::Vulkan")
                .field("fence", fence)
                .finish_non_exhaustive(),
        }
    }
}

// ============================================================================
// Vulkan Resource Cleanup (Drop implementations)
// ============================================================================

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let GpuBuffer::Vulkan {
            device,
            buffer,
            allocation,
            allocator,
            ..
        } = self
        {
            if let Some(allocation) = allocation.lock().take()
                && let Some(allocator) = allocator.lock().as_mut()
                && let Err(e) = allocator.free(allocation)
            {
                log::warn!("Failed to free buffer memory: {}", e);
            }
            unsafe {
                device.destroy_buffer(*buffer, None);
            }
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuTexture {
    fn drop(&mut self) {
        if let GpuTexture::Vulkan {
            device,
            image,
            view,
            allocation,
            allocator,
            ..
        } = self
        {
            unsafe {
                device.destroy_image_view(*view, None);
            }
            if let Some(allocation) = allocation.lock().take()
                && let Some(allocator) = allocator.lock().as_mut()
                && let Err(e) = allocator.free(allocation)
            {
                log::warn!("Failed to free texture memory: {}", e);
            }
            unsafe {
                device.destroy_image(*image, None);
            }
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuFence {
    fn drop(&mut self) {
        if let GpuFence::Vulkan { device, fence } = self {
            unsafe {
                device.destroy_fence(*fence, None);
            }
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuSemaphore {
    fn drop(&mut self) {
        if let GpuSemaphore::Vulkan { device, semaphore } = self {
            unsafe {
                device.destroy_semaphore(*semaphore, None);
            }
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuCommandList {
    fn drop(&mut self) {
        if let GpuCommandList::Vulkan { pool, buffer } = self {
            pool.free(*buffer);
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuSubmission {
    fn drop(&mut self) {
        if let GpuSubmission::Vulkan {
            pool,
            buffer,
            fence,
        } = self
        {
            let device = pool.device();
            unsafe {
                let _ = device.wait_for_fences(&[*fence], true, u64::MAX);
                device.destroy_fence(*fence, None);
            }
            pool.free(*buffer);
        }
    }
}

// ============================================================================
// Backend trait
// ============================================================================

/// GPU backend trait for abstracting the device/queue provider.
///
/// Every fallible call maps a non-success API result straight to an error;
/// nothing in this layer retries.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Queue family indices used by this backend.
    fn queue_indices(&self) -> QueueIndices;

    /// Create a buffer resource.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError>;

    /// Write bytes into a CPU-visible buffer.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8])
    -> Result<(), GraphicsError>;

    /// Create a 2D texture with a full view.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError>;

    /// Create a fence for CPU-GPU synchronization.
    fn create_fence(&self, signaled: bool) -> Result<GpuFence, GraphicsError>;

    /// Wait for a fence to be signaled. No timeout.
    fn wait_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError>;

    /// Return a fence to the unsignaled state.
    fn reset_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError>;

    /// Check if a fence is signaled (non-blocking).
    fn is_fence_signaled(&self, fence: &GpuFence) -> bool;

    /// Create a semaphore for GPU-GPU ordering.
    fn create_semaphore(&self) -> Result<GpuSemaphore, GraphicsError>;

    /// Create a shader module from SPIR-V words.
    fn create_shader_module(
        &self,
        stage: ShaderStage,
        words: &[u32],
    ) -> Result<GpuShaderModule, GraphicsError>;

    /// Create a single-subpass render pass.
    fn create_render_pass(&self, layout: &RenderPassLayout)
    -> Result<GpuRenderPass, GraphicsError>;

    /// Create a descriptor set layout for one set index.
    fn create_descriptor_set_layout(
        &self,
        bindings: &[ResourceBinding],
    ) -> Result<GpuDescriptorSetLayout, GraphicsError>;

    /// Create a pipeline layout over set layouts given in set-index order.
    fn create_pipeline_layout(
        &self,
        set_layouts: &[GpuDescriptorSetLayout],
    ) -> Result<GpuPipelineLayout, GraphicsError>;

    /// Create a graphics pipeline.
    fn create_graphics_pipeline(
        &self,
        descriptor: &GraphicsPipelineDesc<'_>,
    ) -> Result<GpuPipeline, GraphicsError>;

    /// Allocate a reusable command list from the graphics queue's pool.
    fn create_frame_commands(&self) -> Result<GpuCommandList, GraphicsError>;

    /// Record and submit a transfer batch on the copy queue.
    ///
    /// `signal` is signaled for the graphics queue; the returned submission
    /// owns the fence the CPU waits on.
    fn submit_transfer(
        &self,
        batch: &TransferBatch<'_>,
        signal: &GpuSemaphore,
    ) -> Result<GpuSubmission, GraphicsError>;

    /// Wait until a transfer submission has completed.
    fn wait_submission(&self, submission: &GpuSubmission) -> Result<(), GraphicsError>;

    /// Record and submit the frame's graphics work.
    fn submit_frame(&self, frame: &FrameSubmission<'_>) -> Result<(), GraphicsError>;

    /// Wait until every queue is idle.
    fn wait_idle(&self) -> Result<(), GraphicsError>;
}

/// Selects and creates the appropriate backend based on available features.
pub fn create_backend() -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    #[cfg(feature = "vulkan-backend")]
    {
        match vulkan::VulkanBackend::new(&vulkan::VulkanParameters::default()) {
            Ok(backend) => {
                log::info!("Using Vulkan backend (ash)");
                return Ok(Arc::new(backend));
            }
            Err(e) => {
                log::warn!("Failed to create Vulkan backend: {}", e);
            }
        }
    }

    #[cfg(feature = "dummy")]
    {
        log::info!("Using dummy backend");
        return Ok(Arc::new(DummyBackend::new()));
    }

    #[allow(unreachable_code)]
    Err(GraphicsError::InitializationFailed(
        "no GPU backend available".to_string(),
    ))
}

/// Check if a real GPU backend is compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "vulkan-backend")
}
