//! Native Vulkan backend implementation using ash.
//!
//! Owns the instance, device, queues, command pools and the memory
//! allocator. Every handle it hands out keeps a clone of the
//! `ash::Device`; all of them must be dropped before the backend.
//!
//! The copy queue comes from a transfer-only family when the device has
//! one. Buffers are then created with concurrent sharing across the
//! graphics and copy families, so uploads need no ownership transfers.

mod allocator;
mod barriers;
mod command;
mod conversion;
mod debug;
mod device;
mod instance;
mod pipeline;
mod swapchain;

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::RawDisplayHandle;

use crate::error::GraphicsError;
use crate::graph::RenderPassLayout;
use crate::mesh::{TransferBatch, TransferCommand};
use crate::pipeline::{GraphicsPipelineDesc, ResourceBinding};
use crate::shader::ShaderStage;
use crate::swapchain::SwapchainImage;
use crate::types::{BufferDescriptor, TextureDescriptor};

use super::{
    FrameSubmission, GpuBackend, GpuBuffer, GpuCommandList, GpuDescriptorSetLayout, GpuFence,
    GpuPipeline, GpuPipelineLayout, GpuRenderPass, GpuSemaphore, GpuShaderModule, GpuSubmission,
    GpuTexture, QueueIndices,
};

pub use allocator::SharedAllocator;
pub use command::VulkanCommandPool;
pub use swapchain::VulkanSwapchain;

use self::conversion::{
    aspect_mask, convert_buffer_usage, convert_memory_location, convert_pixel_format,
    convert_texture_usage, convert_wait_stage,
};
use self::instance::DebugMessenger;

/// Colour every frame clears the swapchain image to.
const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Options for creating a [`VulkanBackend`].
#[derive(Debug, Clone, Copy)]
pub struct VulkanParameters {
    /// Enable the Khronos validation layer if it is installed.
    pub validation: bool,
    /// Display the backend will present to. Without one, no surface or
    /// swapchain extensions are enabled and the backend is headless.
    pub display: Option<RawDisplayHandle>,
}

impl Default for VulkanParameters {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            display: None,
        }
    }
}

/// Queue handle plus the lock that serializes submissions to it.
type SharedQueue = Arc<Mutex<vk::Queue>>;

/// Vulkan-based GPU backend.
pub struct VulkanBackend {
    entry: ash::Entry,
    instance: ash::Instance,
    debug: Option<DebugMessenger>,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queues: QueueIndices,
    graphics_queue: SharedQueue,
    copy_queue: SharedQueue,
    allocator: SharedAllocator,
    graphics_pool: ManuallyDrop<Arc<VulkanCommandPool>>,
    copy_pool: ManuallyDrop<Arc<VulkanCommandPool>>,
    surface_loader: Option<ash::khr::surface::Instance>,
    swapchain_loader: Option<ash::khr::swapchain::Device>,
}

impl VulkanBackend {
    /// Create the instance and device.
    pub fn new(params: &VulkanParameters) -> Result<Self, GraphicsError> {
        nova_core::profile_function!();

        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to load Vulkan library: {}", e))
        })?;

        let (instance, debug) = instance::create_instance(&entry, params.validation, params.display)?;

        // From here on, partially created objects are torn down by hand on error.
        let destroy_instance = |debug: Option<DebugMessenger>| unsafe {
            if let Some(debug) = debug {
                debug
                    .loader
                    .destroy_debug_utils_messenger(debug.messenger, None);
            }
            instance.destroy_instance(None);
        };

        let selected = device::select_physical_device(&instance).and_then(|physical_device| {
            let queues = device::find_queue_families(&instance, physical_device)?;
            let device = device::create_logical_device(
                &instance,
                physical_device,
                queues,
                params.display.is_some(),
            )?;
            Ok((physical_device, queues, device))
        });
        let (physical_device, queues, device) = match selected {
            Ok(selected) => selected,
            Err(e) => {
                destroy_instance(debug);
                return Err(e);
            }
        };

        let pools = allocator::create_allocator(&instance, physical_device, device.clone())
            .and_then(|allocator| {
                let graphics_pool = VulkanCommandPool::new(&device, queues.graphics)?;
                let copy_pool = VulkanCommandPool::new(&device, queues.copy)?;
                Ok((allocator, graphics_pool, copy_pool))
            });
        let (allocator, graphics_pool, copy_pool) = match pools {
            Ok(pools) => pools,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                destroy_instance(debug);
                return Err(e);
            }
        };

        let graphics_queue = Arc::new(Mutex::new(unsafe {
            device.get_device_queue(queues.graphics, 0)
        }));
        let copy_queue = if queues.copy == queues.graphics {
            Arc::clone(&graphics_queue)
        } else {
            Arc::new(Mutex::new(unsafe { device.get_device_queue(queues.copy, 0) }))
        };

        let (surface_loader, swapchain_loader) = if params.display.is_some() {
            (
                Some(ash::khr::surface::Instance::new(&entry, &instance)),
                Some(ash::khr::swapchain::Device::new(&instance, &device)),
            )
        } else {
            (None, None)
        };

        log::info!(
            "Vulkan backend created: graphics family {}, copy family {}, compute family {}",
            queues.graphics,
            queues.copy,
            queues.compute
        );

        Ok(Self {
            entry,
            instance,
            debug,
            physical_device,
            device,
            queues,
            graphics_queue,
            copy_queue,
            allocator,
            graphics_pool: ManuallyDrop::new(Arc::new(graphics_pool)),
            copy_pool: ManuallyDrop::new(Arc::new(copy_pool)),
            surface_loader,
            swapchain_loader,
        })
    }

    /// The logical device.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// The selected physical device.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub(crate) fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub(crate) fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub(crate) fn graphics_queue(&self) -> &SharedQueue {
        &self.graphics_queue
    }

    /// Surface and swapchain loaders; `None` for a headless backend.
    pub(crate) fn presentation_loaders(
        &self,
    ) -> Option<(&ash::khr::surface::Instance, &ash::khr::swapchain::Device)> {
        self.surface_loader.as_ref().zip(self.swapchain_loader.as_ref())
    }

    /// Queue families a buffer must be shareable between.
    fn buffer_sharing(&self) -> Vec<u32> {
        if self.queues.copy == self.queues.graphics {
            Vec::new()
        } else {
            vec![self.queues.graphics, self.queues.copy]
        }
    }

    /// Record and run a one-off command buffer on the graphics queue,
    /// waiting for it to finish.
    fn submit_immediate(
        &self,
        record: impl FnOnce(&ash::Device, vk::CommandBuffer),
    ) -> Result<(), GraphicsError> {
        let pool = &self.graphics_pool;
        let buffer = pool.allocate()?;
        let fence = match self.create_raw_fence(false) {
            Ok(fence) => fence,
            Err(e) => {
                pool.free(buffer);
                return Err(e);
            }
        };

        let result = pool.record(buffer, record).and_then(|()| {
            let command_buffers = [buffer];
            let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
            let queue = self.graphics_queue.lock();
            unsafe {
                self.device
                    .queue_submit(*queue, &[submit], fence)
                    .and_then(|()| self.device.wait_for_fences(&[fence], true, u64::MAX))
            }
            .map_err(|e| GraphicsError::SubmissionFailed(format!("Immediate submit failed: {:?}", e)))
        });

        unsafe { self.device.destroy_fence(fence, None) };
        pool.free(buffer);
        result
    }

    fn create_raw_fence(&self, signaled: bool) -> Result<vk::Fence, GraphicsError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);

        unsafe { self.device.create_fence(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create fence: {:?}", e))
        })
    }

    fn record_transfer(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        batch: &TransferBatch<'_>,
    ) -> Result<(), GraphicsError> {
        for command in batch.commands() {
            match *command {
                TransferCommand::Barrier { buffer, kind } => {
                    barriers::buffer_barrier(device, cmd, raw_buffer(buffer)?, kind);
                }
                TransferCommand::Copy {
                    src,
                    dst,
                    dst_offset,
                    size,
                } => {
                    let region = vk::BufferCopy {
                        src_offset: 0,
                        dst_offset,
                        size,
                    };
                    unsafe {
                        device.cmd_copy_buffer(cmd, raw_buffer(src)?, raw_buffer(dst)?, &[region]);
                    }
                }
            }
        }
        Ok(())
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // The allocator frees its memory blocks through the device.
            drop(self.allocator.lock().take());

            ManuallyDrop::drop(&mut self.graphics_pool);
            ManuallyDrop::drop(&mut self.copy_pool);

            self.device.destroy_device(None);

            if let Some(debug) = &self.debug {
                debug
                    .loader
                    .destroy_debug_utils_messenger(debug.messenger, None);
            }

            self.instance.destroy_instance(None);
        }
        log::debug!("Vulkan backend destroyed");
    }
}

fn mismatch(what: &str) -> GraphicsError {
    GraphicsError::InvalidParameter(format!("{what} was not created by the Vulkan backend"))
}

fn raw_buffer(buffer: &GpuBuffer) -> Result<vk::Buffer, GraphicsError> {
    match buffer {
        GpuBuffer::Vulkan { buffer, .. } => Ok(*buffer),
        _ => Err(mismatch("buffer")),
    }
}

fn raw_semaphore(semaphore: &GpuSemaphore) -> Result<vk::Semaphore, GraphicsError> {
    match semaphore {
        GpuSemaphore::Vulkan { semaphore, .. } => Ok(*semaphore),
        _ => Err(mismatch("semaphore")),
    }
}

fn raw_fence(fence: &GpuFence) -> Result<vk::Fence, GraphicsError> {
    match fence {
        GpuFence::Vulkan { fence, .. } => Ok(*fence),
        _ => Err(mismatch("fence")),
    }
}

fn submission_error(what: &str, e: vk::Result) -> GraphicsError {
    GraphicsError::SubmissionFailed(format!("{what}: {:?}", e))
}

impl GpuBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan Backend (ash)"
    }

    fn queue_indices(&self) -> QueueIndices {
        self.queues
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        let name = descriptor.label.as_deref().unwrap_or("buffer");
        let families = self.buffer_sharing();
        let mut create_info = vk::BufferCreateInfo::default()
            .size(descriptor.size)
            .usage(convert_buffer_usage(descriptor.usage));
        create_info = if families.is_empty() {
            create_info.sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        };

        let buffer = unsafe { self.device.create_buffer(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create buffer '{name}': {:?}", e))
        })?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let allocation = match allocator::allocate(
            &self.allocator,
            name,
            requirements,
            convert_memory_location(descriptor.location),
            true,
        ) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            allocator::free(&self.allocator, allocation);
            unsafe { self.device.destroy_buffer(buffer, None) };
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "Failed to bind memory of buffer '{name}': {:?}",
                e
            )));
        }

        log::trace!("Created buffer '{}' ({} bytes)", name, descriptor.size);

        Ok(GpuBuffer::Vulkan {
            device: self.device.clone(),
            buffer,
            allocation: Mutex::new(Some(allocation)),
            allocator: Arc::clone(&self.allocator),
            size: descriptor.size,
        })
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let GpuBuffer::Vulkan {
            allocation, size, ..
        } = buffer
        else {
            return Err(mismatch("buffer"));
        };

        let end = offset
            .checked_add(data.len() as u64)
            .filter(|&end| end <= *size)
            .ok_or_else(|| {
                GraphicsError::InvalidParameter(format!(
                    "write of {} bytes at offset {} exceeds buffer size {}",
                    data.len(),
                    offset,
                    size
                ))
            })?;

        let mut allocation = allocation.lock();
        let mapped = allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| {
                GraphicsError::InvalidParameter("buffer is not host visible".to_string())
            })?;
        mapped[offset as usize..end as usize].copy_from_slice(data);
        Ok(())
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        let name = descriptor.label.as_deref().unwrap_or("texture");
        let format = convert_pixel_format(descriptor.format);
        let extent = vk::Extent2D {
            width: descriptor.width,
            height: descriptor.height,
        };

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_texture_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create image '{name}': {:?}", e))
        })?;

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let allocation = match allocator::allocate(
            &self.allocator,
            name,
            requirements,
            gpu_allocator::MemoryLocation::GpuOnly,
            false,
        ) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let aspect = aspect_mask(descriptor.format);
        let view = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .and_then(|()| {
                    let view_info = vk::ImageViewCreateInfo::default()
                        .image(image)
                        .view_type(vk::ImageViewType::TYPE_2D)
                        .format(format)
                        .subresource_range(barriers::subresource_range(aspect));
                    self.device.create_image_view(&view_info, None)
                })
        };
        let view = match view {
            Ok(view) => view,
            Err(e) => {
                allocator::free(&self.allocator, allocation);
                unsafe { self.device.destroy_image(image, None) };
                return Err(GraphicsError::ResourceCreationFailed(format!(
                    "Failed to set up image '{name}': {:?}",
                    e
                )));
            }
        };

        let texture = GpuTexture::Vulkan {
            device: self.device.clone(),
            image,
            view,
            allocation: Mutex::new(Some(allocation)),
            allocator: Arc::clone(&self.allocator),
            format,
            extent,
        };

        // Render targets rest in the shader-read layout between passes.
        self.submit_immediate(|device, cmd| {
            barriers::transition_image(
                device,
                cmd,
                image,
                aspect,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        })?;

        log::trace!("Created texture '{}' ({}x{})", name, extent.width, extent.height);
        Ok(texture)
    }

    fn create_fence(&self, signaled: bool) -> Result<GpuFence, GraphicsError> {
        Ok(GpuFence::Vulkan {
            device: self.device.clone(),
            fence: self.create_raw_fence(signaled)?,
        })
    }

    fn wait_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        let fence = raw_fence(fence)?;
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }
            .map_err(|e| submission_error("Failed to wait for fence", e))
    }

    fn reset_fence(&self, fence: &GpuFence) -> Result<(), GraphicsError> {
        let fence = raw_fence(fence)?;
        unsafe { self.device.reset_fences(&[fence]) }
            .map_err(|e| submission_error("Failed to reset fence", e))
    }

    fn is_fence_signaled(&self, fence: &GpuFence) -> bool {
        raw_fence(fence)
            .ok()
            .and_then(|fence| unsafe { self.device.get_fence_status(fence) }.ok())
            .unwrap_or(false)
    }

    fn create_semaphore(&self) -> Result<GpuSemaphore, GraphicsError> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { self.device.create_semaphore(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create semaphore: {:?}", e))
        })?;

        Ok(GpuSemaphore::Vulkan {
            device: self.device.clone(),
            semaphore,
        })
    }

    fn create_shader_module(
        &self,
        _stage: ShaderStage,
        words: &[u32],
    ) -> Result<GpuShaderModule, GraphicsError> {
        Ok(GpuShaderModule::Vulkan {
            device: self.device.clone(),
            module: pipeline::create_shader_module(&self.device, words)?,
        })
    }

    fn create_render_pass(
        &self,
        layout: &RenderPassLayout,
    ) -> Result<GpuRenderPass, GraphicsError> {
        Ok(GpuRenderPass::Vulkan {
            device: self.device.clone(),
            render_pass: pipeline::create_render_pass(&self.device, layout)?,
        })
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[ResourceBinding],
    ) -> Result<GpuDescriptorSetLayout, GraphicsError> {
        Ok(GpuDescriptorSetLayout::Vulkan {
            device: self.device.clone(),
            layout: pipeline::create_descriptor_set_layout(&self.device, bindings)?,
        })
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[GpuDescriptorSetLayout],
    ) -> Result<GpuPipelineLayout, GraphicsError> {
        let raw_layouts = set_layouts
            .iter()
            .map(|layout| match layout {
                GpuDescriptorSetLayout::Vulkan { layout, .. } => Ok(*layout),
                _ => Err(mismatch("descriptor set layout")),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GpuPipelineLayout::Vulkan {
            device: self.device.clone(),
            layout: pipeline::create_pipeline_layout(&self.device, &raw_layouts)?,
        })
    }

    fn create_graphics_pipeline(
        &self,
        descriptor: &GraphicsPipelineDesc<'_>,
    ) -> Result<GpuPipeline, GraphicsError> {
        let GpuPipelineLayout::Vulkan { layout, .. } = descriptor.layout else {
            return Err(mismatch("pipeline layout"));
        };
        let GpuRenderPass::Vulkan { render_pass, .. } = descriptor.render_pass else {
            return Err(mismatch("render pass"));
        };
        let modules = descriptor
            .stages
            .iter()
            .map(|stage| match stage.module {
                GpuShaderModule::Vulkan { module, .. } => Ok(*module),
                _ => Err(mismatch("shader module")),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pipeline = pipeline::create_graphics_pipeline(
            &self.device,
            descriptor,
            &modules,
            *layout,
            *render_pass,
        )?;
        log::debug!("Created graphics pipeline '{}'", descriptor.name);

        Ok(GpuPipeline::Vulkan {
            device: self.device.clone(),
            pipeline,
        })
    }

    fn create_frame_commands(&self) -> Result<GpuCommandList, GraphicsError> {
        let pool: &Arc<VulkanCommandPool> = &self.graphics_pool;
        Ok(GpuCommandList::Vulkan {
            buffer: pool.allocate()?,
            pool: Arc::clone(pool),
        })
    }

    fn submit_transfer(
        &self,
        batch: &TransferBatch<'_>,
        signal: &GpuSemaphore,
    ) -> Result<GpuSubmission, GraphicsError> {
        nova_core::profile_function!();

        let signal = raw_semaphore(signal)?;
        let pool: &Arc<VulkanCommandPool> = &self.copy_pool;
        let buffer = pool.allocate()?;
        let fence = match self.create_raw_fence(false) {
            Ok(fence) => fence,
            Err(e) => {
                pool.free(buffer);
                return Err(e);
            }
        };

        let mut recorded = Ok(());
        let result = pool
            .record(buffer, |device, cmd| {
                recorded = self.record_transfer(device, cmd, batch);
            })
            .and(recorded)
            .and_then(|()| {
                let command_buffers = [buffer];
                let signal_semaphores = [signal];
                let submit = vk::SubmitInfo::default()
                    .command_buffers(&command_buffers)
                    .signal_semaphores(&signal_semaphores);
                let queue = self.copy_queue.lock();
                unsafe { self.device.queue_submit(*queue, &[submit], fence) }
                    .map_err(|e| submission_error("Failed to submit transfer batch", e))
            });

        if let Err(e) = result {
            unsafe { self.device.destroy_fence(fence, None) };
            pool.free(buffer);
            return Err(e);
        }

        log::trace!("Submitted {} transfer commands", batch.commands().len());
        Ok(GpuSubmission::Vulkan {
            pool: Arc::clone(pool),
            buffer,
            fence,
        })
    }

    fn wait_submission(&self, submission: &GpuSubmission) -> Result<(), GraphicsError> {
        let GpuSubmission::Vulkan { fence, .. } = submission else {
            return Err(mismatch("submission"));
        };
        unsafe { self.device.wait_for_fences(&[*fence], true, u64::MAX) }
            .map_err(|e| submission_error("Failed to wait for transfer", e))
    }

    fn submit_frame(&self, frame: &FrameSubmission<'_>) -> Result<(), GraphicsError> {
        nova_core::profile_function!();

        let GpuCommandList::Vulkan { pool, buffer } = frame.commands else {
            return Err(mismatch("command list"));
        };
        let SwapchainImage::Vulkan { image, .. } = *frame.image else {
            return Err(mismatch("swapchain image"));
        };
        let signal = raw_semaphore(frame.signal)?;
        let fence = raw_fence(frame.fence)?;

        let mut wait_semaphores = Vec::with_capacity(frame.wait.len());
        let mut wait_stages = Vec::with_capacity(frame.wait.len());
        for (semaphore, stage) in frame.wait {
            wait_semaphores.push(raw_semaphore(semaphore)?);
            wait_stages.push(convert_wait_stage(*stage));
        }

        pool.record(*buffer, |device, cmd| {
            let clear = vk::ClearColorValue {
                float32: CLEAR_COLOR,
            };
            let range = barriers::subresource_range(vk::ImageAspectFlags::COLOR);
            barriers::transition_image(
                device,
                cmd,
                image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            unsafe {
                device.cmd_clear_color_image(
                    cmd,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &clear,
                    &[range],
                );
            }
            barriers::transition_image(
                device,
                cmd,
                image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR,
            );
        })?;

        let command_buffers = [*buffer];
        let signal_semaphores = [signal];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let queue = self.graphics_queue.lock();
        unsafe { self.device.queue_submit(*queue, &[submit], fence) }
            .map_err(|e| submission_error("Failed to submit frame", e))?;

        log::trace!(
            "Submitted frame: {} waits, {} passes",
            wait_semaphores.len(),
            frame.pass_count
        );
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        unsafe { self.device.device_wait_idle() }
            .map_err(|e| submission_error("Failed to wait for device idle", e))
    }
}

static_assertions::assert_impl_all!(VulkanBackend: Send, Sync);
