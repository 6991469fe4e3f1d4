//! `VK_KHR_swapchain` presentation.

use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::backend::GpuSemaphore;
use crate::error::GraphicsError;
use crate::swapchain::{AcquireOutcome, PresentOutcome, SwapchainImage, SwapchainProvider};
use crate::types::Extent2d;

use super::{VulkanBackend, barriers, raw_semaphore};

/// Preferred surface format; anything else the surface offers is accepted.
const PREFERRED_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

/// A swapchain on a window surface.
///
/// The swapchain is never recreated: once the surface changes, acquire and
/// present report [`AcquireOutcome::Stale`] / [`PresentOutcome::Stale`].
pub struct VulkanSwapchain {
    backend: Arc<VulkanBackend>,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl VulkanSwapchain {
    /// Create a surface for `window` and a swapchain on it.
    ///
    /// The backend must have been created with the window's display.
    /// `size` is used only when the surface leaves the extent to the
    /// swapchain.
    pub fn new(
        backend: Arc<VulkanBackend>,
        window: &(impl HasWindowHandle + HasDisplayHandle),
        size: Extent2d,
    ) -> Result<Self, GraphicsError> {
        let handle_error =
            |e| GraphicsError::InitializationFailed(format!("Invalid window handle: {e}"));
        let display = window.display_handle().map_err(handle_error)?.as_raw();
        let window = window.window_handle().map_err(handle_error)?.as_raw();

        let Some((surface_loader, _)) = backend.presentation_loaders() else {
            return Err(GraphicsError::InitializationFailed(
                "backend was created without a display".to_string(),
            ));
        };

        let surface = unsafe {
            ash_window::create_surface(backend.entry(), backend.instance(), display, window, None)
        }
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to create surface: {:?}", e))
        })?;

        let mut swapchain = Self {
            backend: Arc::clone(&backend),
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            format: vk::Format::UNDEFINED,
            extent: vk::Extent2D::default(),
        };
        // On error, dropping `swapchain` releases whatever was created so far.
        swapchain.create(surface_loader, size)?;

        log::info!(
            "Swapchain created: {}x{}, {} images, {:?}",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.images.len(),
            swapchain.format
        );
        Ok(swapchain)
    }

    fn create(
        &mut self,
        surface_loader: &ash::khr::surface::Instance,
        size: Extent2d,
    ) -> Result<(), GraphicsError> {
        let backend = Arc::clone(&self.backend);
        let physical_device = backend.physical_device();
        let graphics_family = backend.queues.graphics;
        let query_error =
            |e| GraphicsError::InitializationFailed(format!("Surface query failed: {:?}", e));

        let supported = unsafe {
            surface_loader.get_physical_device_surface_support(
                physical_device,
                graphics_family,
                self.surface,
            )
        }
        .map_err(query_error)?;
        if !supported {
            return Err(GraphicsError::InitializationFailed(
                "graphics queue cannot present to this surface".to_string(),
            ));
        }

        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, self.surface)
        }
        .map_err(query_error)?;
        if !capabilities
            .supported_usage_flags
            .contains(vk::ImageUsageFlags::TRANSFER_DST)
        {
            return Err(GraphicsError::InitializationFailed(
                "surface images cannot be cleared".to_string(),
            ));
        }

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, self.surface)
        }
        .map_err(query_error)?;
        let surface_format = formats
            .iter()
            .find(|f| f.format == PREFERRED_FORMAT)
            .or_else(|| formats.first())
            .copied()
            .ok_or_else(|| {
                GraphicsError::InitializationFailed("surface reports no formats".to_string())
            })?;

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: size.width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: size.height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        };

        // One more than the minimum, within the maximum if there is one
        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true);

        let (_, loader) = backend
            .presentation_loaders()
            .ok_or_else(|| GraphicsError::Internal("swapchain loader missing".to_string()))?;
        self.swapchain = unsafe { loader.create_swapchain(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create swapchain: {:?}", e))
        })?;
        self.format = surface_format.format;
        self.extent = extent;

        self.images = unsafe { loader.get_swapchain_images(self.swapchain) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!(
                "Failed to get swapchain images: {:?}",
                e
            ))
        })?;

        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .subresource_range(barriers::subresource_range(vk::ImageAspectFlags::COLOR));
            let view = unsafe { backend.device().create_image_view(&view_info, None) }.map_err(
                |e| {
                    GraphicsError::ResourceCreationFailed(format!(
                        "Failed to create swapchain image view: {:?}",
                        e
                    ))
                },
            )?;
            self.views.push(view);
        }

        Ok(())
    }

    fn swapchain_loader(&self) -> Result<&ash::khr::swapchain::Device, GraphicsError> {
        self.backend
            .presentation_loaders()
            .map(|(_, swapchain)| swapchain)
            .ok_or_else(|| GraphicsError::Internal("swapchain loader missing".to_string()))
    }
}

impl SwapchainProvider for VulkanSwapchain {
    fn extent(&self) -> Extent2d {
        Extent2d::new(self.extent.width, self.extent.height)
    }

    fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    fn acquire_next_image(
        &mut self,
        signal: &GpuSemaphore,
    ) -> Result<AcquireOutcome, GraphicsError> {
        let semaphore = raw_semaphore(signal)?;
        let loader = self.swapchain_loader()?;

        match unsafe {
            loader.acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        } {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Stale),
            Err(e) => Err(GraphicsError::SubmissionFailed(format!(
                "Failed to acquire swapchain image: {:?}",
                e
            ))),
        }
    }

    fn image(&self, index: u32) -> Result<SwapchainImage, GraphicsError> {
        let i = index as usize;
        match (self.images.get(i), self.views.get(i)) {
            (Some(&image), Some(&view)) => Ok(SwapchainImage::Vulkan {
                index,
                image,
                view,
                extent: self.extent,
            }),
            _ => Err(GraphicsError::InvalidParameter(format!(
                "swapchain has no image {index}"
            ))),
        }
    }

    fn present(
        &mut self,
        image_index: u32,
        wait: &GpuSemaphore,
    ) -> Result<PresentOutcome, GraphicsError> {
        let wait_semaphores = [raw_semaphore(wait)?];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let loader = self.swapchain_loader()?;
        let queue = self.backend.graphics_queue().lock();
        match unsafe { loader.queue_present(*queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(e) => Err(GraphicsError::SubmissionFailed(format!(
                "Failed to present: {:?}",
                e
            ))),
        }
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        let device = self.backend.device();
        unsafe {
            let _ = device.device_wait_idle();
            for &view in &self.views {
                device.destroy_image_view(view, None);
            }
        }

        if let Some((surface_loader, swapchain_loader)) = self.backend.presentation_loaders() {
            unsafe {
                if self.swapchain != vk::SwapchainKHR::null() {
                    swapchain_loader.destroy_swapchain(self.swapchain, None);
                }
                surface_loader.destroy_surface(self.surface, None);
            }
        }
    }
}

impl std::fmt::Debug for VulkanSwapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanSwapchain")
            .field("swapchain", &self.swapchain)
            .field("format", &self.format)
            .field("extent", &self.extent)
            .field("images", &self.images.len())
            .finish_non_exhaustive()
    }
}
