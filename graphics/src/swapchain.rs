//! Swapchain provider interface.
//!
//! The window/swapchain provider owns the presentable images and the
//! acquire/present primitives. The frame loop only ever talks to it through
//! [`SwapchainProvider`].
//!
//! # Implementations
//!
//! - [`DummySwapchain`](crate::backend::dummy::DummySwapchain) - round-robin
//!   fake images, can be told to report stale acquires
//! - `VulkanSwapchain` - `VK_KHR_swapchain` on a surface created from raw
//!   window handles (`vulkan-backend` feature)

#[cfg(feature = "vulkan-backend")]
use ash::vk;

use crate::backend::GpuSemaphore;
use crate::error::GraphicsError;
use crate::types::Extent2d;

/// Result of asking for the next swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquireOutcome {
    /// An image was acquired; the semaphore will be signaled when it is ready.
    Acquired {
        /// Index of the acquired image.
        image_index: u32,
        /// The swapchain still works but no longer matches the surface.
        suboptimal: bool,
    },
    /// The swapchain no longer matches the surface. No semaphore is signaled.
    Stale,
}

/// Result of presenting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentOutcome {
    /// The image was queued for presentation.
    Presented,
    /// The image was queued but the swapchain is suboptimal.
    Suboptimal,
    /// The swapchain no longer matches the surface.
    Stale,
}

/// A presentable image.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapchainImage {
    /// Dummy backend image
    Dummy { index: u32 },
    /// Vulkan swapchain image
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        index: u32,
        image: vk::Image,
        view: vk::ImageView,
        extent: vk::Extent2D,
    },
}

impl SwapchainImage {
    /// Index of the image within its swapchain.
    pub fn index(&self) -> u32 {
        match self {
            Self::Dummy { index } => *index,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { index, .. } => *index,
        }
    }
}

impl std::fmt::Debug for SwapchainImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { index } => f
                .debug_struct("SwapchainImage::Dummy")
                .field("index", index)
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { index, image, .. } => f
                .debug_struct("SwapchainImage::Vulkan")
                .field("index", index)
                .field("image", image)
                .finish_non_exhaustive(),
        }
    }
}

/// Supplier of swapchain images and present/acquire primitives.
pub trait SwapchainProvider: Send {
    /// Current extent of the swapchain images.
    fn extent(&self) -> Extent2d;

    /// Number of images in the swapchain.
    fn image_count(&self) -> u32;

    /// Acquire the next image, signaling `signal` once it can be rendered to.
    fn acquire_next_image(
        &mut self,
        signal: &GpuSemaphore,
    ) -> Result<AcquireOutcome, GraphicsError>;

    /// Look up an image by index.
    fn image(&self, index: u32) -> Result<SwapchainImage, GraphicsError>;

    /// Present an image after `wait` is signaled.
    fn present(
        &mut self,
        image_index: u32,
        wait: &GpuSemaphore,
    ) -> Result<PresentOutcome, GraphicsError>;
}
