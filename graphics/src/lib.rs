//! # Nova Graphics
//!
//! GPU execution core of the Nova renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderEngine`] - the renderer context: mesh streaming, shaderpack
//!   loading and the frame loop
//! - [`mesh`] - megabuffer block allocation, staging buffers and uploads
//! - [`graph`] - render-pass ordering and render-pass objects
//! - [`pipeline`] - graphics pipelines and their descriptor-set layouts
//! - [`backend`] - the device/queue abstraction, with Vulkan and Dummy
//!   (for testing) implementations
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use nova_graphics::backend::{DummyBackend, DummySwapchain};
//! use nova_graphics::shader::NagaShaderCompiler;
//! use nova_graphics::types::Extent2d;
//! use nova_graphics::{FullVertex, MeshData, RenderEngine, RenderSettings};
//!
//! let backend = Arc::new(DummyBackend::new());
//! let swapchain = DummySwapchain::new(&backend, Extent2d::new(800, 600), 2);
//! let mut engine = RenderEngine::new(
//!     backend,
//!     Box::new(swapchain),
//!     Box::new(NagaShaderCompiler::new()),
//!     RenderSettings::default().with_worker_threads(2),
//! )
//! .unwrap();
//!
//! let triangle = MeshData::new(vec![
//!     FullVertex::at([0.0, 0.0, 0.0]),
//!     FullVertex::at([1.0, 0.0, 0.0]),
//!     FullVertex::at([0.0, 1.0, 0.0]),
//! ]);
//! let id = engine.add_mesh(triangle).unwrap();
//! engine.render_frame().unwrap();
//! engine.delete_mesh(id).unwrap();
//! ```

pub mod backend;
pub mod engine;
pub mod error;
pub mod frame;
pub mod graph;
pub mod mesh;
pub mod pipeline;
pub mod resources;
pub mod settings;
pub mod shader;
pub mod shaderpack;
pub mod swapchain;
pub mod types;

// Re-export main types for convenience
pub use backend::{DummyBackend, GpuBackend, create_backend};
pub use engine::{FrameStatus, RenderEngine};
pub use error::{ConfigError, GraphicsError};
pub use graph::{PassHandle, RenderGraph};
pub use mesh::{FullVertex, MeshData, MeshId};
pub use settings::{MeshOptions, RenderSettings};
pub use shaderpack::ShaderpackData;
pub use types::{BufferDescriptor, BufferUsage, Extent2d, PixelFormat, TextureDescriptor};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy Backend");
    }
}
