//! Shaderpack-owned GPU resources.
//!
//! - [`DynamicTexture`] - a render target declared by the shaderpack
//! - [`DynamicTextures`] - the registry passes resolve their inputs against
//!
//! Passes and pipelines refer to textures by name; nothing holds a texture
//! handle outside the registry.

mod texture;

pub use texture::{DynamicTexture, DynamicTextures, resolve_extent};
