//! Dynamic textures.

use std::collections::HashMap;

use crate::backend::{GpuBackend, GpuTexture};
use crate::error::GraphicsError;
use crate::shaderpack::{TextureDimensionType, TextureResourceData};
use crate::types::{Extent2d, PixelFormat, TextureDescriptor};

/// A render target declared by the shaderpack: image, view and memory.
pub struct DynamicTexture {
    name: String,
    format: PixelFormat,
    extent: Extent2d,
    texture: GpuTexture,
}

impl DynamicTexture {
    /// Texture name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pixel format.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Size in pixels.
    pub fn extent(&self) -> Extent2d {
        self.extent
    }

    /// The GPU texture.
    pub fn gpu_texture(&self) -> &GpuTexture {
        &self.texture
    }
}

impl std::fmt::Debug for DynamicTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicTexture")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("extent", &self.extent)
            .finish()
    }
}

/// Resolve a declared size against the swapchain extent.
///
/// Relative sizes are rounded and never drop below one pixel.
pub fn resolve_extent(
    data: &TextureResourceData,
    swapchain: Extent2d,
) -> Result<Extent2d, GraphicsError> {
    if !(data.width > 0.0 && data.height > 0.0) {
        return Err(GraphicsError::InvalidParameter(format!(
            "texture '{}' has a non-positive size {}x{}",
            data.name, data.width, data.height
        )));
    }
    let extent = match data.dimension_type {
        TextureDimensionType::ScreenRelative => Extent2d::new(
            ((data.width * swapchain.width as f32).round() as u32).max(1),
            ((data.height * swapchain.height as f32).round() as u32).max(1),
        ),
        TextureDimensionType::Absolute => {
            Extent2d::new(data.width.round() as u32, data.height.round() as u32)
        }
    };
    Ok(extent)
}

/// Name-keyed registry of dynamic textures.
#[derive(Debug, Default)]
pub struct DynamicTextures {
    textures: Vec<DynamicTexture>,
    by_name: HashMap<String, usize>,
}

impl DynamicTextures {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create every declared texture.
    ///
    /// On error, the textures created so far are dropped.
    pub fn create(
        backend: &dyn GpuBackend,
        declared: &[TextureResourceData],
        swapchain: Extent2d,
    ) -> Result<Self, GraphicsError> {
        let mut registry = Self::new();
        for data in declared {
            if registry.by_name.contains_key(&data.name) {
                return Err(GraphicsError::InvalidParameter(format!(
                    "texture '{}' is declared twice",
                    data.name
                )));
            }

            let extent = resolve_extent(data, swapchain)?;
            let descriptor =
                TextureDescriptor::render_target(extent.width, extent.height, data.pixel_format)
                    .with_label(data.name.clone());
            let texture = backend.create_texture(&descriptor)?;
            log::debug!(
                "Created dynamic texture '{}' ({}x{} {:?})",
                data.name,
                extent.width,
                extent.height,
                data.pixel_format
            );

            registry
                .by_name
                .insert(data.name.clone(), registry.textures.len());
            registry.textures.push(DynamicTexture {
                name: data.name.clone(),
                format: data.pixel_format,
                extent,
                texture,
            });
        }
        Ok(registry)
    }

    /// Look up a texture by name.
    pub fn get(&self, name: &str) -> Option<&DynamicTexture> {
        self.by_name.get(name).map(|&index| &self.textures[index])
    }

    /// Textures in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &DynamicTexture> {
        self.textures.iter()
    }

    /// Number of textures.
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

static_assertions::assert_impl_all!(DynamicTextures: Send, Sync);

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::backend::{DummyBackend, ResourceKind};

    #[rstest]
    #[case::full(1.0, 1.0, 1920, 1080)]
    #[case::half(0.5, 0.5, 960, 540)]
    #[case::rounded(0.333, 1.0, 639, 1080)]
    #[case::tiny(0.0001, 0.0001, 1, 1)]
    fn relative_sizes_scale_swapchain(
        #[case] width: f32,
        #[case] height: f32,
        #[case] expected_width: u32,
        #[case] expected_height: u32,
    ) {
        let data = TextureResourceData::screen_relative("t", PixelFormat::Rgba8, width, height);
        let extent = resolve_extent(&data, Extent2d::new(1920, 1080)).unwrap();
        assert_eq!(extent, Extent2d::new(expected_width, expected_height));
    }

    #[test]
    fn absolute_sizes_ignore_swapchain() {
        let data = TextureResourceData::absolute("shadow", PixelFormat::Depth, 2048, 2048);
        let extent = resolve_extent(&data, Extent2d::new(640, 480)).unwrap();
        assert_eq!(extent, Extent2d::new(2048, 2048));
    }

    #[test]
    fn zero_size_is_rejected() {
        let data = TextureResourceData::absolute("bad", PixelFormat::Rgba8, 0, 16);
        assert!(resolve_extent(&data, Extent2d::new(640, 480)).is_err());
    }

    #[test]
    fn registry_lookup_by_name() {
        let backend = DummyBackend::new();
        let textures = DynamicTextures::create(
            &backend,
            &[
                TextureResourceData::screen_relative("albedo", PixelFormat::Rgba8, 1.0, 1.0),
                TextureResourceData::screen_relative("normals", PixelFormat::Rgba16F, 1.0, 1.0),
            ],
            Extent2d::new(64, 32),
        )
        .unwrap();
        assert_eq!(textures.len(), 2);
        assert_eq!(textures.get("normals").unwrap().format(), PixelFormat::Rgba16F);
        assert!(textures.get("missing").is_none());
        assert_eq!(backend.journal().live(ResourceKind::Texture), 2);

        drop(textures);
        assert_eq!(backend.journal().live(ResourceKind::Texture), 0);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let backend = DummyBackend::new();
        let declared = [
            TextureResourceData::screen_relative("a", PixelFormat::Rgba8, 1.0, 1.0),
            TextureResourceData::screen_relative("a", PixelFormat::Rgba8, 1.0, 1.0),
        ];
        assert!(DynamicTextures::create(&backend, &declared, Extent2d::new(8, 8)).is_err());
        assert_eq!(backend.journal().live(ResourceKind::Texture), 0);
    }
}
