//! Texture types and descriptors.

use bitflags::bitflags;

/// Pixel formats a shaderpack may declare for its dynamic textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 8 bits per channel RGBA, unsigned normalized.
    #[default]
    Rgba8,
    /// 16-bit float RGBA.
    Rgba16F,
    /// 32-bit float RGBA.
    Rgba32F,
    /// 32-bit float depth.
    Depth,
    /// 24-bit depth with 8-bit stencil.
    DepthStencil,
}

impl PixelFormat {
    /// Check if this is a depth (or depth-stencil) format.
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth | Self::DepthStencil)
    }

    /// Check if this format has a stencil component.
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::DepthStencil)
    }

    /// Size of one texel in bytes.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8 | Self::Depth | Self::DepthStencil => 4,
            Self::Rgba16F => 8,
            Self::Rgba32F => 16,
        }
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be sampled in a shader.
        const SAMPLED = 1 << 0;
        /// Texture can be used as a color attachment.
        const COLOR_ATTACHMENT = 1 << 1;
        /// Texture can be used as a depth/stencil attachment.
        const DEPTH_STENCIL_ATTACHMENT = 1 << 2;
        /// Texture can be copied to.
        const COPY_DST = 1 << 3;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a 2D texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: PixelFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a render-target descriptor: attachment plus sampled usage,
    /// picking the attachment kind from the format.
    pub fn render_target(width: u32, height: u32, format: PixelFormat) -> Self {
        let attachment = if format.is_depth() {
            TextureUsage::DEPTH_STENCIL_ATTACHMENT
        } else {
            TextureUsage::COLOR_ATTACHMENT
        };
        Self {
            label: None,
            width,
            height,
            format,
            usage: attachment | TextureUsage::SAMPLED,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_formats() {
        assert!(PixelFormat::Depth.is_depth());
        assert!(PixelFormat::DepthStencil.is_depth());
        assert!(PixelFormat::DepthStencil.has_stencil());
        assert!(!PixelFormat::Rgba16F.is_depth());
        assert_eq!(PixelFormat::Rgba32F.bytes_per_pixel(), 16);
    }

    #[test]
    fn render_target_usage_follows_format() {
        let color = TextureDescriptor::render_target(4, 4, PixelFormat::Rgba8);
        assert!(color.usage.contains(TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED));

        let depth = TextureDescriptor::render_target(4, 4, PixelFormat::Depth);
        assert!(depth.usage.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT));
        assert!(!depth.usage.contains(TextureUsage::COLOR_ATTACHMENT));
    }
}
