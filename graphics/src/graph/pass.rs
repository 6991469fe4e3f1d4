//! Materializing one declared pass into a render-pass object.

use crate::backend::{GpuBackend, GpuRenderPass};
use crate::error::{ConfigError, GraphicsError};
use crate::resources::DynamicTextures;
use crate::shaderpack::RenderPassData;
use crate::types::PixelFormat;

use super::target::{AttachmentLayout, LoadOp, StoreOp};

/// One attachment of a render pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentDescription {
    /// Dynamic texture bound to the attachment.
    pub texture: String,
    /// Format of the texture.
    pub format: PixelFormat,
    /// Load operation.
    pub load_op: LoadOp,
    /// Store operation.
    pub store_op: StoreOp,
    /// Layout on entry to the pass.
    pub initial_layout: AttachmentLayout,
    /// Layout on exit from the pass.
    pub final_layout: AttachmentLayout,
}

/// Reference from the subpass to an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentReference {
    /// Index into [`RenderPassLayout::attachments`].
    pub attachment: u32,
    /// Layout during the subpass.
    pub layout: AttachmentLayout,
}

/// Ordering between the subpass and work outside the render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubpassDependency {
    /// Colour attachment writes submitted earlier are visible before the
    /// subpass's colour attachment output stage starts.
    ExternalColorWrites,
}

/// Everything needed to create a single-subpass render pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPassLayout {
    /// Pass name.
    pub name: String,
    /// Attachments in input declaration order.
    pub attachments: Vec<AttachmentDescription>,
    /// Colour attachment references of the subpass.
    pub color_references: Vec<AttachmentReference>,
    /// Dependencies of the subpass.
    pub dependencies: Vec<SubpassDependency>,
}

impl RenderPassLayout {
    /// Resolve a declared pass against the dynamic textures.
    ///
    /// Every texture input becomes a colour attachment that keeps its
    /// contents across the pass. There is no depth attachment at this level.
    pub fn from_pass(pass: &RenderPassData, textures: &DynamicTextures) -> Result<Self, ConfigError> {
        let mut attachments = Vec::with_capacity(pass.texture_inputs.len());
        let mut color_references = Vec::with_capacity(pass.texture_inputs.len());

        for (index, input) in pass.texture_inputs.iter().enumerate() {
            let texture = textures.get(input).ok_or_else(|| ConfigError::UnknownTexture {
                pass: pass.name.clone(),
                texture: input.clone(),
            })?;
            if texture.format().is_depth() {
                return Err(ConfigError::DepthAttachment {
                    pass: pass.name.clone(),
                    texture: input.clone(),
                });
            }

            attachments.push(AttachmentDescription {
                texture: input.clone(),
                format: texture.format(),
                load_op: LoadOp::Load,
                store_op: StoreOp::Store,
                initial_layout: AttachmentLayout::ShaderReadOnly,
                final_layout: AttachmentLayout::ShaderReadOnly,
            });
            color_references.push(AttachmentReference {
                attachment: index as u32,
                layout: AttachmentLayout::ColorAttachment,
            });
        }

        Ok(Self {
            name: pass.name.clone(),
            attachments,
            color_references,
            dependencies: vec![SubpassDependency::ExternalColorWrites],
        })
    }

    /// Number of colour attachments.
    pub fn color_attachment_count(&self) -> u32 {
        self.color_references.len() as u32
    }
}

/// A render pass ready for pipelines to target.
pub struct CompiledPass {
    position: usize,
    layout: RenderPassLayout,
    render_pass: GpuRenderPass,
}

impl CompiledPass {
    /// Build the render-pass object for `pass`.
    pub fn compile(
        backend: &dyn GpuBackend,
        pass: &RenderPassData,
        textures: &DynamicTextures,
        position: usize,
    ) -> Result<Self, GraphicsError> {
        let layout = RenderPassLayout::from_pass(pass, textures)?;
        let render_pass = backend.create_render_pass(&layout)?;
        log::debug!(
            "Compiled render pass '{}' at position {} ({} attachments)",
            pass.name,
            position,
            layout.attachments.len()
        );
        Ok(Self {
            position,
            layout,
            render_pass,
        })
    }

    /// Pass name.
    pub fn name(&self) -> &str {
        &self.layout.name
    }

    /// Position in the topological order.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The resolved layout.
    pub fn layout(&self) -> &RenderPassLayout {
        &self.layout
    }

    /// The render-pass object.
    pub fn render_pass(&self) -> &GpuRenderPass {
        &self.render_pass
    }
}

impl std::fmt::Debug for CompiledPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPass")
            .field("name", &self.layout.name)
            .field("position", &self.position)
            .field("attachments", &self.layout.attachments.len())
            .finish()
    }
}
