//! In-memory shaderpack description.
//!
//! A shaderpack is produced by an external loader and handed to
//! [`RenderEngine::set_shaderpack`](crate::RenderEngine::set_shaderpack).
//! Cross references (pass inputs, pipeline target passes, material
//! pipelines) are by name and resolved at load time.
//!
//! # Example
//!
//! ```
//! use nova_graphics::shader::ShaderSource;
//! use nova_graphics::shaderpack::{PipelineData, RenderPassData, ShaderpackData, TextureResourceData};
//! use nova_graphics::types::PixelFormat;
//!
//! let pack = ShaderpackData::new()
//!     .with_texture(TextureResourceData::screen_relative("albedo", PixelFormat::Rgba8, 1.0, 1.0))
//!     .with_pass(RenderPassData::new("gbuffer").with_inputs(["albedo"]).with_outputs(["albedo"]))
//!     .with_pipeline(
//!         PipelineData::new("gbuffer_opaque", "gbuffer")
//!             .with_vertex(ShaderSource::new("gbuffer.vert", "...")),
//!     );
//! assert_eq!(pack.passes.len(), 1);
//! ```

use std::collections::BTreeMap;

use crate::shader::{ShaderSource, ShaderStage};
use crate::types::PixelFormat;

/// Everything one shaderpack declares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderpackData {
    /// Render passes, in declaration order.
    pub passes: Vec<RenderPassData>,
    /// Pipelines.
    pub pipelines: Vec<PipelineData>,
    /// Dynamic textures.
    pub textures: Vec<TextureResourceData>,
    /// Materials.
    pub materials: Vec<MaterialData>,
}

impl ShaderpackData {
    /// Create an empty shaderpack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a render pass.
    pub fn with_pass(mut self, pass: RenderPassData) -> Self {
        self.passes.push(pass);
        self
    }

    /// Add a pipeline.
    pub fn with_pipeline(mut self, pipeline: PipelineData) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    /// Add a dynamic texture.
    pub fn with_texture(mut self, texture: TextureResourceData) -> Self {
        self.textures.push(texture);
        self
    }

    /// Add a material.
    pub fn with_material(mut self, material: MaterialData) -> Self {
        self.materials.push(material);
        self
    }
}

/// A declared render pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RenderPassData {
    /// Unique pass name.
    pub name: String,
    /// Textures the pass reads; they become its colour attachments.
    pub texture_inputs: Vec<String>,
    /// Textures the pass writes.
    pub texture_outputs: Vec<String>,
}

impl RenderPassData {
    /// Create a pass with no inputs or outputs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the texture inputs.
    pub fn with_inputs<S: Into<String>>(mut self, inputs: impl IntoIterator<Item = S>) -> Self {
        self.texture_inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Set the texture outputs.
    pub fn with_outputs<S: Into<String>>(mut self, outputs: impl IntoIterator<Item = S>) -> Self {
        self.texture_outputs = outputs.into_iter().map(Into::into).collect();
        self
    }
}

/// Primitive assembly mode of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    Triangles,
    Lines,
}

/// Blend factor for the colour or alpha channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Source and destination factors for colour and alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendFactors {
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

impl Default for BlendFactors {
    /// Overwrite: source one, destination zero.
    fn default() -> Self {
        Self {
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
        }
    }
}

/// A declared graphics pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineData {
    /// Unique pipeline name.
    pub name: String,
    /// Name of the pass the pipeline renders in.
    pub pass: String,
    /// Vertex stage. Required.
    pub vertex_shader: Option<ShaderSource>,
    /// Tessellation control stage.
    pub tessellation_control_shader: Option<ShaderSource>,
    /// Tessellation evaluation stage.
    pub tessellation_evaluation_shader: Option<ShaderSource>,
    /// Geometry stage.
    pub geometry_shader: Option<ShaderSource>,
    /// Fragment stage.
    pub fragment_shader: Option<ShaderSource>,
    /// Primitive assembly mode.
    pub primitive_mode: PrimitiveTopology,
    /// Blend factors.
    pub blend: BlendFactors,
    /// Constant depth bias.
    pub depth_bias: f32,
    /// Slope-scaled depth bias.
    pub slope_scaled_depth_bias: f32,
}

impl PipelineData {
    /// Create a pipeline targeting `pass` with no stages.
    pub fn new(name: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pass: pass.into(),
            ..Self::default()
        }
    }

    /// Set the vertex stage.
    pub fn with_vertex(mut self, source: ShaderSource) -> Self {
        self.vertex_shader = Some(source);
        self
    }

    /// Set both tessellation stages.
    pub fn with_tessellation(mut self, control: ShaderSource, evaluation: ShaderSource) -> Self {
        self.tessellation_control_shader = Some(control);
        self.tessellation_evaluation_shader = Some(evaluation);
        self
    }

    /// Set the geometry stage.
    pub fn with_geometry(mut self, source: ShaderSource) -> Self {
        self.geometry_shader = Some(source);
        self
    }

    /// Set the fragment stage.
    pub fn with_fragment(mut self, source: ShaderSource) -> Self {
        self.fragment_shader = Some(source);
        self
    }

    /// Set the primitive mode.
    pub fn with_primitive_mode(mut self, mode: PrimitiveTopology) -> Self {
        self.primitive_mode = mode;
        self
    }

    /// Set the blend factors.
    pub fn with_blend(mut self, blend: BlendFactors) -> Self {
        self.blend = blend;
        self
    }

    /// Set the depth bias terms.
    pub fn with_depth_bias(mut self, constant: f32, slope_scaled: f32) -> Self {
        self.depth_bias = constant;
        self.slope_scaled_depth_bias = slope_scaled;
        self
    }

    /// Declared stages in pipeline order.
    pub fn stages(&self) -> impl Iterator<Item = (ShaderStage, &ShaderSource)> {
        [
            (ShaderStage::Vertex, &self.vertex_shader),
            (
                ShaderStage::TessellationControl,
                &self.tessellation_control_shader,
            ),
            (
                ShaderStage::TessellationEvaluation,
                &self.tessellation_evaluation_shader,
            ),
            (ShaderStage::Geometry, &self.geometry_shader),
            (ShaderStage::Fragment, &self.fragment_shader),
        ]
        .into_iter()
        .filter_map(|(stage, source)| source.as_ref().map(|s| (stage, s)))
    }
}

/// How a dynamic texture's size is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimensionType {
    /// Width and height scale the swapchain extent.
    #[default]
    ScreenRelative,
    /// Width and height are pixels.
    Absolute,
}

/// A declared dynamic texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureResourceData {
    /// Unique texture name.
    pub name: String,
    /// Pixel format.
    pub pixel_format: PixelFormat,
    /// How `width` and `height` are interpreted.
    pub dimension_type: TextureDimensionType,
    /// Width, in pixels or as a fraction of the swapchain width.
    pub width: f32,
    /// Height, in pixels or as a fraction of the swapchain height.
    pub height: f32,
}

impl TextureResourceData {
    /// A texture sized relative to the swapchain.
    pub fn screen_relative(
        name: impl Into<String>,
        pixel_format: PixelFormat,
        width: f32,
        height: f32,
    ) -> Self {
        Self {
            name: name.into(),
            pixel_format,
            dimension_type: TextureDimensionType::ScreenRelative,
            width,
            height,
        }
    }

    /// A texture with a fixed size in pixels.
    pub fn absolute(name: impl Into<String>, pixel_format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            pixel_format,
            dimension_type: TextureDimensionType::Absolute,
            width: width as f32,
            height: height as f32,
        }
    }
}

/// One pass of a material.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialPass {
    /// Name of the material pass.
    pub name: String,
    /// Pipeline the pass renders with.
    pub pipeline: String,
    /// Shader resource name to bound resource name.
    pub bindings: BTreeMap<String, String>,
}

/// A declared material. Lookup-only metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialData {
    /// Unique material name.
    pub name: String,
    /// Passes of the material.
    pub passes: Vec<MaterialPass>,
    /// Expression selecting the geometry the material applies to.
    pub geometry_filter: String,
}
