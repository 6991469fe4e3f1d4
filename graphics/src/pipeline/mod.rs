//! Graphics pipeline compilation.
//!
//! Each [`PipelineData`] of a shaderpack is turned into a [`CompiledPipeline`]:
//!
//! 1. every declared stage is compiled by the [`ShaderCompiler`] and loaded
//!    as a shader module
//! 2. the stages' reflected bindings are merged by name ([`BindingSet`])
//! 3. the merged bindings are grouped into contiguous descriptor sets, one
//!    set layout each, and a pipeline layout over them in set order
//! 4. the pipeline is created against the already compiled pass it targets
//!
//! # Fixed-Function State
//!
//! Everything not taken from the descriptor is constant:
//!
//! | State | Value |
//! |-------|-------|
//! | Cull mode | back faces |
//! | Front face | clockwise |
//! | Depth bias | enabled, constant and slope terms from the descriptor |
//! | Blend op | add, for colour and alpha |
//! | Colour blend attachments | one per colour attachment of the pass |
//! | Viewport and scissor | the full swapchain extent |

mod bindings;

use std::collections::HashMap;

use crate::backend::{
    GpuBackend, GpuDescriptorSetLayout, GpuPipeline, GpuPipelineLayout, GpuRenderPass,
    GpuShaderModule,
};
use crate::error::{ConfigError, GraphicsError};
use crate::graph::CompiledPasses;
use crate::shader::{ShaderCompiler, ShaderStage};
use crate::shaderpack::{BlendFactors, PipelineData, PrimitiveTopology};
use crate::types::{Extent2d, ScissorRect, Viewport};

pub use bindings::{BindingSet, ResourceBinding};

/// A shader module bound to one pipeline stage.
#[derive(Debug, Clone, Copy)]
pub struct PipelineStage<'a> {
    /// The stage.
    pub stage: ShaderStage,
    /// Module compiled for the stage.
    pub module: &'a GpuShaderModule,
    /// Entry point name.
    pub entry_point: &'a str,
}

/// Everything a backend needs to create a graphics pipeline.
#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    /// Pipeline name, for logs and debug labels.
    pub name: &'a str,
    /// Stages in pipeline order. The vertex stage is always present.
    pub stages: &'a [PipelineStage<'a>],
    /// Pipeline layout.
    pub layout: &'a GpuPipelineLayout,
    /// Render pass the pipeline is used in.
    pub render_pass: &'a GpuRenderPass,
    /// Colour attachment count of the render pass.
    pub color_attachment_count: u32,
    /// Primitive assembly mode.
    pub topology: PrimitiveTopology,
    /// Blend factors applied to every colour attachment.
    pub blend: BlendFactors,
    /// Constant depth bias.
    pub depth_bias: f32,
    /// Slope-scaled depth bias.
    pub slope_scaled_depth_bias: f32,
    /// Viewport.
    pub viewport: Viewport,
    /// Scissor.
    pub scissor: ScissorRect,
}

/// A pipeline together with the layouts it was built from.
///
/// Fields drop in declaration order: the pipeline goes before its layout,
/// and the layout before the set layouts.
pub struct CompiledPipeline {
    pipeline: GpuPipeline,
    layout: GpuPipelineLayout,
    set_layouts: Vec<GpuDescriptorSetLayout>,
    name: String,
    pass: String,
    sets: Vec<Vec<ResourceBinding>>,
    viewport: Viewport,
    scissor: ScissorRect,
}

impl CompiledPipeline {
    /// Compile `data` against the compiled passes.
    ///
    /// The shader modules are only needed while the pipeline is created and
    /// are released before this returns.
    pub fn compile(
        backend: &dyn GpuBackend,
        compiler: &dyn ShaderCompiler,
        data: &PipelineData,
        passes: &CompiledPasses,
        extent: Extent2d,
    ) -> Result<Self, GraphicsError> {
        if data.vertex_shader.is_none() {
            return Err(ConfigError::MissingVertexStage(data.name.clone()).into());
        }
        let pass = passes
            .get(&data.pass)
            .ok_or_else(|| ConfigError::UnknownPass {
                pipeline: data.name.clone(),
                pass: data.pass.clone(),
            })?;

        let mut bindings = BindingSet::new();
        let mut modules = Vec::new();
        for (stage, source) in data.stages() {
            let compiled = compiler.compile(stage, source).map_err(|e| match e {
                GraphicsError::ShaderCompilationFailed(msg) => GraphicsError::ShaderCompilationFailed(
                    format!("pipeline '{}', {}: {msg}", data.name, source.filename),
                ),
                other => other,
            })?;
            bindings.merge(&data.name, stage, &compiled.bindings)?;
            let module = backend.create_shader_module(stage, &compiled.words)?;
            modules.push((stage, module, source.entry_point.as_str()));
        }

        let sets = bindings.into_sets(&data.name)?;
        let set_layouts = sets
            .iter()
            .map(|set| backend.create_descriptor_set_layout(set))
            .collect::<Result<Vec<_>, _>>()?;
        let layout = backend.create_pipeline_layout(&set_layouts)?;

        let stages: Vec<PipelineStage<'_>> = modules
            .iter()
            .map(|(stage, module, entry_point)| PipelineStage {
                stage: *stage,
                module,
                entry_point: *entry_point,
            })
            .collect();
        let viewport = Viewport::from_extent(extent);
        let scissor = ScissorRect::from_extent(extent);
        let pipeline = backend.create_graphics_pipeline(&GraphicsPipelineDesc {
            name: &data.name,
            stages: &stages,
            layout: &layout,
            render_pass: pass.render_pass(),
            color_attachment_count: pass.layout().color_attachment_count(),
            topology: data.primitive_mode,
            blend: data.blend,
            depth_bias: data.depth_bias,
            slope_scaled_depth_bias: data.slope_scaled_depth_bias,
            viewport,
            scissor,
        })?;

        log::debug!(
            "Compiled pipeline '{}' for pass '{}' ({} stages, {} descriptor sets)",
            data.name,
            data.pass,
            stages.len(),
            sets.len()
        );

        Ok(Self {
            pipeline,
            layout,
            set_layouts,
            name: data.name.clone(),
            pass: data.pass.clone(),
            sets,
            viewport,
            scissor,
        })
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the pass the pipeline renders in.
    pub fn pass(&self) -> &str {
        &self.pass
    }

    /// Merged bindings grouped by set index.
    pub fn descriptor_sets(&self) -> &[Vec<ResourceBinding>] {
        &self.sets
    }

    /// The pipeline object.
    pub fn pipeline(&self) -> &GpuPipeline {
        &self.pipeline
    }

    /// The pipeline layout.
    pub fn layout(&self) -> &GpuPipelineLayout {
        &self.layout
    }

    /// Set layouts in set-index order.
    pub fn set_layouts(&self) -> &[GpuDescriptorSetLayout] {
        &self.set_layouts
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn scissor(&self) -> ScissorRect {
        self.scissor
    }
}

impl std::fmt::Debug for CompiledPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPipeline")
            .field("name", &self.name)
            .field("pass", &self.pass)
            .field("sets", &self.sets.len())
            .finish_non_exhaustive()
    }
}

/// Compiled pipelines of the loaded shaderpack, by name.
#[derive(Debug, Default)]
pub struct CompiledPipelines {
    pipelines: HashMap<String, CompiledPipeline>,
}

impl CompiledPipelines {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every declared pipeline.
    pub fn compile(
        backend: &dyn GpuBackend,
        compiler: &dyn ShaderCompiler,
        declared: &[PipelineData],
        passes: &CompiledPasses,
        extent: Extent2d,
    ) -> Result<Self, GraphicsError> {
        let mut result = Self::new();
        for data in declared {
            if result.pipelines.contains_key(&data.name) {
                return Err(GraphicsError::InvalidParameter(format!(
                    "pipeline '{}' is declared twice",
                    data.name
                )));
            }
            let pipeline = CompiledPipeline::compile(backend, compiler, data, passes, extent)?;
            result.pipelines.insert(data.name.clone(), pipeline);
        }
        Ok(result)
    }

    /// Look up a pipeline by name.
    pub fn get(&self, name: &str) -> Option<&CompiledPipeline> {
        self.pipelines.get(name)
    }

    /// Pipelines rendering in `pass`.
    pub fn for_pass<'a>(&'a self, pass: &'a str) -> impl Iterator<Item = &'a CompiledPipeline> {
        self.pipelines.values().filter(move |p| p.pass == pass)
    }

    /// Number of pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Check if there are no pipelines.
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::backend::{DummyBackend, DummyEvent, ResourceKind};
    use crate::resources::DynamicTextures;
    use crate::shader::{CompiledShader, DescriptorType, ReflectedBinding, ShaderSource};
    use crate::shaderpack::{RenderPassData, TextureResourceData};
    use crate::types::PixelFormat;

    /// Returns canned output keyed by file name.
    #[derive(Default)]
    struct TableCompiler {
        table: HashMap<String, Vec<ReflectedBinding>>,
    }

    impl TableCompiler {
        fn with(mut self, filename: &str, bindings: Vec<ReflectedBinding>) -> Self {
            self.table.insert(filename.to_string(), bindings);
            self
        }
    }

    impl ShaderCompiler for TableCompiler {
        fn compile(
            &self,
            _stage: ShaderStage,
            source: &ShaderSource,
        ) -> Result<CompiledShader, GraphicsError> {
            let bindings = self.table.get(&source.filename).ok_or_else(|| {
                GraphicsError::ShaderCompilationFailed(format!("no entry for {}", source.filename))
            })?;
            Ok(CompiledShader {
                words: vec![0x0723_0203, 0],
                bindings: bindings.clone(),
            })
        }
    }

    fn camera() -> ReflectedBinding {
        ReflectedBinding::new("camera", 0, 0, DescriptorType::UniformBuffer)
    }

    fn passes(backend: &DummyBackend) -> (DynamicTextures, CompiledPasses) {
        let textures = DynamicTextures::create(
            backend,
            &[
                TextureResourceData::screen_relative("albedo", PixelFormat::Rgba8, 1.0, 1.0),
                TextureResourceData::screen_relative("normals", PixelFormat::Rgba8, 1.0, 1.0),
            ],
            Extent2d::new(320, 200),
        )
        .unwrap();
        let passes = CompiledPasses::compile(
            backend,
            &[RenderPassData::new("gbuffer").with_inputs(["albedo", "normals"])],
            &textures,
        )
        .unwrap();
        (textures, passes)
    }

    fn gbuffer_pipeline() -> PipelineData {
        PipelineData::new("opaque", "gbuffer")
            .with_vertex(ShaderSource::new("opaque.vert", ""))
            .with_fragment(ShaderSource::new("opaque.frag", ""))
    }

    #[test]
    fn compiles_layouts_from_merged_bindings() {
        let backend = DummyBackend::new();
        let (_textures, passes) = passes(&backend);
        let compiler = TableCompiler::default()
            .with("opaque.vert", vec![camera()])
            .with(
                "opaque.frag",
                vec![
                    camera(),
                    ReflectedBinding::new("albedo_map", 1, 0, DescriptorType::SampledImage),
                ],
            );

        let pipeline = CompiledPipeline::compile(
            &backend,
            &compiler,
            &gbuffer_pipeline(),
            &passes,
            Extent2d::new(320, 200),
        )
        .unwrap();

        assert_eq!(pipeline.set_layouts().len(), 2);
        assert_eq!(pipeline.descriptor_sets()[0][0].name, "camera");
        assert_eq!(pipeline.viewport().width, 320.0);
        assert_eq!(pipeline.scissor().height, 200);
        // Modules are released once the pipeline exists.
        assert_eq!(backend.journal().live(ResourceKind::ShaderModule), 0);
        assert_eq!(backend.journal().live(ResourceKind::Pipeline), 1);
    }

    #[test]
    fn missing_vertex_stage_is_rejected() {
        let backend = DummyBackend::new();
        let (_textures, passes) = passes(&backend);
        let data = PipelineData::new("broken", "gbuffer")
            .with_fragment(ShaderSource::new("opaque.frag", ""));
        let err = CompiledPipeline::compile(
            &backend,
            &TableCompiler::default(),
            &data,
            &passes,
            Extent2d::new(8, 8),
        )
        .unwrap_err();
        assert_eq!(
            err,
            GraphicsError::Configuration(ConfigError::MissingVertexStage("broken".to_string()))
        );
    }

    #[test]
    fn unknown_pass_is_rejected() {
        let backend = DummyBackend::new();
        let (_textures, passes) = passes(&backend);
        let data = PipelineData::new("p", "lighting").with_vertex(ShaderSource::new("a.vert", ""));
        let err = CompiledPipeline::compile(
            &backend,
            &TableCompiler::default().with("a.vert", vec![]),
            &data,
            &passes,
            Extent2d::new(8, 8),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::Configuration(ConfigError::UnknownPass { .. })
        ));
    }

    #[test]
    fn conflicting_stage_types_are_rejected() {
        let backend = DummyBackend::new();
        let (_textures, passes) = passes(&backend);
        let compiler = TableCompiler::default()
            .with("opaque.vert", vec![camera()])
            .with(
                "opaque.frag",
                vec![ReflectedBinding::new("camera", 0, 0, DescriptorType::StorageBuffer)],
            );
        let err = CompiledPipeline::compile(
            &backend,
            &compiler,
            &gbuffer_pipeline(),
            &passes,
            Extent2d::new(8, 8),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::Configuration(ConfigError::BindingMismatch { .. })
        ));
        assert_eq!(backend.journal().live(ResourceKind::ShaderModule), 0);
    }

    #[test]
    fn set_gap_is_rejected() {
        let backend = DummyBackend::new();
        let (_textures, passes) = passes(&backend);
        let compiler = TableCompiler::default()
            .with("opaque.vert", vec![camera()])
            .with(
                "opaque.frag",
                vec![ReflectedBinding::new("lights", 2, 0, DescriptorType::UniformBuffer)],
            );
        let err = CompiledPipeline::compile(
            &backend,
            &compiler,
            &gbuffer_pipeline(),
            &passes,
            Extent2d::new(8, 8),
        )
        .unwrap_err();
        assert_eq!(
            err,
            GraphicsError::Configuration(ConfigError::DescriptorSetGap {
                pipeline: "opaque".to_string(),
                set: 1,
            })
        );
    }

    #[test]
    fn compile_errors_name_the_pipeline() {
        let backend = DummyBackend::new();
        let (_textures, passes) = passes(&backend);
        let err = CompiledPipeline::compile(
            &backend,
            &TableCompiler::default(),
            &gbuffer_pipeline(),
            &passes,
            Extent2d::new(8, 8),
        )
        .unwrap_err();
        assert!(err.to_string().contains("pipeline 'opaque', opaque.vert"));
    }

    #[test]
    fn pipeline_drops_before_its_layout() {
        let backend = DummyBackend::new();
        let (_textures, passes) = passes(&backend);
        let compiler = TableCompiler::default()
            .with("opaque.vert", vec![camera()])
            .with("opaque.frag", vec![]);
        let pipeline = CompiledPipeline::compile(
            &backend,
            &compiler,
            &gbuffer_pipeline(),
            &passes,
            Extent2d::new(8, 8),
        )
        .unwrap();

        backend.journal().clear();
        drop(pipeline);
        let destroyed: Vec<_> = backend
            .journal()
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DummyEvent::Destroyed { kind, .. } => Some(kind),
                _ => None,
            })
            .collect();
        assert_eq!(
            destroyed,
            vec![
                ResourceKind::Pipeline,
                ResourceKind::PipelineLayout,
                ResourceKind::DescriptorSetLayout,
            ]
        );
    }

    #[test]
    fn registry_rejects_duplicates_and_groups_by_pass() {
        let backend = DummyBackend::new();
        let (_textures, passes) = passes(&backend);
        let compiler = TableCompiler::default()
            .with("opaque.vert", vec![])
            .with("opaque.frag", vec![]);

        let pipelines = CompiledPipelines::compile(
            &backend,
            &compiler,
            &[gbuffer_pipeline()],
            &passes,
            Extent2d::new(8, 8),
        )
        .unwrap();
        assert_eq!(pipelines.len(), 1);
        assert_eq!(pipelines.for_pass("gbuffer").count(), 1);
        assert!(pipelines.get("opaque").is_some());

        assert!(
            CompiledPipelines::compile(
                &backend,
                &compiler,
                &[gbuffer_pipeline(), gbuffer_pipeline()],
                &passes,
                Extent2d::new(8, 8),
            )
            .is_err()
        );
    }
}
