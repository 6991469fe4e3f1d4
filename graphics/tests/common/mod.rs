//! Common test utilities for graphics integration tests.
//!
//! This module provides shared infrastructure for testing the engine across
//! backends. Tests run against the Dummy backend everywhere and against
//! Vulkan where a device is present.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use nova_graphics::backend::{DummyBackend, DummySwapchain, GpuBackend};
use nova_graphics::error::GraphicsError;
use nova_graphics::shader::{
    CompiledShader, DescriptorType, ReflectedBinding, ShaderCompiler, ShaderSource, ShaderStage,
};
use nova_graphics::shaderpack::{
    MaterialData, MaterialPass, PipelineData, RenderPassData, TextureResourceData,
};
use nova_graphics::types::{Extent2d, PixelFormat};
use nova_graphics::{FullVertex, MeshData, RenderEngine, RenderSettings, ShaderpackData};

// ============================================================================
// Backend Selection
// ============================================================================

/// Backend types available for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Dummy backend (no GPU operations, always available).
    Dummy,
    /// Vulkan backend (requires a Vulkan-capable device).
    Vulkan,
}

impl Backend {
    /// Check if this backend is available on the current system.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            Backend::Vulkan => cfg!(feature = "vulkan-backend"),
        }
    }

    /// Get a human-readable name for this backend.
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Dummy => "Dummy",
            Backend::Vulkan => "Vulkan",
        }
    }

    /// Create the backend, or `None` if it cannot be created here.
    pub fn create(&self) -> Option<Arc<dyn GpuBackend>> {
        init_logging();
        if !self.is_available() {
            return None;
        }
        match self {
            Backend::Dummy => Some(Arc::new(DummyBackend::new())),
            Backend::Vulkan => create_vulkan(),
        }
    }
}

#[cfg(feature = "vulkan-backend")]
fn create_vulkan() -> Option<Arc<dyn GpuBackend>> {
    use nova_graphics::backend::vulkan::{VulkanBackend, VulkanParameters};

    // Validation layers are rarely installed on test machines.
    let params = VulkanParameters {
        validation: false,
        ..VulkanParameters::default()
    };
    match VulkanBackend::new(&params) {
        Ok(backend) => Some(Arc::new(backend)),
        Err(e) => {
            eprintln!("Vulkan backend unavailable: {e}");
            None
        }
    }
}

#[cfg(not(feature = "vulkan-backend"))]
fn create_vulkan() -> Option<Arc<dyn GpuBackend>> {
    None
}

/// Route `log` output to the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Test Engine
// ============================================================================

/// An engine on the Dummy backend plus handles to steer and observe it.
pub struct TestEngine {
    pub engine: RenderEngine,
    pub backend: Arc<DummyBackend>,
    pub swapchain: DummySwapchain,
}

impl TestEngine {
    /// Engine with default settings and a 3-image swapchain.
    pub fn new() -> Self {
        Self::with_settings(RenderSettings::default().with_worker_threads(2))
    }

    /// Engine with the given settings.
    pub fn with_settings(settings: RenderSettings) -> Self {
        Self::try_with(settings, table_compiler()).expect("Failed to create engine")
    }

    /// Engine with the given settings and compiler.
    pub fn try_with(
        settings: RenderSettings,
        compiler: TableCompiler,
    ) -> Result<Self, GraphicsError> {
        init_logging();
        let backend = Arc::new(DummyBackend::new());
        let swapchain = DummySwapchain::new(&backend, Extent2d::new(640, 480), 3);
        let engine = RenderEngine::new(
            Arc::clone(&backend) as Arc<dyn GpuBackend>,
            Box::new(swapchain.clone()),
            Box::new(compiler),
            settings,
        )?;
        Ok(Self {
            engine,
            backend,
            swapchain,
        })
    }
}

// ============================================================================
// Shader Compilation
// ============================================================================

/// Compiler answering from a table keyed by file name.
///
/// Every known file compiles to a minimal SPIR-V header with the listed
/// bindings; unknown files fail to compile.
#[derive(Debug, Default, Clone)]
pub struct TableCompiler {
    table: HashMap<String, Vec<ReflectedBinding>>,
}

impl TableCompiler {
    /// Register a file and the bindings it reflects.
    pub fn with(mut self, filename: &str, bindings: Vec<ReflectedBinding>) -> Self {
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
            GraphicsError::ShaderCompilationFailed(format!("unknown file {}", source.filename))
        })?;
        Ok(CompiledShader {
            words: vec![0x0723_0203, 0],
            bindings: bindings.clone(),
        })
    }
}

/// Camera uniform at set 0, binding 0.
pub fn camera() -> ReflectedBinding {
    ReflectedBinding::new("camera", 0, 0, DescriptorType::UniformBuffer)
}

/// A compiler knowing the shaders used by [`deferred_shaderpack`].
pub fn table_compiler() -> TableCompiler {
    TableCompiler::default()
        .with("gbuffer.vert", vec![camera()])
        .with(
            "gbuffer.frag",
            vec![
                camera(),
                ReflectedBinding::new("albedo_map", 1, 0, DescriptorType::SampledImage),
            ],
        )
        .with("lighting.vert", vec![])
        .with(
            "lighting.frag",
            vec![ReflectedBinding::new(
                "lit_output",
                0,
                0,
                DescriptorType::SampledImage,
            )],
        )
}

// ============================================================================
// Shaderpacks
// ============================================================================

/// A three-pass deferred shaderpack, declared out of execution order.
///
/// Executes as `gbuffer`, `lighting`, `tonemap`.
pub fn deferred_shaderpack() -> ShaderpackData {
    ShaderpackData::new()
        .with_texture(TextureResourceData::screen_relative(
            "albedo",
            PixelFormat::Rgba8,
            1.0,
            1.0,
        ))
        .with_texture(TextureResourceData::screen_relative(
            "lit",
            PixelFormat::Rgba16F,
            0.5,
            0.5,
        ))
        .with_pass(
            RenderPassData::new("lighting")
                .with_inputs(["albedo"])
                .with_outputs(["lit"]),
        )
        .with_pass(RenderPassData::new("gbuffer").with_outputs(["albedo"]))
        .with_pass(RenderPassData::new("tonemap").with_inputs(["lit"]))
        .with_pipeline(
            PipelineData::new("gbuffer_opaque", "gbuffer")
                .with_vertex(ShaderSource::new("gbuffer.vert", ""))
                .with_fragment(ShaderSource::new("gbuffer.frag", "")),
        )
        .with_pipeline(
            PipelineData::new("lighting", "lighting")
                .with_vertex(ShaderSource::new("lighting.vert", ""))
                .with_fragment(ShaderSource::new("lighting.frag", "")),
        )
        .with_material(MaterialData {
            name: "stone".to_string(),
            passes: vec![MaterialPass {
                name: "main".to_string(),
                pipeline: "gbuffer_opaque".to_string(),
                ..MaterialPass::default()
            }],
            geometry_filter: "geometry_type::block".to_string(),
        })
}

// ============================================================================
// Mesh Data
// ============================================================================

/// A mesh of `count` vertices with distinct positions.
pub fn mesh_with_vertices(count: usize) -> MeshData {
    let vertices: Vec<FullVertex> = (0..count)
        .map(|i| FullVertex::at([i as f32, (i * 2) as f32, (i * 3) as f32]))
        .collect();
    MeshData::new(vertices)
}

/// A single triangle.
pub fn triangle() -> MeshData {
    MeshData::new(vec![
        FullVertex::at([0.0, 0.0, 0.0]),
        FullVertex::at([1.0, 0.0, 0.0]),
        FullVertex::at([0.0, 1.0, 0.0]),
    ])
}
