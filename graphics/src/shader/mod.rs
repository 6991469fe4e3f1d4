//! Shader compilation service.
//!
//! Pipelines hand each stage's source to a [`ShaderCompiler`] and get back
//! SPIR-V words plus the resources the stage binds. The pipeline compiler
//! merges those bindings across stages and builds the layouts from them.
//!
//! [`NagaShaderCompiler`] compiles WGSL with naga. Anything implementing the
//! trait can stand in for it, e.g. a table of precompiled modules.

mod naga_compiler;

use bitflags::bitflags;

use crate::error::GraphicsError;

pub use naga_compiler::NagaShaderCompiler;

/// Programmable stages of a graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
}

impl ShaderStage {
    /// The flag for this stage.
    pub fn flag(self) -> ShaderStageFlags {
        match self {
            Self::Vertex => ShaderStageFlags::VERTEX,
            Self::TessellationControl => ShaderStageFlags::TESSELLATION_CONTROL,
            Self::TessellationEvaluation => ShaderStageFlags::TESSELLATION_EVALUATION,
            Self::Geometry => ShaderStageFlags::GEOMETRY,
            Self::Fragment => ShaderStageFlags::FRAGMENT,
        }
    }
}

bitflags! {
    /// Set of shader stages that use a resource.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const TESSELLATION_CONTROL = 1 << 1;
        const TESSELLATION_EVALUATION = 1 << 2;
        const GEOMETRY = 1 << 3;
        const FRAGMENT = 1 << 4;
    }
}

/// Kind of descriptor a resource is bound through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    SampledImage,
    StorageImage,
    Sampler,
}

/// A resource one shader stage binds, as reported by the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReflectedBinding {
    /// Name of the uniform, texture or sampler in the source.
    pub name: String,
    /// Descriptor set index.
    pub set: u32,
    /// Binding index within the set.
    pub binding: u32,
    /// Descriptor type.
    pub descriptor_type: DescriptorType,
    /// Array size, 1 for non-arrays.
    pub count: u32,
}

impl ReflectedBinding {
    /// A single (non-array) binding.
    pub fn new(
        name: impl Into<String>,
        set: u32,
        binding: u32,
        descriptor_type: DescriptorType,
    ) -> Self {
        Self {
            name: name.into(),
            set,
            binding,
            descriptor_type,
            count: 1,
        }
    }

    /// Set the array size.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }
}

/// Source of one shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSource {
    /// File the source came from, used in error messages.
    pub filename: String,
    /// Source text.
    pub source: String,
    /// Entry point name (default: `main`).
    pub entry_point: String,
}

impl ShaderSource {
    /// Create a source with the `main` entry point.
    pub fn new(filename: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            source: source.into(),
            entry_point: "main".to_string(),
        }
    }

    /// Set the entry point.
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }
}

/// Output of compiling one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledShader {
    /// SPIR-V words.
    pub words: Vec<u32>,
    /// Resources the stage binds.
    pub bindings: Vec<ReflectedBinding>,
}

/// Turns shader source into SPIR-V plus reflected bindings.
pub trait ShaderCompiler: Send + Sync {
    /// Compile one stage.
    fn compile(
        &self,
        stage: ShaderStage,
        source: &ShaderSource,
    ) -> Result<CompiledShader, GraphicsError>;
}
