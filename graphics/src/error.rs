//! Graphics error types.

use std::fmt;

use crate::mesh::MeshId;
use crate::settings::MAX_FRAMES_IN_FLIGHT_LIMIT;

/// Errors that can occur in the graphics system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize the graphics system.
    InitializationFailed(String),
    /// Failed to create a resource.
    ResourceCreationFailed(String),
    /// Shader source could not be compiled or reflected.
    ShaderCompilationFailed(String),
    /// Settings or shaderpack data are inconsistent.
    Configuration(ConfigError),
    /// The mesh allocation ceiling would be exceeded.
    MeshMemoryExhausted {
        /// Parts the allocation needed.
        requested_parts: u32,
        /// Parts that could still be provided, including megabuffers not yet created.
        available_parts: u32,
    },
    /// No mesh is registered under this id.
    UnknownMesh(MeshId),
    /// A queue submission or presentation failed.
    SubmissionFailed(String),
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An internal error occurred.
    Internal(String),
}

impl GraphicsError {
    /// Whether the caller can carry on after this error.
    ///
    /// Only allocation exhaustion is recoverable: the mesh was not added
    /// and nothing else changed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MeshMemoryExhausted { .. })
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::ResourceCreationFailed(msg) => write!(f, "resource creation failed: {msg}"),
            Self::ShaderCompilationFailed(msg) => write!(f, "shader compilation failed: {msg}"),
            Self::Configuration(err) => write!(f, "configuration error: {err}"),
            Self::MeshMemoryExhausted {
                requested_parts,
                available_parts,
            } => write!(
                f,
                "mesh memory exhausted: {requested_parts} parts requested, {available_parts} available"
            ),
            Self::UnknownMesh(id) => write!(f, "unknown mesh {id}"),
            Self::SubmissionFailed(msg) => write!(f, "submission failed: {msg}"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Configuration(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for GraphicsError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err)
    }
}

/// Inconsistent settings or shaderpack data.
///
/// Every variant names the offending field, pass, pipeline or resource so
/// the source data can be fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A mesh buffer size violates the exact-multiple rules.
    MeshOptions {
        /// Name of the violated field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
    /// `max_frames_in_flight` is outside the supported range.
    FramesInFlight(usize),
    /// The render passes depend on each other in a cycle.
    DependencyCycle {
        /// Passes that could not be ordered, in declaration order.
        passes: Vec<String>,
    },
    /// Two render passes share a name.
    DuplicatePass(String),
    /// A pass references a texture that is not a dynamic texture.
    UnknownTexture {
        /// Pass declaring the input.
        pass: String,
        /// Missing texture name.
        texture: String,
    },
    /// A depth texture was declared as a colour attachment.
    DepthAttachment {
        /// Pass declaring the input.
        pass: String,
        /// Depth texture name.
        texture: String,
    },
    /// Two shader stages declare the same resource with different bindings.
    BindingMismatch {
        /// Pipeline being compiled.
        pipeline: String,
        /// Resource name.
        name: String,
        /// Binding seen first, formatted.
        first: String,
        /// Conflicting binding, formatted.
        second: String,
    },
    /// A descriptor set index below the highest used one has no bindings.
    DescriptorSetGap {
        /// Pipeline being compiled.
        pipeline: String,
        /// Empty set index.
        set: u32,
    },
    /// A pipeline targets a pass that was not compiled.
    UnknownPass {
        /// Pipeline being compiled.
        pipeline: String,
        /// Missing pass name.
        pass: String,
    },
    /// A pipeline has no vertex shader.
    MissingVertexStage(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MeshOptions { field, reason } => write!(f, "mesh.{field} {reason}"),
            Self::FramesInFlight(count) => write!(
                f,
                "max_frames_in_flight must be between 1 and {MAX_FRAMES_IN_FLIGHT_LIMIT}, got {count}"
            ),
            Self::DependencyCycle { passes } => {
                write!(f, "render passes form a cycle: {}", passes.join(", "))
            }
            Self::DuplicatePass(name) => write!(f, "render pass '{name}' is declared twice"),
            Self::UnknownTexture { pass, texture } => {
                write!(f, "pass '{pass}' uses unknown texture '{texture}'")
            }
            Self::DepthAttachment { pass, texture } => write!(
                f,
                "pass '{pass}' binds depth texture '{texture}' as a color attachment"
            ),
            Self::BindingMismatch {
                pipeline,
                name,
                first,
                second,
            } => write!(
                f,
                "pipeline '{pipeline}': resource '{name}' is bound as {first} and as {second}"
            ),
            Self::DescriptorSetGap { pipeline, set } => write!(
                f,
                "pipeline '{pipeline}': descriptor set {set} not present"
            ),
            Self::UnknownPass { pipeline, pass } => {
                write!(f, "pipeline '{pipeline}' targets unknown pass '{pass}'")
            }
            Self::MissingVertexStage(pipeline) => {
                write!(f, "pipeline '{pipeline}' has no vertex shader")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
