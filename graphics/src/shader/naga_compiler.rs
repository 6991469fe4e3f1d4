//! WGSL compiler built on naga.

use crate::error::GraphicsError;

use super::{
    CompiledShader, DescriptorType, ReflectedBinding, ShaderCompiler, ShaderSource, ShaderStage,
};

/// Compiles WGSL to SPIR-V with naga and reflects the entry point's
/// uniform, storage, texture and sampler globals.
///
/// naga has no geometry or tessellation front end; those stages fail to
/// compile.
#[derive(Debug, Clone, Copy, Default)]
pub struct NagaShaderCompiler;

impl NagaShaderCompiler {
    /// Create a new compiler.
    pub fn new() -> Self {
        Self
    }
}

fn naga_stage(stage: ShaderStage) -> Option<naga::ShaderStage> {
    match stage {
        ShaderStage::Vertex => Some(naga::ShaderStage::Vertex),
        ShaderStage::Fragment => Some(naga::ShaderStage::Fragment),
        ShaderStage::TessellationControl
        | ShaderStage::TessellationEvaluation
        | ShaderStage::Geometry => None,
    }
}

fn descriptor_type(
    module: &naga::Module,
    var: &naga::GlobalVariable,
) -> Option<(DescriptorType, u32)> {
    let (inner, count) = match module.types[var.ty].inner {
        naga::TypeInner::BindingArray { base, size } => {
            let count = match size {
                naga::ArraySize::Constant(n) => n.get(),
                _ => 1,
            };
            (&module.types[base].inner, count)
        }
        ref inner => (inner, 1),
    };

    let ty = match var.space {
        naga::AddressSpace::Uniform => DescriptorType::UniformBuffer,
        naga::AddressSpace::Storage { .. } => DescriptorType::StorageBuffer,
        naga::AddressSpace::Handle => match inner {
            naga::TypeInner::Sampler { .. } => DescriptorType::Sampler,
            naga::TypeInner::Image {
                class: naga::ImageClass::Storage { .. },
                ..
            } => DescriptorType::StorageImage,
            naga::TypeInner::Image { .. } => DescriptorType::SampledImage,
            _ => return None,
        },
        _ => return None,
    };
    Some((ty, count))
}

impl ShaderCompiler for NagaShaderCompiler {
    fn compile(
        &self,
        stage: ShaderStage,
        source: &ShaderSource,
    ) -> Result<CompiledShader, GraphicsError> {
        let filename = &source.filename;
        let naga_stage = naga_stage(stage).ok_or_else(|| {
            GraphicsError::ShaderCompilationFailed(format!(
                "{filename}: {stage:?} shaders are not supported by the WGSL compiler"
            ))
        })?;

        let module = naga::front::wgsl::parse_str(&source.source).map_err(|e| {
            GraphicsError::ShaderCompilationFailed(format!("{filename}: WGSL parse error: {e}"))
        })?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        let info = validator.validate(&module).map_err(|e| {
            GraphicsError::ShaderCompilationFailed(format!("{filename}: validation error: {e}"))
        })?;

        let entry_index = module
            .entry_points
            .iter()
            .position(|ep| ep.name == source.entry_point && ep.stage == naga_stage)
            .ok_or_else(|| {
                GraphicsError::ShaderCompilationFailed(format!(
                    "{filename}: entry point '{}' not found for stage {:?}",
                    source.entry_point, stage
                ))
            })?;
        let entry_info = info.get_entry_point(entry_index);

        let mut bindings = Vec::new();
        for (handle, var) in module.global_variables.iter() {
            let Some(binding) = &var.binding else {
                continue;
            };
            if entry_info[handle].is_empty() {
                continue;
            }
            let Some((descriptor_type, count)) = descriptor_type(&module, var) else {
                continue;
            };
            let name = var
                .name
                .clone()
                .unwrap_or_else(|| format!("set{}_binding{}", binding.group, binding.binding));
            bindings.push(
                ReflectedBinding::new(name, binding.group, binding.binding, descriptor_type)
                    .with_count(count),
            );
        }

        let options = naga::back::spv::Options {
            lang_version: (1, 3),
            flags: naga::back::spv::WriterFlags::empty(),
            capabilities: None,
            bounds_check_policies: naga::proc::BoundsCheckPolicies::default(),
            binding_map: Default::default(),
            debug_info: None,
            zero_initialize_workgroup_memory:
                naga::back::spv::ZeroInitializeWorkgroupMemoryMode::None,
        };
        let pipeline_options = naga::back::spv::PipelineOptions {
            shader_stage: naga_stage,
            entry_point: source.entry_point.clone(),
        };

        let words = naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
            .map_err(|e| {
                GraphicsError::ShaderCompilationFailed(format!(
                    "{filename}: SPIR-V generation error: {e}"
                ))
            })?;

        log::debug!(
            "Compiled {:?} shader '{}' ({} words, {} bindings)",
            stage,
            filename,
            words.len(),
            bindings.len()
        );
        Ok(CompiledShader { words, bindings })
    }
}
