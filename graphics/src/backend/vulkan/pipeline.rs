//! Render pass, layout and graphics pipeline creation.

use std::ffi::CString;
use std::mem::offset_of;

use ash::vk;

use crate::error::GraphicsError;
use crate::graph::{RenderPassLayout, SubpassDependency};
use crate::mesh::FullVertex;
use crate::pipeline::{GraphicsPipelineDesc, ResourceBinding};
use crate::shader::ShaderStage;

use super::conversion::{
    convert_attachment_layout, convert_blend_factor, convert_descriptor_type, convert_load_op,
    convert_pixel_format, convert_shader_stage, convert_shader_stage_flags, convert_store_op,
    convert_topology,
};

/// Create a shader module from SPIR-V words.
pub fn create_shader_module(
    device: &ash::Device,
    words: &[u32],
) -> Result<vk::ShaderModule, GraphicsError> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(words);

    unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create shader module: {:?}", e))
    })
}

/// Create a render pass with one graphics subpass.
pub fn create_render_pass(
    device: &ash::Device,
    layout: &RenderPassLayout,
) -> Result<vk::RenderPass, GraphicsError> {
    let attachments: Vec<vk::AttachmentDescription> = layout
        .attachments
        .iter()
        .map(|attachment| {
            vk::AttachmentDescription::default()
                .format(convert_pixel_format(attachment.format))
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(convert_load_op(attachment.load_op))
                .store_op(convert_store_op(attachment.store_op))
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(convert_attachment_layout(attachment.initial_layout))
                .final_layout(convert_attachment_layout(attachment.final_layout))
        })
        .collect();

    let color_references: Vec<vk::AttachmentReference> = layout
        .color_references
        .iter()
        .map(|reference| vk::AttachmentReference {
            attachment: reference.attachment,
            layout: convert_attachment_layout(reference.layout),
        })
        .collect();

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_references)];

    let dependencies: Vec<vk::SubpassDependency> = layout
        .dependencies
        .iter()
        .map(|dependency| match dependency {
            SubpassDependency::ExternalColorWrites => vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_READ
                        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                ),
        })
        .collect();

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.create_render_pass(&create_info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!(
            "Failed to create render pass '{}': {:?}",
            layout.name, e
        ))
    })
}

/// Create a descriptor set layout from the bindings of one set.
pub fn create_descriptor_set_layout(
    device: &ash::Device,
    bindings: &[ResourceBinding],
) -> Result<vk::DescriptorSetLayout, GraphicsError> {
    let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
        .iter()
        .map(|binding| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding.binding)
                .descriptor_type(convert_descriptor_type(binding.descriptor_type))
                .descriptor_count(binding.count)
                .stage_flags(convert_shader_stage_flags(binding.stages))
        })
        .collect();

    let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);

    unsafe { device.create_descriptor_set_layout(&create_info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!(
            "Failed to create descriptor set layout: {:?}",
            e
        ))
    })
}

/// Create a pipeline layout from descriptor set layouts in set order.
pub fn create_pipeline_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
) -> Result<vk::PipelineLayout, GraphicsError> {
    let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);

    unsafe { device.create_pipeline_layout(&create_info, None) }.map_err(|e| {
        GraphicsError::ResourceCreationFailed(format!("Failed to create pipeline layout: {:?}", e))
    })
}

/// Vertex input bindings for [`FullVertex`] streams.
pub fn full_vertex_bindings() -> [vk::VertexInputBindingDescription; 1] {
    [vk::VertexInputBindingDescription {
        binding: 0,
        stride: size_of::<FullVertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }]
}

/// Vertex attributes of [`FullVertex`], one location per field.
pub fn full_vertex_attributes() -> [vk::VertexInputAttributeDescription; 7] {
    let attribute = |location: u32, format: vk::Format, offset: usize| {
        vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        }
    };

    [
        attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(FullVertex, position)),
        attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(FullVertex, normal)),
        attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(FullVertex, tangent)),
        attribute(3, vk::Format::R16G16_UNORM, offset_of!(FullVertex, main_uv)),
        attribute(4, vk::Format::R32G32_SFLOAT, offset_of!(FullVertex, secondary_uv)),
        attribute(5, vk::Format::R32_UINT, offset_of!(FullVertex, virtual_texture_id)),
        attribute(
            6,
            vk::Format::R32G32B32A32_SFLOAT,
            offset_of!(FullVertex, additional_stuff),
        ),
    ]
}

/// Create a graphics pipeline.
///
/// Viewport and scissor are static. Tessellation stages switch the input
/// assembly to triangle patches.
pub fn create_graphics_pipeline(
    device: &ash::Device,
    desc: &GraphicsPipelineDesc<'_>,
    modules: &[vk::ShaderModule],
    pipeline_layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
) -> Result<vk::Pipeline, GraphicsError> {
    let entry_names = desc
        .stages
        .iter()
        .map(|stage| {
            CString::new(stage.entry_point).map_err(|e| {
                GraphicsError::InvalidParameter(format!(
                    "Invalid entry point name in pipeline '{}': {}",
                    desc.name, e
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = desc
        .stages
        .iter()
        .zip(modules)
        .zip(&entry_names)
        .map(|((stage, module), entry)| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(convert_shader_stage(stage.stage))
                .module(*module)
                .name(entry)
        })
        .collect();

    let tessellated = desc
        .stages
        .iter()
        .any(|stage| stage.stage == ShaderStage::TessellationControl);

    let bindings = full_vertex_bindings();
    let attributes = full_vertex_attributes();
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let topology = if tessellated {
        vk::PrimitiveTopology::PATCH_LIST
    } else {
        convert_topology(desc.topology)
    };
    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(topology)
        .primitive_restart_enable(false);

    let tessellation_state =
        vk::PipelineTessellationStateCreateInfo::default().patch_control_points(3);

    let viewports = [vk::Viewport {
        x: desc.viewport.x,
        y: desc.viewport.y,
        width: desc.viewport.width,
        height: desc.viewport.height,
        min_depth: desc.viewport.min_depth,
        max_depth: desc.viewport.max_depth,
    }];
    let scissors = [vk::Rect2D {
        offset: vk::Offset2D {
            x: desc.scissor.x,
            y: desc.scissor.y,
        },
        extent: vk::Extent2D {
            width: desc.scissor.width,
            height: desc.scissor.height,
        },
    }];
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewports(&viewports)
        .scissors(&scissors);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(true)
        .depth_bias_constant_factor(desc.depth_bias)
        .depth_bias_slope_factor(desc.slope_scaled_depth_bias);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let blend = desc.blend;
    let attachment = vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(true)
        .src_color_blend_factor(convert_blend_factor(blend.src_color))
        .dst_color_blend_factor(convert_blend_factor(blend.dst_color))
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(convert_blend_factor(blend.src_alpha))
        .dst_alpha_blend_factor(convert_blend_factor(blend.dst_alpha))
        .alpha_blend_op(vk::BlendOp::ADD)
        .color_write_mask(vk::ColorComponentFlags::RGBA);
    let blend_attachments = vec![attachment; desc.color_attachment_count as usize];
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&blend_attachments);

    let mut pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .color_blend_state(&color_blend_state)
        .layout(pipeline_layout)
        .render_pass(render_pass)
        .subpass(0);
    if tessellated {
        pipeline_info = pipeline_info.tessellation_state(&tessellation_state);
    }

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| {
        GraphicsError::ResourceCreationFailed(format!(
            "Failed to create graphics pipeline '{}': {:?}",
            desc.name, e
        ))
    })?;

    pipelines.into_iter().next().ok_or_else(|| {
        GraphicsError::ResourceCreationFailed(format!(
            "driver returned no pipeline for '{}'",
            desc.name
        ))
    })
}
