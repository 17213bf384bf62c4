//! Graphics pipeline construction (dynamic rendering, Vulkan 1.3).

use ash::vk;

use super::VulkanContext;

/// Wrap SPIR-V words in a shader module.
///
/// # Safety
/// `code` must be valid SPIR-V.
pub unsafe fn create_shader_module(
    ctx: &VulkanContext,
    code: &[u32],
) -> Result<vk::ShaderModule, String> {
    let info = vk::ShaderModuleCreateInfo::default().code(code);
    ctx.device
        .create_shader_module(&info, None)
        .map_err(|e| format!("Failed to create shader module: {:?}", e))
}

/// How a pipeline treats depth, for the pass phases: world/opaque
/// entities write depth, translucent reads it, overlays ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthMode {
    WriteTest,
    TestOnly,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Opaque,
    Alpha,
    Additive,
}

/// Common settings for one graphics pipeline.
pub struct PipelineDesc<'a> {
    pub vert: vk::ShaderModule,
    pub frag: vk::ShaderModule,
    pub color_format: vk::Format,
    pub depth_format: Option<vk::Format>,
    pub depth: DepthMode,
    pub blend: BlendMode,
    pub vertex_bindings: &'a [vk::VertexInputBindingDescription],
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    pub layout: vk::PipelineLayout,
    pub cull: bool,
}

/// Build a graphics pipeline for dynamic rendering. Fullscreen passes use
/// empty vertex state and generate the triangle in the vertex shader.
///
/// # Safety
/// All handles in `desc` must be valid.
pub unsafe fn create_graphics_pipeline(
    ctx: &VulkanContext,
    desc: &PipelineDesc<'_>,
) -> Result<vk::Pipeline, String> {
    let entry = c"main";
    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(desc.vert)
            .name(entry),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(desc.frag)
            .name(entry),
    ];

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(desc.vertex_bindings)
        .vertex_attribute_descriptions(desc.vertex_attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(if desc.cull {
            vk::CullModeFlags::BACK
        } else {
            vk::CullModeFlags::NONE
        })
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .line_width(1.0);

    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let (depth_test, depth_write) = match desc.depth {
        DepthMode::WriteTest => (true, true),
        DepthMode::TestOnly => (true, false),
        DepthMode::Disabled => (false, false),
    };
    let depth_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(depth_test)
        .depth_write_enable(depth_write)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

    let attachment = match desc.blend {
        BlendMode::Opaque => vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA),
        BlendMode::Alpha => vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD),
        BlendMode::Additive => vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE)
            .alpha_blend_op(vk::BlendOp::ADD),
    };
    let attachments = [attachment];
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let color_formats = [desc.color_format];
    let mut rendering = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats);
    if let Some(depth_format) = desc.depth_format {
        rendering = rendering.depth_attachment_format(depth_format);
    }

    let info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_state)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic)
        .layout(desc.layout)
        .push_next(&mut rendering);

    let pipelines = ctx
        .device
        .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        .map_err(|(_, e)| format!("Failed to create pipeline: {:?}", e))?;
    Ok(pipelines[0])
}

/// The world-surface vertex layout, matching `WorldVert`.
pub fn world_vertex_layout() -> (
    [vk::VertexInputBindingDescription; 1],
    [vk::VertexInputAttributeDescription; 3],
) {
    let binding = [vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(28) // pos(12) + st(8) + lm_st(8)
        .input_rate(vk::VertexInputRate::VERTEX)];
    let attributes = [
        vk::VertexInputAttributeDescription::default()
            .location(0)
            .binding(0)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(0),
        vk::VertexInputAttributeDescription::default()
            .location(1)
            .binding(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(12),
        vk::VertexInputAttributeDescription::default()
            .location(2)
            .binding(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(20),
    ];
    (binding, attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vk_model_types::WorldVert;

    #[test]
    fn test_world_vertex_stride_matches_struct() {
        let (binding, attrs) = world_vertex_layout();
        assert_eq!(binding[0].stride as usize, std::mem::size_of::<WorldVert>());
        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[2].offset, 20);
    }
}
