//! Graphics/compute pipeline objects and the `PipelineLayout` they bind
//! against, built from SPIR-V modules and the structural state captured in
//! [`crate::pipeline_state::PipelineState`] (§4.7).
//!
//! Grounded in the teacher's `vulkan/pipeline/graphics.rs` (vertex input,
//! blend attachment, dynamic-state setup) and `vulkan/pipeline/compute.rs`
//! (single-stage compute pipeline creation).

use crate::common::ShaderStageFlags;
use crate::descriptor::DescriptorSetLayout;
use crate::device::Device;
use crate::error::{Result, RhiError};
use crate::pipeline_state::{
    AttachmentBlendState, BlendFactor, BlendOp, CullMode, FrontFace, PolygonMode, PrimitiveTopology,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[cfg(feature = "vulkan")]
use ash::vk;

pub struct ShaderModule {
    device: Arc<Device>,
    stage: ShaderStageFlags,
    #[cfg(feature = "vulkan")]
    module: vk::ShaderModule,
}

impl ShaderModule {
    #[cfg(feature = "vulkan")]
    pub fn create(device: Arc<Device>, stage: ShaderStageFlags, spirv: &[u8]) -> Result<Arc<ShaderModule>> {
        if spirv.len() % 4 != 0 {
            return Err(RhiError::InvalidConfiguration(
                "SPIR-V bytecode length must be a multiple of 4".into(),
            ));
        }
        let words: Vec<u32> = spirv
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe {
            device
                .raw
                .create_shader_module(&create_info, None)
                .map_err(|e| RhiError::CompileFailure {
                    stage: "shader-module",
                    message: e.to_string(),
                })?
        };
        Ok(Arc::new(ShaderModule { device, stage, module }))
    }

    #[cfg(feature = "vulkan")]
    pub(crate) fn native(&self) -> vk::ShaderModule {
        self.module
    }

    pub fn stage(&self) -> ShaderStageFlags {
        self.stage
    }
}

#[cfg(feature = "vulkan")]
impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_shader_module(self.module, None);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexInputRate {
    Vertex,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexInputBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexInputAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: crate::common::InternalFormat,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct PushConstantRange {
    pub stages: ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

/// A descriptor-set-layout list plus push constant ranges: the structural
/// key for the `pipeline-layout` cache family (§4.6).
#[derive(Clone)]
pub struct PipelineLayoutDesc {
    pub set_layouts: Vec<Arc<DescriptorSetLayout>>,
    pub push_constants: Vec<PushConstantRange>,
}

impl PipelineLayoutDesc {
    fn hash_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for layout in &self.set_layouts {
            (Arc::as_ptr(layout) as usize).hash(&mut hasher);
        }
        for pc in &self.push_constants {
            pc.offset.hash(&mut hasher);
            pc.size.hash(&mut hasher);
            pc.stages.bits().hash(&mut hasher);
        }
        hasher.finish()
    }
}

pub struct PipelineLayout {
    device: Arc<Device>,
    #[cfg(feature = "vulkan")]
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    #[cfg(feature = "vulkan")]
    pub fn create_or_cached(device: Arc<Device>, desc: PipelineLayoutDesc) -> Result<Arc<PipelineLayout>> {
        let key = desc.hash_key();
        device.resource_cache().get_or_try_insert("pipeline-layout", key, move || {
            let vk_set_layouts: Vec<vk::DescriptorSetLayout> =
                desc.set_layouts.iter().map(|l| l.layout).collect();
            let vk_ranges: Vec<vk::PushConstantRange> = desc
                .push_constants
                .iter()
                .map(|pc| {
                    vk::PushConstantRange::default()
                        .stage_flags(stage_flags_to_vk(pc.stages))
                        .offset(pc.offset)
                        .size(pc.size)
                })
                .collect();
            let create_info = vk::PipelineLayoutCreateInfo::default()
                .set_layouts(&vk_set_layouts)
                .push_constant_ranges(&vk_ranges);
            let layout = unsafe {
                device
                    .raw
                    .create_pipeline_layout(&create_info, None)
                    .map_err(|e| RhiError::CompileFailure {
                        stage: "pipeline-layout",
                        message: e.to_string(),
                    })?
            };
            Ok(PipelineLayout {
                device: device.clone(),
                layout,
            })
        })
    }

    #[cfg(feature = "vulkan")]
    pub(crate) fn native(&self) -> vk::PipelineLayout {
        self.layout
    }
}

#[cfg(feature = "vulkan")]
impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(feature = "vulkan")]
fn stage_flags_to_vk(stages: ShaderStageFlags) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStageFlags::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStageFlags::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(ShaderStageFlags::COMPUTE) {
        flags |= vk::ShaderStageFlags::COMPUTE;
    }
    flags
}

#[cfg(feature = "vulkan")]
fn topology_to_vk(t: PrimitiveTopology) -> vk::PrimitiveTopology {
    match t {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
    }
}

#[cfg(feature = "vulkan")]
fn polygon_mode_to_vk(m: PolygonMode) -> vk::PolygonMode {
    match m {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
        PolygonMode::Point => vk::PolygonMode::POINT,
    }
}

#[cfg(feature = "vulkan")]
fn cull_mode_to_vk(m: CullMode) -> vk::CullModeFlags {
    match m {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
        CullMode::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
    }
}

#[cfg(feature = "vulkan")]
fn front_face_to_vk(f: FrontFace) -> vk::FrontFace {
    match f {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

#[cfg(feature = "vulkan")]
fn blend_factor_to_vk(f: BlendFactor) -> vk::BlendFactor {
    match f {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
    }
}

#[cfg(feature = "vulkan")]
fn blend_op_to_vk(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

#[cfg(feature = "vulkan")]
fn attachment_blend_to_vk(state: &AttachmentBlendState) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(state.enable)
        .src_color_blend_factor(blend_factor_to_vk(state.src_color))
        .dst_color_blend_factor(blend_factor_to_vk(state.dst_color))
        .color_blend_op(blend_op_to_vk(state.color_op))
        .src_alpha_blend_factor(blend_factor_to_vk(state.src_alpha))
        .dst_alpha_blend_factor(blend_factor_to_vk(state.dst_alpha))
        .alpha_blend_op(blend_op_to_vk(state.alpha_op))
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

/// Everything needed to build (or look up) a `VkPipeline`: two shader
/// stages, vertex input, the structural state, and the render pass it will
/// run within (render passes participate in pipeline identity in Vulkan).
pub struct GraphicsPipelineDesc {
    pub vertex_shader: Arc<ShaderModule>,
    pub fragment_shader: Arc<ShaderModule>,
    pub vertex_bindings: Vec<VertexInputBinding>,
    pub vertex_attributes: Vec<VertexInputAttribute>,
    pub layout: Arc<PipelineLayout>,
    #[cfg(feature = "vulkan")]
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub state_hash: u64,
}

pub struct GraphicsPipeline {
    device: Arc<Device>,
    #[cfg(feature = "vulkan")]
    pipeline: vk::Pipeline,
    layout: Arc<PipelineLayout>,
}

impl GraphicsPipeline {
    #[cfg(feature = "vulkan")]
    pub fn create_or_cached(
        device: Arc<Device>,
        desc: GraphicsPipelineDesc,
        state: &crate::pipeline_state::PipelineState,
    ) -> Result<Arc<GraphicsPipeline>> {
        let mut hasher = DefaultHasher::new();
        desc.state_hash.hash(&mut hasher);
        (Arc::as_ptr(&desc.vertex_shader) as usize).hash(&mut hasher);
        (Arc::as_ptr(&desc.fragment_shader) as usize).hash(&mut hasher);
        desc.vertex_bindings.hash(&mut hasher);
        desc.vertex_attributes.hash(&mut hasher);
        (Arc::as_ptr(&desc.layout) as usize).hash(&mut hasher);
        desc.render_pass.hash(&mut hasher);
        desc.subpass.hash(&mut hasher);
        let key = hasher.finish();

        let layout_for_cache = desc.layout.clone();
        let device_for_cache = device.clone();
        device.resource_cache().get_or_try_insert("pipeline", key, move || {
            build_graphics_pipeline(device_for_cache, desc, state, layout_for_cache)
        })
    }

    #[cfg(feature = "vulkan")]
    pub(crate) fn native(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }
}

#[cfg(feature = "vulkan")]
fn build_graphics_pipeline(
    device: Arc<Device>,
    desc: GraphicsPipelineDesc,
    state: &crate::pipeline_state::PipelineState,
    layout: Arc<PipelineLayout>,
) -> Result<GraphicsPipeline> {
    let entry = std::ffi::CString::new("main").unwrap();
    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(desc.vertex_shader.native())
            .name(&entry),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(desc.fragment_shader.native())
            .name(&entry),
    ];

    let bindings: Vec<vk::VertexInputBindingDescription> = desc
        .vertex_bindings
        .iter()
        .map(|b| {
            vk::VertexInputBindingDescription::default()
                .binding(b.binding)
                .stride(b.stride)
                .input_rate(match b.input_rate {
                    VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
                    VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
                })
        })
        .collect();
    let attributes: Vec<vk::VertexInputAttributeDescription> = desc
        .vertex_attributes
        .iter()
        .map(|a| {
            vk::VertexInputAttributeDescription::default()
                .location(a.location)
                .binding(a.binding)
                .format(crate::convert::format_to_vk(a.format))
                .offset(a.offset)
        })
        .collect();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let ia = state.input_assembly();
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(topology_to_vk(ia.topology))
        .primitive_restart_enable(ia.primitive_restart_enable);

    // Viewport/scissor counts only; actual values are dynamic state
    // recorded per-draw (§4.7).
    let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);

    let rs = state.rasterization();
    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(polygon_mode_to_vk(rs.polygon_mode))
        .cull_mode(cull_mode_to_vk(rs.cull_mode))
        .front_face(front_face_to_vk(rs.front_face))
        .depth_bias_enable(rs.depth_bias_enable)
        .depth_clamp_enable(rs.depth_clamp_enable)
        .line_width(1.0);

    let ms = state.multisample();
    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(match ms.sample_count {
            2 => vk::SampleCountFlags::TYPE_2,
            4 => vk::SampleCountFlags::TYPE_4,
            8 => vk::SampleCountFlags::TYPE_8,
            _ => vk::SampleCountFlags::TYPE_1,
        })
        .alpha_to_coverage_enable(ms.alpha_to_coverage_enable);

    let ds = state.depth_stencil();
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(ds.depth_test_enable)
        .depth_write_enable(ds.depth_write_enable)
        .depth_compare_op(crate::convert::compare_op_to_vk(ds.depth_compare))
        .stencil_test_enable(ds.stencil_test_enable);

    let attachments: Vec<vk::PipelineColorBlendAttachmentState> =
        state.blend().attachments.iter().map(attachment_blend_to_vk).collect();
    let attachments = if attachments.is_empty() {
        vec![attachment_blend_to_vk(&AttachmentBlendState::default())]
    } else {
        attachments
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic_state)
        .layout(layout.native())
        .render_pass(desc.render_pass)
        .subpass(desc.subpass);

    let pipelines = unsafe {
        device
            .raw
            .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
            .map_err(|(_, e)| RhiError::CompileFailure {
                stage: "graphics-pipeline",
                message: e.to_string(),
            })?
    };
    Ok(GraphicsPipeline {
        device,
        pipeline: pipelines[0],
        layout,
    })
}

#[cfg(feature = "vulkan")]
impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_pipeline(self.pipeline, None);
        }
    }
}

pub struct ComputePipeline {
    device: Arc<Device>,
    #[cfg(feature = "vulkan")]
    pipeline: vk::Pipeline,
    layout: Arc<PipelineLayout>,
}

impl ComputePipeline {
    #[cfg(feature = "vulkan")]
    pub fn create(device: Arc<Device>, shader: Arc<ShaderModule>, layout: Arc<PipelineLayout>) -> Result<Arc<ComputePipeline>> {
        let entry = std::ffi::CString::new("main").unwrap();
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader.native())
            .name(&entry);
        let create_info = vk::ComputePipelineCreateInfo::default().stage(stage).layout(layout.native());
        let pipelines = unsafe {
            device
                .raw
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| RhiError::CompileFailure {
                    stage: "compute-pipeline",
                    message: e.to_string(),
                })?
        };
        Ok(Arc::new(ComputePipeline {
            device,
            pipeline: pipelines[0],
            layout,
        }))
    }

    #[cfg(feature = "vulkan")]
    pub(crate) fn native(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }
}

#[cfg(feature = "vulkan")]
impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_pipeline(self.pipeline, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_layout_desc_hash_is_order_sensitive() {
        let a = PipelineLayoutDesc {
            set_layouts: vec![],
            push_constants: vec![
                PushConstantRange {
                    stages: ShaderStageFlags::VERTEX,
                    offset: 0,
                    size: 16,
                },
                PushConstantRange {
                    stages: ShaderStageFlags::FRAGMENT,
                    offset: 16,
                    size: 16,
                },
            ],
        };
        let b = PipelineLayoutDesc {
            set_layouts: vec![],
            push_constants: vec![
                PushConstantRange {
                    stages: ShaderStageFlags::FRAGMENT,
                    offset: 16,
                    size: 16,
                },
                PushConstantRange {
                    stages: ShaderStageFlags::VERTEX,
                    offset: 0,
                    size: 16,
                },
            ],
        };
        assert_ne!(a.hash_key(), b.hash_key());
    }
}
