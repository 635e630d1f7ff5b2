//! Conversions from the abstract §6 vocabulary to native Vulkan values:
//! resource-usage -> buffer/image usage flags (§6.3) and the canonical
//! image layout/barrier table (§6.4).
//!
//! Grounded in the teacher's `vulkan/mod.rs` (`image_layout_to_vk`,
//! `image_barrier_stages_access`, `buffer_usage_to_vk`) and
//! `vulkan/texture.rs` (`texture_format_to_vk`), generalized from the
//! trait-object `ResourceUsage`-less types there to this crate's
//! `ResourceUsage`/`InternalFormat` (§6.2).

use crate::common::{InternalFormat, ResourceUsage};
#[cfg(feature = "vulkan")]
use ash::vk;

/// One row of the canonical barrier table (§6.4): what access mask, image
/// layout, and pipeline stages a `ResourceUsage` implies.
#[derive(Debug, Clone, Copy)]
#[cfg(feature = "vulkan")]
pub struct UsageTransition {
    pub access: vk::AccessFlags,
    pub layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

#[cfg(feature = "vulkan")]
pub fn usage_transition(usage: ResourceUsage) -> UsageTransition {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;
    let all_cmds = S::ALL_GRAPHICS | S::ALL_COMMANDS;
    match usage {
        ResourceUsage::Undefined => UsageTransition {
            access: A::empty(),
            layout: L::UNDEFINED,
            src_stage: S::TOP_OF_PIPE,
            dst_stage: all_cmds,
        },
        ResourceUsage::PreInitialized => UsageTransition {
            access: A::empty(),
            layout: L::PREINITIALIZED,
            src_stage: all_cmds,
            dst_stage: all_cmds,
        },
        ResourceUsage::General => UsageTransition {
            access: A::empty(),
            layout: L::GENERAL,
            src_stage: all_cmds,
            dst_stage: all_cmds,
        },
        ResourceUsage::RenderTarget => UsageTransition {
            access: A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
            layout: L::COLOR_ATTACHMENT_OPTIMAL,
            src_stage: S::COLOR_ATTACHMENT_OUTPUT,
            dst_stage: S::COLOR_ATTACHMENT_OUTPUT,
        },
        ResourceUsage::DepthStencil => UsageTransition {
            access: A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            layout: L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            src_stage: S::LATE_FRAGMENT_TESTS,
            dst_stage: S::EARLY_FRAGMENT_TESTS,
        },
        ResourceUsage::ShaderResource => UsageTransition {
            access: A::INPUT_ATTACHMENT_READ,
            layout: L::SHADER_READ_ONLY_OPTIMAL,
            src_stage: S::FRAGMENT_SHADER | S::COMPUTE_SHADER,
            dst_stage: S::FRAGMENT_SHADER | S::COMPUTE_SHADER,
        },
        ResourceUsage::ShaderWrite => UsageTransition {
            access: A::SHADER_WRITE,
            layout: L::GENERAL,
            src_stage: S::FRAGMENT_SHADER | S::COMPUTE_SHADER,
            dst_stage: S::FRAGMENT_SHADER | S::COMPUTE_SHADER,
        },
        ResourceUsage::CopySource => UsageTransition {
            access: A::TRANSFER_READ,
            layout: L::TRANSFER_SRC_OPTIMAL,
            src_stage: S::TRANSFER,
            dst_stage: S::TRANSFER,
        },
        ResourceUsage::CopyDestination => UsageTransition {
            access: A::TRANSFER_WRITE,
            layout: L::TRANSFER_DST_OPTIMAL,
            src_stage: S::TRANSFER,
            dst_stage: S::TRANSFER,
        },
        ResourceUsage::Present => UsageTransition {
            access: A::empty(),
            layout: L::PRESENT_SRC_KHR,
            src_stage: all_cmds,
            dst_stage: S::TOP_OF_PIPE,
        },
        ResourceUsage::IndexBuffer | ResourceUsage::VertexBuffer | ResourceUsage::IndirectBuffer => {
            // Buffer-only usages have no image layout; callers must not
            // reach this path for buffer barriers (image barriers only).
            UsageTransition {
                access: A::empty(),
                layout: L::UNDEFINED,
                src_stage: all_cmds,
                dst_stage: all_cmds,
            }
        }
    }
}

#[cfg(feature = "vulkan")]
pub fn buffer_usage_flags(usage: ResourceUsage) -> vk::BufferUsageFlags {
    use vk::BufferUsageFlags as F;
    let mut flags = F::TRANSFER_SRC | F::TRANSFER_DST;
    match usage {
        ResourceUsage::ShaderResource => flags |= F::UNIFORM_BUFFER | F::UNIFORM_TEXEL_BUFFER,
        ResourceUsage::ShaderWrite => flags |= F::STORAGE_BUFFER | F::STORAGE_TEXEL_BUFFER,
        ResourceUsage::IndexBuffer => flags |= F::INDEX_BUFFER,
        ResourceUsage::VertexBuffer => flags |= F::VERTEX_BUFFER,
        ResourceUsage::IndirectBuffer => flags |= F::INDIRECT_BUFFER,
        ResourceUsage::General => {
            flags |= F::UNIFORM_BUFFER
                | F::UNIFORM_TEXEL_BUFFER
                | F::STORAGE_BUFFER
                | F::STORAGE_TEXEL_BUFFER
                | F::INDEX_BUFFER
                | F::VERTEX_BUFFER
                | F::INDIRECT_BUFFER;
        }
        _ => {}
    }
    flags
}

#[cfg(feature = "vulkan")]
pub fn image_usage_flags(usage: ResourceUsage) -> vk::ImageUsageFlags {
    use vk::ImageUsageFlags as F;
    let mut flags = F::TRANSFER_SRC | F::TRANSFER_DST;
    match usage {
        ResourceUsage::ShaderResource => flags |= F::SAMPLED | F::INPUT_ATTACHMENT,
        ResourceUsage::ShaderWrite => flags |= F::STORAGE | F::INPUT_ATTACHMENT,
        ResourceUsage::RenderTarget | ResourceUsage::Present => flags |= F::COLOR_ATTACHMENT,
        ResourceUsage::DepthStencil => flags |= F::DEPTH_STENCIL_ATTACHMENT,
        ResourceUsage::General => {
            flags |= F::SAMPLED
                | F::STORAGE
                | F::INPUT_ATTACHMENT
                | F::COLOR_ATTACHMENT
                | F::DEPTH_STENCIL_ATTACHMENT;
        }
        _ => {}
    }
    flags
}

#[cfg(feature = "vulkan")]
pub fn format_to_vk(format: InternalFormat) -> vk::Format {
    use InternalFormat::*;
    match format {
        R8Unorm => vk::Format::R8_UNORM,
        R8Snorm => vk::Format::R8_SNORM,
        R8G8Unorm => vk::Format::R8G8_UNORM,
        R8G8Snorm => vk::Format::R8G8_SNORM,
        R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        R8G8B8A8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        R8G8B8A8Snorm => vk::Format::R8G8B8A8_SNORM,
        B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
        B8G8R8A8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
        B5G6R5Unorm => vk::Format::B5G6R5_UNORM_PACK16,
        R16Float => vk::Format::R16_SFLOAT,
        R16G16Float => vk::Format::R16G16_SFLOAT,
        R16G16B16A16Float => vk::Format::R16G16B16A16_SFLOAT,
        R32Float => vk::Format::R32_SFLOAT,
        R32G32Float => vk::Format::R32G32_SFLOAT,
        R32G32B32Float => vk::Format::R32G32B32_SFLOAT,
        R32G32B32A32Float => vk::Format::R32G32B32A32_SFLOAT,
        R32Uint => vk::Format::R32_UINT,
        R32G32B32A32Uint => vk::Format::R32G32B32A32_UINT,
        Bc1Unorm => vk::Format::BC1_RGBA_UNORM_BLOCK,
        Bc1UnormSrgb => vk::Format::BC1_RGBA_SRGB_BLOCK,
        Bc3Unorm => vk::Format::BC3_UNORM_BLOCK,
        Bc3UnormSrgb => vk::Format::BC3_SRGB_BLOCK,
        Bc7Unorm => vk::Format::BC7_UNORM_BLOCK,
        Bc7UnormSrgb => vk::Format::BC7_SRGB_BLOCK,
        D32Float => vk::Format::D32_SFLOAT,
        D16Unorm => vk::Format::D16_UNORM,
        D32FloatS8X24 => vk::Format::D32_SFLOAT_S8_UINT,
        D24UnormS8 => vk::Format::D24_UNORM_S8_UINT,
    }
}

#[cfg(feature = "vulkan")]
pub fn filter_to_vk(filter: crate::common::ImageFilter) -> vk::Filter {
    match filter {
        crate::common::ImageFilter::Nearest => vk::Filter::NEAREST,
        crate::common::ImageFilter::Linear => vk::Filter::LINEAR,
    }
}

#[cfg(feature = "vulkan")]
pub fn address_mode_to_vk(mode: crate::common::ImageAddressMode) -> vk::SamplerAddressMode {
    use crate::common::ImageAddressMode as M;
    match mode {
        M::Repeat => vk::SamplerAddressMode::REPEAT,
        M::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        M::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        M::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

#[cfg(feature = "vulkan")]
pub fn compare_op_to_vk(op: crate::common::ComparisonFunc) -> vk::CompareOp {
    use crate::common::ComparisonFunc as C;
    match op {
        C::Disabled | C::Never => vk::CompareOp::NEVER,
        C::Less => vk::CompareOp::LESS,
        C::Equal => vk::CompareOp::EQUAL,
        C::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        C::Greater => vk::CompareOp::GREATER,
        C::NotEqual => vk::CompareOp::NOT_EQUAL,
        C::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        C::Always => vk::CompareOp::ALWAYS,
    }
}

#[cfg(all(test, feature = "vulkan"))]
mod tests {
    use super::*;

    #[test]
    fn same_usage_has_well_defined_transition() {
        let a = usage_transition(ResourceUsage::RenderTarget);
        let b = usage_transition(ResourceUsage::RenderTarget);
        assert_eq!(a.layout, b.layout);
        assert_eq!(a.access, b.access);
    }

    #[test]
    fn present_table_row_matches_spec() {
        let t = usage_transition(ResourceUsage::Present);
        assert_eq!(t.layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(t.access, vk::AccessFlags::empty());
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
    }

    #[test]
    fn general_buffer_usage_is_union_of_all_flags() {
        let general = buffer_usage_flags(ResourceUsage::General);
        let vertex = buffer_usage_flags(ResourceUsage::VertexBuffer);
        assert!(general.contains(vertex & !vk::BufferUsageFlags::TRANSFER_SRC));
    }
}
