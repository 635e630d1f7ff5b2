//! Shared enumerations persisted across the whole API (§6.2).
//!
//! Mirrors the source library's `Common.h`: these types are the vocabulary
//! every other module (storage, descriptor, pipeline, cache) is built on.

use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryUsage {
    Unknown,
    CpuOnly,
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

impl Default for MemoryUsage {
    fn default() -> Self {
        MemoryUsage::CpuToGpu
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueFamily: u8 {
        const NONE = 0;
        const TRANSFER = 1 << 0;
        const COMPUTE = 1 << 1;
        const GRAPHICS = 1 << 2;
        const PRESENT = 1 << 3;
    }
}

/// Abstract description of how a resource is used at a given instant.
/// Drives flag/access/layout/stage derivation (§6.3, §6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceUsage {
    Undefined,
    PreInitialized,
    General,
    RenderTarget,
    DepthStencil,
    ShaderResource,
    CopySource,
    CopyDestination,
    Present,
    ShaderWrite,
    IndexBuffer,
    VertexBuffer,
    IndirectBuffer,
}

impl Default for ResourceUsage {
    fn default() -> Self {
        ResourceUsage::Undefined
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageAddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonFunc {
    Disabled,
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const GEOMETRY = 1 << 3;
        const TESS_CONTROL = 1 << 4;
        const TESS_EVALUATION = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderResourceType {
    Input,
    InputAttachment,
    Output,
    Image,
    ImageSampler,
    ImageStorage,
    Sampler,
    BufferUniform,
    BufferStorage,
    PushConstant,
    SpecializationConstant,
}

/// Dense enum of supported pixel formats. Ordering is stable and is part of
/// the cache/hash contract (§4.7) — do not reorder existing variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum InternalFormat {
    R8Unorm,
    R8Snorm,
    R8G8Unorm,
    R8G8Snorm,
    R8G8B8A8Unorm,
    R8G8B8A8UnormSrgb,
    R8G8B8A8Snorm,
    B8G8R8A8Unorm,
    B8G8R8A8UnormSrgb,
    B5G6R5Unorm,
    R16Float,
    R16G16Float,
    R16G16B16A16Float,
    R32Float,
    R32G32Float,
    R32G32B32Float,
    R32G32B32A32Float,
    R32Uint,
    R32G32B32A32Uint,
    Bc1Unorm,
    Bc1UnormSrgb,
    Bc3Unorm,
    Bc3UnormSrgb,
    Bc7Unorm,
    Bc7UnormSrgb,
    D32Float,
    D16Unorm,
    D32FloatS8X24,
    D24UnormS8,
}

impl InternalFormat {
    /// Bits per pixel for uncompressed formats, bytes per 4x4 block for
    /// block-compressed formats (so callers must distinguish the two via
    /// `is_block_compressed` before dividing by 8).
    pub fn data_size(self) -> u32 {
        use InternalFormat::*;
        match self {
            R8Unorm | R8Snorm => 8,
            R8G8Unorm | R8G8Snorm => 16,
            R8G8B8A8Unorm | R8G8B8A8UnormSrgb | R8G8B8A8Snorm => 32,
            B8G8R8A8Unorm | B8G8R8A8UnormSrgb => 32,
            B5G6R5Unorm => 16,
            R16Float => 16,
            R16G16Float => 32,
            R16G16B16A16Float => 64,
            R32Float => 32,
            R32G32Float => 64,
            R32G32B32Float => 96,
            R32G32B32A32Float => 128,
            R32Uint => 32,
            R32G32B32A32Uint => 128,
            Bc1Unorm | Bc1UnormSrgb => 8,
            Bc3Unorm | Bc3UnormSrgb => 16,
            Bc7Unorm | Bc7UnormSrgb => 16,
            D32Float => 32,
            D16Unorm => 16,
            D32FloatS8X24 => 64,
            D24UnormS8 => 32,
        }
    }

    pub fn is_block_compressed(self) -> bool {
        matches!(
            self,
            InternalFormat::Bc1Unorm
                | InternalFormat::Bc1UnormSrgb
                | InternalFormat::Bc3Unorm
                | InternalFormat::Bc3UnormSrgb
                | InternalFormat::Bc7Unorm
                | InternalFormat::Bc7UnormSrgb
        )
    }

    pub fn is_depth_stencil(self) -> bool {
        matches!(
            self,
            InternalFormat::D32Float
                | InternalFormat::D16Unorm
                | InternalFormat::D32FloatS8X24
                | InternalFormat::D24UnormS8
        )
    }
}

impl Default for InternalFormat {
    fn default() -> Self {
        InternalFormat::R8G8B8A8Unorm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageFormat {
    pub extent: (u32, u32, u32),
    pub pixel_format: InternalFormat,
    pub mip_levels: u32,
    pub layers: u32,
    pub samples: u32,
}

impl ImageFormat {
    pub fn new(extent: (u32, u32, u32)) -> Self {
        ImageFormat {
            extent,
            pixel_format: InternalFormat::default(),
            mip_levels: 1,
            layers: 1,
            samples: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    Occlusion,
    InputAssemblyVertices,
    InputAssemblyPrimitives,
    VertexShaderInvocations,
    GeometryShaderInvocations,
    GeometryShaderPrimitives,
    ClippingInvocations,
    ClippingPrimitives,
    FragmentShaderInvocations,
    TessellationControlShaderPatches,
    TessellationEvaluationShaderInvocations,
    ComputeShaderInvocations,
    Timestamp,
    TimeElapsed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_family_bits_match_spec() {
        assert_eq!(QueueFamily::NONE.bits(), 0);
        assert_eq!(QueueFamily::TRANSFER.bits(), 1);
        assert_eq!(QueueFamily::COMPUTE.bits(), 2);
        assert_eq!(QueueFamily::GRAPHICS.bits(), 4);
        assert_eq!(QueueFamily::PRESENT.bits(), 8);
    }

    #[test]
    fn memory_usage_default_matches_source() {
        assert_eq!(MemoryUsage::default(), MemoryUsage::CpuToGpu);
    }
}
