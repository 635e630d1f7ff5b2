//! C7: `PipelineState` — the seven sub-states that together form the
//! structural key for a cached graphics pipeline (§4.7), each tracked with
//! its own dirty bit so `RenderingContext` only re-derives what changed
//! since the last draw.
//!
//! Grounded in `original_source/RenderingContext/PipelineState.h`
//! (`PrimitiveTopology`, `InputAssemblyState`, `Viewport`/`ViewportState`,
//! `PolygonMode`, `CullMode`) and the teacher's `vulkan/pipeline/graphics.rs`
//! for which of those fields actually participate in `VkPipeline` creation.

use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputAssemblyState {
    pub topology: PrimitiveTopology,
    pub primitive_restart_enable: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        InputAssemblyState {
            topology: PrimitiveTopology::TriangleList,
            primitive_restart_enable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Scissor {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Viewport/scissor are dynamic state in every pipeline this crate builds
/// (§4.7), so they participate in draw-time recording but not the pipeline
/// hash; kept here only to carry the current value for the command stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewportState {
    pub viewport: Viewport,
    pub scissor: Scissor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizationState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_bias_enable: bool,
    pub depth_clamp_enable: bool,
}

impl Default for RasterizationState {
    fn default() -> Self {
        RasterizationState {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_bias_enable: false,
            depth_clamp_enable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare: crate::common::ComparisonFunc,
    pub stencil_test_enable: bool,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        DepthStencilState {
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare: crate::common::ComparisonFunc::LessOrEqual,
            stencil_test_enable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentBlendState {
    pub enable: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
}

impl Default for AttachmentBlendState {
    fn default() -> Self {
        AttachmentBlendState {
            enable: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BlendState {
    pub attachments: Vec<AttachmentBlendState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MultisampleState {
    pub sample_count: u32,
    pub alpha_to_coverage_enable: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        MultisampleState {
            sample_count: 1,
            alpha_to_coverage_enable: false,
        }
    }
}

macro_rules! dirty_field {
    ($setter:ident, $field:ident, $ty:ty) => {
        pub fn $setter(&mut self, value: $ty) {
            if self.$field != value {
                self.$field = value;
                self.dirty = true;
            }
        }
    };
}

/// The aggregate pipeline state with a single combined dirty bit. The
/// seven sub-states plus the bound shader layout together form the
/// structural cache key (§4.6/§4.7); `ViewportState` is tracked here for
/// convenience but excluded from `hash_key` since it is pure dynamic state.
#[derive(Debug, Clone)]
pub struct PipelineState {
    input_assembly: InputAssemblyState,
    rasterization: RasterizationState,
    depth_stencil: DepthStencilState,
    blend: BlendState,
    multisample: MultisampleState,
    viewport: ViewportState,
    dirty: bool,
}

impl Default for PipelineState {
    fn default() -> Self {
        PipelineState {
            input_assembly: InputAssemblyState::default(),
            rasterization: RasterizationState::default(),
            depth_stencil: DepthStencilState::default(),
            blend: BlendState::default(),
            multisample: MultisampleState::default(),
            viewport: ViewportState::default(),
            dirty: true,
        }
    }
}

impl PipelineState {
    pub fn new() -> PipelineState {
        PipelineState::default()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn input_assembly(&self) -> InputAssemblyState {
        self.input_assembly
    }

    pub fn rasterization(&self) -> RasterizationState {
        self.rasterization
    }

    pub fn depth_stencil(&self) -> DepthStencilState {
        self.depth_stencil
    }

    pub fn blend(&self) -> &BlendState {
        &self.blend
    }

    pub fn multisample(&self) -> MultisampleState {
        self.multisample
    }

    pub fn viewport_state(&self) -> ViewportState {
        self.viewport
    }

    dirty_field!(set_input_assembly, input_assembly, InputAssemblyState);
    dirty_field!(set_rasterization, rasterization, RasterizationState);
    dirty_field!(set_depth_stencil, depth_stencil, DepthStencilState);
    dirty_field!(set_multisample, multisample, MultisampleState);

    pub fn set_blend(&mut self, blend: BlendState) {
        if self.blend != blend {
            self.blend = blend;
            self.dirty = true;
        }
    }

    /// Viewport/scissor changes never dirty the pipeline hash (they are
    /// dynamic state) but do need recording before the next draw.
    pub fn set_viewport_state(&mut self, viewport: ViewportState) {
        self.viewport = viewport;
    }

    /// Structural hash feeding `ResourceCache`'s pipeline family (§4.6).
    /// Deliberately excludes `viewport` (dynamic state, not part of
    /// `VkPipeline` identity).
    pub fn hash_key(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        self.input_assembly.hash(&mut hasher);
        self.rasterization.hash(&mut hasher);
        self.depth_stencil.hash(&mut hasher);
        self.blend.hash(&mut hasher);
        self.multisample.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_equal_value_does_not_dirty() {
        let mut s = PipelineState::new();
        s.clear_dirty();
        s.set_rasterization(RasterizationState::default());
        assert!(!s.is_dirty());
        let mut changed = RasterizationState::default();
        changed.cull_mode = CullMode::None;
        s.set_rasterization(changed);
        assert!(s.is_dirty());
    }

    #[test]
    fn viewport_changes_never_affect_hash() {
        let mut a = PipelineState::new();
        let mut b = PipelineState::new();
        a.set_viewport_state(ViewportState {
            viewport: Viewport {
                width: 100.0,
                ..Default::default()
            },
            scissor: Scissor::default(),
        });
        b.set_viewport_state(ViewportState {
            viewport: Viewport {
                width: 200.0,
                ..Default::default()
            },
            scissor: Scissor::default(),
        });
        assert_eq!(a.hash_key(), b.hash_key());
    }

    #[test]
    fn blend_state_participates_in_hash() {
        let mut a = PipelineState::new();
        let mut b = PipelineState::new();
        b.set_blend(BlendState {
            attachments: vec![AttachmentBlendState {
                enable: true,
                ..Default::default()
            }],
        });
        assert_ne!(a.hash_key(), b.hash_key());
        a.clear_dirty();
    }
}
