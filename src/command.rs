//! C9/C10: `CommandRecorder` and the tagged `Command` dictionary.
//!
//! Grounded in the teacher's `vulkan/mod.rs::begin_render_pass` (render-pass
//! + framebuffer caching, keyed by attachment formats/ops) and
//! `vulkan/render_pass.rs::VulkanRenderPassRecorder` (draw/bind call
//! shapes); `Command` replaces the teacher's `dyn RenderPass` trait object
//! with a tagged enum per the redesign in §9 ("deep inheritance of
//! commands"), so recording never allocates a vtable per call.

use crate::binding_state::{BindingSet, BindingState};
use crate::buffer_object::BufferObject;
use crate::common::ResourceUsage;
use crate::convert::{filter_to_vk, usage_transition};
use crate::descriptor::{DescriptorPool, ShaderResourceLayoutSet};
use crate::device::Device;
use crate::error::{Result, RhiError};
use crate::fbo::{Fbo, FramebufferFormat};
use crate::pipeline::{GraphicsPipeline, GraphicsPipelineDesc, PipelineLayout, ShaderModule, VertexInputAttribute, VertexInputBinding};
use crate::pipeline_state::{PipelineState, Scissor, Viewport};
use crate::query::{QueryPool, QuerySlot};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[cfg(feature = "vulkan")]
use ash::vk;

/// §4.9: the lifecycle every `CommandRecorder` moves through. `Free` is the
/// post-submit resting state once the fence has signaled; `reset()` is the
/// only way back to `Recording` from `Executable`/`Free`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Recording,
    Compiling,
    Executable,
    Pending,
    Free,
    Invalid,
}

impl RecorderState {
    fn name(self) -> &'static str {
        match self {
            RecorderState::Recording => "Recording",
            RecorderState::Compiling => "Compiling",
            RecorderState::Executable => "Executable",
            RecorderState::Pending => "Pending",
            RecorderState::Free => "Free",
            RecorderState::Invalid => "Invalid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugMarkerEvent {
    Begin,
    Insert,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    Uint16,
    Uint32,
}

#[cfg(feature = "vulkan")]
fn index_type_to_vk(ty: IndexType) -> vk::IndexType {
    match ty {
        IndexType::Uint16 => vk::IndexType::UINT16,
        IndexType::Uint32 => vk::IndexType::UINT32,
    }
}

/// §4.10: one variant per native call the recorder can emit. Replaces a
/// polymorphic command hierarchy with a flat tagged sum type (§9).
///
/// `BindPipeline` carries the shader pair and a cloned `PipelineState`
/// rather than an already-resolved `GraphicsPipeline`: the render pass a
/// pipeline runs within is only known once `compile()` walks into the
/// enclosing `BeginRenderPass`, so pipeline resolution happens inline in
/// `CommandRecorder::compile_inner`, not at record time.
pub enum Command {
    BindPipeline {
        shader: DrawShaderState,
        state: PipelineState,
    },
    BindSet {
        set_index: u32,
        layout_set: ShaderResourceLayoutSet,
        bindings: BindingSet,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<Arc<BufferObject>>,
    },
    BindIndexBuffer {
        buffer: Arc<BufferObject>,
        index_type: IndexType,
    },
    BeginRenderPass {
        fbo: Arc<Fbo>,
        clear_color: Option<(f32, f32, f32, f32)>,
        clear_depth: Option<f32>,
        clear_stencil: Option<u32>,
    },
    EndRenderPass,
    PushConstant {
        stages: crate::common::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    ImageBarrier {
        image: Arc<crate::image_storage::ImageStorage>,
        old_usage: ResourceUsage,
        new_usage: ResourceUsage,
    },
    CopyBuffer {
        src: Arc<BufferObject>,
        dst: Arc<BufferObject>,
        size: u64,
    },
    /// §4.10: inline update for small writes (`size` bounded by the
    /// device's `vkCmdUpdateBuffer` limit of 64 KiB), used by
    /// [`crate::rendering_state::UniformBuffer::flush`] for UBO targets.
    UpdateBuffer {
        dst: Arc<BufferObject>,
        offset: u64,
        data: Vec<u8>,
    },
    CopyBufferToImage {
        src: Arc<BufferObject>,
        dst: Arc<crate::image_storage::ImageStorage>,
        width: u32,
        height: u32,
    },
    CopyImageToBuffer {
        src: Arc<crate::image_storage::ImageStorage>,
        dst: Arc<BufferObject>,
        width: u32,
        height: u32,
    },
    BlitImage {
        src: Arc<crate::image_storage::ImageStorage>,
        dst: Arc<crate::image_storage::ImageStorage>,
        filter: crate::common::ImageFilter,
    },
    /// Same-format image-to-image copy, no scaling/filtering (§4.10:
    /// distinct from `BlitImage`, which may rescale).
    CopyImage {
        src: Arc<crate::image_storage::ImageStorage>,
        dst: Arc<crate::image_storage::ImageStorage>,
        width: u32,
        height: u32,
    },
    /// Outside a render pass: transitions to `CopyDestination`, clears
    /// color or depth/stencil (§4.10).
    ClearImage {
        image: Arc<crate::image_storage::ImageStorage>,
        color: Option<(f32, f32, f32, f32)>,
        depth_stencil: Option<(f32, u32)>,
    },
    DrawIndirect {
        buffer: Arc<BufferObject>,
        draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        buffer: Arc<BufferObject>,
        draw_count: u32,
        stride: u32,
    },
    ClearAttachments {
        color: Option<(f32, f32, f32, f32)>,
        depth: Option<f32>,
        rect: Option<Scissor>,
    },
    Draw {
        vertex_count: u32,
        first_vertex: u32,
        instance_count: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
        instance_count: u32,
        first_instance: u32,
    },
    DynamicScissor {
        rects: Vec<Scissor>,
    },
    DynamicViewport {
        viewport: Viewport,
    },
    QueryBegin {
        pool: Arc<QueryPool>,
        slot: QuerySlot,
    },
    QueryEnd {
        pool: Arc<QueryPool>,
        slot: QuerySlot,
    },
    ResetQueryPool {
        pool: Arc<QueryPool>,
        query_type: crate::common::QueryType,
    },
    /// Resets a single slot rather than the whole pool (§4.10).
    ResetQuery {
        pool: Arc<QueryPool>,
        slot: QuerySlot,
    },
    /// A single timestamp write; two of these bracketing a region of work
    /// give elapsed GPU time once read back (§4.10).
    TimeElapsedQuery {
        pool: Arc<QueryPool>,
        slot: QuerySlot,
    },
    /// Compiles (if needed) and records a secondary command buffer inline
    /// (§4.10). Resolved directly by `compile_inner`, like `BeginRenderPass`,
    /// since it needs mutable access to the secondary recorder.
    ExecuteCommandBuffer {
        secondary: Arc<std::sync::Mutex<CommandRecorder>>,
    },
    DebugMarker {
        event: DebugMarkerEvent,
        label: &'static str,
    },
}

/// Everything a `Command::compile` call needs, bundled so the match arm
/// signatures stay small (§4.9: `context = {device, resourceCache,
/// descriptorPool, nativeCmd}`). `BindPipeline`/`BeginRenderPass`/
/// `EndRenderPass` are resolved directly by `CommandRecorder::compile_inner`
/// since they need the render-pass/framebuffer caches, not just this
/// per-command context; their arms below are unreachable.
#[cfg(feature = "vulkan")]
struct CompileContext<'a> {
    device: &'a Arc<Device>,
    cmd: vk::CommandBuffer,
    bound_layout: &'a mut Option<Arc<PipelineLayout>>,
    bound_point: &'a mut vk::PipelineBindPoint,
}

impl Command {
    #[cfg(feature = "vulkan")]
    fn compile(&self, ctx: &mut CompileContext) -> Result<()> {
        let raw = &ctx.device.raw;
        match self {
            Command::BindPipeline { .. }
            | Command::BeginRenderPass { .. }
            | Command::EndRenderPass
            | Command::ExecuteCommandBuffer { .. } => {
                unreachable!("resolved directly by CommandRecorder::compile_inner")
            }
            Command::BindSet {
                set_index,
                layout_set,
                bindings,
            } => {
                let layout = ctx
                    .bound_layout
                    .as_ref()
                    .ok_or(RhiError::RecorderStateViolation {
                        expected: "pipeline bound before BindSet",
                        actual: "no pipeline bound",
                    })?
                    .clone();
                let descriptor_set = ctx
                    .device
                    .with_descriptor_pool(|pool: &DescriptorPool| pool.request_descriptor_set(layout_set.clone(), bindings))??;
                let dynamic_offsets: Vec<u32> = descriptor_set.dynamic_offsets.iter().map(|o| *o as u32).collect();
                unsafe {
                    raw.cmd_bind_descriptor_sets(
                        ctx.cmd,
                        *ctx.bound_point,
                        layout.native(),
                        *set_index,
                        &[descriptor_set.native()],
                        &dynamic_offsets,
                    );
                }
                Ok(())
            }
            Command::BindVertexBuffers { first_binding, buffers } => {
                let natives: Vec<vk::Buffer> = buffers.iter().map(|b| b.storage().native()).collect();
                let offsets: Vec<u64> = buffers.iter().map(|b| b.offset()).collect();
                unsafe {
                    raw.cmd_bind_vertex_buffers(ctx.cmd, *first_binding, &natives, &offsets);
                }
                Ok(())
            }
            Command::BindIndexBuffer { buffer, index_type } => {
                unsafe {
                    raw.cmd_bind_index_buffer(ctx.cmd, buffer.storage().native(), buffer.offset(), index_type_to_vk(*index_type));
                }
                Ok(())
            }
            Command::PushConstant { stages, offset, data } => {
                let layout = ctx
                    .bound_layout
                    .as_ref()
                    .ok_or(RhiError::RecorderStateViolation {
                        expected: "pipeline bound before push constants",
                        actual: "no pipeline bound",
                    })?;
                if *offset as usize + data.len() > ctx.device.max_push_constant_size() as usize {
                    return Err(RhiError::InvalidConfiguration("push constant range exceeds device limit".into()));
                }
                unsafe {
                    raw.cmd_push_constants(ctx.cmd, layout.native(), stage_flags_to_vk(*stages), *offset, data);
                }
                Ok(())
            }
            Command::ImageBarrier {
                image,
                old_usage,
                new_usage,
            } => {
                if old_usage == new_usage {
                    return Ok(());
                }
                let src = usage_transition(*old_usage);
                let dst = usage_transition(*new_usage);
                let aspect = if image.format().pixel_format.is_depth_stencil() {
                    vk::ImageAspectFlags::DEPTH
                } else {
                    vk::ImageAspectFlags::COLOR
                };
                let barrier = vk::ImageMemoryBarrier::default()
                    .old_layout(src.layout)
                    .new_layout(dst.layout)
                    .src_access_mask(src.access)
                    .dst_access_mask(dst.access)
                    .image(image.image)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(aspect)
                            .base_mip_level(0)
                            .level_count(vk::REMAINING_MIP_LEVELS)
                            .base_array_layer(0)
                            .layer_count(vk::REMAINING_ARRAY_LAYERS),
                    );
                unsafe {
                    raw.cmd_pipeline_barrier(
                        ctx.cmd,
                        src.dst_stage,
                        dst.src_stage,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[barrier],
                    );
                }
                image.set_last_usage(*new_usage);
                Ok(())
            }
            Command::CopyBuffer { src, dst, size } => {
                let region = vk::BufferCopy::default().src_offset(src.offset()).dst_offset(dst.offset()).size(*size);
                unsafe {
                    raw.cmd_copy_buffer(ctx.cmd, src.storage().native(), dst.storage().native(), &[region]);
                }
                Ok(())
            }
            Command::UpdateBuffer { dst, offset, data } => {
                if data.len() > 65536 {
                    return Err(RhiError::InvalidConfiguration(
                        "UpdateBuffer payload exceeds the 64 KiB vkCmdUpdateBuffer limit".into(),
                    ));
                }
                unsafe {
                    raw.cmd_update_buffer(ctx.cmd, dst.storage().native(), dst.offset() + offset, data);
                }
                Ok(())
            }
            Command::CopyBufferToImage { src, dst, width, height } => {
                let region = vk::BufferImageCopy::default()
                    .buffer_offset(src.offset())
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image_extent(vk::Extent3D {
                        width: *width,
                        height: *height,
                        depth: 1,
                    });
                unsafe {
                    raw.cmd_copy_buffer_to_image(
                        ctx.cmd,
                        src.storage().native(),
                        dst.image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }
                Ok(())
            }
            Command::CopyImageToBuffer { src, dst, width, height } => {
                let region = vk::BufferImageCopy::default()
                    .buffer_offset(dst.offset())
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image_extent(vk::Extent3D {
                        width: *width,
                        height: *height,
                        depth: 1,
                    });
                unsafe {
                    raw.cmd_copy_image_to_buffer(
                        ctx.cmd,
                        src.image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        dst.storage().native(),
                        &[region],
                    );
                }
                Ok(())
            }
            Command::BlitImage { src, dst, filter } => {
                let src_extent = src.format().extent;
                let dst_extent = dst.format().extent;
                let subresource = vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                };
                let region = vk::ImageBlit::default()
                    .src_subresource(subresource)
                    .src_offsets([
                        vk::Offset3D::default(),
                        vk::Offset3D {
                            x: src_extent.0 as i32,
                            y: src_extent.1 as i32,
                            z: 1,
                        },
                    ])
                    .dst_subresource(subresource)
                    .dst_offsets([
                        vk::Offset3D::default(),
                        vk::Offset3D {
                            x: dst_extent.0 as i32,
                            y: dst_extent.1 as i32,
                            z: 1,
                        },
                    ]);
                unsafe {
                    raw.cmd_blit_image(
                        ctx.cmd,
                        src.image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        dst.image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                        filter_to_vk(*filter),
                    );
                }
                Ok(())
            }
            Command::CopyImage { src, dst, width, height } => {
                let subresource = vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                };
                let region = vk::ImageCopy::default()
                    .src_subresource(subresource)
                    .dst_subresource(subresource)
                    .extent(vk::Extent3D {
                        width: *width,
                        height: *height,
                        depth: 1,
                    });
                unsafe {
                    raw.cmd_copy_image(
                        ctx.cmd,
                        src.image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        dst.image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }
                Ok(())
            }
            Command::ClearImage { image, color, depth_stencil } => {
                let aspect = if image.format().pixel_format.is_depth_stencil() {
                    vk::ImageAspectFlags::DEPTH
                } else {
                    vk::ImageAspectFlags::COLOR
                };
                let range = vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(vk::REMAINING_MIP_LEVELS)
                    .base_array_layer(0)
                    .layer_count(vk::REMAINING_ARRAY_LAYERS);
                unsafe {
                    if let Some((r, g, b, a)) = color {
                        raw.cmd_clear_color_image(
                            ctx.cmd,
                            image.image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            &vk::ClearColorValue {
                                float32: [*r, *g, *b, *a],
                            },
                            &[range],
                        );
                    } else if let Some((depth, stencil)) = depth_stencil {
                        raw.cmd_clear_depth_stencil_image(
                            ctx.cmd,
                            image.image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            &vk::ClearDepthStencilValue {
                                depth: *depth,
                                stencil: *stencil,
                            },
                            &[range],
                        );
                    }
                }
                image.set_last_usage(ResourceUsage::CopyDestination);
                Ok(())
            }
            Command::DrawIndirect { buffer, draw_count, stride } => {
                if *draw_count == 0 {
                    return Ok(());
                }
                unsafe {
                    raw.cmd_draw_indirect(ctx.cmd, buffer.storage().native(), buffer.offset(), *draw_count, *stride);
                }
                Ok(())
            }
            Command::DrawIndexedIndirect { buffer, draw_count, stride } => {
                if *draw_count == 0 {
                    return Ok(());
                }
                unsafe {
                    raw.cmd_draw_indexed_indirect(ctx.cmd, buffer.storage().native(), buffer.offset(), *draw_count, *stride);
                }
                Ok(())
            }
            Command::ClearAttachments { color, depth, rect } => {
                let mut attachments = Vec::new();
                if let Some((r, g, b, a)) = color {
                    attachments.push(
                        vk::ClearAttachment::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .color_attachment(0)
                            .clear_value(vk::ClearValue {
                                color: vk::ClearColorValue {
                                    float32: [*r, *g, *b, *a],
                                },
                            }),
                    );
                }
                if let Some(d) = depth {
                    attachments.push(vk::ClearAttachment::default().aspect_mask(vk::ImageAspectFlags::DEPTH).clear_value(
                        vk::ClearValue {
                            depth_stencil: vk::ClearDepthStencilValue { depth: *d, stencil: 0 },
                        },
                    ));
                }
                if attachments.is_empty() {
                    return Ok(());
                }
                let rect = rect.unwrap_or(Scissor {
                    x: 0,
                    y: 0,
                    width: u32::MAX,
                    height: u32::MAX,
                });
                let clear_rect = vk::ClearRect::default()
                    .rect(vk::Rect2D {
                        offset: vk::Offset2D { x: rect.x, y: rect.y },
                        extent: vk::Extent2D {
                            width: rect.width,
                            height: rect.height,
                        },
                    })
                    .base_array_layer(0)
                    .layer_count(1);
                unsafe {
                    raw.cmd_clear_attachments(ctx.cmd, &attachments, &[clear_rect]);
                }
                Ok(())
            }
            Command::Draw {
                vertex_count,
                first_vertex,
                instance_count,
                first_instance,
            } => {
                if *instance_count == 0 {
                    return Ok(());
                }
                unsafe {
                    raw.cmd_draw(ctx.cmd, *vertex_count, *instance_count, *first_vertex, *first_instance);
                }
                Ok(())
            }
            Command::DrawIndexed {
                index_count,
                first_index,
                vertex_offset,
                instance_count,
                first_instance,
            } => {
                if *instance_count == 0 {
                    return Ok(());
                }
                unsafe {
                    raw.cmd_draw_indexed(
                        ctx.cmd,
                        *index_count,
                        *instance_count,
                        *first_index,
                        *vertex_offset,
                        *first_instance,
                    );
                }
                Ok(())
            }
            Command::DynamicScissor { rects } => {
                let vk_rects: Vec<vk::Rect2D> = rects
                    .iter()
                    .map(|r| vk::Rect2D {
                        offset: vk::Offset2D { x: r.x.max(0), y: r.y.max(0) },
                        extent: vk::Extent2D {
                            width: r.width,
                            height: r.height,
                        },
                    })
                    .collect();
                unsafe {
                    raw.cmd_set_scissor(ctx.cmd, 0, &vk_rects);
                }
                Ok(())
            }
            Command::DynamicViewport { viewport } => {
                let vp = vk::Viewport::default()
                    .x(viewport.x)
                    .y(viewport.y)
                    .width(viewport.width)
                    .height(viewport.height)
                    .min_depth(viewport.min_depth)
                    .max_depth(viewport.max_depth);
                unsafe {
                    raw.cmd_set_viewport(ctx.cmd, 0, &[vp]);
                }
                Ok(())
            }
            Command::QueryBegin { pool, slot } => {
                if let Some(native) = pool.native_pool(*slot) {
                    unsafe {
                        raw.cmd_begin_query(ctx.cmd, native, slot.slot, vk::QueryControlFlags::empty());
                    }
                }
                Ok(())
            }
            Command::QueryEnd { pool, slot } => {
                if let Some(native) = pool.native_pool(*slot) {
                    unsafe {
                        raw.cmd_end_query(ctx.cmd, native, slot.slot);
                    }
                }
                Ok(())
            }
            Command::ResetQueryPool { pool, query_type } => {
                pool.reset_pool(*query_type);
                Ok(())
            }
            Command::ResetQuery { pool, slot } => {
                if let Some(native) = pool.native_pool(*slot) {
                    unsafe {
                        raw.cmd_reset_query_pool(ctx.cmd, native, slot.slot, 1);
                    }
                }
                Ok(())
            }
            Command::TimeElapsedQuery { pool, slot } => {
                if let Some(native) = pool.native_pool(*slot) {
                    unsafe {
                        raw.cmd_write_timestamp(ctx.cmd, vk::PipelineStageFlags::BOTTOM_OF_PIPE, native, slot.slot);
                    }
                }
                Ok(())
            }
            Command::DebugMarker { .. } => {
                // No `VK_EXT_debug_utils` loader is wired up at device
                // creation yet; markers are recorded for parity with the
                // command stream but emit nothing until that extension is
                // loaded.
                Ok(())
            }
        }
    }
}

#[cfg(feature = "vulkan")]
fn stage_flags_to_vk(stages: crate::common::ShaderStageFlags) -> vk::ShaderStageFlags {
    use crate::common::ShaderStageFlags as S;
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(S::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(S::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(S::COMPUTE) {
        flags |= vk::ShaderStageFlags::COMPUTE;
    }
    flags
}

/// The active shader pair plus vertex layout, set by `set_pipeline` and
/// resolved into a cached `GraphicsPipeline` at `compile()` time, once the
/// render pass it will run within is known (§4.9, §4.7).
#[derive(Clone)]
pub struct DrawShaderState {
    pub vertex_shader: Arc<ShaderModule>,
    pub fragment_shader: Arc<ShaderModule>,
    pub vertex_bindings: Vec<VertexInputBinding>,
    pub vertex_attributes: Vec<VertexInputAttribute>,
    pub layout: Arc<PipelineLayout>,
    pub shader_layouts: Vec<ShaderResourceLayoutSet>,
}

/// §4.9: deferred command recording, pre-draw `flush`, and compile/submit.
pub struct CommandRecorder {
    device: Arc<Device>,
    state: RecorderState,
    commands: Vec<Command>,
    pipeline_state: PipelineState,
    binding_state: BindingState,
    shader: Option<DrawShaderState>,
    shader_dirty: bool,
    render_pass_open: bool,
    #[cfg(feature = "vulkan")]
    native: Option<vk::CommandBuffer>,
    #[cfg(feature = "vulkan")]
    transient: bool,
    is_secondary: bool,
}

impl CommandRecorder {
    pub fn new(device: Arc<Device>, set_count: usize) -> CommandRecorder {
        CommandRecorder {
            device,
            state: RecorderState::Recording,
            commands: Vec::new(),
            pipeline_state: PipelineState::new(),
            binding_state: BindingState::new(set_count),
            shader: None,
            shader_dirty: false,
            render_pass_open: false,
            #[cfg(feature = "vulkan")]
            native: None,
            #[cfg(feature = "vulkan")]
            transient: true,
            is_secondary: false,
        }
    }

    /// §4.10 `ExecuteCommandBuffer`: a secondary recorder compiles into a
    /// `SECONDARY`-level command buffer outside any render pass, rather
    /// than the `PRIMARY` level `new` produces.
    pub fn new_secondary(device: Arc<Device>, set_count: usize) -> CommandRecorder {
        let mut recorder = CommandRecorder::new(device, set_count);
        recorder.is_secondary = true;
        recorder
    }

    pub fn execute_command_buffer(&mut self, secondary: Arc<std::sync::Mutex<CommandRecorder>>) {
        self.commands.push(Command::ExecuteCommandBuffer { secondary });
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    fn expect_state(&self, expected: RecorderState) -> Result<()> {
        if self.state != expected {
            return Err(RhiError::RecorderStateViolation {
                expected: expected.name(),
                actual: self.state.name(),
            });
        }
        Ok(())
    }

    pub fn pipeline_state_mut(&mut self) -> &mut PipelineState {
        &mut self.pipeline_state
    }

    pub fn binding_state_mut(&mut self) -> &mut BindingState {
        &mut self.binding_state
    }

    pub fn set_pipeline(&mut self, shader: DrawShaderState) {
        self.shader = Some(shader);
        self.shader_dirty = true;
    }

    pub fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: Vec<Arc<BufferObject>>) {
        self.commands.push(Command::BindVertexBuffers { first_binding, buffers });
    }

    pub fn bind_index_buffer(&mut self, buffer: Arc<BufferObject>, index_type: IndexType) {
        self.commands.push(Command::BindIndexBuffer { buffer, index_type });
    }

    pub fn push_constants(&mut self, stages: crate::common::ShaderStageFlags, offset: u32, data: Vec<u8>) {
        self.commands.push(Command::PushConstant { stages, offset, data });
    }

    pub fn image_barrier(&mut self, image: Arc<crate::image_storage::ImageStorage>, new_usage: ResourceUsage) {
        let old_usage = image.last_usage();
        self.commands.push(Command::ImageBarrier {
            image,
            old_usage,
            new_usage,
        });
    }

    pub fn copy_buffer(&mut self, src: Arc<BufferObject>, dst: Arc<BufferObject>, size: u64) {
        self.commands.push(Command::CopyBuffer { src, dst, size });
    }

    /// §4.10 `UpdateBuffer`: inline update for small (≤64 KiB) writes, used
    /// by the uniform-buffer flush path instead of a staged copy.
    pub fn update_buffer(&mut self, dst: Arc<BufferObject>, offset: u64, data: Vec<u8>) {
        self.commands.push(Command::UpdateBuffer { dst, offset, data });
    }

    pub fn copy_buffer_to_image(&mut self, src: Arc<BufferObject>, dst: Arc<crate::image_storage::ImageStorage>, width: u32, height: u32) {
        self.image_barrier(dst.clone(), ResourceUsage::CopyDestination);
        self.commands.push(Command::CopyBufferToImage { src, dst, width, height });
    }

    pub fn copy_image_to_buffer(&mut self, src: Arc<crate::image_storage::ImageStorage>, dst: Arc<BufferObject>, width: u32, height: u32) {
        self.image_barrier(src.clone(), ResourceUsage::CopySource);
        self.commands.push(Command::CopyImageToBuffer { src, dst, width, height });
    }

    /// Same-format, unscaled image copy (§4.10); use `blit_image` for
    /// rescaling or format conversion.
    pub fn copy_image(&mut self, src: Arc<crate::image_storage::ImageStorage>, dst: Arc<crate::image_storage::ImageStorage>, width: u32, height: u32) {
        self.image_barrier(src.clone(), ResourceUsage::CopySource);
        self.image_barrier(dst.clone(), ResourceUsage::CopyDestination);
        self.commands.push(Command::CopyImage { src, dst, width, height });
    }

    pub fn blit_image(
        &mut self,
        src: Arc<crate::image_storage::ImageStorage>,
        dst: Arc<crate::image_storage::ImageStorage>,
        filter: crate::common::ImageFilter,
    ) {
        self.image_barrier(src.clone(), ResourceUsage::CopySource);
        self.image_barrier(dst.clone(), ResourceUsage::CopyDestination);
        self.commands.push(Command::BlitImage { src, dst, filter });
    }

    /// Outside a render pass only; auto-transitions to `CopyDestination`
    /// first (§4.10).
    pub fn clear_image(
        &mut self,
        image: Arc<crate::image_storage::ImageStorage>,
        color: Option<(f32, f32, f32, f32)>,
        depth_stencil: Option<(f32, u32)>,
    ) {
        self.image_barrier(image.clone(), ResourceUsage::CopyDestination);
        self.commands.push(Command::ClearImage { image, color, depth_stencil });
    }

    pub fn draw_indirect(&mut self, buffer: Arc<BufferObject>, draw_count: u32, stride: u32) {
        self.flush();
        self.commands.push(Command::DrawIndirect { buffer, draw_count, stride });
    }

    pub fn draw_indexed_indirect(&mut self, buffer: Arc<BufferObject>, draw_count: u32, stride: u32) {
        self.flush();
        self.commands.push(Command::DrawIndexedIndirect { buffer, draw_count, stride });
    }

    pub fn clear_attachments(&mut self, color: Option<(f32, f32, f32, f32)>, depth: Option<f32>, rect: Option<Scissor>) {
        self.commands.push(Command::ClearAttachments { color, depth, rect });
    }

    pub fn set_scissor(&mut self, rects: Vec<Scissor>) {
        let rects: Vec<Scissor> = rects
            .into_iter()
            .map(|mut r| {
                r.x = r.x.max(0);
                r.y = r.y.max(0);
                r
            })
            .collect();
        self.commands.push(Command::DynamicScissor { rects });
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(Command::DynamicViewport { viewport });
    }

    pub fn begin_query(&mut self, pool: Arc<QueryPool>, slot: QuerySlot) {
        self.commands.push(Command::QueryBegin { pool, slot });
    }

    pub fn end_query(&mut self, pool: Arc<QueryPool>, slot: QuerySlot) {
        self.commands.push(Command::QueryEnd { pool, slot });
    }

    /// Resets one slot rather than every slot of its `QueryType` (§4.10).
    pub fn reset_query(&mut self, pool: Arc<QueryPool>, slot: QuerySlot) {
        self.commands.push(Command::ResetQuery { pool, slot });
    }

    /// Writes a single GPU timestamp into `slot`; the caller reads back two
    /// bracketing writes to compute elapsed time (§4.10).
    pub fn time_elapsed_query(&mut self, pool: Arc<QueryPool>, slot: QuerySlot) {
        self.commands.push(Command::TimeElapsedQuery { pool, slot });
    }

    pub fn reset_query_pool(&mut self, pool: Arc<QueryPool>, query_type: crate::common::QueryType) {
        self.commands.push(Command::ResetQueryPool { pool, query_type });
    }

    pub fn debug_marker(&mut self, event: DebugMarkerEvent, label: &'static str) {
        self.commands.push(Command::DebugMarker { event, label });
    }

    /// §4.9: begins a render pass against `fbo`. The native render pass and
    /// framebuffer are not resolved here, only at `compile()` time, once
    /// the active command buffer is known and every attachment's current
    /// `lastUsage` can be read for the `loadOp` decision.
    pub fn begin_render_pass(
        &mut self,
        fbo: Arc<Fbo>,
        clear_color: Option<(f32, f32, f32, f32)>,
        clear_depth: Option<f32>,
        clear_stencil: Option<u32>,
    ) -> Result<()> {
        if self.render_pass_open {
            return Err(RhiError::RecorderStateViolation {
                expected: "no active render pass",
                actual: "render pass already open",
            });
        }
        self.render_pass_open = true;
        self.debug_marker(DebugMarkerEvent::Begin, "Render Pass");
        self.commands.push(Command::BeginRenderPass {
            fbo,
            clear_color,
            clear_depth,
            clear_stencil,
        });
        Ok(())
    }

    /// §4.9: updates each attachment's `lastUsage` to the attachment usage
    /// it will have on exit (`RenderTarget`/`DepthStencil`).
    pub fn end_render_pass(&mut self, fbo: &Fbo) -> Result<()> {
        if !self.render_pass_open {
            return Err(RhiError::RecorderStateViolation {
                expected: "active render pass",
                actual: "no render pass open",
            });
        }
        self.render_pass_open = false;
        for t in &fbo.color_attachments {
            t.view().storage().set_last_usage(ResourceUsage::RenderTarget);
        }
        if let Some(d) = &fbo.depth_attachment {
            d.view().storage().set_last_usage(ResourceUsage::DepthStencil);
        }
        self.commands.push(Command::EndRenderPass);
        self.debug_marker(DebugMarkerEvent::End, "Render Pass");
        Ok(())
    }

    /// §4.9 steps 1-3: resolves the dirty pipeline/binding state into
    /// `BindPipeline`/`BindSet` commands before the next draw/dispatch. A
    /// change to `PipelineState` alone (no shader change) still needs a new
    /// `BindPipeline`, since pipeline identity is keyed on both.
    pub fn flush(&mut self) {
        if self.shader_dirty || self.pipeline_state.is_dirty() {
            if let Some(shader) = &self.shader {
                self.commands.push(Command::BindPipeline {
                    shader: shader.clone(),
                    state: self.pipeline_state.clone(),
                });
            }
        }
        self.pipeline_state.clear_dirty();
        self.shader_dirty = false;

        if self.binding_state.any_dirty() {
            if let Some(shader) = &self.shader {
                let debug = self.device.config.debug_mode;
                for set_index in self.binding_state.dirty_indices() {
                    if let Some(layout_set) = shader.shader_layouts.get(set_index) {
                        let bindings = self.binding_state.set(set_index).clone();
                        self.commands.push(Command::BindSet {
                            set_index: set_index as u32,
                            layout_set: layout_set.clone(),
                            bindings,
                        });
                        self.binding_state.set_mut(set_index).clear_dirty();
                    }
                }
                if debug {
                    self.debug_marker(DebugMarkerEvent::Insert, "Bindings changed");
                }
            }
        }
    }

    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32, instance_count: u32, first_instance: u32) {
        self.flush();
        self.commands.push(Command::Draw {
            vertex_count,
            first_vertex,
            instance_count,
            first_instance,
        });
    }

    pub fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32, instance_count: u32, first_instance: u32) {
        self.flush();
        self.commands.push(Command::DrawIndexed {
            index_count,
            first_index,
            vertex_offset,
            instance_count,
            first_instance,
        });
    }

    /// §4.9: resolves each deferred pipeline against the render pass it
    /// runs within, records every command into a fresh native command
    /// buffer, then transitions to `Executable`. Any compile failure moves
    /// the recorder to `Invalid` and refuses later `submit()`.
    #[cfg(feature = "vulkan")]
    pub fn compile(&mut self) -> Result<()> {
        if self.state == RecorderState::Executable {
            return Ok(());
        }
        self.expect_state(RecorderState::Recording)?;
        self.state = RecorderState::Compiling;

        match self.compile_inner() {
            Ok(()) => {
                self.state = RecorderState::Executable;
                Ok(())
            }
            Err(e) => {
                self.state = RecorderState::Invalid;
                log::error!(target: "render_core::command", "recorder compile failed: {e}");
                Err(e)
            }
        }
    }

    #[cfg(feature = "vulkan")]
    fn compile_inner(&mut self) -> Result<()> {
        let raw = self.device.raw.clone();
        let pool = self.device.command_pool;
        let level = if self.is_secondary {
            vk::CommandBufferLevel::SECONDARY
        } else {
            vk::CommandBufferLevel::PRIMARY
        };
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(level)
            .command_buffer_count(1);
        let native = unsafe {
            raw.allocate_command_buffers(&alloc_info).map_err(|e| RhiError::CompileFailure {
                stage: "command-buffer",
                message: e.to_string(),
            })?[0]
        };
        let usage = if self.transient {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::SIMULTANEOUS_USE
        };
        let begin_info = vk::CommandBufferBeginInfo::default().flags(usage);
        let inheritance = vk::CommandBufferInheritanceInfo::default();
        let begin_info = if self.is_secondary {
            begin_info.inheritance_info(&inheritance)
        } else {
            begin_info
        };
        unsafe {
            raw.begin_command_buffer(native, &begin_info).map_err(|e| RhiError::CompileFailure {
                stage: "command-buffer-begin",
                message: e.to_string(),
            })?;
        }

        let mut bound_layout: Option<Arc<PipelineLayout>> = None;
        let mut bound_point = vk::PipelineBindPoint::GRAPHICS;
        let mut active_render_pass = vk::RenderPass::null();
        let subpass = 0u32;

        for command in self.commands.drain(..) {
            match command {
                Command::BindPipeline { shader, state } => {
                    let desc = GraphicsPipelineDesc {
                        vertex_shader: shader.vertex_shader.clone(),
                        fragment_shader: shader.fragment_shader.clone(),
                        vertex_bindings: shader.vertex_bindings.clone(),
                        vertex_attributes: shader.vertex_attributes.clone(),
                        layout: shader.layout.clone(),
                        render_pass: active_render_pass,
                        subpass,
                        state_hash: state.hash_key(),
                    };
                    let pipeline = GraphicsPipeline::create_or_cached(self.device.clone(), desc, &state)?;
                    unsafe {
                        raw.cmd_bind_pipeline(native, vk::PipelineBindPoint::GRAPHICS, pipeline.native());
                    }
                    bound_layout = Some(pipeline.layout().clone());
                    bound_point = vk::PipelineBindPoint::GRAPHICS;
                }
                Command::BeginRenderPass {
                    fbo,
                    clear_color,
                    clear_depth,
                    clear_stencil,
                } => {
                    let (render_pass, framebuffer, extent) = resolve_render_pass(&self.device, &fbo)?;
                    active_render_pass = render_pass;
                    let clear_values = build_clear_values(&fbo, clear_color, clear_depth, clear_stencil);
                    let begin = vk::RenderPassBeginInfo::default()
                        .render_pass(render_pass)
                        .framebuffer(framebuffer)
                        .render_area(vk::Rect2D {
                            offset: vk::Offset2D { x: 0, y: 0 },
                            extent: vk::Extent2D {
                                width: extent.0,
                                height: extent.1,
                            },
                        })
                        .clear_values(&clear_values);
                    unsafe {
                        raw.cmd_begin_render_pass(native, &begin, vk::SubpassContents::INLINE);
                    }
                }
                Command::EndRenderPass => {
                    unsafe { raw.cmd_end_render_pass(native) };
                    active_render_pass = vk::RenderPass::null();
                }
                Command::ExecuteCommandBuffer { secondary } => {
                    let mut guard = secondary.lock().unwrap();
                    if guard.state != RecorderState::Executable {
                        guard.compile()?;
                    }
                    if let Some(secondary_native) = guard.native {
                        unsafe {
                            raw.cmd_execute_commands(native, &[secondary_native]);
                        }
                    }
                }
                other => {
                    let mut ctx = CompileContext {
                        device: &self.device,
                        cmd: native,
                        bound_layout: &mut bound_layout,
                        bound_point: &mut bound_point,
                    };
                    other.compile(&mut ctx)?;
                }
            }
        }

        unsafe {
            raw.end_command_buffer(native).map_err(|e| RhiError::CompileFailure {
                stage: "command-buffer-end",
                message: e.to_string(),
            })?;
        }
        self.native = Some(native);
        Ok(())
    }

    /// §4.9: legal only on a primary, `Executable` recorder. Submission is
    /// delegated to the queue; this call blocks until the submit fence
    /// signals when `wait` is set (the render thread, C13, owns pacing for
    /// the non-blocking path).
    #[cfg(feature = "vulkan")]
    pub fn submit(&mut self, wait: bool) -> Result<()> {
        self.expect_state(RecorderState::Executable)?;
        let native = self.native.ok_or(RhiError::RecorderStateViolation {
            expected: "compiled command buffer",
            actual: "no native handle",
        })?;
        self.state = RecorderState::Pending;

        let queue = self.device.get_queue(crate::device::QueueFamily::GRAPHICS, 0)?;
        let buffers = [native];
        let submit_info = vk::SubmitInfo::default().command_buffers(&buffers);
        let fence_info = vk::FenceCreateInfo::default();
        let fence = unsafe {
            self.device.raw.create_fence(&fence_info, None).map_err(|e| RhiError::CompileFailure {
                stage: "submit-fence",
                message: e.to_string(),
            })?
        };
        unsafe {
            self.device
                .raw
                .queue_submit(queue.native, &[submit_info], fence)
                .map_err(|e| RhiError::CompileFailure {
                    stage: "queue-submit",
                    message: e.to_string(),
                })?;
            if wait {
                let _ = self.device.raw.wait_for_fences(&[fence], true, u64::MAX);
            }
            self.device.raw.destroy_fence(fence, None);
        }
        self.state = RecorderState::Free;
        Ok(())
    }

    /// §4.9: legal outside `Compiling`/`Pending`. Releases the native
    /// buffer back to the pool and re-enters `Recording`.
    #[cfg(feature = "vulkan")]
    pub fn reset(&mut self) -> Result<()> {
        if matches!(self.state, RecorderState::Compiling | RecorderState::Pending) {
            return Err(RhiError::RecorderStateViolation {
                expected: "not Compiling/Pending",
                actual: self.state.name(),
            });
        }
        if let Some(native) = self.native.take() {
            unsafe {
                let _ = self
                    .device
                    .raw
                    .reset_command_buffer(native, vk::CommandBufferResetFlags::RELEASE_RESOURCES);
                self.device.raw.free_command_buffers(self.device.command_pool, &[native]);
            }
        }
        self.commands.clear();
        self.pipeline_state = PipelineState::new();
        self.render_pass_open = false;
        self.state = RecorderState::Recording;
        Ok(())
    }
}

#[cfg(feature = "vulkan")]
struct RenderPassCacheKey {
    format: FramebufferFormat,
    color_load: Vec<bool>,
    depth_load: Option<bool>,
}

#[cfg(feature = "vulkan")]
impl RenderPassCacheKey {
    fn hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.format.hash_key().hash(&mut hasher);
        self.color_load.hash(&mut hasher);
        self.depth_load.hash(&mut hasher);
        hasher.finish()
    }
}

/// §4.6/§4.9: resolves (or builds) the cached `VkRenderPass` + `VkFramebuffer`
/// pair for `fbo`, keyed by its structural `FramebufferFormat` plus each
/// attachment's current `lastUsage` (determines `loadOp`), grounded in the
/// teacher's `begin_render_pass` cache-key construction.
#[cfg(feature = "vulkan")]
fn resolve_render_pass(device: &Arc<Device>, fbo: &Fbo) -> Result<(vk::RenderPass, vk::Framebuffer, (u32, u32))> {
    use ash::vk::Handle;

    let extent = fbo.validate()?;
    let format = fbo.format();
    let color_load: Vec<bool> = fbo
        .color_attachments
        .iter()
        .map(|t| t.last_usage() == ResourceUsage::RenderTarget)
        .collect();
    let depth_load = fbo.depth_attachment.as_ref().map(|t| t.last_usage() == ResourceUsage::DepthStencil);
    let key = RenderPassCacheKey {
        format: format.clone(),
        color_load: color_load.clone(),
        depth_load,
    };

    let render_pass = device.resource_cache().get_or_try_insert::<vk::RenderPass, RhiError>("render-pass", key.hash(), || {
        build_render_pass(device.raw.as_ref(), &format, &color_load, depth_load)
    })?;
    let render_pass_val = *render_pass;

    let attachment_views: Vec<vk::ImageView> = fbo
        .color_attachments
        .iter()
        .chain(fbo.depth_attachment.iter())
        .map(|t| t.view().native())
        .collect();
    let mut fb_hasher = DefaultHasher::new();
    render_pass_val.as_raw().hash(&mut fb_hasher);
    extent.hash(&mut fb_hasher);
    for v in &attachment_views {
        v.as_raw().hash(&mut fb_hasher);
    }
    let fb_key = fb_hasher.finish();
    let framebuffer = device.resource_cache().get_or_try_insert::<vk::Framebuffer, RhiError>("framebuffer", fb_key, || {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass_val)
            .attachments(&attachment_views)
            .width(extent.0)
            .height(extent.1)
            .layers(1);
        let fb = unsafe {
            device.raw.create_framebuffer(&create_info, None).map_err(|e| RhiError::CompileFailure {
                stage: "framebuffer",
                message: e.to_string(),
            })?
        };
        Ok(fb)
    })?;
    Ok((render_pass_val, *framebuffer, extent))
}

#[cfg(feature = "vulkan")]
fn build_render_pass(
    raw: &ash::Device,
    format: &FramebufferFormat,
    color_load: &[bool],
    depth_load: Option<bool>,
) -> Result<vk::RenderPass> {
    let mut attachments = Vec::new();
    let mut color_refs = Vec::new();
    for (i, (pixel_format, samples)) in format.color.iter().enumerate() {
        let load_op = if color_load[i] { vk::AttachmentLoadOp::LOAD } else { vk::AttachmentLoadOp::CLEAR };
        attachments.push(
            vk::AttachmentDescription::default()
                .format(crate::convert::format_to_vk(*pixel_format))
                .samples(sample_count_to_vk(*samples))
                .load_op(load_op)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(if color_load[i] {
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
                } else {
                    vk::ImageLayout::UNDEFINED
                })
                .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        );
        color_refs.push(vk::AttachmentReference::default().attachment(i as u32).layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
    }

    let mut depth_ref = None;
    if let Some((pixel_format, samples)) = format.depth {
        let loaded = depth_load.unwrap_or(false);
        let idx = attachments.len();
        let load_op = if loaded { vk::AttachmentLoadOp::LOAD } else { vk::AttachmentLoadOp::CLEAR };
        attachments.push(
            vk::AttachmentDescription::default()
                .format(crate::convert::format_to_vk(pixel_format))
                .samples(sample_count_to_vk(samples))
                .load_op(load_op)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(if loaded {
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
                } else {
                    vk::ImageLayout::UNDEFINED
                })
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        );
        depth_ref = Some(vk::AttachmentReference::default().attachment(idx as u32).layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL));
    }

    let subpass = if let Some(ref d) = depth_ref {
        vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(d)
    } else {
        vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
    };

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass));
    unsafe {
        raw.create_render_pass(&create_info, None).map_err(|e| RhiError::CompileFailure {
            stage: "render-pass",
            message: e.to_string(),
        })
    }
}

#[cfg(feature = "vulkan")]
fn sample_count_to_vk(samples: u32) -> vk::SampleCountFlags {
    match samples {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

#[cfg(feature = "vulkan")]
fn build_clear_values(
    fbo: &Fbo,
    clear_color: Option<(f32, f32, f32, f32)>,
    clear_depth: Option<f32>,
    clear_stencil: Option<u32>,
) -> Vec<vk::ClearValue> {
    let color = clear_color.unwrap_or((0.0, 0.0, 0.0, 1.0));
    let mut values: Vec<vk::ClearValue> = fbo
        .color_attachments
        .iter()
        .map(|_| vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [color.0, color.1, color.2, color.3],
            },
        })
        .collect();
    if fbo.depth_attachment.is_some() {
        values.push(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: clear_depth.unwrap_or(1.0),
                stencil: clear_stencil.unwrap_or(0),
            },
        });
    }
    values
}

impl std::fmt::Debug for CommandRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRecorder")
            .field("state", &self.state)
            .field("pending_commands", &self.commands.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_are_distinguishable() {
        assert_eq!(RecorderState::Recording.name(), "Recording");
        assert_ne!(RecorderState::Executable.name(), RecorderState::Pending.name());
    }

    #[test]
    fn scissor_rect_clamps_negative_origin() {
        let mut rects = vec![Scissor {
            x: -5,
            y: -10,
            width: 100,
            height: 100,
        }];
        for r in rects.iter_mut() {
            r.x = r.x.max(0);
            r.y = r.y.max(0);
        }
        assert_eq!(rects[0].x, 0);
        assert_eq!(rects[0].y, 0);
    }
}
