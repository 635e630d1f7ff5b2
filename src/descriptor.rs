//! C5: Descriptor Subsystem — `DescriptorPool` + `DescriptorSet`, keyed by
//! layout hash with a per-layout free list (§4.5).
//!
//! Grounded in the teacher's `vulkan/descriptor.rs` (`DEFAULT_POOL_MULTIPLIER`,
//! per-type pool sizing, `write_buffer`/`write_texture` binding-type lookup).

use crate::buffer_object::BufferObject;
use crate::common::ShaderStageFlags;
use crate::device::Device;
use crate::error::{Result, RhiError};
use crate::texture::Texture;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

#[cfg(feature = "vulkan")]
use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    StorageImage,
    SampledImage,
    CombinedImageSampler,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub stages: ShaderStageFlags,
    pub dynamic: bool,
}

/// A full shader resource layout set: the structural key for
/// `ResourceCache::descriptor_set_layout` (§4.6).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderResourceLayoutSet {
    pub bindings: Vec<DescriptorSetLayoutBinding>,
}

impl ShaderResourceLayoutSet {
    pub fn hash_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.bindings.hash(&mut hasher);
        hasher.finish()
    }
}

pub struct DescriptorSetLayout {
    device: Arc<Device>,
    pub(crate) bindings: Vec<DescriptorSetLayoutBinding>,
    #[cfg(feature = "vulkan")]
    pub(crate) layout: vk::DescriptorSetLayout,
}

#[cfg(feature = "vulkan")]
pub(crate) fn descriptor_type_to_vk(ty: DescriptorType) -> vk::DescriptorType {
    match ty {
        DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        DescriptorType::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorType::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    }
}

#[cfg(feature = "vulkan")]
fn shader_stages_to_vk(stages: ShaderStageFlags) -> vk::ShaderStageFlags {
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
    if stages.contains(ShaderStageFlags::GEOMETRY) {
        flags |= vk::ShaderStageFlags::GEOMETRY;
    }
    if stages.contains(ShaderStageFlags::TESS_CONTROL) {
        flags |= vk::ShaderStageFlags::TESSELLATION_CONTROL;
    }
    if stages.contains(ShaderStageFlags::TESS_EVALUATION) {
        flags |= vk::ShaderStageFlags::TESSELLATION_EVALUATION;
    }
    flags
}

impl DescriptorSetLayout {
    #[cfg(feature = "vulkan")]
    pub fn create(device: Arc<Device>, layout_set: ShaderResourceLayoutSet) -> Result<Arc<DescriptorSetLayout>> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = layout_set
            .bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(descriptor_type_to_vk(b.descriptor_type))
                    .descriptor_count(b.count.max(1))
                    .stage_flags(shader_stages_to_vk(b.stages))
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe {
            device
                .raw
                .create_descriptor_set_layout(&create_info, None)
                .map_err(|e| RhiError::CompileFailure {
                    stage: "descriptor-set-layout",
                    message: e.to_string(),
                })?
        };
        Ok(Arc::new(DescriptorSetLayout {
            device,
            bindings: layout_set.bindings,
            layout,
        }))
    }
}

#[cfg(feature = "vulkan")]
impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Per-type budget and total cap for the owning pool (§3.1).
#[derive(Debug, Clone, Default)]
pub struct DescriptorPoolConfig {
    pub counts: HashMap<DescriptorType, u32>,
    pub total: u32,
}

const DEFAULT_POOL_MULTIPLIER: u32 = 4;

impl DescriptorPoolConfig {
    /// Default sizing: `max_sets * DEFAULT_POOL_MULTIPLIER` per commonly
    /// used descriptor type, matching the teacher's
    /// `create_descriptor_pool` defaults.
    pub fn default_for(max_sets: u32) -> Self {
        let per_type = max_sets * DEFAULT_POOL_MULTIPLIER;
        let mut counts = HashMap::new();
        counts.insert(DescriptorType::UniformBuffer, per_type);
        counts.insert(DescriptorType::StorageBuffer, per_type);
        counts.insert(DescriptorType::StorageImage, per_type);
        counts.insert(DescriptorType::SampledImage, per_type);
        counts.insert(DescriptorType::CombinedImageSampler, per_type);
        DescriptorPoolConfig {
            counts,
            total: max_sets,
        }
    }
}

struct LayoutSlab {
    layout: Arc<DescriptorSetLayout>,
    #[cfg(feature = "vulkan")]
    free_sets: Vec<vk::DescriptorSet>,
}

pub struct DescriptorPool {
    device: Arc<Device>,
    config: DescriptorPoolConfig,
    #[cfg(feature = "vulkan")]
    pool: vk::DescriptorPool,
    slabs: Mutex<HashMap<u64, LayoutSlab>>,
}

impl DescriptorPool {
    #[cfg(feature = "vulkan")]
    pub fn create(device: Arc<Device>, config: DescriptorPoolConfig) -> Result<DescriptorPool> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = config
            .counts
            .iter()
            .map(|(ty, count)| {
                vk::DescriptorPoolSize::default()
                    .ty(descriptor_type_to_vk(*ty))
                    .descriptor_count(*count)
            })
            .collect();
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(config.total.max(1))
            .pool_sizes(&pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);
        let pool = unsafe {
            device
                .raw
                .create_descriptor_pool(&create_info, None)
                .map_err(|e| RhiError::CompileFailure {
                    stage: "descriptor-pool",
                    message: e.to_string(),
                })?
        };
        Ok(DescriptorPool {
            device,
            config,
            pool,
            slabs: Mutex::new(HashMap::new()),
        })
    }

    /// §4.5: compute layout hash, register a factory on first use, acquire
    /// a set from the per-layout slab, then update it from the binding set.
    #[cfg(feature = "vulkan")]
    pub fn request_descriptor_set(
        &self,
        layout_set: ShaderResourceLayoutSet,
        bindings: &crate::binding_state::BindingSet,
    ) -> Result<DescriptorSet> {
        let hash = layout_set.hash_key();
        let mut slabs = self.slabs.lock().unwrap();
        let slab = match slabs.get_mut(&hash) {
            Some(s) => s,
            None => {
                let layout = DescriptorSetLayout::create(self.device.clone(), layout_set)?;
                slabs.insert(
                    hash,
                    LayoutSlab {
                        layout,
                        free_sets: Vec::new(),
                    },
                );
                slabs.get_mut(&hash).unwrap()
            }
        };

        let native = if let Some(set) = slab.free_sets.pop() {
            set
        } else {
            let layouts = [slab.layout.layout];
            let alloc_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(self.pool)
                .set_layouts(&layouts);
            let sets = unsafe {
                self.device.raw.allocate_descriptor_sets(&alloc_info).map_err(|_| {
                    RhiError::DescriptorPoolExhausted(
                        slab.layout
                            .bindings
                            .first()
                            .map(|b| b.descriptor_type)
                            .unwrap_or(DescriptorType::UniformBuffer),
                    )
                })?
            };
            sets[0]
        };

        if slab.layout.bindings.is_empty() {
            log::warn!(target: "render_core::descriptor", "requesting a descriptor set with an empty layout");
        }

        let dynamic_offsets = self.write_descriptor_set(native, &slab.layout, bindings);

        Ok(DescriptorSet {
            device: self.device.clone(),
            hash,
            native,
            dynamic_offsets,
            pool: self as *const DescriptorPool,
        })
    }

    #[cfg(feature = "vulkan")]
    fn write_descriptor_set(
        &self,
        set: vk::DescriptorSet,
        layout: &DescriptorSetLayout,
        bindings: &crate::binding_state::BindingSet,
    ) -> Vec<u64> {
        let mut dynamic_offsets = Vec::new();
        let mut buffer_infos: Vec<Vec<vk::DescriptorBufferInfo>> = Vec::new();
        let mut image_infos: Vec<Vec<vk::DescriptorImageInfo>> = Vec::new();
        let mut writes = Vec::new();

        // Iteration order matches `layout.bindings` order, which is the
        // invariant §4.5 requires for dynamic-offset ordering.
        for binding_desc in &layout.bindings {
            let Some(binding) = bindings.get(binding_desc.binding) else {
                continue;
            };
            match binding_desc.descriptor_type {
                DescriptorType::UniformBuffer | DescriptorType::StorageBuffer => {
                    let infos: Vec<vk::DescriptorBufferInfo> = binding
                        .buffers
                        .iter()
                        .filter_map(|b| b.as_ref())
                        .map(|b: &Arc<BufferObject>| {
                            if binding_desc.dynamic {
                                dynamic_offsets.push(b.offset());
                            }
                            vk::DescriptorBufferInfo::default()
                                .buffer(b.storage().native())
                                .offset(if binding_desc.dynamic { 0 } else { b.offset() })
                                .range(b.size())
                        })
                        .collect();
                    buffer_infos.push(infos);
                    let idx = buffer_infos.len() - 1;
                    writes.push(
                        vk::WriteDescriptorSet::default()
                            .dst_set(set)
                            .dst_binding(binding_desc.binding)
                            .descriptor_type(descriptor_type_to_vk(binding_desc.descriptor_type))
                            .buffer_info(&buffer_infos[idx]),
                    );
                }
                DescriptorType::SampledImage | DescriptorType::CombinedImageSampler | DescriptorType::StorageImage => {
                    let layout_hint = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
                    let infos: Vec<vk::DescriptorImageInfo> = binding
                        .textures
                        .iter()
                        .filter_map(|t| t.as_ref())
                        .map(|t: &Arc<Texture>| {
                            vk::DescriptorImageInfo::default()
                                .image_view(t.view().native())
                                .sampler(t.sampler().native())
                                .image_layout(layout_hint)
                        })
                        .collect();
                    image_infos.push(infos);
                    let idx = image_infos.len() - 1;
                    writes.push(
                        vk::WriteDescriptorSet::default()
                            .dst_set(set)
                            .dst_binding(binding_desc.binding)
                            .descriptor_type(descriptor_type_to_vk(binding_desc.descriptor_type))
                            .image_info(&image_infos[idx]),
                    );
                }
            }
        }

        if !writes.is_empty() {
            unsafe { self.device.raw.update_descriptor_sets(&writes, &[]) };
        }
        dynamic_offsets
    }

    #[cfg(feature = "vulkan")]
    fn return_set(&self, hash: u64, set: vk::DescriptorSet) {
        if let Some(slab) = self.slabs.lock().unwrap().get_mut(&hash) {
            slab.free_sets.push(set);
        }
    }

    /// Frees every outstanding set; sets allocated from this pool before
    /// `reset()` become invalid per §3.3 invariant 4.
    #[cfg(feature = "vulkan")]
    pub fn reset(&self) {
        self.slabs.lock().unwrap().clear();
        unsafe {
            let _ = self
                .device
                .raw
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty());
        }
    }
}

#[cfg(feature = "vulkan")]
impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_descriptor_pool(self.pool, None);
        }
    }
}

impl std::fmt::Debug for DescriptorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorPool").field("config", &self.config).finish()
    }
}

/// Owns its native handle and a list of dynamic offsets; returns to its
/// pool on drop (§3.1).
pub struct DescriptorSet {
    device: Arc<Device>,
    hash: u64,
    #[cfg(feature = "vulkan")]
    native: vk::DescriptorSet,
    pub dynamic_offsets: Vec<u64>,
    pool: *const DescriptorPool,
}

// Safety: `pool` outlives every `DescriptorSet` it produces by construction
// (the façade/device own the pool for the process lifetime); the raw
// pointer exists only to avoid an `Arc` cycle between pool and set.
unsafe impl Send for DescriptorSet {}
unsafe impl Sync for DescriptorSet {}

#[cfg(feature = "vulkan")]
impl DescriptorSet {
    pub(crate) fn native(&self) -> vk::DescriptorSet {
        self.native
    }
}

impl Drop for DescriptorSet {
    fn drop(&mut self) {
        #[cfg(feature = "vulkan")]
        unsafe {
            (*self.pool).return_set(self.hash, self.native);
        }
        let _ = &self.device;
    }
}

impl std::fmt::Debug for DescriptorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorSet")
            .field("dynamic_offsets", &self.dynamic_offsets)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_sizing_applies_multiplier() {
        let cfg = DescriptorPoolConfig::default_for(10);
        assert_eq!(cfg.counts[&DescriptorType::UniformBuffer], 40);
        assert_eq!(cfg.total, 10);
    }

    #[test]
    fn equal_layout_sets_hash_equal() {
        let a = ShaderResourceLayoutSet {
            bindings: vec![DescriptorSetLayoutBinding {
                binding: 0,
                descriptor_type: DescriptorType::UniformBuffer,
                count: 1,
                stages: ShaderStageFlags::VERTEX,
                dynamic: false,
            }],
        };
        let b = a.clone();
        assert_eq!(a.hash_key(), b.hash_key());
    }
}
