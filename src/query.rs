//! §3.1 `Query` / `QueryPool`: a slotted allocator per `QueryType` over
//! fixed-size native pools of `batch_size`, parameterized per device.
//!
//! Grounded in the teacher's pool-allocation pattern in
//! `vulkan/descriptor.rs` (per-type slab growth) applied to
//! `vk::QueryPool`, since the teacher repo itself has no query-pool
//! wrapper; `original_source/Core/QueryPool.h` supplies the slot
//! lifecycle (`begin`/`end`/`reset` addressed by a dense index).

use crate::common::QueryType;
use crate::device::Device;
use crate::error::{Result, RhiError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[cfg(feature = "vulkan")]
use ash::vk;

#[cfg(feature = "vulkan")]
fn query_type_to_vk(ty: QueryType) -> vk::QueryType {
    match ty {
        QueryType::Occlusion => vk::QueryType::OCCLUSION,
        QueryType::Timestamp => vk::QueryType::TIMESTAMP,
        QueryType::TimeElapsed => vk::QueryType::TIMESTAMP,
        _ => vk::QueryType::PIPELINE_STATISTICS,
    }
}

#[cfg(feature = "vulkan")]
fn query_type_pipeline_statistics(ty: QueryType) -> vk::QueryPipelineStatisticFlags {
    use vk::QueryPipelineStatisticFlags as F;
    match ty {
        QueryType::InputAssemblyVertices => F::INPUT_ASSEMBLY_VERTICES,
        QueryType::InputAssemblyPrimitives => F::INPUT_ASSEMBLY_PRIMITIVES,
        QueryType::VertexShaderInvocations => F::VERTEX_SHADER_INVOCATIONS,
        QueryType::GeometryShaderInvocations => F::GEOMETRY_SHADER_INVOCATIONS,
        QueryType::GeometryShaderPrimitives => F::GEOMETRY_SHADER_PRIMITIVES,
        QueryType::ClippingInvocations => F::CLIPPING_INVOCATIONS,
        QueryType::ClippingPrimitives => F::CLIPPING_PRIMITIVES,
        QueryType::FragmentShaderInvocations => F::FRAGMENT_SHADER_INVOCATIONS,
        QueryType::TessellationControlShaderPatches => F::TESSELLATION_CONTROL_SHADER_PATCHES,
        QueryType::TessellationEvaluationShaderInvocations => F::TESSELLATION_EVALUATION_SHADER_INVOCATIONS,
        QueryType::ComputeShaderInvocations => F::COMPUTE_SHADER_INVOCATIONS,
        _ => F::empty(),
    }
}

struct Batch {
    #[cfg(feature = "vulkan")]
    pool: vk::QueryPool,
    size: u32,
    free: Vec<u32>,
}

/// A dense per-(device, QueryType) pool, growing by `batch_size` when
/// exhausted. Slots are addressed by a global index into a logical
/// concatenation of its batches.
pub struct QueryPool {
    device: Arc<Device>,
    batch_size: u32,
    batches: Mutex<HashMap<QueryType, Vec<Batch>>>,
}

/// A single allocated slot: `(type, batch index, slot within batch)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuerySlot {
    pub query_type: QueryType,
    pub batch: usize,
    pub slot: u32,
}

impl QueryPool {
    pub fn new(device: Arc<Device>, batch_size: u32) -> QueryPool {
        QueryPool {
            device,
            batch_size: batch_size.max(1),
            batches: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(feature = "vulkan")]
    fn grow(&self, ty: QueryType) -> Result<Batch> {
        let create_info = vk::QueryPoolCreateInfo::default()
            .query_type(query_type_to_vk(ty))
            .query_count(self.batch_size)
            .pipeline_statistics(query_type_pipeline_statistics(ty));
        let pool = unsafe {
            self.device
                .raw
                .create_query_pool(&create_info, None)
                .map_err(|e| RhiError::CompileFailure {
                    stage: "query-pool",
                    message: e.to_string(),
                })?
        };
        Ok(Batch {
            pool,
            size: self.batch_size,
            free: (0..self.batch_size).rev().collect(),
        })
    }

    /// Allocates a slot for `ty`, growing a new native pool by
    /// `batch_size` when every existing batch is exhausted.
    #[cfg(feature = "vulkan")]
    pub fn allocate(&self, ty: QueryType) -> Result<QuerySlot> {
        let mut batches = self.batches.lock().unwrap();
        let list = batches.entry(ty).or_default();
        for (i, batch) in list.iter_mut().enumerate() {
            if let Some(slot) = batch.free.pop() {
                return Ok(QuerySlot {
                    query_type: ty,
                    batch: i,
                    slot,
                });
            }
        }
        let mut fresh = self.grow(ty)?;
        let slot = fresh.free.pop().unwrap();
        list.push(fresh);
        Ok(QuerySlot {
            query_type: ty,
            batch: list.len() - 1,
            slot,
        })
    }

    pub fn free(&self, slot: QuerySlot) {
        let mut batches = self.batches.lock().unwrap();
        if let Some(list) = batches.get_mut(&slot.query_type) {
            if let Some(batch) = list.get_mut(slot.batch) {
                batch.free.push(slot.slot);
            }
        }
    }

    #[cfg(feature = "vulkan")]
    pub(crate) fn native_pool(&self, slot: QuerySlot) -> Option<vk::QueryPool> {
        self.batches
            .lock()
            .unwrap()
            .get(&slot.query_type)
            .and_then(|list| list.get(slot.batch))
            .map(|b| b.pool)
    }

    #[cfg(feature = "vulkan")]
    pub fn reset_pool(&self, ty: QueryType) {
        let batches = self.batches.lock().unwrap();
        if let Some(list) = batches.get(&ty) {
            for batch in list {
                unsafe {
                    self.device.raw.reset_query_pool(batch.pool, 0, batch.size);
                }
            }
        }
    }
}

#[cfg(feature = "vulkan")]
impl Drop for QueryPool {
    fn drop(&mut self) {
        for list in self.batches.lock().unwrap().values() {
            for batch in list {
                unsafe {
                    self.device.raw.destroy_query_pool(batch.pool, None);
                }
            }
        }
    }
}

impl std::fmt::Debug for QueryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPool").field("batch_size", &self.batch_size).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Exercises the slot bookkeeping without a real device by constructing
    /// `Batch` values directly (the allocate/grow path itself requires a
    /// live `vk::Device` and is covered by the `#[ignore]` integration tests).
    #[test]
    fn batch_free_list_is_lifo_and_bounded() {
        let mut batch = Batch {
            #[cfg(feature = "vulkan")]
            pool: Default::default(),
            size: 4,
            free: (0..4u32).rev().collect(),
        };
        let a = batch.free.pop().unwrap();
        let b = batch.free.pop().unwrap();
        assert_eq!((a, b), (0, 1));
        batch.free.push(a);
        assert_eq!(batch.free.pop(), Some(0));
    }
}
