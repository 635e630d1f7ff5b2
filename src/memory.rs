//! C3 (allocator component of the Device): device memory-type selection.
//!
//! The device owns a single `MemoryHeap` that answers "which
//! `vk::MemoryType` index should this allocation use" for a requested
//! `MemoryUsage`; the actual `vkAllocateMemory`/`vkFreeMemory` calls happen
//! per-resource in `buffer_storage`/`image_storage`, matching the teacher's
//! hand-rolled, non-suballocating allocation style (`vulkan/memory.rs`).
//! No third-party sub-allocator crate is used (see DESIGN.md).

use crate::common::MemoryUsage;

#[cfg(feature = "vulkan")]
use ash::vk;

#[cfg(feature = "vulkan")]
pub struct MemoryHeap {
    properties: vk::PhysicalDeviceMemoryProperties,
}

#[cfg(feature = "vulkan")]
impl MemoryHeap {
    pub fn new(properties: vk::PhysicalDeviceMemoryProperties) -> Self {
        MemoryHeap { properties }
    }

    /// Selects a memory type index satisfying `type_bits` (from
    /// `vkGetBufferMemoryRequirements`/`vkGetImageMemoryRequirements`) that
    /// best matches `usage`: device-local for `GpuOnly`, host-visible +
    /// host-coherent for the CPU-touching usages, falling back to any
    /// type satisfying `type_bits` if no exact match exists.
    pub fn select_memory_type(&self, type_bits: u32, usage: MemoryUsage) -> Option<u32> {
        let preferred = match usage {
            MemoryUsage::GpuOnly => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryUsage::CpuOnly | MemoryUsage::CpuToGpu | MemoryUsage::GpuToCpu => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
            MemoryUsage::Unknown => vk::MemoryPropertyFlags::empty(),
        };

        (0..self.properties.memory_type_count)
            .find(|&i| {
                let suitable = (type_bits & (1 << i)) != 0;
                let flags = self.properties.memory_types[i as usize].property_flags;
                suitable && flags.contains(preferred)
            })
            .or_else(|| (0..self.properties.memory_type_count).find(|&i| (type_bits & (1 << i)) != 0))
    }

    pub fn is_host_coherent(&self, memory_type_index: u32) -> bool {
        self.properties.memory_types[memory_type_index as usize]
            .property_flags
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
    }
}

#[cfg(all(test, feature = "vulkan"))]
mod tests {
    use super::*;

    fn fake_properties() -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = 2;
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props
    }

    #[test]
    fn prefers_device_local_for_gpu_only() {
        let heap = MemoryHeap::new(fake_properties());
        let idx = heap.select_memory_type(0b11, MemoryUsage::GpuOnly).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn prefers_host_visible_for_cpu_to_gpu() {
        let heap = MemoryHeap::new(fake_properties());
        let idx = heap.select_memory_type(0b11, MemoryUsage::CpuToGpu).unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn falls_back_when_preferred_type_unavailable() {
        let heap = MemoryHeap::new(fake_properties());
        // Only memory type 0 (host-visible) satisfies the mask; GpuOnly still gets it.
        let idx = heap.select_memory_type(0b01, MemoryUsage::GpuOnly).unwrap();
        assert_eq!(idx, 0);
    }
}
