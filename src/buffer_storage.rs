//! C3: `BufferStorage` — typed linear device memory.
//!
//! Grounded in `original_source/Core/BufferStorage.h` (the `Configuration`,
//! `map`/`unmap`/`flush`/`upload` contract) and the teacher's
//! `vulkan/buffer.rs` (native `vkCreateBuffer` + `vkAllocateMemory` + bind).

use crate::common::{MemoryUsage, ResourceUsage};
use crate::convert::buffer_usage_flags;
use crate::device::Device;
use crate::error::{Result, RhiError};
use std::sync::Arc;

#[cfg(feature = "vulkan")]
use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferStorageConfig {
    pub size: u64,
    pub access: MemoryUsage,
    pub persistent: bool,
    pub usage: ResourceUsage,
}

impl Default for BufferStorageConfig {
    fn default() -> Self {
        BufferStorageConfig {
            size: 0,
            access: MemoryUsage::CpuToGpu,
            persistent: false,
            usage: ResourceUsage::General,
        }
    }
}

pub struct BufferStorage {
    device: Arc<Device>,
    config: BufferStorageConfig,
    #[cfg(feature = "vulkan")]
    buffer: vk::Buffer,
    #[cfg(feature = "vulkan")]
    memory: vk::DeviceMemory,
    #[cfg(feature = "vulkan")]
    memory_type_index: u32,
    mapped_ptr: std::sync::Mutex<Option<*mut u8>>,
}

// The mapped pointer is only ever handed out through `map()`, which
// requires `&mut self`-equivalent discipline enforced by the caller owning
// the `BufferStorage`; the raw pointer itself is `Send` because it points
// into device-visible host memory, not thread-local state.
unsafe impl Send for BufferStorage {}
unsafe impl Sync for BufferStorage {}

impl BufferStorage {
    #[cfg(feature = "vulkan")]
    pub fn create(device: Arc<Device>, config: BufferStorageConfig) -> Result<Arc<BufferStorage>> {
        if config.size == 0 {
            return Err(RhiError::InvalidConfiguration("buffer storage size must be > 0".into()));
        }
        let raw = &device.raw;
        let usage_flags = buffer_usage_flags(config.usage);
        let buffer_info = vk::BufferCreateInfo::default()
            .size(config.size)
            .usage(usage_flags)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe {
            raw.create_buffer(&buffer_info, None).map_err(|e| RhiError::CompileFailure {
                stage: "buffer",
                message: e.to_string(),
            })?
        };
        let requirements = unsafe { raw.get_buffer_memory_requirements(buffer) };
        let memory_type_index = device
            .memory
            .select_memory_type(requirements.memory_type_bits, config.access)
            .ok_or_else(|| {
                unsafe { raw.destroy_buffer(buffer, None) };
                RhiError::InvalidConfiguration("no memory type available for buffer".into())
            })?;

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = unsafe {
            raw.allocate_memory(&alloc_info, None).map_err(|e| {
                raw.destroy_buffer(buffer, None);
                RhiError::CompileFailure {
                    stage: "buffer-memory",
                    message: e.to_string(),
                }
            })?
        };
        unsafe {
            raw.bind_buffer_memory(buffer, memory, 0).map_err(|e| {
                raw.free_memory(memory, None);
                raw.destroy_buffer(buffer, None);
                RhiError::CompileFailure {
                    stage: "buffer-bind",
                    message: e.to_string(),
                }
            })?;
        }

        let mut mapped_ptr = None;
        if config.persistent {
            if !Self::is_mappable_for(config.access) {
                unsafe {
                    raw.free_memory(memory, None);
                    raw.destroy_buffer(buffer, None);
                }
                return Err(RhiError::InvalidConfiguration(
                    "persistent mapping requested on a non-mappable memory usage".into(),
                ));
            }
            mapped_ptr = Some(unsafe {
                raw.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                    .map_err(|e| RhiError::CompileFailure {
                        stage: "buffer-map",
                        message: e.to_string(),
                    })? as *mut u8
            });
        }

        Ok(Arc::new(BufferStorage {
            device,
            config,
            buffer,
            memory,
            memory_type_index,
            mapped_ptr: std::sync::Mutex::new(mapped_ptr),
        }))
    }

    fn is_mappable_for(access: MemoryUsage) -> bool {
        access != MemoryUsage::GpuOnly && access != MemoryUsage::Unknown
    }

    pub fn is_mappable(&self) -> bool {
        Self::is_mappable_for(self.config.access)
    }

    pub fn size(&self) -> u64 {
        self.config.size
    }

    pub fn config(&self) -> &BufferStorageConfig {
        &self.config
    }

    #[cfg(feature = "vulkan")]
    pub fn map(&self) -> Result<*mut u8> {
        if !self.is_mappable() {
            return Err(RhiError::UnsupportedOperation("buffer storage is not mappable"));
        }
        let mut guard = self.mapped_ptr.lock().unwrap();
        if let Some(ptr) = *guard {
            return Ok(ptr);
        }
        let ptr = unsafe {
            self.device
                .raw
                .map_memory(self.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .map_err(|e| RhiError::CompileFailure {
                    stage: "buffer-map",
                    message: e.to_string(),
                })? as *mut u8
        };
        *guard = Some(ptr);
        Ok(ptr)
    }

    #[cfg(feature = "vulkan")]
    pub fn unmap(&self) {
        if self.config.persistent {
            // Persistent mappings stay mapped for the buffer's lifetime.
            return;
        }
        let mut guard = self.mapped_ptr.lock().unwrap();
        if guard.take().is_some() {
            unsafe { self.device.raw.unmap_memory(self.memory) };
        }
    }

    /// Flushes non-coherent host-visible memory. A no-op on coherent memory.
    #[cfg(feature = "vulkan")]
    pub fn flush(&self) {
        if self.device.memory.is_host_coherent(self.memory_type_index) {
            return;
        }
        let range = vk::MappedMemoryRange::default()
            .memory(self.memory)
            .offset(0)
            .size(vk::WHOLE_SIZE);
        unsafe {
            let _ = self.device.raw.flush_mapped_memory_ranges(&[range]);
        }
    }

    #[cfg(feature = "vulkan")]
    pub fn upload(&self, data: &[u8], offset: u64) -> Result<()> {
        if offset + data.len() as u64 > self.config.size {
            return Err(RhiError::RangeOutOfBounds {
                offset,
                size: data.len() as u64,
                capacity: self.config.size,
            });
        }
        let ptr = self.map()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }
        self.flush();
        if !self.config.persistent {
            self.unmap();
        }
        Ok(())
    }

    /// Reads `size` bytes back starting at `offset` (§8 testable property 3:
    /// `download` after `upload` on a mappable buffer round-trips exactly).
    /// Invalidates non-coherent memory before reading, mirroring `flush`'s
    /// symmetric handling on the write side.
    #[cfg(feature = "vulkan")]
    pub fn download(&self, size: u64, offset: u64) -> Result<Vec<u8>> {
        if offset + size > self.config.size {
            return Err(RhiError::RangeOutOfBounds {
                offset,
                size,
                capacity: self.config.size,
            });
        }
        let ptr = self.map()?;
        if !self.device.memory.is_host_coherent(self.memory_type_index) {
            let range = vk::MappedMemoryRange::default()
                .memory(self.memory)
                .offset(0)
                .size(vk::WHOLE_SIZE);
            unsafe {
                let _ = self.device.raw.invalidate_mapped_memory_ranges(&[range]);
            }
        }
        let mut out = vec![0u8; size as usize];
        unsafe {
            std::ptr::copy_nonoverlapping(ptr.add(offset as usize), out.as_mut_ptr(), size as usize);
        }
        if !self.config.persistent {
            self.unmap();
        }
        Ok(out)
    }

    #[cfg(feature = "vulkan")]
    pub(crate) fn native(&self) -> vk::Buffer {
        self.buffer
    }
}

#[cfg(feature = "vulkan")]
impl Drop for BufferStorage {
    fn drop(&mut self) {
        unsafe {
            if self.mapped_ptr.lock().unwrap().is_some() {
                self.device.raw.unmap_memory(self.memory);
            }
            self.device.raw.destroy_buffer(self.buffer, None);
            self.device.raw.free_memory(self.memory, None);
        }
    }
}

impl std::fmt::Debug for BufferStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferStorage")
            .field("size", &self.config.size)
            .field("access", &self.config.access)
            .field("persistent", &self.config.persistent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mappability_matches_spec_invariant_3() {
        assert!(!BufferStorage::is_mappable_for(MemoryUsage::GpuOnly));
        assert!(!BufferStorage::is_mappable_for(MemoryUsage::Unknown));
        assert!(BufferStorage::is_mappable_for(MemoryUsage::CpuOnly));
        assert!(BufferStorage::is_mappable_for(MemoryUsage::CpuToGpu));
        assert!(BufferStorage::is_mappable_for(MemoryUsage::GpuToCpu));
    }
}
