//! C4: `BufferObject` — a logical (storage, offset, size) slice, with a
//! lazily-created staging buffer for uploads into non-mappable memory.
//!
//! Grounded in `original_source/Core/BufferStorage.h`'s upload contract and
//! §4.4: "when not host-visible, BufferObject.upload routes through a
//! lazily created staging BufferStorage (CpuOnly, CopySource), then records
//! a copy on a Transfer queue."

use crate::buffer_storage::{BufferStorage, BufferStorageConfig};
use crate::common::{MemoryUsage, ResourceUsage};
use crate::device::Device;
use crate::error::{Result, RhiError};
use std::sync::{Arc, Mutex};

pub struct BufferObject {
    device: Arc<Device>,
    storage: Arc<BufferStorage>,
    offset: u64,
    size: u64,
    staging: Mutex<Option<Arc<BufferStorage>>>,
}

impl BufferObject {
    /// Allocates a fresh `BufferStorage` sized exactly to this object.
    pub fn create_new(
        device: Arc<Device>,
        size: u64,
        usage: ResourceUsage,
        access: MemoryUsage,
        persistent: bool,
    ) -> Result<BufferObject> {
        let storage = BufferStorage::create(
            device.clone(),
            BufferStorageConfig {
                size,
                access,
                persistent,
                usage,
            },
        )?;
        Ok(BufferObject {
            device,
            storage,
            offset: 0,
            size,
            staging: Mutex::new(None),
        })
    }

    /// Wraps a slice of an existing storage. `size == 0` means "to the end
    /// of the storage", per §4.4.
    pub fn wrap(device: Arc<Device>, storage: Arc<BufferStorage>, offset: u64, size: u64) -> Result<BufferObject> {
        let size = if size == 0 { storage.size() - offset } else { size };
        if offset + size > storage.size() {
            return Err(RhiError::RangeOutOfBounds {
                offset,
                size,
                capacity: storage.size(),
            });
        }
        Ok(BufferObject {
            device,
            storage,
            offset,
            size,
            staging: Mutex::new(None),
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn storage(&self) -> &Arc<BufferStorage> {
        &self.storage
    }

    /// Uploads `data` at `local_offset` within this object's range. Writes
    /// directly when the backing storage is mappable; otherwise stages
    /// through a lazily created `CpuOnly`/`CopySource` buffer — the caller
    /// (the command recorder) is responsible for recording the actual
    /// device-side copy once staged, per §4.4 and the concurrency note in
    /// §5 about `BufferStorage.upload` not overlapping in-flight GPU use.
    #[cfg(feature = "vulkan")]
    pub fn upload(&self, data: &[u8], local_offset: u64) -> Result<UploadOutcome> {
        if local_offset + data.len() as u64 > self.size {
            return Err(RhiError::RangeOutOfBounds {
                offset: local_offset,
                size: data.len() as u64,
                capacity: self.size,
            });
        }
        if self.storage.is_mappable() {
            self.storage.upload(data, self.offset + local_offset)?;
            return Ok(UploadOutcome::WrittenDirectly);
        }

        let mut guard = self.staging.lock().unwrap();
        let staging = match guard.as_ref() {
            Some(s) if s.size() >= data.len() as u64 => s.clone(),
            _ => {
                let staging = BufferStorage::create(
                    self.device.clone(),
                    BufferStorageConfig {
                        size: data.len() as u64,
                        access: MemoryUsage::CpuOnly,
                        persistent: false,
                        usage: ResourceUsage::CopySource,
                    },
                )?;
                *guard = Some(staging.clone());
                staging
            }
        };
        staging.upload(data, 0)?;
        Ok(UploadOutcome::StagedForCopy {
            staging,
            dst_offset: self.offset + local_offset,
            size: data.len() as u64,
        })
    }

    /// Reads `size` bytes back at `local_offset` within this object's
    /// range. Only meaningful on a mappable storage directly; for
    /// `GpuOnly` storage the caller must first copy into a `GpuToCpu`
    /// readback buffer and call `download` on that instead (§8 property 3).
    #[cfg(feature = "vulkan")]
    pub fn download(&self, size: u64, local_offset: u64) -> Result<Vec<u8>> {
        if local_offset + size > self.size {
            return Err(RhiError::RangeOutOfBounds {
                offset: local_offset,
                size,
                capacity: self.size,
            });
        }
        self.storage.download(size, self.offset + local_offset)
    }
}

/// Result of `BufferObject::upload`, telling the caller whether a
/// device-side copy command still needs to be recorded.
pub enum UploadOutcome {
    WrittenDirectly,
    StagedForCopy {
        staging: Arc<BufferStorage>,
        dst_offset: u64,
        size: u64,
    },
}
