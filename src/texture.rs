//! §3.1 `Texture`: an `(ImageStorage, ImageView, Sampler)` triple plus an
//! optional CPU-side bitmap backing. Upload moves bitmap bytes into image
//! storage via a staging buffer; `last_usage` is derived from the
//! underlying storage.

use crate::buffer_storage::{BufferStorage, BufferStorageConfig};
use crate::common::{MemoryUsage, ResourceUsage};
use crate::device::Device;
use crate::error::Result;
use crate::image_storage::{ImageStorage, ImageView};
use crate::sampler::Sampler;
use std::sync::Arc;

pub struct Texture {
    view: Arc<ImageView>,
    sampler: Arc<Sampler>,
    bitmap: Option<Vec<u8>>,
}

impl Texture {
    pub fn new(view: Arc<ImageView>, sampler: Arc<Sampler>) -> Texture {
        Texture {
            view,
            sampler,
            bitmap: None,
        }
    }

    pub fn with_bitmap(view: Arc<ImageView>, sampler: Arc<Sampler>, bitmap: Vec<u8>) -> Texture {
        Texture {
            view,
            sampler,
            bitmap: Some(bitmap),
        }
    }

    /// A 1x1 opaque-white texture, used as the transparent replacement for
    /// a missing texture (§7 user-visible failure behavior).
    #[cfg(feature = "vulkan")]
    pub fn dummy_white(device: Arc<Device>) -> Result<Texture> {
        use crate::common::{ImageFormat, InternalFormat};
        use crate::image_storage::{ImageViewConfig, ViewType};
        use crate::sampler::SamplerConfig;

        let mut format = ImageFormat::new((1, 1, 1));
        format.pixel_format = InternalFormat::R8G8B8A8Unorm;
        let storage = ImageStorage::create(device.clone(), format, ResourceUsage::ShaderResource)?;
        let view = ImageView::create(
            storage,
            ImageViewConfig {
                view_type: ViewType::D2,
                base_mip_level: 0,
                mip_level_count: 1,
                base_layer: 0,
                layer_count: 1,
            },
        )?;
        let sampler = Sampler::create(device, SamplerConfig::default())?;
        let mut tex = Texture::new(view, sampler);
        tex.bitmap = Some(vec![255, 255, 255, 255]);
        Ok(tex)
    }

    pub fn view(&self) -> &Arc<ImageView> {
        &self.view
    }

    pub fn sampler(&self) -> &Arc<Sampler> {
        &self.sampler
    }

    pub fn last_usage(&self) -> ResourceUsage {
        self.view.storage().last_usage()
    }

    /// Moves bitmap bytes into the underlying image storage through a
    /// staging buffer (images are never host-visible/`DEVICE_LOCAL`-backed
    /// directly). The caller's command recorder performs the actual
    /// `CopyBufferToImage`; this method only produces the staged source.
    #[cfg(feature = "vulkan")]
    pub fn stage_upload(&mut self, device: Arc<Device>, bytes: &[u8]) -> Result<Arc<BufferStorage>> {
        self.bitmap = Some(bytes.to_vec());
        let staging = BufferStorage::create(
            device,
            BufferStorageConfig {
                size: bytes.len() as u64,
                access: MemoryUsage::CpuOnly,
                persistent: false,
                usage: ResourceUsage::CopySource,
            },
        )?;
        staging.upload(bytes, 0)?;
        Ok(staging)
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("has_bitmap", &self.bitmap.is_some())
            .finish()
    }
}
