//! C3: `ImageStorage` and `ImageView`.
//!
//! `ImageStorage` owns the native image + memory (grounded in the teacher's
//! `vulkan/texture.rs::create_texture`, split apart so image and view
//! creation are independent calls matching §3.1's entity split). `ImageView`
//! enforces the type-compatibility table of §4.3.

use crate::common::{ImageFormat, ResourceUsage};
use crate::convert::{format_to_vk, image_usage_flags};
use crate::device::Device;
use crate::error::{Result, RhiError};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

#[cfg(feature = "vulkan")]
use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    D1,
    D2,
    D3,
}

fn derive_image_type(extent: (u32, u32, u32)) -> ImageType {
    match extent {
        (_, 1, 1) => ImageType::D1,
        (_, _, 1) => ImageType::D2,
        _ => ImageType::D3,
    }
}

pub struct ImageStorage {
    device: Arc<Device>,
    pub(crate) format: ImageFormat,
    pub(crate) image_type: ImageType,
    usage: ResourceUsage,
    last_usage: Mutex<ResourceUsage>,
    #[cfg(feature = "vulkan")]
    pub(crate) image: vk::Image,
    #[cfg(feature = "vulkan")]
    memory: vk::DeviceMemory,
    /// `false` for a swapchain image: the presentation engine owns the
    /// native `vk::Image`/memory and this storage must not destroy them.
    owns_native: bool,
}

impl ImageStorage {
    /// Wraps a `vk::Image` this crate does not own (a swapchain image).
    /// `last_usage` starts at `Undefined` like any freshly created image;
    /// the swapchain's first `present` transitions it through the normal
    /// barrier path.
    #[cfg(feature = "vulkan")]
    pub(crate) fn from_borrowed(device: Arc<Device>, image: vk::Image, format: ImageFormat, usage: ResourceUsage) -> Arc<ImageStorage> {
        Arc::new(ImageStorage {
            device,
            image_type: derive_image_type(format.extent),
            format,
            usage,
            last_usage: Mutex::new(ResourceUsage::Undefined),
            image,
            memory: vk::DeviceMemory::null(),
            owns_native: false,
        })
    }

    #[cfg(feature = "vulkan")]
    pub fn create(device: Arc<Device>, format: ImageFormat, usage: ResourceUsage) -> Result<Arc<ImageStorage>> {
        let image_type = derive_image_type(format.extent);
        let raw = &device.raw;
        let vk_type = match image_type {
            ImageType::D1 => vk::ImageType::TYPE_1D,
            ImageType::D2 => vk::ImageType::TYPE_2D,
            ImageType::D3 => vk::ImageType::TYPE_3D,
        };
        if image_type == ImageType::D1 && format.samples > 1 {
            return Err(RhiError::InvalidConfiguration("1D images cannot be multisampled".into()));
        }

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk_type)
            .format(format_to_vk(format.pixel_format))
            .extent(vk::Extent3D {
                width: format.extent.0.max(1),
                height: format.extent.1.max(1),
                depth: if image_type == ImageType::D3 { format.extent.2.max(1) } else { 1 },
            })
            .mip_levels(format.mip_levels.max(1))
            .array_layers(if image_type == ImageType::D3 { 1 } else { format.layers.max(1) })
            .samples(sample_count_to_vk(format.samples))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(image_usage_flags(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .flags(if format.layers % 6 == 0 && format.layers > 0 && image_type == ImageType::D2 {
                vk::ImageCreateFlags::CUBE_COMPATIBLE
            } else {
                vk::ImageCreateFlags::empty()
            });

        let image = unsafe {
            raw.create_image(&create_info, None).map_err(|e| RhiError::CompileFailure {
                stage: "image",
                message: e.to_string(),
            })?
        };
        let requirements = unsafe { raw.get_image_memory_requirements(image) };
        let memory_type_index = device
            .memory
            .select_memory_type(requirements.memory_type_bits, crate::common::MemoryUsage::GpuOnly)
            .ok_or_else(|| {
                unsafe { raw.destroy_image(image, None) };
                RhiError::InvalidConfiguration("no device-local memory for image".into())
            })?;
        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = unsafe {
            raw.allocate_memory(&alloc_info, None).map_err(|e| {
                raw.destroy_image(image, None);
                RhiError::CompileFailure {
                    stage: "image-memory",
                    message: e.to_string(),
                }
            })?
        };
        unsafe {
            raw.bind_image_memory(image, memory, 0).map_err(|e| {
                raw.free_memory(memory, None);
                raw.destroy_image(image, None);
                RhiError::CompileFailure {
                    stage: "image-bind",
                    message: e.to_string(),
                }
            })?;
        }

        Ok(Arc::new(ImageStorage {
            device,
            format,
            image_type,
            usage,
            last_usage: Mutex::new(ResourceUsage::Undefined),
            image,
            memory,
            owns_native: true,
        }))
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    pub fn intended_usage(&self) -> ResourceUsage {
        self.usage
    }

    /// Last recorded usage, consulted when deciding barrier / render-pass
    /// `loadOp` (§3.3 invariant 2). Updated on barrier record, not on
    /// execution — see §5's rationale (single recorder per resource).
    pub fn last_usage(&self) -> ResourceUsage {
        *self.last_usage.lock().unwrap()
    }

    pub fn set_last_usage(&self, usage: ResourceUsage) {
        *self.last_usage.lock().unwrap() = usage;
    }
}

#[cfg(feature = "vulkan")]
impl Drop for ImageStorage {
    fn drop(&mut self) {
        if !self.owns_native {
            return;
        }
        unsafe {
            self.device.raw.destroy_image(self.image, None);
            self.device.raw.free_memory(self.memory, None);
        }
    }
}

impl std::fmt::Debug for ImageStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageStorage")
            .field("format", &self.format)
            .field("image_type", &self.image_type)
            .finish()
    }
}

#[cfg(feature = "vulkan")]
fn sample_count_to_vk(samples: u32) -> vk::SampleCountFlags {
    match samples {
        1 => vk::SampleCountFlags::TYPE_1,
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewType {
    D1,
    D1Array,
    D2,
    D2Array,
    D3,
    Cube,
    CubeArray,
    D2Multisample,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageViewConfig {
    pub view_type: ViewType,
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

/// Validates a view configuration against its image's type per the
/// compatibility table in §4.3. Returns the matching error on rejection.
fn check_compatibility(image_type: ImageType, samples: u32, cfg: &ImageViewConfig) -> Result<()> {
    let ok = match image_type {
        ImageType::D1 => matches!(cfg.view_type, ViewType::D1 | ViewType::D1Array),
        ImageType::D2 => match cfg.view_type {
            ViewType::D2 => cfg.layer_count == 1,
            ViewType::D2Array => true,
            ViewType::Cube => cfg.layer_count == 6,
            ViewType::CubeArray => cfg.layer_count % 6 == 0,
            ViewType::D2Multisample => cfg.layer_count == 1 && samples > 1,
            _ => false,
        },
        ImageType::D3 => match cfg.view_type {
            ViewType::D3 => cfg.layer_count == 1,
            ViewType::D2 => cfg.layer_count == 1 && cfg.mip_level_count == 1,
            ViewType::D2Array => cfg.mip_level_count == 1,
            _ => false,
        },
    };
    if ok {
        Ok(())
    } else {
        Err(RhiError::IncompatibleView(format!(
            "{:?} view of a {:?} image (layers={}, mips={})",
            cfg.view_type, image_type, cfg.layer_count, cfg.mip_level_count
        )))
    }
}

pub struct ImageView {
    storage: Arc<ImageStorage>,
    config: ImageViewConfig,
    #[cfg(feature = "vulkan")]
    view: vk::ImageView,
}

impl ImageView {
    #[cfg(feature = "vulkan")]
    pub fn create(storage: Arc<ImageStorage>, config: ImageViewConfig) -> Result<Arc<ImageView>> {
        check_compatibility(storage.image_type, storage.format.samples, &config)?;

        let aspect_mask = if storage.format.pixel_format.is_depth_stencil() {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let view_type = match config.view_type {
            ViewType::D1 => vk::ImageViewType::TYPE_1D,
            ViewType::D1Array => vk::ImageViewType::TYPE_1D_ARRAY,
            ViewType::D2 | ViewType::D2Multisample => vk::ImageViewType::TYPE_2D,
            ViewType::D2Array => vk::ImageViewType::TYPE_2D_ARRAY,
            ViewType::D3 => vk::ImageViewType::TYPE_3D,
            ViewType::Cube => vk::ImageViewType::CUBE,
            ViewType::CubeArray => vk::ImageViewType::CUBE_ARRAY,
        };
        let create_info = vk::ImageViewCreateInfo::default()
            .image(storage.image)
            .view_type(view_type)
            .format(format_to_vk(storage.format.pixel_format))
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_mask)
                    .base_mip_level(config.base_mip_level)
                    .level_count(config.mip_level_count)
                    .base_array_layer(config.base_layer)
                    .layer_count(config.layer_count),
            );
        let view = unsafe {
            storage
                .device
                .raw
                .create_image_view(&create_info, None)
                .map_err(|e| RhiError::CompileFailure {
                    stage: "image-view",
                    message: e.to_string(),
                })?
        };
        Ok(Arc::new(ImageView { storage, config, view }))
    }

    pub fn storage(&self) -> &Arc<ImageStorage> {
        &self.storage
    }

    pub fn config(&self) -> ImageViewConfig {
        self.config
    }

    #[cfg(feature = "vulkan")]
    pub(crate) fn native(&self) -> vk::ImageView {
        self.view
    }
}

#[cfg(feature = "vulkan")]
impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.storage.device.raw.destroy_image_view(self.view, None);
        }
    }
}

impl std::fmt::Debug for ImageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageView").field("config", &self.config).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(view_type: ViewType, layer_count: u32, mip_level_count: u32) -> ImageViewConfig {
        ImageViewConfig {
            view_type,
            base_mip_level: 0,
            mip_level_count,
            base_layer: 0,
            layer_count,
        }
    }

    #[test]
    fn cube_view_requires_exactly_six_layers() {
        assert!(check_compatibility(ImageType::D2, 1, &cfg(ViewType::Cube, 6, 1)).is_ok());
        assert!(check_compatibility(ImageType::D2, 1, &cfg(ViewType::Cube, 5, 1)).is_err());
    }

    #[test]
    fn cube_array_requires_multiple_of_six() {
        assert!(check_compatibility(ImageType::D2, 1, &cfg(ViewType::CubeArray, 12, 1)).is_ok());
        assert!(check_compatibility(ImageType::D2, 1, &cfg(ViewType::CubeArray, 7, 1)).is_err());
    }

    #[test]
    fn d3_image_rejects_2d_array_view_with_multiple_mips() {
        assert!(check_compatibility(ImageType::D3, 1, &cfg(ViewType::D2Array, 4, 1)).is_ok());
        assert!(check_compatibility(ImageType::D3, 1, &cfg(ViewType::D2Array, 4, 2)).is_err());
    }

    #[test]
    fn d1_image_rejects_2d_view() {
        assert!(check_compatibility(ImageType::D1, 1, &cfg(ViewType::D2, 1, 1)).is_err());
    }

    #[test]
    fn derive_image_type_from_extent() {
        assert_eq!(derive_image_type((64, 1, 1)), ImageType::D1);
        assert_eq!(derive_image_type((64, 64, 1)), ImageType::D2);
        assert_eq!(derive_image_type((64, 64, 64)), ImageType::D3);
    }
}
