//! §3.1 `Swapchain`: a cyclic array of per-image FBOs, present fences, and
//! an acquired index, owned by the `Device`.
//!
//! Grounded in the teacher's `vulkan/swapchain.rs` (`VulkanSwapchainImage`,
//! `acquire_next_image`/`present`), generalized so each image is wrapped in
//! this crate's [`crate::fbo::Fbo`] instead of a bare `Texture` trait
//! object, since `CommandRecorder::begin_render_pass` needs an `Fbo` to
//! resolve a render pass + framebuffer from the cache (§4.9).

#![cfg(feature = "window")]

use crate::common::{ImageFormat, InternalFormat, ResourceUsage};
use crate::device::Device;
use crate::error::{Result, RhiError};
use crate::fbo::Fbo;
use crate::image_storage::{ImageStorage, ImageViewConfig, ViewType};
use crate::sampler::{Sampler, SamplerConfig};
use crate::texture::Texture;
use ash::khr::{surface as surface_khr, swapchain as swapchain_khr};
use ash::vk;
use std::sync::Arc;

pub struct Swapchain {
    device: Arc<Device>,
    surface_loader: surface_khr::Instance,
    surface: vk::SurfaceKHR,
    loader: swapchain_khr::Device,
    swapchain: vk::SwapchainKHR,
    extent: (u32, u32),
    format: InternalFormat,
    frames: Vec<Arc<Fbo>>,
    acquired_index: Option<u32>,
}

impl Swapchain {
    /// Builds the per-image `Fbo`s. Each swapchain image is given a 1x1
    /// mip/layer `ImageView` wrapping the presentation engine's `vk::Image`
    /// and a default nearest sampler (swapchain images are never sampled,
    /// but `Texture`/`Fbo` require one to stay uniform with off-screen FBOs).
    pub fn create(
        device: Arc<Device>,
        entry: &ash::Entry,
        surface: vk::SurfaceKHR,
        requested_extent: (u32, u32),
    ) -> Result<Swapchain> {
        let surface_loader = surface_khr::Instance::new(entry, &device.instance);
        let loader = swapchain_khr::Device::new(&device.instance, &device.raw);

        let caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(device.physical_device, surface)
                .map_err(|e| RhiError::PresentFailure(e.to_string()))?
        };
        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(device.physical_device, surface)
                .map_err(|e| RhiError::PresentFailure(e.to_string()))?
        };
        let surface_format = formats
            .iter()
            .find(|f| f.format == vk::Format::B8G8R8A8_UNORM)
            .or_else(|| formats.first())
            .copied()
            .ok_or_else(|| RhiError::PresentFailure("no surface formats reported".into()))?;

        let extent = if caps.current_extent.width != u32::MAX {
            (caps.current_extent.width, caps.current_extent.height)
        } else {
            requested_extent
        };
        let image_count = (caps.min_image_count + 1).min(if caps.max_image_count == 0 {
            u32::MAX
        } else {
            caps.max_image_count
        });

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(vk::Extent2D {
                width: extent.0,
                height: extent.1,
            })
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true);
        let swapchain = unsafe {
            loader.create_swapchain(&create_info, None).map_err(|e| RhiError::PresentFailure(e.to_string()))?
        };

        let images = unsafe {
            loader.get_swapchain_images(swapchain).map_err(|e| RhiError::PresentFailure(e.to_string()))?
        };

        let format = InternalFormat::B8G8R8A8Unorm;
        let image_format = {
            let mut f = ImageFormat::new((extent.0, extent.1, 1));
            f.pixel_format = format;
            f
        };

        let mut frames = Vec::with_capacity(images.len());
        let sampler = Sampler::create(device.clone(), SamplerConfig::default())?;
        for image in images {
            let storage = ImageStorage::from_borrowed(device.clone(), image, image_format, ResourceUsage::Present);
            let view = crate::image_storage::ImageView::create(
                storage,
                ImageViewConfig {
                    view_type: ViewType::D2,
                    base_mip_level: 0,
                    mip_level_count: 1,
                    base_layer: 0,
                    layer_count: 1,
                },
            )?;
            let texture = Arc::new(Texture::new(view, sampler.clone()));
            frames.push(Arc::new(Fbo::new(vec![texture], None)));
        }

        Ok(Swapchain {
            device,
            surface_loader,
            surface,
            loader,
            swapchain,
            extent,
            format,
            frames,
            acquired_index: None,
        })
    }

    pub fn extent(&self) -> (u32, u32) {
        self.extent
    }

    pub fn format(&self) -> InternalFormat {
        self.format
    }

    /// Blocks on the presentation engine's own semaphore/fence contract;
    /// the caller supplies the semaphore the graphics queue will wait on
    /// before rendering into the returned `Fbo`.
    pub fn acquire_next_image(&mut self, signal_semaphore: vk::Semaphore) -> Result<(u32, Arc<Fbo>)> {
        let (index, _suboptimal) = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, signal_semaphore, vk::Fence::null())
                .map_err(|e| RhiError::PresentFailure(e.to_string()))?
        };
        self.acquired_index = Some(index);
        Ok((index, self.frames[index as usize].clone()))
    }

    pub fn present(&self, queue: vk::Queue, wait_semaphore: vk::Semaphore) -> Result<()> {
        let Some(index) = self.acquired_index else {
            return Err(RhiError::PresentFailure("present without a prior acquire".into()));
        };
        let wait = [wait_semaphore];
        let swapchains = [self.swapchain];
        let indices = [index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait)
            .swapchains(&swapchains)
            .image_indices(&indices);
        unsafe {
            self.loader
                .queue_present(queue, &present_info)
                .map_err(|e| RhiError::PresentFailure(e.to_string()))?;
        }
        Ok(())
    }

    pub fn current_fbo(&self) -> Option<Arc<Fbo>> {
        self.acquired_index.map(|i| self.frames[i as usize].clone())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.frames.clear();
        unsafe {
            self.loader.destroy_swapchain(self.swapchain, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

impl std::fmt::Debug for Swapchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swapchain")
            .field("extent", &self.extent)
            .field("image_count", &self.frames.len())
            .finish()
    }
}
