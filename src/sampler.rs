//! C3: `Sampler` — immutable sampling configuration.
//! Grounded in the teacher's `vulkan/sampler.rs::create_sampler`.

use crate::common::{ComparisonFunc, ImageAddressMode, ImageFilter};
use crate::convert::{address_mode_to_vk, compare_op_to_vk, filter_to_vk};
use crate::device::Device;
use crate::error::{Result, RhiError};
use std::sync::Arc;

#[cfg(feature = "vulkan")]
use ash::vk;

#[derive(Debug, Clone, Copy)]
pub struct SamplerConfig {
    pub min_filter: ImageFilter,
    pub mag_filter: ImageFilter,
    pub mipmap_filter: ImageFilter,
    pub address_u: ImageAddressMode,
    pub address_v: ImageAddressMode,
    pub address_w: ImageAddressMode,
    pub min_lod: f32,
    pub max_lod: f32,
    pub lod_bias: f32,
    pub max_anisotropy: f32,
    pub compare: ComparisonFunc,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            min_filter: ImageFilter::Linear,
            mag_filter: ImageFilter::Linear,
            mipmap_filter: ImageFilter::Linear,
            address_u: ImageAddressMode::Repeat,
            address_v: ImageAddressMode::Repeat,
            address_w: ImageAddressMode::Repeat,
            min_lod: 0.0,
            max_lod: 1000.0,
            lod_bias: 0.0,
            max_anisotropy: 1.0,
            compare: ComparisonFunc::Disabled,
        }
    }
}

pub struct Sampler {
    device: Arc<Device>,
    config: SamplerConfig,
    #[cfg(feature = "vulkan")]
    sampler: vk::Sampler,
}

impl Sampler {
    #[cfg(feature = "vulkan")]
    pub fn create(device: Arc<Device>, config: SamplerConfig) -> Result<Arc<Sampler>> {
        let compare_enable = config.compare != ComparisonFunc::Disabled;
        let mipmap_mode = match config.mipmap_filter {
            ImageFilter::Nearest => vk::SamplerMipmapMode::NEAREST,
            ImageFilter::Linear => vk::SamplerMipmapMode::LINEAR,
        };
        let create_info = vk::SamplerCreateInfo::default()
            .min_filter(filter_to_vk(config.min_filter))
            .mag_filter(filter_to_vk(config.mag_filter))
            .mipmap_mode(mipmap_mode)
            .address_mode_u(address_mode_to_vk(config.address_u))
            .address_mode_v(address_mode_to_vk(config.address_v))
            .address_mode_w(address_mode_to_vk(config.address_w))
            .min_lod(config.min_lod)
            .max_lod(config.max_lod)
            .mip_lod_bias(config.lod_bias)
            .anisotropy_enable(config.max_anisotropy > 1.0)
            .max_anisotropy(config.max_anisotropy)
            .compare_enable(compare_enable)
            .compare_op(compare_op_to_vk(config.compare));

        let sampler = unsafe {
            device
                .raw
                .create_sampler(&create_info, None)
                .map_err(|e| RhiError::CompileFailure {
                    stage: "sampler",
                    message: e.to_string(),
                })?
        };
        Ok(Arc::new(Sampler { device, config, sampler }))
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    #[cfg(feature = "vulkan")]
    pub(crate) fn native(&self) -> vk::Sampler {
        self.sampler
    }
}

#[cfg(feature = "vulkan")]
impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_sampler(self.sampler, None);
        }
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler").field("config", &self.config).finish()
    }
}
