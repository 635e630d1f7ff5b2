//! C2: Device & Queues.
//!
//! Root object for the rendering core: enumerates queue families, owns the
//! allocator, swapchain, resource cache, pipeline cache, descriptor pool and
//! query pool. Grounded in the teacher's `vulkan::VulkanDevice` (physical
//! device scoring, queue family enumeration, command pool creation) and
//! `original_source/Core/Device.h` (the `Configuration`/`getQueue` surface).

pub use crate::common::QueueFamily;

use crate::cache::ResourceCache;
use crate::descriptor::{DescriptorPool, DescriptorPoolConfig};
use crate::error::{Result, RhiError};
use crate::memory::MemoryHeap;
use crate::query::QueryPool;
use std::ffi::CString;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[cfg(feature = "window")]
use crate::swapchain::Swapchain;

#[cfg(feature = "vulkan")]
use ash::vk;

/// User-provided device configuration. `validation_override`, when unset,
/// falls back to `debug_mode`; both can be overridden at runtime by the
/// `LUME_RHI_VALIDATION` environment variable (§10.2).
#[derive(Debug, Clone)]
pub struct Configuration {
    pub name: String,
    pub api_version: (u32, u32),
    pub debug_mode: bool,
    pub max_pending_submissions: u32,
    pub validation_override: Option<bool>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            name: "render-core".to_string(),
            api_version: (1, 1),
            debug_mode: false,
            max_pending_submissions: 100,
            validation_override: None,
        }
    }
}

impl Configuration {
    pub fn new(name: impl Into<String>) -> Self {
        Configuration {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_debug_mode(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    /// Whether validation should be requested, resolving the environment
    /// override described in §10.2.
    fn wants_validation(&self) -> bool {
        match std::env::var("LUME_RHI_VALIDATION") {
            Ok(v) if v == "1" || v.eq_ignore_ascii_case("true") => true,
            Ok(v) if v == "0" || v.eq_ignore_ascii_case("false") => false,
            _ => self.validation_override.unwrap_or(self.debug_mode),
        }
    }
}

/// A queue within a family: capability bitset plus ordinal.
pub struct Queue {
    pub family: QueueFamily,
    pub index: u32,
    #[cfg(feature = "vulkan")]
    pub(crate) native: vk::Queue,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("family", &self.family)
            .field("index", &self.index)
            .finish()
    }
}

impl Queue {
    /// Submission is delegated to the native queue; see `command::CommandBuffer::submit`.
    pub fn supports(&self, family: QueueFamily) -> bool {
        self.family.contains(family)
    }
}

pub struct Device {
    pub(crate) config: Configuration,
    #[cfg(feature = "vulkan")]
    pub(crate) entry: ash::Entry,
    #[cfg(feature = "vulkan")]
    pub(crate) instance: ash::Instance,
    #[cfg(feature = "vulkan")]
    pub(crate) physical_device: vk::PhysicalDevice,
    #[cfg(feature = "vulkan")]
    pub(crate) raw: Arc<ash::Device>,
    graphics_queue: Queue,
    transfer_queue: Option<Queue>,
    #[cfg(feature = "vulkan")]
    pub(crate) command_pool: vk::CommandPool,
    #[cfg(feature = "vulkan")]
    pub(crate) transfer_command_pool: Option<vk::CommandPool>,
    pub(crate) memory: MemoryHeap,
    pub(crate) resource_cache: ResourceCache,
    descriptor_pool: Mutex<Option<DescriptorPool>>,
    query_pool: Mutex<Option<Arc<QueryPool>>>,
    #[cfg(feature = "window")]
    swapchain: Mutex<Option<Arc<Mutex<Swapchain>>>>,
    next_id: AtomicU64,
    max_framebuffer_attachments: u32,
    max_push_constant_size: u32,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device").field("config", &self.config).finish()
    }
}

impl Device {
    /// Physical-device scoring per §4.2: discrete > integrated > other,
    /// OR-combined with local heap size in the low bits so ties fall back
    /// to the larger GPU.
    #[cfg(feature = "vulkan")]
    fn score_physical_device(instance: &ash::Instance, pd: vk::PhysicalDevice) -> u64 {
        let props = unsafe { instance.get_physical_device_properties(pd) };
        let type_score: u64 = match props.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 2,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
            _ => 0,
        };
        let mem_props = unsafe { instance.get_physical_device_memory_properties(pd) };
        let heap_size: u64 = mem_props.memory_heaps[..mem_props.memory_heap_count as usize]
            .iter()
            .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|h| h.size)
            .max()
            .unwrap_or(0);
        (type_score << 56) | (heap_size >> 8)
    }

    #[cfg(feature = "vulkan")]
    pub fn create(config: Configuration) -> Result<Arc<Device>> {
        let entry = unsafe {
            ash::Entry::load().map_err(|e| RhiError::CompileFailure {
                stage: "instance",
                message: e.to_string(),
            })?
        };

        let app_name = CString::new(config.name.clone()).unwrap_or_default();
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .api_version(vk::make_api_version(0, config.api_version.0, config.api_version.1, 0));

        let layer_names: Vec<CString> = if config.wants_validation() {
            validation_layer_names(&entry)
        } else {
            vec![]
        };
        let layer_ptrs: Vec<*const i8> = layer_names.iter().map(|c| c.as_ptr()).collect();

        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs);
        let instance = unsafe {
            entry.create_instance(&instance_info, None).map_err(|e| RhiError::CompileFailure {
                stage: "instance",
                message: e.to_string(),
            })?
        };

        let physical_devices = unsafe {
            instance.enumerate_physical_devices().map_err(|e| RhiError::CompileFailure {
                stage: "physical-device-enum",
                message: e.to_string(),
            })?
        };
        let physical_device = *physical_devices
            .iter()
            .max_by_key(|pd| Self::score_physical_device(&instance, **pd))
            .ok_or(RhiError::CompileFailure {
                stage: "physical-device-enum",
                message: "no Vulkan physical devices present".into(),
            })?;

        let queue_family_props =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let graphics_family_index = queue_family_props
            .iter()
            .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .ok_or(RhiError::InvalidQueueFamily {
                requested: QueueFamily::GRAPHICS,
            })? as u32;
        let transfer_family_index = queue_family_props.iter().position(|p| {
            p.queue_flags.contains(vk::QueueFlags::TRANSFER) && !p.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        });

        let priorities = [1.0f32];
        let mut queue_infos = vec![vk::DeviceQueueCreateInfo::default()
            .queue_family_index(graphics_family_index)
            .queue_priorities(&priorities)];
        if let Some(idx) = transfer_family_index {
            queue_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(idx as u32)
                    .queue_priorities(&priorities),
            );
        }

        let device_info = vk::DeviceCreateInfo::default().queue_create_infos(&queue_infos);
        let raw = unsafe {
            instance
                .create_device(physical_device, &device_info, None)
                .map_err(|e| RhiError::CompileFailure {
                    stage: "device",
                    message: e.to_string(),
                })?
        };

        let graphics_native = unsafe { raw.get_device_queue(graphics_family_index, 0) };
        let transfer_native = transfer_family_index.map(|idx| unsafe { raw.get_device_queue(idx as u32, 0) });

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(graphics_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe {
            raw.create_command_pool(&pool_info, None).map_err(|e| RhiError::CompileFailure {
                stage: "command-pool",
                message: e.to_string(),
            })?
        };
        let transfer_command_pool = match transfer_family_index {
            Some(idx) => {
                let info = vk::CommandPoolCreateInfo::default()
                    .queue_family_index(idx as u32)
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER | vk::CommandPoolCreateFlags::TRANSIENT);
                Some(unsafe {
                    raw.create_command_pool(&info, None).map_err(|e| RhiError::CompileFailure {
                        stage: "transfer-command-pool",
                        message: e.to_string(),
                    })?
                })
            }
            None => None,
        };

        let mem_props = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let memory = MemoryHeap::new(mem_props);

        let device = Arc::new(Device {
            config,
            entry,
            instance,
            physical_device,
            raw: Arc::new(raw),
            graphics_queue: Queue {
                family: QueueFamily::GRAPHICS | QueueFamily::PRESENT,
                index: 0,
                native: graphics_native,
            },
            transfer_queue: transfer_native.map(|native| Queue {
                family: QueueFamily::TRANSFER,
                index: 0,
                native,
            }),
            command_pool,
            transfer_command_pool,
            memory,
            resource_cache: ResourceCache::new(),
            descriptor_pool: Mutex::new(None),
            query_pool: Mutex::new(None),
            #[cfg(feature = "window")]
            swapchain: Mutex::new(None),
            next_id: AtomicU64::new(1),
            max_framebuffer_attachments: 8,
            max_push_constant_size: 128,
        });

        log::info!(target: "render_core::device", "created device '{}' on {:?}", device.config.name, physical_device);
        Ok(device)
    }

    pub fn get_queue(&self, family: QueueFamily, index: u32) -> Result<&Queue> {
        if index != 0 {
            return Err(RhiError::InvalidQueueFamily { requested: family });
        }
        if self.graphics_queue.supports(family) {
            return Ok(&self.graphics_queue);
        }
        if let Some(q) = &self.transfer_queue {
            if q.supports(family) {
                return Ok(q);
            }
        }
        log::warn!(target: "render_core::device", "requested unsupported queue family {:?}", family);
        Err(RhiError::InvalidQueueFamily { requested: family })
    }

    pub fn max_framebuffer_attachments(&self) -> u32 {
        self.max_framebuffer_attachments
    }

    pub fn max_push_constant_size(&self) -> u32 {
        self.max_push_constant_size
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn resource_cache(&self) -> &ResourceCache {
        &self.resource_cache
    }

    #[cfg(feature = "vulkan")]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.raw.device_wait_idle() }.map_err(|e| RhiError::PresentFailure(e.to_string()))
    }

    /// §2: the device owns a single descriptor pool, sized lazily on first
    /// request (`DescriptorPoolConfig::default_for`) rather than at
    /// `create()`, since `max_sets` is only known once callers start
    /// requesting shader resource layouts.
    #[cfg(feature = "vulkan")]
    pub(crate) fn with_descriptor_pool<R>(
        self: &Arc<Self>,
        f: impl FnOnce(&DescriptorPool) -> R,
    ) -> Result<R> {
        let mut guard = self.descriptor_pool.lock().unwrap();
        if guard.is_none() {
            *guard = Some(DescriptorPool::create(self.clone(), DescriptorPoolConfig::default_for(256))?);
        }
        Ok(f(guard.as_ref().unwrap()))
    }

    /// Resets the lazily-created descriptor pool, if one exists; a no-op
    /// otherwise (§3.3 invariant 4).
    #[cfg(feature = "vulkan")]
    pub fn reset_descriptor_pool(&self) {
        if let Some(pool) = self.descriptor_pool.lock().unwrap().as_ref() {
            pool.reset();
        }
    }

    /// §2: the device owns a single query pool, created on first request
    /// with a fixed batch size (§3.1 `QueryPool` grows in `batch_size`
    /// increments per `QueryType`, so no up-front sizing is needed here).
    #[cfg(feature = "vulkan")]
    pub fn query_pool(self: &Arc<Self>) -> Arc<QueryPool> {
        let mut guard = self.query_pool.lock().unwrap();
        if guard.is_none() {
            *guard = Some(Arc::new(QueryPool::new(self.clone(), 32)));
        }
        guard.as_ref().unwrap().clone()
    }

    /// §2/§3.1: the device owns at most one swapchain at a time. Re-creating
    /// it (e.g. on resize) replaces the stored handle, dropping the old one
    /// after `wait_idle` so in-flight presents have completed.
    #[cfg(all(feature = "vulkan", feature = "window"))]
    pub fn create_swapchain(
        self: &Arc<Self>,
        entry: &ash::Entry,
        surface: ash::vk::SurfaceKHR,
        extent: (u32, u32),
    ) -> Result<Arc<Mutex<Swapchain>>> {
        self.wait_idle()?;
        let swapchain = Arc::new(Mutex::new(Swapchain::create(self.clone(), entry, surface, extent)?));
        *self.swapchain.lock().unwrap() = Some(swapchain.clone());
        Ok(swapchain)
    }

    #[cfg(feature = "window")]
    pub fn swapchain(&self) -> Option<Arc<Mutex<Swapchain>>> {
        self.swapchain.lock().unwrap().clone()
    }
}

#[cfg(feature = "vulkan")]
impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            let _ = self.raw.device_wait_idle();
            #[cfg(feature = "window")]
            self.swapchain.lock().unwrap().take();
            self.query_pool.lock().unwrap().take();
            self.descriptor_pool.lock().unwrap().take();
            if let Some(pool) = self.transfer_command_pool {
                self.raw.destroy_command_pool(pool, None);
            }
            self.raw.destroy_command_pool(self.command_pool, None);
            self.instance.destroy_instance(None);
        }
    }
}

#[cfg(feature = "vulkan")]
fn validation_layer_names(entry: &ash::Entry) -> Vec<CString> {
    let layers = match unsafe { entry.enumerate_instance_layer_properties() } {
        Ok(l) => l,
        Err(_) => return vec![],
    };
    const KHRONOS: &str = "VK_LAYER_KHRONOS_validation";
    for prop in &layers {
        let name = unsafe { std::ffi::CStr::from_ptr(prop.layer_name.as_ptr()).to_string_lossy() };
        if name == KHRONOS {
            return vec![CString::new(KHRONOS).unwrap()];
        }
    }
    log::warn!(target: "render_core::device", "validation requested but {} is not installed", KHRONOS);
    vec![]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_override_respects_env_var_precedence() {
        let cfg = Configuration::new("test").with_debug_mode(false);
        std::env::remove_var("LUME_RHI_VALIDATION");
        assert!(!cfg.wants_validation());
    }
}
