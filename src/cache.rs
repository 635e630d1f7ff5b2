//! C6: `ResourceCache` — content-hashed factory cache for render passes,
//! framebuffers, pipelines, pipeline layouts and descriptor set layouts
//! (§4.6). Never auto-evicts; callers explicitly `clear()` when recreating
//! a swapchain or invalidating a cached generation.
//!
//! Grounded in `original_source/Core/ResourceCache.h` (hash-keyed lookup,
//! no eviction policy) and the teacher's `RenderPassCacheKey`/
//! `FramebufferCacheKey` structural-hash pattern in `vulkan/mod.rs`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A single type-erased slab, keyed by the structural hash of whatever
/// the caller used to build the cached value.
#[derive(Default)]
struct Slab {
    entries: HashMap<u64, Arc<dyn Any + Send + Sync>>,
}

/// One cache per resource family (§4.6 lists: pipeline, pipeline layout,
/// descriptor set layout, render pass, framebuffer). Keyed by family name
/// so hash collisions across families can't mix entries of different
/// concrete types.
pub struct ResourceCache {
    families: Mutex<HashMap<&'static str, Slab>>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

impl ResourceCache {
    pub fn new() -> ResourceCache {
        ResourceCache {
            families: Mutex::new(HashMap::new()),
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Returns the cached value for `(family, key)`, constructing it with
    /// `build` on a miss. `build` may fail (e.g. pipeline compilation);
    /// a failed build is not cached.
    pub fn get_or_try_insert<T, E>(
        &self,
        family: &'static str,
        key: u64,
        build: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E>
    where
        T: Any + Send + Sync,
    {
        {
            let mut families = self.families.lock().unwrap();
            let slab = families.entry(family).or_default();
            if let Some(existing) = slab.entries.get(&key) {
                if let Ok(found) = existing.clone().downcast::<T>() {
                    self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    return Ok(found);
                }
            }
        }
        self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let built = Arc::new(build()?);
        let mut families = self.families.lock().unwrap();
        let slab = families.entry(family).or_default();
        slab.entries.insert(key, built.clone());
        Ok(built)
    }

    /// Drops every cached entry across all families. Outstanding `Arc`s
    /// held elsewhere keep their resources alive until their last
    /// reference is dropped, per the handle-kernel refcounting in §4.1.
    pub fn clear(&self) {
        self.families.lock().unwrap().clear();
    }

    /// Drops cached entries for a single family only.
    pub fn clear_family(&self, family: &'static str) {
        self.families.lock().unwrap().remove(family);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(std::sync::atomic::Ordering::Relaxed),
            misses: self.misses.load(std::sync::atomic::Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache").field("stats", &self.stats()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_hit_avoids_rebuild() {
        let cache = ResourceCache::new();
        let mut builds = 0;
        let _: Arc<u32> = cache
            .get_or_try_insert::<u32, ()>("pipeline", 42, || {
                builds += 1;
                Ok(7)
            })
            .unwrap();
        let _: Arc<u32> = cache
            .get_or_try_insert::<u32, ()>("pipeline", 42, || {
                builds += 1;
                Ok(7)
            })
            .unwrap();
        assert_eq!(builds, 1);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn distinct_families_do_not_collide_on_key() {
        let cache = ResourceCache::new();
        let a: Arc<u32> = cache.get_or_try_insert::<u32, ()>("pipeline", 1, || Ok(100)).unwrap();
        let b: Arc<u32> = cache
            .get_or_try_insert::<u32, ()>("render-pass", 1, || Ok(200))
            .unwrap();
        assert_eq!(*a, 100);
        assert_eq!(*b, 200);
    }

    #[test]
    fn clear_forces_rebuild() {
        let cache = ResourceCache::new();
        let _: Arc<u32> = cache.get_or_try_insert::<u32, ()>("pipeline", 1, || Ok(1)).unwrap();
        cache.clear();
        let mut builds = 0;
        let _: Arc<u32> = cache
            .get_or_try_insert::<u32, ()>("pipeline", 1, || {
                builds += 1;
                Ok(2)
            })
            .unwrap();
        assert_eq!(builds, 1);
    }
}
