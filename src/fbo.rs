//! §3.1 `FBO` — an ordered list of color attachment `Texture`s plus an
//! optional depth/stencil attachment, and `FramebufferFormat`, the
//! structural key `ResourceCache`'s render-pass/framebuffer families hash
//! against (§4.6, GLOSSARY).
//!
//! Grounded in the teacher's `vulkan/render_pass.rs` (`ColorAttachmentInfo`
//! / `DepthAttachmentInfo`, one `vk::AttachmentDescription` per entry) and
//! `original_source/RenderingContext/FBO.h` (attachment ordering, derived
//! size = min of attachment extents).

use crate::common::InternalFormat;
use crate::error::{Result, RhiError};
use crate::texture::Texture;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// One (pixelFormat, sampleCount) pair per attachment, ordered exactly as
/// the FBO's color attachments, plus an optional depth entry. This is the
/// structural key shared by the render-pass, framebuffer, and pipeline
/// cache families (GLOSSARY: FramebufferFormat).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FramebufferFormat {
    pub color: Vec<(InternalFormat, u32)>,
    pub depth: Option<(InternalFormat, u32)>,
}

impl FramebufferFormat {
    pub fn hash_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.color.hash(&mut hasher);
        self.depth.hash(&mut hasher);
        hasher.finish()
    }
}

/// §3.1: ordered color attachments + optional depth/stencil attachment.
/// `validate()` derives the render extent (min of attachment extents) and
/// the structural `FramebufferFormat` used by the caches.
pub struct Fbo {
    pub color_attachments: Vec<Arc<Texture>>,
    pub depth_attachment: Option<Arc<Texture>>,
}

impl Fbo {
    pub fn new(color_attachments: Vec<Arc<Texture>>, depth_attachment: Option<Arc<Texture>>) -> Fbo {
        Fbo {
            color_attachments,
            depth_attachment,
        }
    }

    /// §4.6/GLOSSARY: extent = min over (width, height) of every attachment;
    /// rejects an FBO with no attachments at all.
    pub fn validate(&self) -> Result<(u32, u32)> {
        let mut extents = self
            .color_attachments
            .iter()
            .chain(self.depth_attachment.iter())
            .map(|t| t.view().storage().format().extent);
        let Some(first) = extents.next() else {
            return Err(RhiError::InvalidConfiguration("FBO has no attachments".into()));
        };
        let (mut w, mut h) = (first.0, first.1);
        for e in extents {
            w = w.min(e.0);
            h = h.min(e.1);
        }
        Ok((w, h))
    }

    pub fn format(&self) -> FramebufferFormat {
        FramebufferFormat {
            color: self
                .color_attachments
                .iter()
                .map(|t| {
                    let fmt = t.view().storage().format();
                    (fmt.pixel_format, fmt.samples)
                })
                .collect(),
            depth: self.depth_attachment.as_ref().map(|t| {
                let fmt = t.view().storage().format();
                (fmt.pixel_format, fmt.samples)
            }),
        }
    }

    /// §4.6: the render-pass/framebuffer cache key also depends on the
    /// attachments' `lastUsage` at begin time (determines `loadOp`), so
    /// this is folded in by the caller (`CommandRecorder::begin_render_pass`)
    /// rather than baked into `FramebufferFormat` itself.
    pub fn layout_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.format().hash(&mut hasher);
        for t in self.color_attachments.iter().chain(self.depth_attachment.iter()) {
            (Arc::as_ptr(t) as usize).hash(&mut hasher);
        }
        hasher.finish()
    }
}

impl std::fmt::Debug for Fbo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fbo")
            .field("color_attachments", &self.color_attachments.len())
            .field("has_depth", &self.depth_attachment.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framebuffer_format_is_order_sensitive() {
        let a = FramebufferFormat {
            color: vec![(InternalFormat::R8G8B8A8Unorm, 1), (InternalFormat::B8G8R8A8Unorm, 1)],
            depth: None,
        };
        let b = FramebufferFormat {
            color: vec![(InternalFormat::B8G8R8A8Unorm, 1), (InternalFormat::R8G8B8A8Unorm, 1)],
            depth: None,
        };
        assert_ne!(a.hash_key(), b.hash_key());
    }

    #[test]
    fn equal_formats_hash_equal() {
        let a = FramebufferFormat {
            color: vec![(InternalFormat::R8G8B8A8Unorm, 1)],
            depth: Some((InternalFormat::D32Float, 1)),
        };
        let b = a.clone();
        assert_eq!(a.hash_key(), b.hash_key());
    }
}
