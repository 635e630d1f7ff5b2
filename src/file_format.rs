//! §6.5/§10.6: the mesh/texture/material file-format collaborator surface,
//! specified only as a capability contract — "can I load meshes from
//! `.mmf`" — with no parser bodies. Parsing lives in a streamer crate this
//! core does not own (§1 Out of scope).
//!
//! Grounded in `original_source/IO/` (the per-extension capability table
//! reproduced in §6.5) and the teacher's `lume-tools` static-registry
//! pattern for dispatching on a file extension without a runtime `match`.

use bitflags::bitflags;
use std::collections::HashMap;
use std::sync::OnceLock;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileCapabilities: u8 {
        const LOAD_MESH = 1 << 0;
        const SAVE_MESH = 1 << 1;
        const LOAD_TEXTURE = 1 << 2;
        const SAVE_TEXTURE = 1 << 3;
        const LOAD_GENERIC = 1 << 4;
    }
}

/// A collaborator's declared capabilities for one file extension. No
/// `load`/`save` methods: those belong to the out-of-scope streamer layer
/// (§1, §10.6).
pub trait FileFormat: Send + Sync {
    fn extension(&self) -> &'static str;
    fn capabilities(&self) -> FileCapabilities;
}

macro_rules! stub_format {
    ($name:ident, $ext:literal, $caps:expr) => {
        struct $name;
        impl FileFormat for $name {
            fn extension(&self) -> &'static str {
                $ext
            }
            fn capabilities(&self) -> FileCapabilities {
                $caps
            }
        }
    };
}

use FileCapabilities as C;

stub_format!(MmfFormat, "mmf", C::LOAD_MESH.union(C::SAVE_MESH).union(C::LOAD_GENERIC));
stub_format!(PlyFormat, "ply", C::LOAD_MESH.union(C::SAVE_MESH).union(C::LOAD_GENERIC));
stub_format!(ObjFormat, "obj", C::LOAD_GENERIC);
stub_format!(MtlFormat, "mtl", C::LOAD_GENERIC);
stub_format!(Md2Format, "md2", C::LOAD_GENERIC);
stub_format!(MvboFormat, "mvbo", C::LOAD_MESH.union(C::LOAD_GENERIC));
stub_format!(NgcFormat, "ngc", C::LOAD_MESH.union(C::LOAD_GENERIC));
stub_format!(PkmFormat, "pkm", C::LOAD_TEXTURE);
stub_format!(XyzFormat, "xyz", C::LOAD_MESH.union(C::LOAD_GENERIC));

/// Static extension → collaborator registry (§6.5: "a static map of
/// extension → streamer").
pub fn registry() -> &'static HashMap<&'static str, &'static dyn FileFormat> {
    static REGISTRY: OnceLock<HashMap<&'static str, &'static dyn FileFormat>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<&'static str, &'static dyn FileFormat> = HashMap::new();
        map.insert("mmf", &MmfFormat);
        map.insert("ply", &PlyFormat);
        map.insert("obj", &ObjFormat);
        map.insert("mtl", &MtlFormat);
        map.insert("md2", &Md2Format);
        map.insert("mvbo", &MvboFormat);
        map.insert("ngc", &NgcFormat);
        map.insert("pkm", &PkmFormat);
        map.insert("xyz", &XyzFormat);
        map
    })
}

/// Looks up the capability bitset for an extension (case-insensitive,
/// without a leading dot). Returns `None` for an unregistered extension.
pub fn capabilities_for(extension: &str) -> Option<FileCapabilities> {
    let lower = extension.to_ascii_lowercase();
    registry().get(lower.as_str()).map(|f| f.capabilities())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mmf_supports_mesh_load_save_and_generic() {
        let caps = capabilities_for("mmf").unwrap();
        assert!(caps.contains(FileCapabilities::LOAD_MESH));
        assert!(caps.contains(FileCapabilities::SAVE_MESH));
        assert!(caps.contains(FileCapabilities::LOAD_GENERIC));
        assert!(!caps.contains(FileCapabilities::LOAD_TEXTURE));
    }

    #[test]
    fn pkm_is_texture_only() {
        let caps = capabilities_for("pkm").unwrap();
        assert_eq!(caps, FileCapabilities::LOAD_TEXTURE);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(capabilities_for("PLY"), capabilities_for("ply"));
    }

    #[test]
    fn unknown_extension_returns_none() {
        assert!(capabilities_for("zzz").is_none());
    }
}
