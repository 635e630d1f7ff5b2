//! C11: Rendering State & Apply Engine — camera/instance/material/light
//! state that is GPU-visible but not part of the pipeline's structural
//! identity (§3.1 `RenderingState`, §4.11). `apply()` diffs against the
//! shader's last-applied snapshot and writes only the uniforms that moved,
//! via the same push-constant/`UpdateBuffer` machinery [`crate::command`]
//! already exposes.
//!
//! Grounded in `original_source/RenderingContext/RenderingState.h` (the
//! Camera/Instance/Material/Light grouping and the "apply only what
//! changed" diff) and the teacher's uniform-buffer update path in
//! `vulkan/mod.rs::update_buffer` for how a dirty CPU-side cache turns into
//! a device write.

use crate::buffer_object::BufferObject;
use crate::command::CommandRecorder;
use crate::common::ShaderStageFlags;
use glam::{Mat4, Vec3, Vec4};
use std::sync::Arc;

/// Camera matrices. `world_to_camera` is derived (inverse of
/// `camera_to_world`) rather than stored independently, so the two can
/// never disagree.
#[derive(Debug, Clone, Copy)]
pub struct CameraData {
    camera_to_clipping: Mat4,
    camera_to_world: Mat4,
    dirty: bool,
}

impl Default for CameraData {
    fn default() -> Self {
        CameraData {
            camera_to_clipping: Mat4::IDENTITY,
            camera_to_world: Mat4::IDENTITY,
            dirty: true,
        }
    }
}

impl CameraData {
    pub fn set_camera_to_clipping(&mut self, m: Mat4) {
        if self.camera_to_clipping != m {
            self.camera_to_clipping = m;
            self.dirty = true;
        }
    }

    pub fn set_camera_to_world(&mut self, m: Mat4) {
        if self.camera_to_world != m {
            self.camera_to_world = m;
            self.dirty = true;
        }
    }

    pub fn camera_to_clipping(&self) -> Mat4 {
        self.camera_to_clipping
    }

    pub fn camera_to_world(&self) -> Mat4 {
        self.camera_to_world
    }

    /// §3.1: `worldToCamera` is always the inverse of `cameraToWorld`,
    /// never stored or diffed on its own.
    pub fn world_to_camera(&self) -> Mat4 {
        self.camera_to_world.inverse()
    }
}

/// Per-draw instance data: model-to-camera matrix and point size. The
/// change counter lets downstream per-instance uniform buffers detect a
/// new value even across frames where `modelToCamera` happens to repeat
/// (§3.1: "a change counter").
#[derive(Debug, Clone, Copy)]
pub struct InstanceData {
    model_to_camera: Mat4,
    point_size: f32,
    change_counter: u64,
    dirty: bool,
}

impl Default for InstanceData {
    fn default() -> Self {
        InstanceData {
            model_to_camera: Mat4::IDENTITY,
            point_size: 1.0,
            change_counter: 0,
            dirty: true,
        }
    }
}

impl InstanceData {
    /// §8 property 2: re-setting to the identical matrix must not dirty.
    pub fn set_model_to_camera(&mut self, m: Mat4) {
        if self.model_to_camera != m {
            self.model_to_camera = m;
            self.change_counter += 1;
            self.dirty = true;
        }
    }

    pub fn set_point_size(&mut self, size: f32) {
        if self.point_size != size {
            self.point_size = size;
            self.change_counter += 1;
            self.dirty = true;
        }
    }

    pub fn model_to_camera(&self) -> Mat4 {
        self.model_to_camera
    }

    pub fn point_size(&self) -> f32 {
        self.point_size
    }

    pub fn change_counter(&self) -> u64 {
        self.change_counter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadingModel {
    Shadeless,
    Phong,
}

/// §3.1: shininess is packed into `specular.w` rather than carried as a
/// separate field, matching the source layout so the uniform block's byte
/// layout needs no extra padding member.
#[derive(Debug, Clone, Copy)]
pub struct MaterialData {
    pub ambient: Vec4,
    pub diffuse: Vec4,
    pub specular: Vec4,
    pub emission: Vec4,
    pub shading_model: ShadingModel,
    pub alpha_mask_enabled: bool,
    pub alpha_threshold: f32,
    dirty: bool,
}

impl Default for MaterialData {
    fn default() -> Self {
        MaterialData {
            ambient: Vec4::new(0.2, 0.2, 0.2, 1.0),
            diffuse: Vec4::new(0.8, 0.8, 0.8, 1.0),
            specular: Vec4::new(0.0, 0.0, 0.0, 0.0),
            emission: Vec4::ZERO,
            shading_model: ShadingModel::Phong,
            alpha_mask_enabled: false,
            alpha_threshold: 0.5,
            dirty: true,
        }
    }
}

impl MaterialData {
    pub fn shininess(&self) -> f32 {
        self.specular.w
    }

    pub fn set_shininess(&mut self, value: f32) {
        if self.specular.w != value {
            self.specular.w = value;
            self.dirty = true;
        }
    }

    pub fn set_ambient(&mut self, v: Vec4) {
        if self.ambient != v {
            self.ambient = v;
            self.dirty = true;
        }
    }

    pub fn set_diffuse(&mut self, v: Vec4) {
        if self.diffuse != v {
            self.diffuse = v;
            self.dirty = true;
        }
    }

    pub fn set_shading_model(&mut self, model: ShadingModel) {
        if self.shading_model != model {
            self.shading_model = model;
            self.dirty = true;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Point,
    Directional,
    Spot,
}

#[derive(Debug, Clone, Copy)]
pub struct LightData {
    pub kind: LightKind,
    pub position: Vec3,
    pub direction: Vec3,
    pub intensity: Vec3,
    pub cone_angle: f32,
}

impl Default for LightData {
    fn default() -> Self {
        LightData {
            kind: LightKind::Point,
            position: Vec3::ZERO,
            direction: Vec3::new(0.0, -1.0, 0.0),
            intensity: Vec3::ONE,
            cone_angle: std::f32::consts::FRAC_PI_4,
        }
    }
}

/// §3.1: "indexed add/remove" — handles stay stable across removal of
/// other lights (a `Vec<Option<LightData>>` rather than a dense `Vec`), so
/// a light's handle never needs to be remapped while the collection
/// shrinks/grows.
#[derive(Default)]
pub struct LightCollection {
    slots: Vec<Option<LightData>>,
    free: Vec<usize>,
    dirty: bool,
}

impl LightCollection {
    pub fn add_light(&mut self, light: LightData) -> usize {
        self.dirty = true;
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(light);
            idx
        } else {
            self.slots.push(Some(light));
            self.slots.len() - 1
        }
    }

    pub fn remove_light(&mut self, handle: usize) {
        if handle < self.slots.len() && self.slots[handle].is_some() {
            self.slots[handle] = None;
            self.free.push(handle);
            self.dirty = true;
        }
    }

    pub fn get(&self, handle: usize) -> Option<&LightData> {
        self.slots.get(handle).and_then(|s| s.as_ref())
    }

    /// §4.11: "writes a contiguous array + count uniform" — dense,
    /// handle-order-independent, for upload.
    pub fn dense(&self) -> Vec<LightData> {
        self.slots.iter().filter_map(|s| *s).collect()
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// §3.1: a registry of named `Uniform`s synced into the active shader's
/// uniform registry lazily. `sync` is the "unchanged since last sync" fast
/// path: unchanged entries are skipped entirely.
#[derive(Default)]
pub struct GlobalUniforms {
    values: Vec<(String, Vec<u8>)>,
    dirty: std::collections::HashSet<String>,
}

impl GlobalUniforms {
    pub fn set(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        if let Some(entry) = self.values.iter_mut().find(|(n, _)| *n == name) {
            if entry.1 != bytes {
                entry.1 = bytes;
                self.dirty.insert(name);
            }
        } else {
            self.dirty.insert(name.clone());
            self.values.push((name, bytes));
        }
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_slice())
    }

    /// Drains and returns the names that changed since the last sync,
    /// clearing the dirty set (the "unchanged since last sync" fast path).
    pub fn take_dirty(&mut self) -> Vec<String> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }
}

/// §3.1 `UniformBuffer`: a CPU-side byte cache mirroring a uniform layout,
/// backed by either a regular UBO (`BufferObject`) or a push-constant
/// range. `flush` writes only when `bytes` actually changed (or `force`).
pub struct UniformBuffer {
    bytes: Vec<u8>,
    target: UniformTarget,
    last_flushed: Option<Vec<u8>>,
}

pub enum UniformTarget {
    Buffer { object: Arc<BufferObject>, set: u32, binding: u32 },
    PushConstant { stages: ShaderStageFlags, offset: u32 },
}

impl UniformBuffer {
    pub fn new(size: usize, target: UniformTarget) -> UniformBuffer {
        UniformBuffer {
            bytes: vec![0u8; size],
            target,
            last_flushed: None,
        }
    }

    pub fn write(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn is_dirty(&self) -> bool {
        self.last_flushed.as_deref() != Some(&self.bytes[..])
    }

    /// Issues an `UpdateBuffer` or `PushConstants` command when dirty (or
    /// `force`), then snapshots `bytes` as the new baseline.
    pub fn flush(&mut self, cmd: &mut CommandRecorder, force: bool) {
        if !force && !self.is_dirty() {
            return;
        }
        match &self.target {
            UniformTarget::Buffer { object, .. } => {
                cmd.update_buffer(object.clone(), 0, self.bytes.clone());
            }
            UniformTarget::PushConstant { stages, offset } => {
                cmd.push_constants(*stages, *offset, self.bytes.clone());
            }
        }
        self.last_flushed = Some(self.bytes.clone());
    }
}

/// The aggregate non-pipeline rendering state (§3.1, §4.11). `apply`
/// writes each group's uniform(s) only if that group (or `forced`) is
/// dirty, then clears the group's dirty bit.
#[derive(Default)]
pub struct RenderingState {
    pub camera: CameraData,
    pub instance: InstanceData,
    pub material: MaterialData,
    pub lights: LightCollection,
    pub globals: GlobalUniforms,
}

impl RenderingState {
    pub fn new() -> RenderingState {
        RenderingState::default()
    }

    /// §4.11: never touches `PipelineState` (C7) — only the uniform-facing
    /// state above. Returns which groups were actually written, for
    /// logging/tests.
    pub fn apply(&mut self, cmd: &mut CommandRecorder, uniforms: &mut AppliedUniforms, forced: bool) -> AppliedGroups {
        let mut applied = AppliedGroups::default();

        if forced || self.camera.dirty {
            uniforms.camera.write(0, bytemuck_cast(&self.camera.camera_to_clipping));
            uniforms.camera.write(64, bytemuck_cast(&self.camera.camera_to_world));
            uniforms.camera.write(128, bytemuck_cast(&self.camera.world_to_camera()));
            uniforms.camera.flush(cmd, forced);
            self.camera.dirty = false;
            applied.camera = true;
        }

        if forced || self.instance.dirty {
            uniforms.instance.write(0, bytemuck_cast(&self.instance.model_to_camera));
            uniforms.instance.write(64, &self.instance.point_size.to_le_bytes());
            uniforms.instance.flush(cmd, forced);
            self.instance.dirty = false;
            applied.instance = true;
        }

        if forced || self.material.dirty {
            uniforms.material.write(0, bytemuck_cast(&self.material.ambient));
            uniforms.material.write(16, bytemuck_cast(&self.material.diffuse));
            uniforms.material.write(32, bytemuck_cast(&self.material.specular));
            uniforms.material.write(48, bytemuck_cast(&self.material.emission));
            uniforms.material.flush(cmd, forced);
            self.material.dirty = false;
            applied.material = true;
        }

        if forced || self.lights.dirty {
            let dense = self.lights.dense();
            let mut offset = 0usize;
            for light in &dense {
                if offset + 48 > uniforms.lights.bytes().len() {
                    break;
                }
                uniforms.lights.write(offset, bytemuck_cast(&light.position));
                uniforms.lights.write(offset + 16, bytemuck_cast(&light.direction));
                uniforms.lights.write(offset + 32, bytemuck_cast(&light.intensity));
                offset += 48;
            }
            uniforms.lights.flush(cmd, forced);
            self.lights.dirty = false;
            applied.lights = true;
        }

        let changed_globals = self.globals.take_dirty();
        applied.globals = !changed_globals.is_empty();

        applied
    }
}

/// The per-shader uniform targets that `RenderingState::apply` writes
/// into; owned by the façade/draw call site since the targets depend on
/// the active shader's reflected layout (§4.11).
pub struct AppliedUniforms {
    pub camera: UniformBuffer,
    pub instance: UniformBuffer,
    pub material: UniformBuffer,
    pub lights: UniformBuffer,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AppliedGroups {
    pub camera: bool,
    pub instance: bool,
    pub material: bool,
    pub lights: bool,
    pub globals: bool,
}

fn bytemuck_cast<T: Copy>(value: &T) -> &[u8] {
    unsafe { std::slice::from_raw_parts((value as *const T) as *const u8, std::mem::size_of::<T>()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_dirty_only_on_distinct_matrix() {
        let mut instance = InstanceData::default();
        instance.dirty = false;
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        instance.set_model_to_camera(m);
        assert!(instance.dirty);
        assert_eq!(instance.change_counter(), 1);
        instance.dirty = false;
        instance.set_model_to_camera(m);
        assert!(!instance.dirty);
        assert_eq!(instance.change_counter(), 1);
    }

    #[test]
    fn camera_derives_world_to_camera() {
        let mut camera = CameraData::default();
        let m = Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0));
        camera.set_camera_to_world(m);
        assert_eq!(camera.world_to_camera(), m.inverse());
    }

    #[test]
    fn light_handles_survive_unrelated_removal() {
        let mut lights = LightCollection::default();
        let a = lights.add_light(LightData::default());
        let b = lights.add_light(LightData {
            position: Vec3::new(1.0, 0.0, 0.0),
            ..Default::default()
        });
        lights.remove_light(a);
        assert!(lights.get(a).is_none());
        assert!(lights.get(b).is_some());
        assert_eq!(lights.count(), 1);
    }

    #[test]
    fn light_slot_reused_after_removal() {
        let mut lights = LightCollection::default();
        let a = lights.add_light(LightData::default());
        lights.remove_light(a);
        let b = lights.add_light(LightData::default());
        assert_eq!(a, b);
    }

    #[test]
    fn global_uniforms_track_dirty_names() {
        let mut globals = GlobalUniforms::default();
        globals.set("time", vec![0, 0, 0, 0]);
        let dirty = globals.take_dirty();
        assert_eq!(dirty, vec!["time".to_string()]);
        assert!(globals.take_dirty().is_empty());
        globals.set("time", vec![0, 0, 0, 0]);
        assert!(globals.take_dirty().is_empty());
        globals.set("time", vec![1, 0, 0, 0]);
        assert_eq!(globals.take_dirty(), vec!["time".to_string()]);
    }

    #[test]
    fn material_shininess_packed_into_specular_alpha() {
        let mut material = MaterialData::default();
        material.dirty = false;
        material.set_shininess(32.0);
        assert_eq!(material.shininess(), 32.0);
        assert!(material.dirty);
    }
}
