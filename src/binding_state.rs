//! C8: `BindingState` — per-(set, binding, arrayElement) resource bindings
//! with dirty-bit tracking, consumed by the descriptor subsystem (§4.8).
//!
//! Grounded in the teacher's binding-table handling in `vulkan/mod.rs`
//! (`VulkanCommandEncoder`'s per-set dirty mask before a draw/dispatch) and
//! `original_source/RenderingContext/PipelineState.h`'s set/slot layout.

use crate::buffer_object::BufferObject;
use crate::texture::Texture;
use std::sync::Arc;

/// One binding slot's bound resources, addressable by array element.
#[derive(Default, Clone)]
pub struct Binding {
    pub buffers: Vec<Option<Arc<BufferObject>>>,
    pub textures: Vec<Option<Arc<Texture>>>,
}

impl Binding {
    fn buffer(buffer: Arc<BufferObject>) -> Binding {
        Binding {
            buffers: vec![Some(buffer)],
            textures: Vec::new(),
        }
    }

    fn texture(texture: Arc<Texture>) -> Binding {
        Binding {
            buffers: Vec::new(),
            textures: vec![Some(texture)],
        }
    }
}

/// All bindings for a single descriptor set index, keyed by binding number.
/// `dirty` is set whenever a slot changes and cleared once a descriptor set
/// has been written and bound for the current binding-number set (§4.8
/// invariant: a dirty set forces `request_descriptor_set` before the next
/// draw/dispatch). `Clone` is used to snapshot a set's contents at record
/// time, since a `CommandRecorder`'s `Command::BindSet` entries must
/// reference the bindings as they stood when recorded, not whatever the
/// live `BindingState` mutates to afterward.
#[derive(Default, Clone)]
pub struct BindingSet {
    slots: Vec<(u32, Binding)>,
    dirty: bool,
}

impl BindingSet {
    pub fn new() -> BindingSet {
        BindingSet::default()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn get(&self, binding: u32) -> Option<&Binding> {
        self.slots.iter().find(|(b, _)| *b == binding).map(|(_, v)| v)
    }

    pub fn bind_buffer(&mut self, binding: u32, buffer: Arc<BufferObject>) {
        self.set_slot(binding, Binding::buffer(buffer));
    }

    pub fn bind_texture(&mut self, binding: u32, texture: Arc<Texture>) {
        self.set_slot(binding, Binding::texture(texture));
    }

    pub fn bind_buffer_at(&mut self, binding: u32, index: usize, buffer: Arc<BufferObject>) {
        self.ensure_buffer_slot(binding, index);
        for (b, slot) in self.slots.iter_mut() {
            if *b == binding {
                slot.buffers[index] = Some(buffer);
            }
        }
        self.dirty = true;
    }

    pub fn bind_texture_at(&mut self, binding: u32, index: usize, texture: Arc<Texture>) {
        self.ensure_texture_slot(binding, index);
        for (b, slot) in self.slots.iter_mut() {
            if *b == binding {
                slot.textures[index] = Some(texture);
            }
        }
        self.dirty = true;
    }

    pub fn unbind(&mut self, binding: u32) {
        self.slots.retain(|(b, _)| *b != binding);
        self.dirty = true;
    }

    fn set_slot(&mut self, binding: u32, value: Binding) {
        if let Some(entry) = self.slots.iter_mut().find(|(b, _)| *b == binding) {
            entry.1 = value;
        } else {
            self.slots.push((binding, value));
        }
        self.dirty = true;
    }

    fn ensure_buffer_slot(&mut self, binding: u32, index: usize) {
        if self.slots.iter().all(|(b, _)| *b != binding) {
            self.slots.push((binding, Binding::default()));
        }
        let slot = &mut self.slots.iter_mut().find(|(b, _)| *b == binding).unwrap().1;
        if slot.buffers.len() <= index {
            slot.buffers.resize_with(index + 1, || None);
        }
    }

    fn ensure_texture_slot(&mut self, binding: u32, index: usize) {
        if self.slots.iter().all(|(b, _)| *b != binding) {
            self.slots.push((binding, Binding::default()));
        }
        let slot = &mut self.slots.iter_mut().find(|(b, _)| *b == binding).unwrap().1;
        if slot.textures.len() <= index {
            slot.textures.resize_with(index + 1, || None);
        }
    }
}

/// A fixed-size array of `BindingSet`s, one per descriptor set index
/// (typically 0..=3 following the teacher's conventions).
pub struct BindingState {
    sets: Vec<BindingSet>,
}

impl BindingState {
    pub fn new(set_count: usize) -> BindingState {
        BindingState {
            sets: (0..set_count).map(|_| BindingSet::new()).collect(),
        }
    }

    pub fn set(&self, index: usize) -> &BindingSet {
        &self.sets[index]
    }

    pub fn set_mut(&mut self, index: usize) -> &mut BindingSet {
        &mut self.sets[index]
    }

    pub fn any_dirty(&self) -> bool {
        self.sets.iter().any(|s| s.is_dirty())
    }

    pub fn dirty_indices(&self) -> Vec<usize> {
        self.sets
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_dirty())
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_slot_is_none() {
        let set = BindingSet::new();
        assert!(set.get(0).is_none());
    }

    #[test]
    fn binding_marks_set_dirty_until_cleared() {
        let mut state = BindingState::new(2);
        assert!(!state.any_dirty());
        state.set_mut(1).unbind(3);
        assert!(state.any_dirty());
        assert_eq!(state.dirty_indices(), vec![1]);
        state.set_mut(1).clear_dirty();
        assert!(!state.any_dirty());
    }
}
