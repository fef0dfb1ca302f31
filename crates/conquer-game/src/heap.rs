// heap.rs: fixed-capacity slot pools for simulation objects

use log::{debug, warn};

use crate::defines::Kind;
use crate::save_error::{SaveError, SaveResult};
use crate::target::{Handle, Target};

/// Whether the links inside a pool's objects are live or coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolState {
    #[default]
    Live,
    Coded,
}

/// A fixed number of slots for one kind of object. Slots never move, so an
/// object's index is stable for its whole lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotPool<T> {
    kind: Kind,
    objects: Vec<T>,
    active: Vec<bool>,
    generations: Vec<u32>,
    active_count: usize,
    state: PoolState,
}

impl<T: Default> SlotPool<T> {
    pub fn new(kind: Kind, capacity: usize) -> Self {
        assert!(kind.is_pool(), "{} is not a pooled kind", kind);
        assert!(capacity <= Target::INDEX_MASK as usize + 1, "{} pool too large: {}", kind, capacity);
        let mut objects = Vec::with_capacity(capacity);
        objects.resize_with(capacity, T::default);
        Self {
            kind,
            objects,
            active: vec![false; capacity],
            generations: vec![0; capacity],
            active_count: 0,
            state: PoolState::Live,
        }
    }

    /// Claims the lowest free slot and resets it to a default object.
    /// Returns None (after logging) when every slot is in use.
    pub fn allocate(&mut self) -> Option<Handle> {
        let index = match self.active.iter().position(|a| !a) {
            Some(index) => index,
            None => {
                warn!("{} pool exhausted ({} slots)", self.kind, self.capacity());
                return None;
            }
        };
        self.objects[index] = T::default();
        self.active[index] = true;
        self.active_count += 1;
        Some(Handle::new(self.kind, index, self.generations[index]))
    }

    /// Places `object` into a specific free slot; used when restoring a save.
    pub fn allocate_at(&mut self, index: usize, object: T) -> SaveResult<Handle> {
        if index >= self.capacity() {
            return Err(SaveError::InvalidData(format!(
                "{} index {} out of range (capacity {})",
                self.kind,
                index,
                self.capacity()
            )));
        }
        if self.active[index] {
            return Err(SaveError::InvalidData(format!("{} slot {} stored twice", self.kind, index)));
        }
        self.objects[index] = object;
        self.active[index] = true;
        self.active_count += 1;
        Ok(Handle::new(self.kind, index, self.generations[index]))
    }

    /// Releases the slot named by `handle`. A stale or foreign handle is
    /// ignored and returns false.
    pub fn free(&mut self, handle: Handle) -> bool {
        if !self.is_live(handle) {
            debug!("ignoring free of stale {} handle {:?}", self.kind, handle);
            return false;
        }
        self.free_index(handle.index())
    }

    pub fn free_index(&mut self, index: usize) -> bool {
        if !self.is_active(index) {
            return false;
        }
        self.objects[index] = T::default();
        self.active[index] = false;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.active_count -= 1;
        true
    }

    /// Frees every slot, e.g. when a scenario is cleared.
    pub fn free_all(&mut self) {
        for index in 0..self.capacity() {
            self.free_index(index);
        }
        self.state = PoolState::Live;
    }
}

impl<T> SlotPool<T> {
    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.objects.len()
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn is_full(&self) -> bool {
        self.active_count == self.capacity()
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn set_state(&mut self, state: PoolState) {
        self.state = state;
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.active.get(index).copied().unwrap_or(false)
    }

    /// True when `handle` names an occupied slot of this pool and the slot
    /// has not been freed since the handle was issued.
    pub fn is_live(&self, handle: Handle) -> bool {
        handle.kind == self.kind
            && self.is_active(handle.index())
            && self.generations[handle.index()] == handle.generation
    }

    /// The current handle for an occupied slot.
    pub fn handle_at(&self, index: usize) -> Option<Handle> {
        if self.is_active(index) {
            Some(Handle::new(self.kind, index, self.generations[index]))
        } else {
            None
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        if self.is_live(handle) {
            Some(&self.objects[handle.index()])
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        if self.is_live(handle) {
            Some(&mut self.objects[handle.index()])
        } else {
            None
        }
    }

    pub fn get_index(&self, index: usize) -> Option<&T> {
        if self.is_active(index) {
            Some(&self.objects[index])
        } else {
            None
        }
    }

    pub fn get_index_mut(&mut self, index: usize) -> Option<&mut T> {
        if self.is_active(index) {
            Some(&mut self.objects[index])
        } else {
            None
        }
    }

    /// Live objects in index order. Each call starts over from slot 0.
    pub fn iter_active(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
        let kind = self.kind;
        self.objects
            .iter()
            .enumerate()
            .filter(move |(i, _)| self.active[*i])
            .map(move |(i, obj)| (Handle::new(kind, i, self.generations[i]), obj))
    }

    pub fn iter_active_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> + '_ {
        let kind = self.kind;
        let active = &self.active;
        let generations = &self.generations;
        self.objects
            .iter_mut()
            .enumerate()
            .filter(move |(i, _)| active[*i])
            .map(move |(i, obj)| (Handle::new(kind, i, generations[i]), obj))
    }

    pub fn active_indices(&self) -> Vec<usize> {
        (0..self.capacity()).filter(|&i| self.active[i]).collect()
    }

    /// Slot index of an object that lives in this pool, from its address.
    ///
    /// Panics if `obj` is not one of this pool's slots.
    pub fn index_of(&self, obj: &T) -> usize {
        let size = std::mem::size_of::<T>().max(1);
        let base = self.objects.as_ptr() as usize;
        let addr = obj as *const T as usize;
        assert!(
            addr >= base && addr < base + self.capacity() * size,
            "object does not belong to the {} pool",
            self.kind
        );
        (addr - base) / size
    }
}
