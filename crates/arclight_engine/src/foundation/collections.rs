//! Handle arenas and free-list collections
//!
//! Every long-lived engine object (transform node, drawable, light) is
//! referenced through a generation-tagged handle rather than a raw index.
//! A handle is valid only while its generation matches the slot's current
//! generation, so stale handle use is a detectable failure instead of
//! silent aliasing of a recycled slot.

use std::marker::PhantomData;

pub use slotmap::{DefaultKey, SlotMap};

/// Handle-based map using slot map for stable references
pub type HandleMap<T> = SlotMap<DefaultKey, T>;

/// Generation-tagged handle into a [`HandleArena`]
///
/// The phantom type parameter prevents mixing handles between arenas of
/// different element types at compile time.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Sentinel index denoting "no resource"
    const INVALID_INDEX: u32 = u32::MAX;

    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// The invalid sentinel handle
    pub fn invalid() -> Self {
        Self::new(Self::INVALID_INDEX, 0)
    }

    /// Whether this handle is the invalid sentinel
    pub fn is_valid(&self) -> bool {
        self.index != Self::INVALID_INDEX
    }

    /// Slot index of this handle
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation tag of this handle
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({}:{})", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Free-list backed arena with generation-tagged handles
///
/// Slots are recycled LIFO: the most recently freed index is the first to
/// be reused. Each release bumps the slot generation, invalidating any
/// outstanding handles to the old occupant.
pub struct HandleArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    max_slots: Option<usize>,
    live: usize,
}

impl<T> HandleArena<T> {
    /// Create a growable arena
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            max_slots: None,
            live: 0,
        }
    }

    /// Create an arena that refuses to grow beyond `max_slots` live slots
    pub fn with_max_slots(max_slots: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            max_slots: Some(max_slots),
            live: 0,
        }
    }

    /// Insert a value, reusing a freed slot when one is available
    ///
    /// Returns `None` when the arena has a slot limit and it is exhausted.
    pub fn insert(&mut self, value: T) -> Option<Handle<T>> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            self.live += 1;
            return Some(Handle::new(index, slot.generation));
        }

        if let Some(max) = self.max_slots {
            if self.slots.len() >= max {
                return None;
            }
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        self.live += 1;
        Some(Handle::new(index, 0))
    }

    /// Fetch a value, failing on stale or out-of-range handles
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Fetch a value mutably, failing on stale or out-of-range handles
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Whether the handle currently resolves to a live value
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Release a slot, bumping its generation and free-listing the index
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(value)
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.live
    }

    /// Total slots ever allocated (live + free-listed)
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether the arena holds no live values
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate over live (handle, value) pairs in slot order
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.value
                .as_ref()
                .map(|v| (Handle::new(i as u32, slot.generation), v))
        })
    }

    /// Iterate over live (handle, value) pairs mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(move |v| (Handle::new(i as u32, generation), v))
        })
    }
}

impl<T> Default for HandleArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
