//! Generational slot storage for scope records.
//!
//! Every open scope of a compiled stream occupies one slot; a
//! [`ScopeId`](crate::types::ScopeId) is the slot number plus the slot's
//! generation at insertion. Removing a value bumps the generation, so an id
//! that outlives its scope looks up as absent instead of finding whichever
//! scope reuses the slot.

use core::fmt;

/// A slot number paired with the generation it was issued under.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaIndex {
    slot: usize,
    generation: u32,
}

impl ArenaIndex {
    /// Builds an index by hand; lookups with it only succeed if it matches
    /// a live slot.
    #[must_use]
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self {
            slot: slot as usize,
            generation,
        }
    }

    /// The slot number.
    #[must_use]
    pub const fn index(self) -> usize {
        self.slot
    }

    /// The generation the index was issued under.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaIndex({}:{})", self.slot, self.generation)
    }
}

#[derive(Debug)]
struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Values addressed by [`ArenaIndex`], with freed slots reused.
#[derive(Debug)]
pub struct Arena<T> {
    entries: Vec<Entry<T>>,
    /// Vacant slots, most recently freed last.
    vacant: Vec<usize>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    /// An arena with no slots.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            vacant: Vec::new(),
        }
    }

    /// Number of live values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() - self.vacant.len()
    }

    /// True when no value is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores the value `make` builds from the index it will live at, so a
    /// record can carry its own id.
    pub fn insert_with<F>(&mut self, make: F) -> ArenaIndex
    where
        F: FnOnce(ArenaIndex) -> T,
    {
        let slot = match self.vacant.pop() {
            Some(slot) => slot,
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    value: None,
                });
                self.entries.len() - 1
            }
        };
        let entry = &mut self.entries[slot];
        let index = ArenaIndex {
            slot,
            generation: entry.generation,
        };
        entry.value = Some(make(index));
        index
    }

    /// Stores `value`.
    pub fn insert(&mut self, value: T) -> ArenaIndex {
        self.insert_with(|_| value)
    }

    /// Takes the value out, retiring `index`. `None` for a stale index.
    pub fn remove(&mut self, index: ArenaIndex) -> Option<T> {
        let entry = self.live_entry_mut(index)?;
        let value = entry.value.take();
        entry.generation = entry.generation.wrapping_add(1);
        self.vacant.push(index.slot);
        value
    }

    /// The value at `index`, unless it was removed.
    #[must_use]
    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        self.entries
            .get(index.slot)
            .filter(|e| e.generation == index.generation)
            .and_then(|e| e.value.as_ref())
    }

    /// Mutable access to the value at `index`, unless it was removed.
    pub fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        self.live_entry_mut(index).and_then(|e| e.value.as_mut())
    }

    /// True if `index` refers to a live value.
    #[must_use]
    pub fn contains(&self, index: ArenaIndex) -> bool {
        self.get(index).is_some()
    }

    fn live_entry_mut(&mut self, index: ArenaIndex) -> Option<&mut Entry<T>> {
        self.entries
            .get_mut(index.slot)
            .filter(|e| e.generation == index.generation && e.value.is_some())
    }
}
