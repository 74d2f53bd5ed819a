//! Scope and resource identifiers.
//!
//! A [`ScopeId`] is the scope's slot in its tree's arena together with the
//! slot generation, so an id kept past its scope's close never names a
//! later scope. A [`ResourceId`] is drawn from a process-wide counter and
//! only shows up in logs.

use crate::util::ArenaIndex;
use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Names one scope of one compiled stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(ArenaIndex);

impl ScopeId {
    pub(crate) const fn from_arena(index: ArenaIndex) -> Self {
        Self(index)
    }

    pub(crate) const fn arena_index(self) -> ArenaIndex {
        self.0
    }

    /// An id with the given slot and generation, for tests that need an
    /// id without a tree.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(slot: u32, generation: u32) -> Self {
        Self(ArenaIndex::new(slot, generation))
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopeId")
            .field(&self.0.index())
            .field(&self.0.generation())
            .finish()
    }
}

/// `S<slot>`; the generation only shows in `Debug`.
impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0.index())
    }
}

/// Names one acquired resource in log output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// A value no earlier call returned.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_slot() {
        assert_eq!(ScopeId::new_for_test(7, 0).to_string(), "S7");
        assert_eq!(ScopeId::new_for_test(7, 3).to_string(), "S7");
        assert_eq!(format!("{:?}", ScopeId::new_for_test(7, 3)), "ScopeId(7, 3)");
    }

    #[test]
    fn reused_slot_gets_a_distinct_id() {
        let mut arena = crate::util::Arena::new();
        let first = ScopeId::from_arena(arena.insert(()));
        arena.remove(first.arena_index());
        let second = ScopeId::from_arena(arena.insert(()));
        assert_eq!(first.arena_index().index(), second.arena_index().index());
        assert_ne!(first, second);
    }

    #[test]
    fn resource_ids_never_repeat() {
        let ids: Vec<_> = (0..64).map(|_| ResourceId::next()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
}
