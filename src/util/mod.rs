//! Internal utilities.
//!
//! - [`arena`]: generational storage backing the scope tree
//! - `guard`: panic containment around user code

pub mod arena;
pub(crate) mod guard;

pub use arena::{Arena, ArenaIndex};
