//! Future combinators used by the interpreter.
//!
//! - [`race`]: poll two futures, first wins, loser dropped

pub mod race;

pub use race::{race, RaceResult};
