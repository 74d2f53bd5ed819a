//! Signalling primitives shared by the scope tree and concurrent streams.
//!
//! - [`Notify`]: broadcast wake-up with generation snapshots
//! - [`Deferred`]: write-once value with async readers

mod deferred;
mod notify;

pub use deferred::Deferred;
pub use notify::{Notified, Notify};
