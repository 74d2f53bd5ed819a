//! Core value types shared by every layer.
//!
//! - [`id`]: scope and resource identifiers
//! - [`exit_case`]: the outcome tag delivered to finalizers
//! - [`element`]: the bound every stream element and pull result satisfies

pub mod element;
pub mod exit_case;
pub mod id;

pub use element::Element;
pub use exit_case::ExitCase;
pub use id::{ResourceId, ScopeId};
