//! fxstream: resource-safe, interruptible, chunked effect streams.
//!
//! # Overview
//!
//! A [`Stream`] is a lazy description of a sequence of values produced by
//! asynchronous effects. Streams compile to [`Pull`]s, a free-monad algebra
//! that a trampolined interpreter steps against a tree of [`Scope`]s. Scopes
//! own the resources a stream acquires and release them, last acquired
//! first, when the part of the stream that opened them ends.
//!
//! # Core Guarantees
//!
//! - **Resource safety**: every successful acquisition is released exactly
//!   once, whether the stream completes, fails, or is interrupted
//! - **Ordered finalization**: a scope's resources are released after its
//!   child scopes are closed, newest first
//! - **Interruption**: interrupting a scope stops its stream at the next
//!   suspension point and runs its finalizers with [`ExitCase::Cancelled`]
//! - **Stack safety**: left- and right-nested binds and long appends run in
//!   constant stack
//! - **Structured concurrency**: concurrent legs run as forked
//!   interpretations that follow their parent's interruption, and a
//!   combinator does not finish before every leg it started has unwound
//!
//! # Module Structure
//!
//! - [`chunk`]: immutable chunks of values and chunk queues
//! - [`pull`]: the pull algebra and its interpreter
//! - [`scope`]: the scope tree, resources and interruption
//! - [`stream`]: the stream API
//! - [`runtime`]: executor, dispatcher and configuration
//! - [`sync`]: one-shot cells and wakeup notification
//! - [`combinator`]: effect-level combinators
//! - [`types`]: identifiers, exit cases and the element bound
//! - [`error`]: error types
//! - [`util`]: internal utilities (arena)
//! - [`tracing_compat`]: logging facade over `tracing`
//!
//! # Example
//!
//! ```ignore
//! use fxstream::{Executor, Stream};
//!
//! #[tokio::main]
//! async fn main() -> fxstream::Result<()> {
//!     let executor = Executor::current()?;
//!     let out = Stream::bracket(|| async { Ok("conn") }, |_| async { Ok(()) })
//!         .flat_map(|conn| Stream::emits(vec![conn; 3]))
//!         .zip_with_index()
//!         .to_list(&executor)
//!         .await?;
//!     assert_eq!(out.len(), 3);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::type_complexity)]

pub mod chunk;
pub mod combinator;
pub mod error;
pub mod pull;
pub mod runtime;
pub mod scope;
pub mod stream;
pub mod sync;
pub mod tracing_compat;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod test_utils;

pub use chunk::{Chunk, ChunkQueue};
pub use error::{Error, ErrorCategory, ErrorKind, Result, ResultExt};
pub use pull::{Pull, StepLeg, Uncons, Uncons1};
pub use runtime::{ConfigError, Dispatcher, Executor, ExecutorBuilder, StreamConfig, TokioDispatcher};
pub use scope::{InterruptCause, Lease, Scope, ScopeKind};
pub use stream::{Compiled, Stream};
pub use types::{Element, ExitCase, ResourceId, ScopeId};
