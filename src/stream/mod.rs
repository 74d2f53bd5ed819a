//! Lazy, resource-safe streams of chunked values.
//!
//! A [`Stream<O>`] describes a sequence of `O` values produced by effects. It
//! runs nothing until compiled against an [`Executor`](crate::Executor):
//!
//! ```ignore
//! use fxstream::{Executor, Stream};
//!
//! async fn example(executor: &Executor) -> fxstream::Result<()> {
//!     let evens = Stream::range(0..10)
//!         .filter(|n| n % 2 == 0)
//!         .map(|n| n * 10)
//!         .to_list(executor)
//!         .await?;
//!     assert_eq!(evens, vec![0, 20, 40, 60, 80]);
//!     Ok(())
//! }
//! ```
//!
//! # Operations
//!
//! - Sources, effects and brackets: [`Stream::just`], [`Stream::effect`],
//!   [`Stream::unfold`], [`Stream::bracket`]
//! - Transformations: [`Stream::map`], [`Stream::flat_map`],
//!   [`Stream::take`], [`Stream::zip`], [`Stream::buffer`]
//! - Interruption: [`Stream::interrupt_when`], [`Stream::interrupt_after`]
//! - Concurrency: [`Stream::concurrently`], [`Stream::par_join`],
//!   [`Stream::merge`]
//! - Terminal operations: [`Compiled`]
//!
//! # Construction
//!
//! Values are carried in [`Chunk`](crate::Chunk)s. Constructors such as
//! [`Stream::emits`] produce one chunk; [`Stream::range`] and
//! [`Stream::iterable`] use the executor's `default_chunk_size`.
//!
//! # Resources
//!
//! [`Stream::bracket`] ties a resource to the scope of the stream that uses
//! it. The release runs exactly once, after everything downstream of the
//! bracket that runs in that scope, and sees how the scope ended.

mod concurrent;
mod construct;
mod interrupt;
mod terminal;
mod transform;

pub use terminal::Compiled;

use crate::pull::Pull;
use crate::types::Element;
use core::fmt;

/// A lazy sequence of `O` values produced by effects.
///
/// Cloning a stream clones the description; each compilation runs its
/// effects afresh.
pub struct Stream<O> {
    pub(crate) pull: Pull<O, ()>,
}

impl<O: Clone> Clone for Stream<O> {
    fn clone(&self) -> Self {
        Self {
            pull: self.pull.clone(),
        }
    }
}

impl<O> fmt::Debug for Stream<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Stream(..)")
    }
}

impl<O: Element> Stream<O> {
    /// Wraps a pull without introducing a scope.
    pub(crate) const fn from_pull(pull: Pull<O, ()>) -> Self {
        Self { pull }
    }

    /// The pull this stream is built from, for writing custom step-wise
    /// transformations.
    #[must_use]
    pub fn to_pull(self) -> Pull<O, ()> {
        self.pull
    }

    /// Runs this stream in its own scope. Resources acquired inside are
    /// released as soon as the stream ends, not when the enclosing stream
    /// does.
    #[must_use]
    pub fn scope(self) -> Self {
        Self::from_pull(self.pull.scope())
    }

    /// Like [`Stream::scope`], making the new scope interruptible.
    ///
    /// Interrupting it stops this stream at its next suspension point; the
    /// enclosing stream then continues after it.
    #[must_use]
    pub fn interrupt_scope(self) -> Self {
        Self::from_pull(self.pull.interrupt_scope())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, test_executor};

    #[tokio::test]
    async fn to_pull_round_trips_through_stream() {
        init_test_logging();
        let executor = test_executor();
        let pull = Stream::emits(vec![1, 2, 3]).to_pull();
        let out = pull.take(2).void().stream().to_list(&executor).await.unwrap();
        assert_eq!(out, vec![1, 2]);
    }

    #[tokio::test]
    async fn streams_are_rerunnable_descriptions() {
        init_test_logging();
        let executor = test_executor();
        let s = Stream::range(0..4).map(|n| n + 1);
        assert_eq!(s.clone().to_list(&executor).await.unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(s.to_list(&executor).await.unwrap(), vec![1, 2, 3, 4]);
    }
}
