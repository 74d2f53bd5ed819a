//! Two-way race between futures.
//!
//! The interpreter races every effect against its scope's interrupt signal,
//! and `par_join` races channel receives against its stop flag. The left
//! side is polled first on each wake, so a tie goes to the effect. The
//! losing future is dropped where it is suspended; cleanup that must run
//! belongs in a scope finalizer, not in the loser's code.

use futures_lite::future;
use std::future::Future;

/// Which side of a [`race`] completed, with its output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceResult<A, B> {
    /// The left future completed.
    First(A),
    /// The right future completed.
    Second(B),
}

impl<A, B> RaceResult<A, B> {
    /// The left output, if the left side won.
    #[must_use]
    pub fn first(self) -> Option<A> {
        match self {
            Self::First(a) => Some(a),
            Self::Second(_) => None,
        }
    }
}

/// Runs `left` and `right` until one completes, then drops the other.
pub async fn race<A, B>(left: A, right: B) -> RaceResult<A::Output, B::Output>
where
    A: Future,
    B: Future,
{
    let left = async move { RaceResult::First(left.await) };
    let right = async move { RaceResult::Second(right.await) };
    future::or(left, right).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Notify;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts how many futures holding it were dropped.
    struct Released(Arc<AtomicUsize>);

    impl Drop for Released {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn effect_wins_a_tie_with_the_interrupt() {
        let out = future::block_on(race(future::ready("effect"), future::ready("interrupt")));
        assert_eq!(out, RaceResult::First("effect"));
    }

    #[test]
    fn interrupt_preempts_a_hung_effect() {
        let released = Arc::new(AtomicUsize::new(0));
        let held = Released(Arc::clone(&released));
        let hung = async move {
            let _held = held;
            future::pending::<u32>().await
        };
        let signal = Notify::new();
        let interrupted = signal.notified();
        signal.notify_waiters();

        let out = future::block_on(race(hung, interrupted));
        assert_eq!(out.first(), None);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
