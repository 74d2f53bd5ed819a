//! Step operations: pulls that consume another pull chunk by chunk.
//!
//! Each operation is built from [`Pull::uncons`], which runs the source up
//! to its next chunk and hands back the chunk together with the rest of the
//! source. Operations that return a "remainder" pull leave the source
//! positioned right after what they consumed.

use super::algebra::{interrupt_boundary, Node, Terminal};
use super::compile::{StepOf, StepOut};
use super::Pull;
use crate::chunk::{Chunk, ChunkQueue};
use crate::types::{Element, ScopeId};
use std::sync::Arc;

/// The next chunk of a pull and the rest of it, or `None` at the end.
pub type Uncons<O> = Option<(Chunk<O>, Pull<O, ()>)>;

/// The next element of a pull and the rest of it, or `None` at the end.
pub type Uncons1<O> = Option<(O, Pull<O, ()>)>;

type Pred<O> = Arc<dyn Fn(&O) -> bool + Send + Sync>;

impl<O: Element> Pull<O, ()> {
    pub(crate) fn step<P: Element>(self, token: Option<ScopeId>) -> Pull<P, Option<StepOut<O>>> {
        Pull::from_node(Node::Instr(StepOf::instr(self.node, token)))
    }

    /// Runs this pull up to its next chunk.
    #[must_use]
    pub fn uncons<P: Element>(self) -> Pull<P, Uncons<O>> {
        self.step(None)
            .map(|step: Option<StepOut<O>>| step.map(|s| (s.head, s.tail)))
    }

    /// Like [`Pull::uncons`], one element at a time. Empty chunks are
    /// skipped.
    #[must_use]
    pub fn uncons1<P: Element>(self) -> Pull<P, Uncons1<O>> {
        self.uncons().flat_map(|step| match step {
            None => Pull::pure(None),
            Some((head, tail)) => match head.first() {
                None => tail.uncons1(),
                Some(first) => Pull::pure(Some((first.clone(), tail.cons(head.tail())))),
            },
        })
    }

    /// Like [`Pull::uncons`], returning at most `n` elements. Ends with
    /// `None` when `n` is zero.
    #[must_use]
    pub fn uncons_limit<P: Element>(self, n: usize) -> Pull<P, Uncons<O>> {
        self.uncons().map(move |step| match step {
            None => None,
            Some(_) if n == 0 => None,
            Some((head, tail)) if head.len() <= n => Some((head, tail)),
            Some((head, tail)) => {
                let (out, rest) = head.split_at(n);
                Some((out, tail.cons(rest)))
            }
        })
    }

    /// Like [`Pull::uncons`], returning exactly `n` elements, splitting or
    /// joining chunks as needed.
    ///
    /// If the source ends early, `allow_fewer` returns what was read;
    /// otherwise the result is `None`.
    #[must_use]
    pub fn uncons_n<P: Element>(self, n: usize, allow_fewer: bool) -> Pull<P, Uncons<O>> {
        if n == 0 {
            return Pull::pure(Some((Chunk::empty(), self)));
        }
        uncons_n_go(ChunkQueue::empty(), n, self, allow_fewer)
    }

    /// Like [`Pull::uncons`], skipping empty chunks.
    #[must_use]
    pub fn uncons_non_empty<P: Element>(self) -> Pull<P, Uncons<O>> {
        self.uncons().flat_map(|step| match step {
            Some((head, tail)) if head.is_empty() => tail.uncons_non_empty(),
            other => Pull::pure(other),
        })
    }

    /// Drops the first `n` elements, then continues with the rest.
    #[must_use]
    pub fn drop(self, n: usize) -> Self {
        drop_go(self, n).flat_map(|rest| rest)
    }

    /// Drops elements while `pred` holds.
    #[must_use]
    pub fn drop_while<F>(self, pred: F) -> Self
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        drop_while_go(self, Arc::new(pred), false).flat_map(|rest| rest)
    }

    /// Like [`Pull::drop_while`], also dropping the first element that fails
    /// `pred`.
    #[must_use]
    pub fn drop_through<F>(self, pred: F) -> Self
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        drop_while_go(self, Arc::new(pred), true).flat_map(|rest| rest)
    }

    /// Outputs the first `n` elements and finishes with the rest.
    #[must_use]
    pub fn take(self, n: usize) -> Pull<O, Self> {
        if n == 0 {
            return Pull::pure(Pull::done());
        }
        self.uncons().flat_map(move |step| match step {
            None => Pull::pure(Pull::done()),
            Some((head, tail)) => {
                let m = head.len();
                if m < n {
                    Pull::output(head).then(tail.take(n - m))
                } else if m == n {
                    Pull::output(head).map(move |()| tail.clone())
                } else {
                    let (out, rest) = head.split_at(n);
                    Pull::output(out).map(move |()| tail.clone().cons(rest.clone()))
                }
            }
        })
    }

    /// Outputs elements while `pred` holds and finishes with the rest.
    #[must_use]
    pub fn take_while<F>(self, pred: F) -> Pull<O, Self>
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        take_while_go(self, Arc::new(pred), false)
    }

    /// Like [`Pull::take_while`], also outputting the first element that
    /// fails `pred`.
    #[must_use]
    pub fn take_through<F>(self, pred: F) -> Pull<O, Self>
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        take_while_go(self, Arc::new(pred), true)
    }

    /// Consumes the whole pull, finishing with its last `n` elements.
    #[must_use]
    pub fn take_last<P: Element>(self, n: usize) -> Pull<P, ChunkQueue<O>> {
        if n == 0 {
            return Pull::pure(ChunkQueue::empty());
        }
        take_last_go(ChunkQueue::empty(), n, self)
    }

    /// Outputs everything this pull outputs.
    #[must_use]
    pub fn echo(self) -> Self {
        self
    }

    /// Outputs one element and finishes with the rest, or `None` at the end.
    #[must_use]
    pub fn echo1(self) -> Pull<O, Option<Self>> {
        self.uncons1().flat_map(|step| match step {
            None => Pull::pure(None),
            Some((head, tail)) => Pull::output1(head).map(move |()| Some(tail.clone())),
        })
    }

    /// Outputs one chunk and finishes with the rest, or `None` at the end.
    #[must_use]
    pub fn echo_chunk(self) -> Pull<O, Option<Self>> {
        self.uncons().flat_map(|step| match step {
            None => Pull::pure(None),
            Some((head, tail)) => Pull::output(head).map(move |()| Some(tail.clone())),
        })
    }

    /// Finds the first element satisfying `pred`, finishing with it and the
    /// rest of the pull.
    #[must_use]
    pub fn first<P, F>(self, pred: F) -> Pull<P, Uncons1<O>>
    where
        P: Element,
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        first_go(self, Arc::new(pred))
    }

    /// Finishes with `true` if every element satisfies `pred`. Stops reading
    /// at the first element that does not.
    #[must_use]
    pub fn forall<P, F>(self, pred: F) -> Pull<P, bool>
    where
        P: Element,
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        forall_go(self, Arc::new(pred))
    }

    /// Like [`Pull::uncons`], pushing the chunk back onto the rest.
    #[must_use]
    pub fn peek<P: Element>(self) -> Pull<P, Uncons<O>> {
        self.uncons().map(|step| step.map(|(head, tail)| (head.clone(), tail.cons(head))))
    }

    /// Like [`Pull::uncons1`], pushing the element back onto the rest.
    #[must_use]
    pub fn peek1<P: Element>(self) -> Pull<P, Uncons1<O>> {
        self.uncons1().map(|step| {
            step.map(|(head, tail)| (head.clone(), tail.cons(Chunk::singleton(head))))
        })
    }

    /// Folds every element, finishing with the result.
    #[must_use]
    pub fn fold<P, B, F>(self, init: B, f: F) -> Pull<P, B>
    where
        P: Element,
        B: Element,
        F: Fn(B, &O) -> B + Send + Sync + 'static,
    {
        fold_go(self, init, Arc::new(f))
    }

    /// Folds every element using the first as the initial value. Finishes
    /// with `None` for an empty pull.
    #[must_use]
    pub fn fold1<P, F>(self, f: F) -> Pull<P, Option<O>>
    where
        P: Element,
        F: Fn(O, &O) -> O + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.uncons1().flat_map(move |step| match step {
            None => Pull::pure(None),
            Some((head, tail)) => {
                let f = Arc::clone(&f);
                tail.fold(head, move |acc, o| f(acc, o)).map(Some)
            }
        })
    }

    /// Finishes with the last element, if any.
    #[must_use]
    pub fn last<P: Element>(self) -> Pull<P, Option<O>> {
        self.fold(None, |_, o: &O| Some(o.clone()))
    }

    /// Maps each chunk with a state, outputting the mapped chunks and
    /// finishing with the final state.
    #[must_use]
    pub fn scan_chunks<S, O2, F>(self, init: S, f: F) -> Pull<O2, S>
    where
        S: Element,
        O2: Element,
        F: Fn(S, &Chunk<O>) -> (S, Chunk<O2>) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.scan_chunks_opt(init, move |s| {
            let f = Arc::clone(&f);
            Some(Arc::new(move |c: &Chunk<O>| f(s.clone(), c)) as ChunkStep<O, S, O2>)
        })
    }

    /// Like [`Pull::scan_chunks`], letting the state decide whether to read
    /// another chunk: `f` returns `None` to stop.
    #[must_use]
    pub fn scan_chunks_opt<S, O2, F>(self, init: S, f: F) -> Pull<O2, S>
    where
        S: Element,
        O2: Element,
        F: Fn(S) -> Option<ChunkStep<O, S, O2>> + Send + Sync + 'static,
    {
        scan_chunks_go(init, self, Arc::new(f))
    }

    /// Repeatedly runs `using` on the remainder it returns, until it
    /// finishes with `None`.
    #[must_use]
    pub fn repeat<B, F>(self, using: F) -> Pull<B, ()>
    where
        B: Element,
        F: Fn(Self) -> Pull<B, Option<Self>> + Send + Sync + 'static,
    {
        Pull::repeat_pull(self, using).void()
    }

    /// Runs `f` on every output element and concatenates the resulting
    /// pulls.
    #[must_use]
    pub fn flat_map_output<O2, F>(self, f: F) -> Pull<O2, ()>
    where
        O2: Element,
        F: Fn(O) -> Pull<O2, ()> + Send + Sync + 'static,
    {
        flat_map_output_go(self, Arc::new(f))
    }
}

/// A chunk transition of [`Pull::scan_chunks_opt`].
pub type ChunkStep<O, S, O2> = Arc<dyn Fn(&Chunk<O>) -> (S, Chunk<O2>) + Send + Sync>;

fn uncons_n_go<O: Element, P: Element>(
    acc: ChunkQueue<O>,
    n: usize,
    pull: Pull<O, ()>,
    allow_fewer: bool,
) -> Pull<P, Uncons<O>> {
    pull.uncons().flat_map(move |step| match step {
        None => {
            if allow_fewer && !acc.is_empty() {
                Pull::pure(Some((acc.to_chunk(), Pull::done())))
            } else {
                Pull::pure(None)
            }
        }
        Some((head, tail)) => {
            let m = head.len();
            if m < n {
                uncons_n_go(acc.clone().enqueue(head), n - m, tail, allow_fewer)
            } else if m == n {
                Pull::pure(Some((acc.clone().enqueue(head).to_chunk(), tail)))
            } else {
                let (prefix, suffix) = head.split_at(n);
                Pull::pure(Some((acc.clone().enqueue(prefix).to_chunk(), tail.cons(suffix))))
            }
        }
    })
}

fn drop_go<O: Element>(pull: Pull<O, ()>, n: usize) -> Pull<O, Pull<O, ()>> {
    if n == 0 {
        return Pull::pure(pull);
    }
    pull.uncons().flat_map(move |step| match step {
        None => Pull::pure(Pull::done()),
        Some((head, tail)) => {
            let m = head.len();
            if m < n {
                drop_go(tail, n - m)
            } else if m == n {
                Pull::pure(tail)
            } else {
                Pull::pure(tail.cons(head.drop(n)))
            }
        }
    })
}

fn drop_while_go<O: Element>(
    pull: Pull<O, ()>,
    pred: Pred<O>,
    drop_failure: bool,
) -> Pull<O, Pull<O, ()>> {
    pull.uncons().flat_map(move |step| match step {
        None => Pull::pure(Pull::done()),
        Some((head, tail)) => match head.index_of_first(|o| !pred(o)) {
            Some(idx) => {
                let to_drop = if drop_failure { idx + 1 } else { idx };
                Pull::pure(tail.cons(head.drop(to_drop)))
            }
            None => drop_while_go(tail, Arc::clone(&pred), drop_failure),
        },
    })
}

fn take_while_go<O: Element>(
    pull: Pull<O, ()>,
    pred: Pred<O>,
    take_failure: bool,
) -> Pull<O, Pull<O, ()>> {
    pull.uncons().flat_map(move |step| match step {
        None => Pull::pure(Pull::done()),
        Some((head, tail)) => match head.index_of_first(|o| !pred(o)) {
            Some(idx) => {
                let to_take = if take_failure { idx + 1 } else { idx };
                let (prefix, suffix) = head.split_at(to_take);
                Pull::output(prefix).map(move |()| tail.clone().cons(suffix.clone()))
            }
            None => Pull::output(head).then(take_while_go(tail, Arc::clone(&pred), take_failure)),
        },
    })
}

fn take_last_go<O: Element, P: Element>(
    acc: ChunkQueue<O>,
    n: usize,
    pull: Pull<O, ()>,
) -> Pull<P, ChunkQueue<O>> {
    pull.uncons_n(n, true).flat_map(move |step| match step {
        None => Pull::pure(acc.clone()),
        Some((head, tail)) => {
            let kept = acc.clone().drop(head.len()).enqueue(head);
            take_last_go(kept, n, tail)
        }
    })
}

fn first_go<O: Element, P: Element>(pull: Pull<O, ()>, pred: Pred<O>) -> Pull<P, Uncons1<O>> {
    pull.uncons().flat_map(move |step| match step {
        None => Pull::pure(None),
        Some((head, tail)) => match head.index_of_first(|o| pred(o)) {
            None => first_go(tail, Arc::clone(&pred)),
            Some(idx) => {
                let found = head.as_slice()[idx].clone();
                Pull::pure(Some((found, tail.cons(head.drop(idx + 1)))))
            }
        },
    })
}

fn forall_go<O: Element, P: Element>(pull: Pull<O, ()>, pred: Pred<O>) -> Pull<P, bool> {
    pull.uncons().flat_map(move |step| match step {
        None => Pull::pure(true),
        Some((head, tail)) => {
            if head.all(|o| pred(o)) {
                forall_go(tail, Arc::clone(&pred))
            } else {
                Pull::pure(false)
            }
        }
    })
}

type FoldFn<B, O> = Arc<dyn Fn(B, &O) -> B + Send + Sync>;

fn fold_go<O: Element, P: Element, B: Element>(
    pull: Pull<O, ()>,
    init: B,
    f: FoldFn<B, O>,
) -> Pull<P, B> {
    pull.uncons().flat_map(move |step| match step {
        None => Pull::pure(init.clone()),
        Some((head, tail)) => {
            let acc = head.fold(init.clone(), |acc, o| f(acc, o));
            fold_go(tail, acc, Arc::clone(&f))
        }
    })
}

type ScanFn<O, S, O2> = Arc<dyn Fn(S) -> Option<ChunkStep<O, S, O2>> + Send + Sync>;

fn scan_chunks_go<O: Element, S: Element, O2: Element>(
    acc: S,
    pull: Pull<O, ()>,
    f: ScanFn<O, S, O2>,
) -> Pull<O2, S> {
    Pull::defer(move || {
        let Some(next) = f(acc.clone()) else {
            return Pull::pure(acc.clone());
        };
        let f = Arc::clone(&f);
        let acc = acc.clone();
        pull.clone().uncons().flat_map(move |step| match step {
            None => Pull::pure(acc.clone()),
            Some((head, tail)) => {
                let (state, out) = next(&head);
                Pull::output(out).then(scan_chunks_go(state, tail, Arc::clone(&f)))
            }
        })
    })
}

type OutputFn<O, O2> = Arc<dyn Fn(O) -> Pull<O2, ()> + Send + Sync>;

fn flat_map_output_go<O: Element, O2: Element>(
    pull: Pull<O, ()>,
    f: OutputFn<O, O2>,
) -> Pull<O2, ()> {
    pull.uncons().flat_map(move |step| match step {
        None => Pull::done(),
        Some((head, tail)) => {
            if head.len() == 1 && matches!(tail.node, Node::Result(Terminal::Pure(_))) {
                if let Some(only) = head.first() {
                    return f(only.clone());
                }
            }
            flat_map_chunk(head, 0, tail, Arc::clone(&f))
        }
    })
}

fn flat_map_chunk<O: Element, O2: Element>(
    head: Chunk<O>,
    idx: usize,
    tail: Pull<O, ()>,
    f: OutputFn<O, O2>,
) -> Pull<O2, ()> {
    let Some(o) = head.get(idx).cloned() else {
        return flat_map_output_go(tail, f);
    };
    let inner = f(o);
    inner.transform_with(move |t| match t {
        Terminal::Pure(_) => flat_map_chunk(head.clone(), idx + 1, tail.clone(), Arc::clone(&f)),
        Terminal::Fail(e) => Pull::raise_error(e),
        Terminal::Interrupted { scope, deferred } => {
            let rest = interrupt_boundary(tail.node.clone(), scope, deferred);
            flat_map_output_go(Pull::from_node(rest), Arc::clone(&f))
        }
    })
}
