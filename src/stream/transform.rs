//! Element and chunk transformations.

use super::construct::sleep_pull;
use super::Stream;
use crate::chunk::{Chunk, ChunkQueue};
use crate::error::{Error, Result};
use crate::pull::{Pull, StepLeg};
use crate::types::{Element, ExitCase};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

impl<O: Element> Stream<O> {
    /// Maps every element.
    #[must_use]
    pub fn map<O2, F>(self, f: F) -> Stream<O2>
    where
        O2: Element,
        F: Fn(&O) -> O2 + Send + Sync + 'static,
    {
        Stream::from_pull(self.pull.map_output(f))
    }

    /// Maps every chunk.
    #[must_use]
    pub fn map_chunks<O2, F>(self, f: F) -> Stream<O2>
    where
        O2: Element,
        F: Fn(&Chunk<O>) -> Chunk<O2> + Send + Sync + 'static,
    {
        Stream::from_pull(self.pull.scan_chunks((), move |(), c| ((), f(c))).void())
    }

    /// Emits each chunk as a single element.
    #[must_use]
    pub fn chunks(self) -> Stream<Chunk<O>> {
        self.map_chunks(|c| Chunk::singleton(c.clone()))
    }

    /// Splits every chunk into chunks of one element.
    #[must_use]
    pub fn unchunk(self) -> Self {
        Self::from_pull(self.pull.flat_map_output(Pull::output1))
    }

    /// Maps every element through an effect, in order.
    #[must_use]
    pub fn effect_map<O2, F, Fut>(self, f: F) -> Stream<O2>
    where
        O2: Element,
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O2>> + Send + 'static,
    {
        let f = Arc::new(f);
        Stream::from_pull(self.pull.flat_map_output(move |o| {
            let f = Arc::clone(&f);
            Pull::eval(move || f(o.clone())).flat_map(Pull::output1)
        }))
    }

    /// Runs an effect for every element, passing the element through.
    #[must_use]
    pub fn effect_tap<F, Fut>(self, f: F) -> Self
    where
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let f = Arc::new(f);
        Self::from_pull(self.pull.flat_map_output(move |o| {
            let f = Arc::clone(&f);
            let input = o.clone();
            Pull::eval(move || f(input.clone())).then(Pull::output1(o))
        }))
    }

    /// Keeps the elements that satisfy `pred`.
    #[must_use]
    pub fn filter<F>(self, pred: F) -> Self
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        self.map_chunks(move |c| c.filter(&pred))
    }

    /// Maps elements, keeping the `Some` results.
    #[must_use]
    pub fn filter_map<O2, F>(self, f: F) -> Stream<O2>
    where
        O2: Element,
        F: Fn(&O) -> Option<O2> + Send + Sync + 'static,
    {
        self.map_chunks(move |c| c.iter().filter_map(&f).collect())
    }

    /// Runs `f` for every element and concatenates the resulting streams.
    #[must_use]
    pub fn flat_map<O2, F>(self, f: F) -> Stream<O2>
    where
        O2: Element,
        F: Fn(O) -> Stream<O2> + Send + Sync + 'static,
    {
        Stream::from_pull(self.pull.flat_map_output(move |o| f(o).pull))
    }

    /// This stream followed by `next`.
    #[must_use]
    pub fn append(self, next: Self) -> Self {
        Self::from_pull(self.pull.then(next.pull))
    }

    /// This stream, repeated forever.
    #[must_use]
    pub fn repeat(self) -> Self {
        Self::from_pull(repeat_go(self.pull))
    }

    /// This stream, repeated `n` times.
    #[must_use]
    pub fn repeat_n(self, n: usize) -> Self {
        Self::from_pull(repeat_n_go(self.pull, n))
    }

    /// The first `n` elements. The rest of the stream is never run.
    #[must_use]
    pub fn take(self, n: usize) -> Self {
        Self::from_pull(self.pull.take(n).void())
    }

    /// Elements up to the first one failing `pred`.
    #[must_use]
    pub fn take_while<F>(self, pred: F) -> Self
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        Self::from_pull(self.pull.take_while(pred).void())
    }

    /// Like [`Stream::take_while`], also emitting the element that failed.
    #[must_use]
    pub fn take_through<F>(self, pred: F) -> Self
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        Self::from_pull(self.pull.take_through(pred).void())
    }

    /// The last `n` elements, emitted once the stream has ended.
    #[must_use]
    pub fn take_last(self, n: usize) -> Self {
        Self::from_pull(
            self.pull
                .take_last(n)
                .flat_map(|window: ChunkQueue<O>| Pull::done().cons(window.to_chunk())),
        )
    }

    /// All but the first `n` elements.
    #[must_use]
    pub fn drop(self, n: usize) -> Self {
        Self::from_pull(self.pull.drop(n))
    }

    /// Drops elements while `pred` holds.
    #[must_use]
    pub fn drop_while<F>(self, pred: F) -> Self
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        Self::from_pull(self.pull.drop_while(pred))
    }

    /// Like [`Stream::drop_while`], also dropping the element that failed.
    #[must_use]
    pub fn drop_through<F>(self, pred: F) -> Self
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        Self::from_pull(self.pull.drop_through(pred))
    }

    /// All but the last `n` elements. Holds back at most `n` elements.
    #[must_use]
    pub fn drop_last(self, n: usize) -> Self {
        if n == 0 {
            return self;
        }
        let pull = self.pull.scan_chunks(ChunkQueue::empty(), move |held, c| {
            let held = held.enqueue(c.clone());
            let excess = held.size().saturating_sub(n);
            let out = held.clone().take(excess).to_chunk();
            (held.drop(excess), out)
        });
        Self::from_pull(pull.void())
    }

    /// All but the first element.
    #[must_use]
    pub fn tail(self) -> Self {
        self.drop(1)
    }

    /// Splits chunks larger than `n`. Chunks are never joined.
    #[must_use]
    pub fn chunk_limit(self, n: usize) -> Self {
        let n = n.max(1);
        Self::from_pull(self.pull.repeat(move |p| {
            p.uncons_limit(n).flat_map(|step| match step {
                None => Pull::pure(None),
                Some((head, tail)) => Pull::output(head).map(move |()| Some(tail.clone())),
            })
        }))
    }

    /// Joins chunks until each has at least `n` elements. A shorter last
    /// chunk is emitted if `allow_fewer` is set and dropped otherwise.
    #[must_use]
    pub fn chunk_min(self, n: usize, allow_fewer: bool) -> Self {
        Self::from_pull(chunk_min_go(ChunkQueue::empty(), self.pull, n, allow_fewer))
    }

    /// Regroups elements into chunks of exactly `n`, except possibly the
    /// last.
    #[must_use]
    pub fn buffer(self, n: usize) -> Self {
        if n == 0 {
            return self;
        }
        Self::from_pull(self.pull.repeat(move |p| {
            p.uncons_n(n, true).flat_map(|step| match step {
                None => Pull::pure(None),
                Some((head, tail)) => Pull::output(head).map(move |()| Some(tail.clone())),
            })
        }))
    }

    /// Reads the whole stream, then emits it as one chunk.
    #[must_use]
    pub fn buffer_all(self) -> Self {
        Self::from_pull(buffer_all_go(ChunkQueue::empty(), self.pull))
    }

    /// Emits `init` and then every intermediate state of a left fold.
    #[must_use]
    pub fn scan<S, F>(self, init: S, f: F) -> Stream<S>
    where
        S: Element,
        F: Fn(&S, &O) -> S + Send + Sync + 'static,
    {
        let first = Pull::output1(init.clone());
        let rest = self.pull.scan_chunks(init, move |s, c| {
            c.map_accumulate(s, |acc, o| {
                let next = f(&acc, o);
                (next.clone(), next)
            })
        });
        Stream::from_pull(first.then(rest.void()))
    }

    /// Maps chunks with a state threaded between them.
    #[must_use]
    pub fn scan_chunks<S, O2, F>(self, init: S, f: F) -> Stream<O2>
    where
        S: Element,
        O2: Element,
        F: Fn(S, &Chunk<O>) -> (S, Chunk<O2>) + Send + Sync + 'static,
    {
        Stream::from_pull(self.pull.scan_chunks(init, f).void())
    }

    /// Emits the result of folding every element.
    #[must_use]
    pub fn fold<B, F>(self, init: B, f: F) -> Stream<B>
    where
        B: Element,
        F: Fn(B, &O) -> B + Send + Sync + 'static,
    {
        Stream::from_pull(self.pull.fold(init, f).flat_map(Pull::output1))
    }

    /// Emits the last element, or `None` for an empty stream.
    #[must_use]
    pub fn last(self) -> Stream<Option<O>> {
        Stream::from_pull(self.pull.last().flat_map(Pull::output1))
    }

    /// Pairs elements positionally. Ends with the shorter stream.
    #[must_use]
    pub fn zip<O2: Element>(self, that: Stream<O2>) -> Stream<(O, O2)> {
        self.zip_with(that, |a, b| (a.clone(), b.clone()))
    }

    /// Combines elements positionally with `f`. Ends with the shorter
    /// stream; the rest of the longer one is never run.
    #[must_use]
    pub fn zip_with<O2, O3, F>(self, that: Stream<O2>, f: F) -> Stream<O3>
    where
        O2: Element,
        O3: Element,
        F: Fn(&O, &O2) -> O3 + Send + Sync + 'static,
    {
        let f: ZipFn<O, O2, O3> = Arc::new(f);
        let right = that.pull;
        let pull = self.pull.step_leg().flat_map(move |left| {
            let f = Arc::clone(&f);
            right.clone().step_leg().flat_map(move |right| match (left.clone(), right) {
                (Some(left), Some(right)) => zip_go(left, right, Arc::clone(&f)),
                _ => Pull::done(),
            })
        });
        Stream::from_pull(pull)
    }

    /// Pairs every element with its index.
    #[must_use]
    pub fn zip_with_index(self) -> Stream<(O, usize)> {
        self.scan_chunks(0_usize, |start, c| {
            c.map_accumulate(start, |i, o| (i + 1, (o.clone(), i)))
        })
    }

    /// Emits `separator` between consecutive elements.
    #[must_use]
    pub fn intersperse(self, separator: O) -> Self {
        let pull = self.pull.uncons1().flat_map(move |step| match step {
            None => Pull::done(),
            Some((head, tail)) => {
                let separator = separator.clone();
                let rest = tail.scan_chunks((), move |(), c| {
                    let spaced = c.flat_map(|o| Chunk::from_vec(vec![separator.clone(), o.clone()]));
                    ((), spaced)
                });
                Pull::output1(head).then(rest.void())
            }
        });
        Self::from_pull(pull)
    }

    /// Recovers from a failure of this stream with the stream `f` returns.
    ///
    /// Resources acquired by this stream are released before `f` runs.
    #[must_use]
    pub fn handle_error_with<F>(self, f: F) -> Self
    where
        F: Fn(Error) -> Self + Send + Sync + 'static,
    {
        Self::from_pull(self.pull.scope().handle_error_with(move |e| f(e).pull))
    }

    /// Emits `Ok` for every element, and `Err` in place of a failure.
    #[must_use]
    pub fn attempt(self) -> Stream<Result<O>> {
        self.map(|o| Ok(o.clone()))
            .handle_error_with(|e| Stream::just(Err(e)))
    }

    /// Applies a stream transformation.
    #[must_use]
    pub fn through<O2, F>(self, pipe: F) -> Stream<O2>
    where
        O2: Element,
        F: FnOnce(Self) -> Stream<O2>,
    {
        pipe(self)
    }

    /// Runs the stream for its effects, emitting nothing.
    #[must_use]
    pub fn drain(self) -> Self {
        Self::from_pull(self.pull.repeat(|p| p.uncons().map(|step| step.map(|(_, tail)| tail))))
    }

    /// Starts the stream after `duration`.
    #[must_use]
    pub fn delay_by(self, duration: Duration) -> Self {
        Self::from_pull(sleep_pull(duration).then(self.pull))
    }

    /// Runs `f` once the stream ends, however it ends.
    #[must_use]
    pub fn on_finalize<F, Fut>(self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_finalize_case(move |_| f())
    }

    /// Like [`Stream::on_finalize`], handing `f` the way the stream ended.
    #[must_use]
    pub fn on_finalize_case<F, Fut>(self, f: F) -> Self
    where
        F: Fn(ExitCase) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let guard = Pull::<O, ()>::acquire_case(|| async { Ok(()) }, move |(), exit| f(exit));
        Self::from_pull(guard.then(self.pull).scope())
    }
}

impl<O: Element> Stream<Option<O>> {
    /// Keeps the `Some` values.
    #[must_use]
    pub fn filter_option(self) -> Stream<O> {
        self.filter_map(Clone::clone)
    }
}

impl<O: Element> Stream<Stream<O>> {
    /// Concatenates the inner streams, one after another.
    #[must_use]
    pub fn flatten(self) -> Stream<O> {
        self.flat_map(|inner| inner)
    }
}

fn repeat_go<O: Element>(pull: Pull<O, ()>) -> Pull<O, ()> {
    let again = pull.clone();
    pull.then(Pull::defer(move || repeat_go(again.clone())))
}

fn repeat_n_go<O: Element>(pull: Pull<O, ()>, n: usize) -> Pull<O, ()> {
    match n {
        0 => Pull::done(),
        1 => pull,
        _ => {
            let again = pull.clone();
            pull.then(Pull::defer(move || repeat_n_go(again.clone(), n - 1)))
        }
    }
}

fn chunk_min_go<O: Element>(
    acc: ChunkQueue<O>,
    pull: Pull<O, ()>,
    n: usize,
    allow_fewer: bool,
) -> Pull<O, ()> {
    pull.uncons().flat_map(move |step| match step {
        None if allow_fewer => Pull::done().cons(acc.to_chunk()),
        None => Pull::done(),
        Some((head, tail)) => {
            let acc = acc.clone().enqueue(head);
            if acc.size() >= n {
                Pull::output(acc.to_chunk()).then(chunk_min_go(ChunkQueue::empty(), tail, n, allow_fewer))
            } else {
                chunk_min_go(acc, tail, n, allow_fewer)
            }
        }
    })
}

fn buffer_all_go<O: Element>(acc: ChunkQueue<O>, pull: Pull<O, ()>) -> Pull<O, ()> {
    pull.uncons().flat_map(move |step| match step {
        None => Pull::done().cons(acc.to_chunk()),
        Some((head, tail)) => buffer_all_go(acc.clone().enqueue(head), tail),
    })
}

type ZipFn<O, O2, O3> = Arc<dyn Fn(&O, &O2) -> O3 + Send + Sync>;

fn zip_go<O, O2, O3>(left: StepLeg<O>, right: StepLeg<O2>, f: ZipFn<O, O2, O3>) -> Pull<O3, ()>
where
    O: Element,
    O2: Element,
    O3: Element,
{
    let (lh, rh) = (left.head().clone(), right.head().clone());
    let n = lh.len().min(rh.len());
    let out = lh.zip_with(&rh, |a, b| f(a, b));
    let left = left.set_head(lh.drop(n));
    let right = right.set_head(rh.drop(n));
    let next = refill(left).flat_map(move |left| match left {
        None => Pull::done(),
        Some(left) => {
            let f = Arc::clone(&f);
            refill(right.clone()).flat_map(move |right| match right {
                None => Pull::done(),
                Some(right) => zip_go(left.clone(), right, Arc::clone(&f)),
            })
        }
    });
    next.cons(out)
}

fn refill<O: Element, P: Element>(leg: StepLeg<O>) -> Pull<P, Option<StepLeg<O>>> {
    if leg.head().is_empty() {
        leg.step_leg()
    } else {
        Pull::pure(Some(leg))
    }
}
