//! Stream sources.

use super::Stream;
use crate::chunk::Chunk;
use crate::error::{Error, Result};
use crate::pull::Pull;
use crate::scope::Scope;
use crate::types::{Element, ExitCase};
use parking_lot::Mutex;
use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

impl<O: Element> Stream<O> {
    /// The stream with no elements.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_pull(Pull::done())
    }

    /// A stream of one element.
    #[must_use]
    pub fn just(value: O) -> Self {
        Self::from_pull(Pull::output1(value))
    }

    /// A stream of the elements of `chunk`, as one chunk.
    #[must_use]
    pub fn chunk(chunk: Chunk<O>) -> Self {
        Self::from_pull(Pull::output(chunk))
    }

    /// A stream of the given elements, as one chunk.
    #[must_use]
    pub fn emits(values: Vec<O>) -> Self {
        Self::chunk(Chunk::from_vec(values))
    }

    /// A stream that fails with `e`.
    #[must_use]
    pub fn raise_error(e: Error) -> Self {
        Self::from_pull(Pull::raise_error(e))
    }

    /// Builds the stream lazily, each time it is run.
    #[must_use]
    pub fn defer<F>(f: F) -> Self
    where
        F: Fn() -> Self + Send + Sync + 'static,
    {
        Self::from_pull(Pull::defer(move || f().pull))
    }

    /// A stream that never emits and never ends. Only interruption stops it.
    #[must_use]
    pub fn never() -> Self {
        Self::exec(std::future::pending)
    }

    /// The elements of `iter`, chunked by the executor's
    /// `default_chunk_size`. The iterable is cloned on every run, so
    /// infinite iterators are fine.
    #[must_use]
    pub fn iterable<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = O> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::from_pull(Pull::<O, Scope>::get_scope().flat_map(move |scope| {
            let size = scope.config().default_chunk_size.max(1);
            let source = Arc::new(Mutex::new(iter.clone().into_iter()));
            drain_iterator(source, size)
        }))
    }

    /// The values of `range`, in chunks of the executor's
    /// `default_chunk_size`.
    #[must_use]
    pub fn range(range: Range<O>) -> Self
    where
        Range<O>: Iterator<Item = O>,
    {
        Self::iterable(range)
    }

    /// `value`, repeated forever.
    #[must_use]
    pub fn constant(value: O) -> Self {
        Self::just(value).repeat()
    }

    /// `start`, `f(start)`, `f(f(start))`, ... forever.
    #[must_use]
    pub fn iterate<F>(start: O, f: F) -> Self
    where
        F: Fn(&O) -> O + Send + Sync + 'static,
    {
        Self::unfold(start, move |s| {
            let next = f(&s);
            Some((s, next))
        })
    }

    /// Like [`Stream::iterate`], with an effectful step.
    #[must_use]
    pub fn iterate_effect<F, Fut>(start: O, f: F) -> Self
    where
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        Self::from_pull(iterate_effect_go(start, Arc::new(f)))
    }

    /// Emits elements produced from a state until `f` returns `None`.
    #[must_use]
    pub fn unfold<S, F>(init: S, f: F) -> Self
    where
        S: Element,
        F: Fn(S) -> Option<(O, S)> + Send + Sync + 'static,
    {
        Self::unfold_chunk(init, move |s| f(s).map(|(o, s)| (Chunk::singleton(o), s)))
    }

    /// Like [`Stream::unfold`], producing a chunk per step.
    #[must_use]
    pub fn unfold_chunk<S, F>(init: S, f: F) -> Self
    where
        S: Element,
        F: Fn(S) -> Option<(Chunk<O>, S)> + Send + Sync + 'static,
    {
        Self::from_pull(unfold_go(init, Arc::new(f)))
    }

    /// Like [`Stream::unfold`], with an effectful step.
    #[must_use]
    pub fn unfold_effect<S, F, Fut>(init: S, f: F) -> Self
    where
        S: Element,
        F: Fn(S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<(O, S)>>> + Send + 'static,
    {
        let f = Arc::new(f);
        Self::unfold_chunk_effect(init, move |s| {
            let step = f(s);
            async move { Ok(step.await?.map(|(o, s)| (Chunk::singleton(o), s))) }
        })
    }

    /// Like [`Stream::unfold_chunk`], with an effectful step.
    #[must_use]
    pub fn unfold_chunk_effect<S, F, Fut>(init: S, f: F) -> Self
    where
        S: Element,
        F: Fn(S) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<(Chunk<O>, S)>>> + Send + 'static,
    {
        Self::from_pull(unfold_effect_go(init, Arc::new(f)))
    }

    /// A stream of the single value produced by the effect `f`.
    #[must_use]
    pub fn effect<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
    {
        Self::from_pull(Pull::eval(f).flat_map(Pull::output1))
    }

    /// Runs the effect `f` for its side effects, emitting nothing.
    #[must_use]
    pub fn exec<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::from_pull(Pull::eval(f))
    }

    /// A stream of the chunk produced by the effect `f`.
    #[must_use]
    pub fn effect_chunk<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Chunk<O>>> + Send + 'static,
    {
        Self::from_pull(Pull::eval(f).flat_map(Pull::output))
    }

    /// Acquires a resource and emits it. `release` runs exactly once when
    /// the scope of the stream ends, however it ends.
    #[must_use]
    pub fn bracket<A, AFut, Rel, RFut>(acquire: A, release: Rel) -> Self
    where
        A: Fn() -> AFut + Send + Sync + 'static,
        AFut: Future<Output = Result<O>> + Send + 'static,
        Rel: Fn(O) -> RFut + Send + Sync + 'static,
        RFut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::bracket_case(acquire, move |r, _| release(r))
    }

    /// Like [`Stream::bracket`], handing the way the scope ended to
    /// `release`.
    #[must_use]
    pub fn bracket_case<A, AFut, Rel, RFut>(acquire: A, release: Rel) -> Self
    where
        A: Fn() -> AFut + Send + Sync + 'static,
        AFut: Future<Output = Result<O>> + Send + 'static,
        Rel: Fn(O, ExitCase) -> RFut + Send + Sync + 'static,
        RFut: Future<Output = Result<()>> + Send + 'static,
    {
        Pull::acquire_case(acquire, release)
            .flat_map(Pull::output1)
            .stream()
    }
}

impl Stream<()> {
    /// A stream of one `()`.
    #[must_use]
    pub fn unit() -> Self {
        Self::just(())
    }

    /// Emits `()` once `duration` has elapsed on the executor's clock.
    #[must_use]
    pub fn sleep(duration: Duration) -> Self {
        Self::from_pull(sleep_pull(duration).then(Pull::output1(())))
    }
}

pub(super) fn sleep_pull<O: Element>(duration: Duration) -> Pull<O, ()> {
    Pull::<O, Scope>::get_scope().flat_map(move |scope| {
        let executor = scope.executor().clone();
        Pull::eval(move || {
            let sleep = executor.sleep(duration);
            async move {
                sleep.await;
                Ok(())
            }
        })
    })
}

fn drain_iterator<O, It>(source: Arc<Mutex<It>>, size: usize) -> Pull<O, ()>
where
    O: Element,
    It: Iterator<Item = O> + Send + 'static,
{
    Pull::defer(move || {
        let chunk: Chunk<O> = source.lock().by_ref().take(size).collect();
        if chunk.is_empty() {
            Pull::done()
        } else {
            Pull::output(chunk).then(drain_iterator(Arc::clone(&source), size))
        }
    })
}

type UnfoldFn<S, O> = Arc<dyn Fn(S) -> Option<(Chunk<O>, S)> + Send + Sync>;

fn unfold_go<S: Element, O: Element>(state: S, f: UnfoldFn<S, O>) -> Pull<O, ()> {
    Pull::defer(move || match f(state.clone()) {
        None => Pull::done(),
        Some((chunk, next)) => Pull::output(chunk).then(unfold_go(next, Arc::clone(&f))),
    })
}

fn unfold_effect_go<S, O, F, Fut>(state: S, f: Arc<F>) -> Pull<O, ()>
where
    S: Element,
    O: Element,
    F: Fn(S) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<(Chunk<O>, S)>>> + Send + 'static,
{
    let step = Arc::clone(&f);
    Pull::eval(move || step(state.clone())).flat_map(move |next| match next {
        None => Pull::done(),
        Some((chunk, state)) => Pull::output(chunk).then(unfold_effect_go(state, Arc::clone(&f))),
    })
}

fn iterate_effect_go<O, F, Fut>(value: O, f: Arc<F>) -> Pull<O, ()>
where
    O: Element,
    F: Fn(O) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    let step = Arc::clone(&f);
    let current = value.clone();
    Pull::output1(value)
        .then(Pull::eval(move || step(current.clone())))
        .flat_map(move |next| iterate_effect_go(next, Arc::clone(&f)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::{init_test_logging, test_executor, EventLog};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn pure_sources() {
        init_test_logging();
        let executor = test_executor();
        assert!(Stream::<i32>::empty().to_list(&executor).await.unwrap().is_empty());
        assert_eq!(Stream::just(1).to_list(&executor).await.unwrap(), vec![1]);
        assert_eq!(Stream::emits(vec![1, 2]).to_list(&executor).await.unwrap(), vec![1, 2]);
        assert_eq!(Stream::unit().to_list(&executor).await.unwrap(), vec![()]);
        let err = Stream::<i32>::raise_error(Error::user("nope"))
            .to_list(&executor)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::User);
    }

    #[tokio::test]
    async fn range_uses_configured_chunk_size() {
        init_test_logging();
        let executor = crate::ExecutorBuilder::new()
            .default_chunk_size(4)
            .ignore_env()
            .build()
            .unwrap();
        let sizes = Stream::range(0..10)
            .chunks()
            .map(|c| c.len())
            .to_list(&executor)
            .await
            .unwrap();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn unfold_and_iterate() {
        init_test_logging();
        let executor = test_executor();
        let countdown = Stream::unfold(3, |n| (n > 0).then_some((n, n - 1)));
        assert_eq!(countdown.to_list(&executor).await.unwrap(), vec![3, 2, 1]);

        let powers = Stream::iterate(1, |n| n * 2).take(5);
        assert_eq!(powers.to_list(&executor).await.unwrap(), vec![1, 2, 4, 8, 16]);

        let effectful = Stream::iterate_effect(1, |n| async move { Ok(n + 1) }).take(3);
        assert_eq!(effectful.to_list(&executor).await.unwrap(), vec![1, 2, 3]);

        let chunked = Stream::unfold_chunk_effect(0, |n| async move {
            Ok((n < 2).then(|| (Chunk::from_vec(vec![n, n]), n + 1)))
        });
        assert_eq!(chunked.to_list(&executor).await.unwrap(), vec![0, 0, 1, 1]);
    }

    #[tokio::test]
    async fn effects_run_once_per_compilation() {
        init_test_logging();
        let executor = test_executor();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let s = Stream::effect(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(n) }
        });
        assert_eq!(s.clone().to_list(&executor).await.unwrap(), vec![0]);
        assert_eq!(s.to_list(&executor).await.unwrap(), vec![1]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn bracket_releases_after_use() {
        init_test_logging();
        let executor = test_executor();
        let log = EventLog::new();
        let (a, r, u) = (log.clone(), log.clone(), log.clone());
        let s = Stream::bracket(
            move || {
                let a = a.clone();
                async move {
                    a.record("acquired");
                    Ok(7)
                }
            },
            move |_| {
                let r = r.clone();
                async move {
                    r.record("released");
                    Ok(())
                }
            },
        )
        .effect_map(move |n| {
            let u = u.clone();
            async move {
                u.record("used");
                Ok(n)
            }
        });
        assert_eq!(s.to_list(&executor).await.unwrap(), vec![7]);
        assert_eq!(log.snapshot(), vec!["acquired", "used", "released"]);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_emits_after_the_delay() {
        init_test_logging();
        let executor = test_executor();
        let started = tokio::time::Instant::now();
        let out = Stream::sleep(Duration::from_secs(5)).to_list(&executor).await.unwrap();
        assert_eq!(out, vec![()]);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }
}
