//! Running streams concurrently.
//!
//! Concurrent legs are forked interpretations: each runs in its own fiber
//! under a forked root scope that follows the interruption of the scope it
//! was forked from. The combinators here own their fibers as scope
//! resources, so a combined stream does not finish, successfully or not,
//! before every fiber it started has unwound.

use super::Stream;
use crate::chunk::Chunk;
use crate::combinator::{race, RaceResult};
use crate::error::{Error, Result};
use crate::pull::compile::run_forked;
use crate::pull::Pull;
use crate::scope::Scope;
use crate::sync::{Deferred, Notify};
use crate::tracing_compat::{debug, trace};
use crate::types::Element;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

impl<O: Element> Stream<O> {
    /// Runs `background` alongside this stream, for its effects.
    ///
    /// If `background` fails, this stream is interrupted and the combined
    /// stream fails with the same error. When this stream ends first,
    /// `background` is interrupted, and the combined stream ends only once
    /// `background` has released everything it acquired.
    #[must_use]
    pub fn concurrently<O2: Element>(self, background: Stream<O2>) -> Self {
        let body = self.pull;
        let background = background.pull;
        let pull = Pull::<O, Scope>::get_scope().flat_map(move |scope| {
            let background = background.clone();
            let body = body.clone();
            Pull::<O, Background>::acquire(
                move || {
                    let started = Background::start(&scope, background.clone());
                    async move { Ok(started) }
                },
                |started: Background| async move { started.stop().await },
            )
            .flat_map(move |started| {
                let failed = Arc::clone(&started.failed);
                Stream::from_pull(body.clone())
                    .interrupt_when(move || {
                        let failed = Arc::clone(&failed);
                        async move {
                            failed.get().await;
                            Ok(())
                        }
                    })
                    .pull
            })
        });
        Self::from_pull(pull.scope())
    }

    /// Interleaves this stream with `that`, emitting chunks from either as
    /// they arrive. Order within each side is kept.
    ///
    /// The merged stream ends when both sides have ended, and fails as soon
    /// as either side fails.
    #[must_use]
    pub fn merge(self, that: Self) -> Self {
        Stream::emits(vec![self, that]).par_join(2)
    }
}

impl<O: Element> Stream<Stream<O>> {
    /// Runs up to `max_open` inner streams at once, emitting their chunks as
    /// they arrive.
    ///
    /// Order within one inner stream is kept; there is no order across
    /// inner streams. The first failure of the outer stream or any inner
    /// stream interrupts all the others and fails the joined stream. Inner
    /// streams keep the resources of the outer stream that were open when
    /// they were emitted until they finish, and the joined stream ends only
    /// after every inner stream has unwound.
    ///
    /// `max_open` is clamped to `[1, max_par_join]` of the executor's
    /// configuration.
    #[must_use]
    pub fn par_join(self, max_open: usize) -> Stream<O> {
        let outer = self.pull;
        let pull = Pull::<O, Scope>::get_scope().flat_map(move |scope| {
            let outer = outer.clone();
            Pull::<O, Arc<Join<O>>>::acquire(
                move || {
                    let join = Join::start(&scope, outer.clone(), max_open);
                    async move { Ok(join) }
                },
                |join: Arc<Join<O>>| async move { join.finish().await },
            )
            .flat_map(receive_chunks)
        });
        Stream::from_pull(pull.scope())
    }

    /// Like [`Stream::par_join`], bounded only by the executor's
    /// `max_par_join`.
    #[must_use]
    pub fn par_join_unbounded(self) -> Stream<O> {
        self.par_join(usize::MAX)
    }
}

/// The fiber behind `concurrently`.
#[derive(Clone)]
struct Background {
    stop: Arc<Deferred<()>>,
    failed: Arc<Deferred<()>>,
    done: Arc<Deferred<Result<()>>>,
}

impl Background {
    fn start<O2: Element>(scope: &Scope, pull: Pull<O2, ()>) -> Self {
        let started = Self {
            stop: Arc::new(Deferred::new()),
            failed: Arc::new(Deferred::new()),
            done: Arc::new(Deferred::new()),
        };
        let stop = Arc::clone(&started.stop);
        let watched = Stream::from_pull(pull).interrupt_when(move || {
            let stop = Arc::clone(&stop);
            async move {
                stop.get().await;
                Ok(())
            }
        });
        let fiber = started.clone();
        let parent = scope.clone();
        scope.executor().spawn(async move {
            let result = run_forked(parent, watched.pull.node).await;
            if result.is_err() {
                fiber.failed.complete(());
            }
            fiber.done.complete(result);
        });
        started
    }

    /// Interrupts the fiber and waits for it to unwind, returning its
    /// failure if it had one.
    async fn stop(&self) -> Result<()> {
        self.stop.complete(());
        self.done.get().await
    }
}

/// Shared state of one `par_join` interpretation.
struct Join<O> {
    /// How the join was stopped: `Some(None)` normally, `Some(Some(e))` on
    /// failure.
    outcome: Mutex<Option<Option<Error>>>,
    stopped: Arc<Deferred<()>>,
    running: AtomicUsize,
    idle: Notify,
    permits: Arc<Semaphore>,
    output: tokio::sync::Mutex<mpsc::Receiver<Chunk<O>>>,
    max_suppressed: usize,
}

impl<O: Element> Join<O> {
    fn start(scope: &Scope, outer: Pull<Stream<O>, ()>, max_open: usize) -> Arc<Self> {
        let config = scope.config();
        let width = config.clamp_par_join(max_open);
        let (tx, rx) = mpsc::channel(config.par_join_buffer.max(1));
        let join = Arc::new(Self {
            outcome: Mutex::new(None),
            stopped: Arc::new(Deferred::new()),
            running: AtomicUsize::new(1),
            idle: Notify::new(),
            permits: Arc::new(Semaphore::new(width)),
            output: tokio::sync::Mutex::new(rx),
            max_suppressed: config.max_suppressed,
        });
        debug!(scope = %scope.id(), width, "par_join started");
        let runner = Arc::clone(&join);
        let parent = scope.clone();
        scope.executor().spawn(async move {
            let outer = runner.outer_pull(outer, tx);
            if let Err(e) = run_forked(parent, outer.node).await {
                runner.stop(Some(e));
            }
            runner.fiber_finished();
        });
        join
    }

    /// The outer stream, starting a fiber for every inner stream it emits.
    fn outer_pull(
        self: &Arc<Self>,
        outer: Pull<Stream<O>, ()>,
        tx: mpsc::Sender<Chunk<O>>,
    ) -> Pull<(), ()> {
        let join = Arc::clone(self);
        let spawning = outer.flat_map_output(move |inner: Stream<O>| {
            let join = Arc::clone(&join);
            let tx = tx.clone();
            Pull::<(), Scope>::get_scope().flat_map(move |outer_scope| {
                let join = Arc::clone(&join);
                let inner = inner.clone();
                let tx = tx.clone();
                Pull::eval(move || {
                    Arc::clone(&join).spawn_inner(inner.clone(), outer_scope.clone(), tx.clone())
                })
            })
        });
        self.until_stopped(Stream::from_pull(spawning)).pull
    }

    /// Waits for a free slot, then runs `inner` in its own fiber. The
    /// fiber holds a lease on the scope `inner` was emitted in.
    ///
    /// Once the join has stopped, `inner` is dropped without running.
    async fn spawn_inner(
        self: Arc<Self>,
        inner: Stream<O>,
        outer_scope: Scope,
        tx: mpsc::Sender<Chunk<O>>,
    ) -> Result<()> {
        let permit = match race(
            Arc::clone(&self.permits).acquire_owned(),
            self.stopped.get(),
        )
        .await
        {
            RaceResult::First(permit) => {
                permit.map_err(|_| Error::internal("par_join permits closed"))?
            }
            RaceResult::Second(()) => return Ok(()),
        };
        if self.stopped.is_complete() {
            trace!(scope = %outer_scope.id(), "par_join stopped; inner stream skipped");
            return Ok(());
        }
        let lease = outer_scope.lease();
        self.running.fetch_add(1, Ordering::SeqCst);
        let executor = outer_scope.executor().clone();
        executor.spawn(async move {
            let sink = self.inner_pull(inner, tx);
            let result = run_forked(outer_scope, sink.node).await;
            let released = match lease {
                Some(lease) => lease.cancel().await,
                None => Ok(()),
            };
            drop(permit);
            if let Some(e) = Error::compose_opt(result.err(), released.err()) {
                self.stop(Some(e));
            }
            self.fiber_finished();
        });
        Ok(())
    }

    /// An inner stream, sending its chunks to the joined output.
    fn inner_pull(&self, inner: Stream<O>, tx: mpsc::Sender<Chunk<O>>) -> Pull<(), ()> {
        let sending = inner.chunks().effect_map(move |chunk| {
            let tx = tx.clone();
            async move {
                tx.send(chunk)
                    .await
                    .map_err(|_| Error::internal("par_join output closed"))
            }
        });
        self.until_stopped(sending).pull
    }

    /// Drains `s`, interrupting it once the join has stopped.
    fn until_stopped(&self, s: Stream<()>) -> Stream<()> {
        let stopped = Arc::clone(&self.stopped);
        s.drain().interrupt_when(move || {
            let stopped = Arc::clone(&stopped);
            async move {
                stopped.get().await;
                Ok(())
            }
        })
    }

    /// Records how the join ended and wakes everything waiting on it. A
    /// failure replaces a normal stop; later failures are suppressed into
    /// the first.
    fn stop(&self, cause: Option<Error>) {
        {
            let mut outcome = self.outcome.lock();
            *outcome = Some(match (outcome.take(), cause) {
                (Some(Some(first)), Some(e)) => {
                    Some(Error::compose(first, [e], self.max_suppressed))
                }
                (Some(Some(first)), None) => Some(first),
                (_, cause) => cause,
            });
        }
        self.stopped.complete(());
    }

    fn fiber_finished(&self) {
        if self.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            trace!("par_join fibers finished");
            self.idle.notify_waiters();
        }
    }

    /// The next chunk from any fiber. `None` once every sender is gone or
    /// the join has stopped.
    async fn next_chunk(&self) -> Option<Chunk<O>> {
        let receive = async { self.output.lock().await.recv().await };
        match race(receive, self.stopped.get()).await {
            RaceResult::First(next) => next,
            RaceResult::Second(()) => None,
        }
    }

    /// Stops the join, waits for every fiber to unwind, and reports the
    /// first failure.
    async fn finish(&self) -> Result<()> {
        self.stop(None);
        loop {
            let idle = self.idle.notified();
            if self.running.load(Ordering::SeqCst) == 0 {
                break;
            }
            idle.await;
        }
        let outcome = self.outcome.lock().clone().flatten();
        debug!(failed = outcome.is_some(), "par_join finished");
        outcome.map_or(Ok(()), Err)
    }
}

fn receive_chunks<O: Element>(join: Arc<Join<O>>) -> Pull<O, ()> {
    let next = Arc::clone(&join);
    Pull::eval(move || {
        let join = Arc::clone(&next);
        async move { Ok(join.next_chunk().await) }
    })
    .flat_map(move |chunk| match chunk {
        Some(chunk) => Pull::output(chunk).then(receive_chunks(Arc::clone(&join))),
        None => Pull::done(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, test_executor, EventLog};
    use crate::types::ExitCase;
    use std::time::Duration;

    fn logged(log: &EventLog<String>, name: &'static str, s: Stream<i32>) -> Stream<i32> {
        let log = log.clone();
        s.on_finalize(move || {
            let log = log.clone();
            async move {
                log.record(format!("{name} finalized"));
                Ok(())
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn background_failure_fails_the_combined_stream() {
        init_test_logging();
        let ex = test_executor();
        let log = EventLog::new();
        let failing = Stream::<()>::sleep(Duration::from_millis(10))
            .append(Stream::raise_error(Error::user("background")));
        let err = logged(&log, "main", Stream::never())
            .concurrently(failing)
            .to_list(&ex)
            .await
            .unwrap_err();
        assert_eq!(err.message(), Some("background"));
        assert_eq!(log.snapshot(), vec!["main finalized".to_string()]);
    }

    #[tokio::test]
    async fn background_is_interrupted_when_main_ends() {
        init_test_logging();
        let ex = test_executor();
        let log = EventLog::new();
        let background = logged(&log, "background", Stream::never());
        let out = Stream::emits(vec![1, 2, 3])
            .concurrently(background)
            .to_list(&ex)
            .await
            .unwrap();
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(log.snapshot(), vec!["background finalized".to_string()]);
    }

    #[tokio::test]
    async fn par_join_of_one_keeps_order() {
        init_test_logging();
        let ex = test_executor();
        let inners = Stream::range(0..5).map(|n| Stream::range(n * 10..n * 10 + 3));
        let out = inners.par_join(1).to_list(&ex).await.unwrap();
        let expected: Vec<i32> = (0..5).flat_map(|n| n * 10..n * 10 + 3).collect();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn par_join_keeps_every_element() {
        init_test_logging();
        let ex = test_executor();
        let inners = Stream::range(0..8).map(|n| {
            Stream::range(n * 100..n * 100 + 50).effect_map(|x| async move {
                tokio::task::yield_now().await;
                Ok(x)
            })
        });
        let mut out = inners.par_join(3).to_list(&ex).await.unwrap();
        out.sort_unstable();
        let expected: Vec<i32> = (0..8).flat_map(|n| n * 100..n * 100 + 50).collect();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn par_join_keeps_order_within_each_inner() {
        init_test_logging();
        let ex = test_executor();
        let inners = Stream::range(0..4).map(|n| {
            let n = *n;
            Stream::range(0..20).map(move |x| (n, *x))
        });
        let out = inners.par_join_unbounded().to_list(&ex).await.unwrap();
        assert_eq!(out.len(), 80);
        for n in 0..4 {
            let seen: Vec<i32> = out.iter().filter(|(k, _)| *k == n).map(|(_, x)| *x).collect();
            assert_eq!(seen, (0..20).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn inner_failure_fails_the_join_and_releases_siblings() {
        init_test_logging();
        let ex = test_executor();
        let log = EventLog::new();
        let sibling = logged(&log, "sibling", Stream::never());
        let err = Stream::emits(vec![sibling, Stream::raise_error(Error::user("inner"))])
            .par_join(2)
            .to_list(&ex)
            .await
            .unwrap_err();
        assert_eq!(err.message(), Some("inner"));
        assert_eq!(log.snapshot(), vec!["sibling finalized".to_string()]);
    }

    #[tokio::test]
    async fn outer_failure_fails_the_join() {
        init_test_logging();
        let ex = test_executor();
        let outer = Stream::just(Stream::just(1)).append(Stream::raise_error(Error::user("outer")));
        let err = outer.par_join(2).to_list(&ex).await.unwrap_err();
        assert_eq!(err.message(), Some("outer"));
    }

    #[tokio::test]
    async fn inner_streams_finish_before_outer_resources() {
        init_test_logging();
        let ex = test_executor();
        let log: EventLog<String> = EventLog::new();
        let outer_log = log.clone();
        let inner_log = log.clone();
        let outer = Stream::bracket_case(
            || async { Ok(()) },
            move |(), exit: ExitCase| {
                let log = outer_log.clone();
                async move {
                    log.record(format!("outer {exit}"));
                    Ok(())
                }
            },
        )
        .flat_map(move |()| {
            let log = inner_log.clone();
            Stream::emits(vec![1, 2]).map(move |n| {
                let yielding = Stream::just(*n).effect_map(|n| async move {
                    tokio::task::yield_now().await;
                    Ok(n)
                });
                logged(&log, "inner", yielding)
            })
        });
        let mut out = outer.par_join(2).to_list(&ex).await.unwrap();
        out.sort_unstable();
        assert_eq!(out, vec![1, 2]);
        let events = log.snapshot();
        assert_eq!(events.len(), 3);
        assert_eq!(events.last().map(String::as_str), Some("outer completed"));
    }

    #[tokio::test]
    async fn inner_emitted_after_a_failure_never_runs() {
        init_test_logging();
        let root = Scope::new_root(test_executor());
        let join = Join::<i32>::start(&root, Pull::done(), 2);
        join.stop(Some(Error::user("earlier")));

        let ran: EventLog<()> = EventLog::new();
        let effects = ran.clone();
        let late = Stream::exec(move || {
            let effects = effects.clone();
            async move {
                effects.record(());
                Ok(())
            }
        })
        .append(Stream::just(1));
        let (tx, _rx) = mpsc::channel(1);
        Arc::clone(&join).spawn_inner(late, root.clone(), tx).await.unwrap();

        let err = join.finish().await.unwrap_err();
        assert_eq!(err.message(), Some("earlier"));
        assert!(ran.snapshot().is_empty());
    }

    #[tokio::test]
    async fn merge_interleaves_and_ends_with_both_sides() {
        init_test_logging();
        let ex = test_executor();
        let mut out = Stream::emits(vec![1, 2, 3])
            .merge(Stream::emits(vec![4, 5]))
            .to_list(&ex)
            .await
            .unwrap();
        out.sort_unstable();
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn merge_with_a_hung_side_can_be_taken_from() {
        init_test_logging();
        let ex = test_executor();
        let out = Stream::emits(vec![1, 2])
            .merge(Stream::never())
            .take(2)
            .to_list(&ex)
            .await
            .unwrap();
        assert_eq!(out, vec![1, 2]);
    }
}
