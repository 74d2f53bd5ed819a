//! Concurrent combinators: `concurrently`, `par_join`, `merge`.
//!
//! # Properties
//!
//! - `par_join(1)` emits inner streams in order
//! - `par_join(n)` emits every inner element exactly once
//! - Inner streams finish before the resources of the outer stream close,
//!   including when an inner stream fails
//! - A failing leg fails the combined stream and releases every other leg
//! - A background failure fails the primary stream after releasing it

mod common;

use common::*;
use fxstream::{Error, Stream};
use proptest::prelude::*;
use std::time::Duration;

fn counted<O: fxstream::Element>(live: &Counter, body: Stream<O>) -> Stream<O> {
    let acquire = live.clone();
    let release = live.clone();
    Stream::bracket(
        move || {
            let live = acquire.clone();
            async move {
                live.incr();
                Ok(())
            }
        },
        move |()| {
            let live = release.clone();
            async move {
                live.decr();
                Ok(())
            }
        },
    )
    .flat_map(move |()| body.clone())
}

fn yielding(values: Vec<i32>) -> Stream<i32> {
    Stream::emits(values).effect_map(|n| async move {
        tokio::task::yield_now().await;
        Ok(n)
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn background_failure_fails_and_releases_the_primary() {
    init_test_logging();
    test_phase!("background_failure_fails_and_releases_the_primary");
    let ex = test_executor();
    let live = Counter::new();
    let background_done = EventLog::new();
    let done = background_done.clone();
    let background = Stream::<()>::sleep(Duration::from_millis(20))
        .append(Stream::raise_error(Error::user("background")))
        .on_finalize(move || {
            let done = done.clone();
            async move {
                done.record(());
                Ok(())
            }
        });
    let primary = counted(&live, Stream::iterate(0, |n| n + 1).effect_map(|n| async move {
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(n)
    }));
    let err = primary
        .concurrently(background)
        .compile(&ex)
        .drain()
        .await
        .unwrap_err();
    assert_eq!(err.message(), Some("background"));
    assert_eq!(live.get(), 0);
    assert_eq!(background_done.snapshot().len(), 1);
    test_complete!("background_failure_fails_and_releases_the_primary");
}

#[tokio::test]
async fn finite_primary_stops_an_endless_background() {
    init_test_logging();
    let ex = test_executor();
    let background = Stream::constant(()).effect_tap(|()| async {
        tokio::task::yield_now().await;
        Ok(())
    });
    let out = yielding(vec![1, 2, 3])
        .concurrently(background)
        .to_list(&ex)
        .await
        .unwrap();
    assert_eq!(out, vec![1, 2, 3]);
}

#[tokio::test]
async fn par_join_over_a_failing_inner_releases_its_siblings() {
    init_test_logging();
    let ex = test_executor();
    for bound in 2..=4 {
        let live = Counter::new();
        let s = counted(&live, Stream::<i32>::never());
        let err = Stream::emits(vec![s, Stream::raise_error(Error::user("e"))])
            .par_join(bound)
            .to_list(&ex)
            .await
            .unwrap_err();
        assert_eq!(err.message(), Some("e"));
        assert_eq!(live.get(), 0, "bound {bound}");
    }
}

#[tokio::test]
async fn par_join_of_one_fails_after_the_preceding_inner() {
    init_test_logging();
    let ex = test_executor();
    let live = Counter::new();
    let s = counted(&live, yielding(vec![1, 2]));
    let err = Stream::emits(vec![s, Stream::raise_error(Error::user("e"))])
        .par_join(1)
        .to_list(&ex)
        .await
        .unwrap_err();
    assert_eq!(err.message(), Some("e"));
    assert_eq!(live.get(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn par_join_failure_is_reported_after_every_release_on_worker_threads() {
    init_test_logging();
    test_phase!("par_join_failure_is_reported_after_every_release_on_worker_threads");
    let ex = test_executor();
    for run in 0..200 {
        let live = Counter::new();
        let s = counted(&live, Stream::<i32>::never());
        let result = Stream::emits(vec![s, Stream::raise_error(Error::user("inner"))])
            .par_join(2)
            .to_list(&ex)
            .await;
        let err = result.expect_err("the failing inner fails the join");
        assert_eq!(err.message(), Some("inner"), "run {run}");
        assert_eq!(live.get(), 0, "run {run}");
    }
    test_complete!("par_join_failure_is_reported_after_every_release_on_worker_threads");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn par_join_success_releases_everything_before_returning_on_worker_threads() {
    init_test_logging();
    test_phase!("par_join_success_releases_everything_before_returning_on_worker_threads");
    let ex = test_executor();
    for run in 0..200 {
        let live = Counter::new();
        let inner = counted(&live, Stream::emits(vec![1, 2, 3]));
        let out = counted(&live, Stream::emits(vec![inner.clone(), inner]))
            .par_join(2)
            .to_list(&ex)
            .await
            .unwrap();
        assert_eq!(out.len(), 6, "run {run}");
        let mut sorted = out;
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 1, 2, 2, 3, 3], "run {run}");
        assert_eq!(live.get(), 0, "run {run}");
    }
    test_complete!("par_join_success_releases_everything_before_returning_on_worker_threads");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn inner_finalizers_run_before_the_outer_one_under_failure() {
    init_test_logging();
    let ex = test_executor();
    let log: EventLog<&'static str> = EventLog::new();
    let outer_log = log.clone();
    let inner_log = log.clone();
    let outer = Stream::bracket(
        || async { Ok(()) },
        move |()| {
            let log = outer_log.clone();
            async move {
                log.record("outer");
                Ok(())
            }
        },
    )
    .flat_map(move |()| {
        let log = inner_log.clone();
        Stream::range(0..4).map(move |n| {
            let log = log.clone();
            let body = if *n == 3 {
                Stream::<i32>::raise_error(Error::user("inner"))
            } else {
                Stream::never()
            };
            body.on_finalize(move || {
                let log = log.clone();
                async move {
                    log.record("inner");
                    Ok(())
                }
            })
        })
    });
    let err = outer.par_join(4).to_list(&ex).await.unwrap_err();
    assert_eq!(err.message(), Some("inner"));
    let log = log.snapshot();
    assert_eq!(log.len(), 5);
    assert_eq!(log.last().copied(), Some("outer"));
}

#[tokio::test]
async fn take_from_a_merge_with_a_hung_side_terminates() {
    init_test_logging();
    let ex = test_executor();
    let out = Stream::emits(vec![1, 2, 3])
        .merge(Stream::never())
        .take(3)
        .to_list(&ex)
        .await
        .unwrap();
    assert_eq!(out, vec![1, 2, 3]);
}

#[tokio::test]
async fn merge_fails_when_either_side_fails() {
    init_test_logging();
    let ex = test_executor();
    let live = Counter::new();
    let err = counted(&live, Stream::<i32>::never())
        .merge(Stream::raise_error(Error::user("right")))
        .to_list(&ex)
        .await
        .unwrap_err();
    assert_eq!(err.message(), Some("right"));
    assert_eq!(live.get(), 0);
}

proptest! {
    #![proptest_config(test_proptest_config(24))]

    #[test]
    fn par_join_of_one_preserves_order(inners in prop::collection::vec(prop::collection::vec(any::<i32>(), 0..8), 0..6)) {
        init_test_logging();
        let expected: Vec<i32> = inners.iter().flatten().copied().collect();
        let outer = Stream::emits(inners.into_iter().map(yielding).collect());
        let out = block_on(|ex| async move { outer.par_join(1).to_list(&ex).await });
        prop_assert_eq!(out.unwrap(), expected);
    }

    #[test]
    fn par_join_preserves_the_multiset(
        inners in prop::collection::vec(prop::collection::vec(any::<i32>(), 0..8), 0..6),
        bound in 1usize..5,
    ) {
        init_test_logging();
        let mut expected: Vec<i32> = inners.iter().flatten().copied().collect();
        expected.sort_unstable();
        let outer = Stream::emits(inners.into_iter().map(yielding).collect());
        let out = block_on(|ex| async move { outer.par_join(bound).to_list(&ex).await });
        let mut out = out.unwrap();
        out.sort_unstable();
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn merge_preserves_both_sides(
        left in prop::collection::vec(any::<i32>(), 0..16),
        right in prop::collection::vec(any::<i32>(), 0..16),
    ) {
        init_test_logging();
        let merged = yielding(left.clone()).map(|n| (0, *n)).merge(yielding(right.clone()).map(|n| (1, *n)));
        let out = block_on(|ex| async move { merged.to_list(&ex).await }).unwrap();
        let side = |k: i32| out.iter().filter(|(s, _)| *s == k).map(|(_, n)| *n).collect::<Vec<_>>();
        prop_assert_eq!(side(0), left);
        prop_assert_eq!(side(1), right);
    }
}
