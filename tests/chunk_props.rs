//! Property tests for `Chunk` and `ChunkQueue` against a `Vec` model.

mod common;

use common::*;
use fxstream::{Chunk, ChunkQueue};
use proptest::prelude::*;

fn arb_vec() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(any::<i32>(), 0..48)
}

/// A chunk of `v`, built as a slice of a larger chunk when `offset` is set
/// so that views are exercised too.
fn chunk_of(v: &[i32], offset: usize) -> Chunk<i32> {
    if offset == 0 {
        return Chunk::from_vec(v.to_vec());
    }
    let mut padded = vec![0; offset];
    padded.extend_from_slice(v);
    Chunk::from_vec(padded).drop(offset)
}

fn clamp(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

proptest! {
    #![proptest_config(test_proptest_config(256))]

    #[test]
    fn iterable_round_trip(v in arb_vec(), offset in 0usize..3) {
        let c = chunk_of(&v, offset);
        let rebuilt: Chunk<i32> = c.to_vec().into_iter().collect();
        prop_assert_eq!(rebuilt, c.clone());
        prop_assert_eq!(c.len(), v.len());
        prop_assert_eq!(c.to_vec(), v);
    }

    #[test]
    fn take_and_drop_match_the_model(v in arb_vec(), n in -8i64..64, offset in 0usize..3) {
        let c = chunk_of(&v, offset);
        let k = clamp(n);
        let model_take: Vec<i32> = v.iter().copied().take(k).collect();
        let model_drop: Vec<i32> = v.iter().copied().skip(k).collect();
        prop_assert_eq!(c.take(k).to_vec(), model_take);
        prop_assert_eq!(c.drop(k).to_vec(), model_drop);
        let keep = v.len().saturating_sub(k);
        prop_assert_eq!(c.take_last(k).to_vec(), v[keep..].to_vec());
        prop_assert_eq!(c.drop_last(k).to_vec(), v[..keep].to_vec());
        let (left, right) = c.split_at(k);
        prop_assert_eq!(left.len() + right.len(), v.len());
        prop_assert_eq!(Chunk::concat(&[left, right]), c);
    }

    #[test]
    fn element_queries_match_the_model(v in arb_vec(), i in 0usize..64) {
        let c = Chunk::from_slice(&v);
        prop_assert_eq!(c.get(i), v.get(i));
        prop_assert_eq!(c.first(), v.first());
        prop_assert_eq!(c.last(), v.last());
        prop_assert_eq!(c.index_of_first(|x| *x > 0), v.iter().position(|x| *x > 0));
        prop_assert_eq!(c.all(|x| *x % 2 == 0), v.iter().all(|x| *x % 2 == 0));
        prop_assert_eq!(c.any(|x| *x < 0), v.iter().any(|x| *x < 0));
        prop_assert_eq!(c.tail().to_vec(), v.iter().copied().skip(1).collect::<Vec<_>>());
    }

    #[test]
    fn transforms_match_the_model(v in arb_vec(), w in arb_vec()) {
        let c = Chunk::from_vec(v.clone());
        let d = Chunk::from_vec(w.clone());
        let doubled: Vec<i64> = v.iter().map(|x| i64::from(*x) * 2).collect();
        prop_assert_eq!(c.map(|x| i64::from(*x) * 2).to_vec(), doubled);
        let evens: Vec<i32> = v.iter().copied().filter(|x| x % 2 == 0).collect();
        prop_assert_eq!(c.filter(|x| x % 2 == 0).to_vec(), evens);
        let sum = v.iter().fold(0i64, |a, x| a + i64::from(*x));
        prop_assert_eq!(c.fold(0i64, |a, x| a + i64::from(*x)), sum);
        let zipped: Vec<(i32, i32)> = v.iter().copied().zip(w.iter().copied()).collect();
        prop_assert_eq!(c.zip(&d).to_vec(), zipped);
        let repeated: Vec<i32> = v.iter().flat_map(|x| [*x, *x]).collect();
        prop_assert_eq!(c.flat_map(|x| Chunk::from_vec(vec![*x, *x])).to_vec(), repeated);
    }

    #[test]
    fn scans_carry_their_state(v in arb_vec()) {
        let c = Chunk::from_vec(v.clone());
        let (prefix, total) = c.scan_left(0i64, |acc, x| acc + i64::from(*x));
        let mut running = 0i64;
        let model: Vec<i64> = v
            .iter()
            .map(|x| {
                running += i64::from(*x);
                running
            })
            .collect();
        prop_assert_eq!(prefix.to_vec(), model);
        prop_assert_eq!(total, running);

        let (next, indexed) = c.map_accumulate(0usize, |i, x| (i + 1, (i, *x)));
        prop_assert_eq!(next, v.len());
        let expected: Vec<(usize, i32)> = v.iter().copied().enumerate().collect();
        prop_assert_eq!(indexed.to_vec(), expected);
    }

    #[test]
    fn queue_matches_the_model(parts in prop::collection::vec(arb_vec(), 0..6), n in -4i64..96) {
        let k = clamp(n);
        let flat: Vec<i32> = parts.iter().flatten().copied().collect();
        let queue = parts
            .iter()
            .fold(ChunkQueue::empty(), |q, p| q.enqueue(Chunk::from_vec(p.clone())));
        prop_assert_eq!(queue.size(), flat.len());
        prop_assert_eq!(queue.is_empty(), flat.is_empty());
        prop_assert_eq!(queue.to_chunk().to_vec(), flat.clone());
        let keep = flat.len().saturating_sub(k);
        prop_assert_eq!(queue.clone().take(k).to_chunk().to_vec(), flat.iter().copied().take(k).collect::<Vec<_>>());
        prop_assert_eq!(queue.clone().drop(k).to_chunk().to_vec(), flat.iter().copied().skip(k).collect::<Vec<_>>());
        prop_assert_eq!(queue.clone().take_last(k).to_chunk().to_vec(), flat[keep..].to_vec());
        prop_assert_eq!(queue.drop_last(k).to_chunk().to_vec(), flat[..keep].to_vec());
    }
}

#[test]
fn concat_of_empties_is_empty() {
    init_test_logging();
    let c: Chunk<u8> = Chunk::concat(&[Chunk::empty(), Chunk::empty()]);
    assert!(c.is_empty());
    assert_eq!(c, Chunk::empty());
}
