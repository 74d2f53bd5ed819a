//! Immutable, indexable batches of elements.
//!
//! A [`Chunk`] is the unit of transfer between pipeline stages. Chunks are
//! never mutated after construction; slicing shares the backing storage, so
//! `take`, `drop`, `split_at` and friends are O(1). Index arguments are
//! clamped to `[0, len]` instead of panicking, which keeps pipeline code
//! branch-free.
//!
//! Element types are monomorphised, so a `Chunk<u8>` or `Chunk<f64>` is
//! already a dense unboxed buffer.

mod queue;

pub use queue::ChunkQueue;

use core::fmt;
use std::sync::Arc;

/// An immutable, cheaply cloneable sequence of `A`.
#[derive(Clone)]
pub struct Chunk<A> {
    repr: Repr<A>,
}

#[derive(Clone)]
enum Repr<A> {
    Empty,
    Single(A),
    Slice {
        data: Arc<[A]>,
        offset: usize,
        len: usize,
    },
}

impl<A> Chunk<A> {
    /// The empty chunk.
    #[must_use]
    pub const fn empty() -> Self {
        Self { repr: Repr::Empty }
    }

    /// A chunk holding one element.
    #[must_use]
    pub const fn singleton(value: A) -> Self {
        Self {
            repr: Repr::Single(value),
        }
    }

    /// Takes ownership of a vector without copying its elements.
    #[must_use]
    pub fn from_vec(values: Vec<A>) -> Self {
        let len = values.len();
        if len == 0 {
            return Self::empty();
        }
        Self {
            repr: Repr::Slice {
                data: Arc::from(values),
                offset: 0,
                len,
            },
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Empty => 0,
            Repr::Single(_) => 1,
            Repr::Slice { len, .. } => *len,
        }
    }

    /// Returns true if the chunk holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The elements as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[A] {
        match &self.repr {
            Repr::Empty => &[],
            Repr::Single(value) => std::slice::from_ref(value),
            Repr::Slice { data, offset, len } => &data[*offset..*offset + *len],
        }
    }

    /// Element at `index`, or `None` when out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&A> {
        self.as_slice().get(index)
    }

    /// First element.
    #[must_use]
    pub fn first(&self) -> Option<&A> {
        self.as_slice().first()
    }

    /// Last element.
    #[must_use]
    pub fn last(&self) -> Option<&A> {
        self.as_slice().last()
    }

    /// Iterates over the elements.
    pub fn iter(&self) -> std::slice::Iter<'_, A> {
        self.as_slice().iter()
    }

    /// Maps every element into a new chunk.
    #[must_use]
    pub fn map<B, F>(&self, f: F) -> Chunk<B>
    where
        F: FnMut(&A) -> B,
    {
        Chunk::from_vec(self.iter().map(f).collect())
    }

    /// Maps every element to a chunk and concatenates the results.
    #[must_use]
    pub fn flat_map<B: Clone, F>(&self, mut f: F) -> Chunk<B>
    where
        F: FnMut(&A) -> Chunk<B>,
    {
        let parts: Vec<Chunk<B>> = self.iter().map(&mut f).collect();
        Chunk::concat(&parts)
    }

    /// Left fold over the elements.
    pub fn fold<B, F>(&self, init: B, f: F) -> B
    where
        F: FnMut(B, &A) -> B,
    {
        self.iter().fold(init, f)
    }

    /// Index of the first element satisfying `pred`.
    pub fn index_of_first<F>(&self, pred: F) -> Option<usize>
    where
        F: FnMut(&A) -> bool,
    {
        self.iter().position(pred)
    }

    /// True if every element satisfies `pred` (vacuously true when empty).
    pub fn all<F>(&self, pred: F) -> bool
    where
        F: FnMut(&A) -> bool,
    {
        self.iter().all(pred)
    }

    /// True if any element satisfies `pred`.
    pub fn any<F>(&self, pred: F) -> bool
    where
        F: FnMut(&A) -> bool,
    {
        self.iter().any(pred)
    }

    /// Pairs elements positionally, truncating to the shorter chunk.
    #[must_use]
    pub fn zip_with<B, C, F>(&self, other: &Chunk<B>, mut f: F) -> Chunk<C>
    where
        F: FnMut(&A, &B) -> C,
    {
        Chunk::from_vec(
            self.iter()
                .zip(other.iter())
                .map(|(a, b)| f(a, b))
                .collect(),
        )
    }

    /// Threads a state through the elements, emitting one output per input.
    #[must_use]
    pub fn map_accumulate<S, B, F>(&self, init: S, mut f: F) -> (S, Chunk<B>)
    where
        F: FnMut(S, &A) -> (S, B),
    {
        let mut state = init;
        let mut out = Vec::with_capacity(self.len());
        for a in self.iter() {
            let (next, b) = f(state, a);
            state = next;
            out.push(b);
        }
        (state, Chunk::from_vec(out))
    }
}

impl<A: Clone> Chunk<A> {
    /// Copies a slice into a new chunk.
    #[must_use]
    pub fn from_slice(values: &[A]) -> Self {
        match values {
            [] => Self::empty(),
            [one] => Self::singleton(one.clone()),
            _ => Self::from_vec(values.to_vec()),
        }
    }

    /// Concatenates chunks, copying at most once.
    #[must_use]
    pub fn concat(chunks: &[Self]) -> Self {
        let mut non_empty = chunks.iter().filter(|c| !c.is_empty());
        let Some(first) = non_empty.next() else {
            return Self::empty();
        };
        let rest: Vec<&Self> = non_empty.collect();
        if rest.is_empty() {
            return first.clone();
        }
        let total = first.len() + rest.iter().map(|c| c.len()).sum::<usize>();
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(first.as_slice());
        for c in rest {
            out.extend_from_slice(c.as_slice());
        }
        Self::from_vec(out)
    }

    /// Copies the elements into a vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<A> {
        self.as_slice().to_vec()
    }

    fn slice(&self, start: usize, end: usize) -> Self {
        let len = self.len();
        let end = end.min(len);
        let start = start.min(end);
        if start == 0 && end == len {
            return self.clone();
        }
        if start == end {
            return Self::empty();
        }
        match &self.repr {
            Repr::Slice { data, offset, .. } => Self {
                repr: Repr::Slice {
                    data: Arc::clone(data),
                    offset: offset + start,
                    len: end - start,
                },
            },
            // Empty and Single are fully covered by the two early returns.
            Repr::Empty | Repr::Single(_) => Self::empty(),
        }
    }

    /// The first `n` elements. `take(len)` returns the same chunk.
    #[must_use]
    pub fn take(&self, n: usize) -> Self {
        self.slice(0, n)
    }

    /// All but the first `n` elements.
    #[must_use]
    pub fn drop(&self, n: usize) -> Self {
        self.slice(n, self.len())
    }

    /// The last `n` elements.
    #[must_use]
    pub fn take_last(&self, n: usize) -> Self {
        let len = self.len();
        self.slice(len.saturating_sub(n), len)
    }

    /// All but the last `n` elements.
    #[must_use]
    pub fn drop_last(&self, n: usize) -> Self {
        self.slice(0, self.len().saturating_sub(n))
    }

    /// Splits into `(take(n), drop(n))`.
    #[must_use]
    pub fn split_at(&self, n: usize) -> (Self, Self) {
        (self.take(n), self.drop(n))
    }

    /// All but the first element.
    #[must_use]
    pub fn tail(&self) -> Self {
        self.drop(1)
    }

    /// Keeps the elements that satisfy `pred`.
    #[must_use]
    pub fn filter<F>(&self, mut pred: F) -> Self
    where
        F: FnMut(&A) -> bool,
    {
        if self.all(&mut pred) {
            return self.clone();
        }
        Self::from_vec(self.iter().filter(|a| pred(a)).cloned().collect())
    }

    /// Pairs elements positionally, truncating to the shorter chunk.
    #[must_use]
    pub fn zip<B: Clone>(&self, other: &Chunk<B>) -> Chunk<(A, B)> {
        self.zip_with(other, |a, b| (a.clone(), b.clone()))
    }

    /// Running fold: every intermediate accumulator, plus the final one.
    ///
    /// The emitted chunk does not include `init`.
    #[must_use]
    pub fn scan_left<B: Clone, F>(&self, init: B, mut f: F) -> (Chunk<B>, B)
    where
        F: FnMut(&B, &A) -> B,
    {
        let mut acc = init;
        let mut out = Vec::with_capacity(self.len());
        for a in self.iter() {
            acc = f(&acc, a);
            out.push(acc.clone());
        }
        (Chunk::from_vec(out), acc)
    }
}

impl<A> Default for Chunk<A> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<A> From<Vec<A>> for Chunk<A> {
    fn from(values: Vec<A>) -> Self {
        Self::from_vec(values)
    }
}

impl<A> FromIterator<A> for Chunk<A> {
    fn from_iter<I: IntoIterator<Item = A>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<'a, A> IntoIterator for &'a Chunk<A> {
    type Item = &'a A;
    type IntoIter = std::slice::Iter<'a, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<A: PartialEq> PartialEq for Chunk<A> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<A: Eq> Eq for Chunk<A> {}

impl<A: fmt::Debug> fmt::Debug for Chunk<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Chunk")?;
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(values: &[i32]) -> Chunk<i32> {
        Chunk::from_slice(values)
    }

    #[test]
    fn take_and_drop_clamp() {
        let c = chunk(&[1, 2, 3]);
        assert_eq!(c.take(10).to_vec(), vec![1, 2, 3]);
        assert_eq!(c.drop(10).len(), 0);
        assert_eq!(c.take_last(2).to_vec(), vec![2, 3]);
        assert_eq!(c.drop_last(5).len(), 0);
        assert_eq!(c.drop_last(1).to_vec(), vec![1, 2]);
    }

    #[test]
    fn take_full_length_shares_storage() {
        let c = chunk(&[1, 2, 3, 4]);
        let same = c.take(4);
        assert_eq!(same, c);
        let (Repr::Slice { data: a, .. }, Repr::Slice { data: b, .. }) = (&c.repr, &same.repr)
        else {
            panic!("expected slice representation");
        };
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn slices_of_slices_keep_offsets() {
        let c = Chunk::from_vec((0..10).collect::<Vec<i32>>());
        let middle = c.drop(2).take(5).drop(1);
        assert_eq!(middle.to_vec(), vec![3, 4, 5, 6]);
        assert_eq!(middle.get(0), Some(&3));
        assert_eq!(middle.get(4), None);
        assert_eq!(middle.last(), Some(&6));
    }

    #[test]
    fn concat_skips_empty_and_reuses_single() {
        let a = chunk(&[1, 2]);
        let joined = Chunk::concat(&[Chunk::empty(), a.clone(), Chunk::empty()]);
        assert_eq!(joined, a);

        let all = Chunk::concat(&[a, chunk(&[3]), chunk(&[4, 5])]);
        assert_eq!(all.to_vec(), vec![1, 2, 3, 4, 5]);
        assert!(Chunk::<i32>::concat(&[]).is_empty());
    }

    #[test]
    fn filter_map_zip() {
        let c = chunk(&[1, 2, 3, 4]);
        assert_eq!(c.filter(|x| x % 2 == 0).to_vec(), vec![2, 4]);
        assert_eq!(c.map(|x| x * 10).to_vec(), vec![10, 20, 30, 40]);
        let z = c.zip_with(&chunk(&[5, 6]), |a, b| a + b);
        assert_eq!(z.to_vec(), vec![6, 8]);
        assert_eq!(c.zip(&chunk(&[9])).to_vec(), vec![(1, 9)]);
    }

    #[test]
    fn folds_and_scans() {
        let c = chunk(&[1, 2, 3]);
        assert_eq!(c.fold(0, |acc, x| acc + x), 6);
        let (scanned, last) = c.scan_left(0, |acc, x| acc + x);
        assert_eq!(scanned.to_vec(), vec![1, 3, 6]);
        assert_eq!(last, 6);
        let (state, out) = c.map_accumulate(10, |s, x| (s + x, s * x));
        assert_eq!(state, 16);
        assert_eq!(out.to_vec(), vec![10, 22, 39]);
    }

    #[test]
    fn queries() {
        let c = chunk(&[4, 5, 6]);
        assert_eq!(c.index_of_first(|x| *x > 4), Some(1));
        assert!(c.all(|x| *x > 3));
        assert!(c.any(|x| *x == 6));
        assert_eq!(c.first(), Some(&4));
        assert_eq!(c.tail().to_vec(), vec![5, 6]);
        let (l, r) = c.split_at(1);
        assert_eq!((l.to_vec(), r.to_vec()), (vec![4], vec![5, 6]));
    }

    #[test]
    fn flat_map_concatenates() {
        let c = chunk(&[1, 2]);
        let out = c.flat_map(|x| Chunk::from_vec(vec![*x; *x as usize]));
        assert_eq!(out.to_vec(), vec![1, 2, 2]);
    }

    #[test]
    fn debug_format() {
        assert_eq!(format!("{:?}", chunk(&[1, 2])), "Chunk[1, 2]");
        assert_eq!(format!("{:?}", Chunk::<i32>::empty()), "Chunk[]");
    }
}
