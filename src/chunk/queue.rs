//! A persistent queue of chunks with O(1) size tracking.

use super::Chunk;
use std::collections::VecDeque;

/// An immutable-by-convention queue of chunks.
///
/// Used to buffer the tail of a stream (`take_last`, `drop_last`) without
/// flattening every chunk as it arrives.
#[derive(Clone, Debug)]
pub struct ChunkQueue<A> {
    chunks: VecDeque<Chunk<A>>,
    size: usize,
}

impl<A: Clone> ChunkQueue<A> {
    /// The empty queue.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            chunks: VecDeque::new(),
            size: 0,
        }
    }

    /// Total number of elements across all chunks.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns true when no elements are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The queued chunks, oldest first.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk<A>> {
        self.chunks.iter()
    }

    /// Appends a chunk. Empty chunks are ignored.
    #[must_use]
    pub fn enqueue(mut self, chunk: Chunk<A>) -> Self {
        if !chunk.is_empty() {
            self.size += chunk.len();
            self.chunks.push_back(chunk);
        }
        self
    }

    /// Keeps the first `n` elements.
    #[must_use]
    pub fn take(self, n: usize) -> Self {
        if n >= self.size {
            return self;
        }
        let mut out = Self::empty();
        let mut remaining = n;
        for chunk in self.chunks {
            if remaining == 0 {
                break;
            }
            let part = chunk.take(remaining);
            remaining -= part.len();
            out = out.enqueue(part);
        }
        out
    }

    /// Keeps the last `n` elements.
    #[must_use]
    pub fn take_last(self, n: usize) -> Self {
        let skip = self.size.saturating_sub(n);
        self.drop(skip)
    }

    /// Removes the first `n` elements.
    #[must_use]
    pub fn drop(mut self, n: usize) -> Self {
        let mut remaining = n;
        while remaining > 0 {
            let Some(head) = self.chunks.pop_front() else {
                break;
            };
            if head.len() <= remaining {
                remaining -= head.len();
                self.size -= head.len();
            } else {
                let rest = head.drop(remaining);
                self.size -= remaining;
                remaining = 0;
                self.chunks.push_front(rest);
            }
        }
        self
    }

    /// Removes the last `n` elements.
    #[must_use]
    pub fn drop_last(self, n: usize) -> Self {
        let keep = self.size.saturating_sub(n);
        self.take(keep)
    }

    /// Flattens the queue into one chunk.
    #[must_use]
    pub fn to_chunk(&self) -> Chunk<A> {
        let parts: Vec<Chunk<A>> = self.chunks.iter().cloned().collect();
        Chunk::concat(&parts)
    }
}

impl<A: Clone> Default for ChunkQueue<A> {
    fn default() -> Self {
        Self::empty()
    }
}
