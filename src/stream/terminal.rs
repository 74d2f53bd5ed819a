//! Terminal operations: running a stream.

use super::Stream;
use crate::chunk::Chunk;
use crate::error::{Error, Result};
use crate::pull::compile::run_root;
use crate::pull::Pull;
use crate::runtime::Executor;
use crate::types::Element;
use std::collections::HashSet;
use std::hash::Hash;

/// A stream bound to an executor, ready to run.
///
/// Every method runs the stream from the start under a fresh root scope.
/// The root scope is closed before the method returns, so every resource
/// the stream acquired has been released by then.
#[derive(Debug)]
pub struct Compiled<O> {
    stream: Stream<O>,
    executor: Executor,
}

impl<O: Element> Compiled<O> {
    /// Folds every chunk the stream emits into `init`.
    ///
    /// This is the primitive the other terminal operations are built on.
    pub async fn fold_chunks<B, F>(self, init: B, f: F) -> Result<B>
    where
        F: FnMut(B, Chunk<O>) -> B,
    {
        let mut f = f;
        let folded = run_root(self.executor, self.stream.pull.node, Some(init), |acc, chunk| {
            *acc = acc.take().map(|b| f(b, chunk));
        })
        .await?;
        folded.ok_or_else(|| Error::internal("fold accumulator lost"))
    }

    /// Folds every element into `init`.
    pub async fn fold<B, F>(self, init: B, f: F) -> Result<B>
    where
        F: FnMut(B, &O) -> B,
    {
        let mut f = f;
        self.fold_chunks(init, |acc, chunk| chunk.iter().fold(acc, &mut f))
            .await
    }

    /// Runs the stream for its effects only.
    pub async fn drain(self) -> Result<()> {
        self.fold_chunks((), |(), _| ()).await
    }

    /// Collects every element.
    pub async fn to_vec(self) -> Result<Vec<O>> {
        self.fold_chunks(Vec::new(), |mut out, chunk| {
            out.extend(chunk.iter().cloned());
            out
        })
        .await
    }

    /// Collects every element into one chunk.
    pub async fn to_chunk(self) -> Result<Chunk<O>> {
        let chunks = self
            .fold_chunks(Vec::new(), |mut out, chunk| {
                out.push(chunk);
                out
            })
            .await?;
        Ok(Chunk::concat(&chunks))
    }

    /// Collects the distinct elements.
    pub async fn to_set(self) -> Result<HashSet<O>>
    where
        O: Eq + Hash,
    {
        self.fold(HashSet::new(), |mut set, o| {
            set.insert(o.clone());
            set
        })
        .await
    }

    /// The last element, if any.
    pub async fn last(self) -> Result<Option<O>> {
        self.fold_chunks(None, |last, chunk| chunk.last().cloned().or(last))
            .await
    }

    /// The first element, if any. The rest of the stream is not run.
    pub async fn first(self) -> Result<Option<O>> {
        Compiled {
            stream: self.stream.take(1),
            executor: self.executor,
        }
        .last()
        .await
    }

    /// The pull the stream is built from, for driving it step by step
    /// under another stream's interpretation.
    #[must_use]
    pub fn pull(self) -> Pull<O, ()> {
        self.stream.pull
    }
}

impl<O: Element> Stream<O> {
    /// Binds this stream to `executor` for running.
    #[must_use]
    pub fn compile(self, executor: &Executor) -> Compiled<O> {
        Compiled {
            stream: self,
            executor: executor.clone(),
        }
    }

    /// Runs this stream and collects every element.
    pub async fn to_list(self, executor: &Executor) -> Result<Vec<O>> {
        self.compile(executor).to_vec().await
    }
}
