//! Stepping several pulls side by side.

use super::compile::StepOut;
use super::Pull;
use crate::chunk::Chunk;
use crate::scope::Scope;
use crate::stream::Stream;
use crate::types::{Element, ScopeId};
use core::fmt;

/// One leg of a pull that is being stepped alongside others.
///
/// Unlike [`Pull::uncons`], a leg remembers the scope its pull was left in.
/// Each leg of a zip keeps its own resources open while the caller
/// interleaves the legs, and stepping one leg never closes the other's
/// scopes.
#[derive(Clone)]
pub struct StepLeg<O> {
    head: Chunk<O>,
    scope: ScopeId,
    next: Pull<O, ()>,
}

impl<O: Element> StepLeg<O> {
    /// The chunk this step produced.
    #[must_use]
    pub fn head(&self) -> &Chunk<O> {
        &self.head
    }

    /// The scope the leg's pull was in after this step.
    #[must_use]
    pub fn scope_id(&self) -> ScopeId {
        self.scope
    }

    /// Replaces the head, for a caller that consumed only part of it.
    #[must_use]
    pub fn set_head(self, head: Chunk<O>) -> Self {
        Self { head, ..self }
    }

    /// Steps the leg to its next chunk, or `None` at the end.
    #[must_use]
    pub fn step_leg<P: Element>(self) -> Pull<P, Option<Self>> {
        self.next
            .step(Some(self.scope))
            .map(|step: Option<StepOut<O>>| {
                step.map(|s| StepLeg {
                    head: s.head,
                    scope: s.scope,
                    next: s.tail,
                })
            })
    }

    /// The rest of the leg as a plain pull, without the current head.
    ///
    /// Only valid once this is the last leg being stepped.
    #[must_use]
    pub fn pull(self) -> Pull<O, ()> {
        Pull::repeat_pull(self.set_head(Chunk::empty()), |leg: Self| {
            Pull::output(leg.head.clone()).then(leg.step_leg())
        })
        .void()
    }

    /// Like [`StepLeg::pull`], as a stream.
    #[must_use]
    pub fn stream(self) -> Stream<O> {
        self.pull().stream()
    }
}

impl<O> fmt::Debug for StepLeg<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepLeg")
            .field("head_len", &self.head.len())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl<O: Element> Pull<O, ()> {
    /// Like [`Pull::uncons`], keeping track of the scope the pull is left
    /// in. Use this instead of `uncons` to interleave several pulls.
    #[must_use]
    pub fn step_leg<P: Element>(self) -> Pull<P, Option<StepLeg<O>>> {
        Pull::<P, Scope>::get_scope().flat_map(move |scope| {
            StepLeg {
                head: Chunk::empty(),
                scope: scope.id(),
                next: self.clone(),
            }
            .step_leg()
        })
    }
}
