//! Scope records stored in the tree arena.

use super::interrupt::InterruptContext;
use super::resource::ScopedResource;
use crate::types::ScopeId;
use smallvec::SmallVec;
use std::sync::Arc;

/// Where a scope sits relative to the interpreter that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Root of a top-level compilation, or a freestanding root.
    Root,
    /// Root of a forked interpretation (a concurrent inner stream).
    Forked,
    /// A nested scope.
    Child,
}

impl ScopeKind {
    /// Roots are never closed by a `CloseScope` step.
    #[must_use]
    pub const fn is_root(self) -> bool {
        matches!(self, Self::Root | Self::Forked)
    }
}

/// Immutable identity of a scope. Outlives the scope's record.
#[derive(Debug)]
pub(crate) struct ScopeNode {
    pub(crate) id: ScopeId,
    /// Relation only: the parent's resources live in its record.
    pub(crate) parent: Option<Arc<ScopeNode>>,
    pub(crate) interrupt: Option<Arc<InterruptContext>>,
    pub(crate) kind: ScopeKind,
}

impl ScopeNode {
    /// True when this node owns its interrupt context rather than sharing
    /// the parent's.
    pub(crate) fn owns_interrupt(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|ctx| ctx.root() == self.id)
    }
}

/// Mutable state of an open scope. Present in the arena iff the scope is open.
#[derive(Debug)]
pub(crate) struct ScopeRecord {
    pub(crate) node: Arc<ScopeNode>,
    /// Open children, in creation order.
    pub(crate) children: SmallVec<[ScopeId; 4]>,
    /// Registered resources, in acquisition order.
    pub(crate) resources: Vec<Arc<ScopedResource>>,
}

impl ScopeRecord {
    pub(crate) fn new(node: Arc<ScopeNode>) -> Self {
        Self {
            node,
            children: SmallVec::new(),
            resources: Vec::new(),
        }
    }

    pub(crate) fn unregister_child(&mut self, id: ScopeId) {
        if let Some(pos) = self.children.iter().position(|c| *c == id) {
            self.children.remove(pos);
        }
    }

    pub(crate) fn unregister_resource(&mut self, resource: &Arc<ScopedResource>) {
        self.resources.retain(|r| !Arc::ptr_eq(r, resource));
    }
}
