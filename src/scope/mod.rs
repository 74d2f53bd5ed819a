//! The scope tree: resource ownership and interruption.
//!
//! Every compilation creates one root [`Scope`]. The interpreter opens child
//! scopes as it enters `scope`/`interrupt_scope`/`bracket` regions and
//! closes them when the region ends. Each scope owns the resources acquired
//! while it was current.
//!
//! # Layout
//!
//! Open scopes live as [`ScopeRecord`](record::ScopeRecord)s in an arena
//! shared by the whole tree. A record holds the scope's children and
//! resources and is removed when the scope closes, so "open" simply means
//! "has a record". The immutable identity of a scope (id, parent link,
//! interrupt context) lives in a reference-counted node that outlives the
//! record, which lets the interpreter resolve ancestry of scopes that are
//! already closed.
//!
//! # Closing
//!
//! Closing a scope removes its record, closes its open children newest
//! first, then releases its resources newest first. Every error raised on
//! the way is collected; the first is returned with the rest suppressed.
//!
//! # Interruption
//!
//! Interruptible scopes own an interrupt context chained to their parent's.
//! Interrupting a scope marks its context and all descendant contexts; it
//! never runs finalizers. The interpreter observes the mark at its next
//! suspension point and unwinds through ordinary closes.

mod interrupt;
mod record;
mod resource;

pub use interrupt::InterruptCause;
pub use record::ScopeKind;

pub(crate) use interrupt::InterruptContext;
pub(crate) use resource::{run_finalizer, Finalizer, ScopedResource};

use crate::combinator::{race, RaceResult};
use crate::error::{Error, ErrorKind, Result};
use crate::pull::algebra::{AcquireFn, EvalFn, Value};
use crate::runtime::{BoxFuture, Executor, StreamConfig};
use crate::tracing_compat::{debug, trace, warn};
use crate::types::{ExitCase, ScopeId};
use crate::util::{guard, Arena};
use core::fmt;
use parking_lot::Mutex;
use record::{ScopeNode, ScopeRecord};
use resource::ResourceLease;
use std::sync::Arc;

pub(crate) struct ScopeTree {
    records: Mutex<Arena<ScopeRecord>>,
    executor: Executor,
}

/// Handle to a scope in a scope tree.
///
/// Cheap to clone. A handle stays valid after the scope closes; queries on a
/// closed scope report it as closed.
#[derive(Clone)]
pub struct Scope {
    tree: Arc<ScopeTree>,
    node: Arc<ScopeNode>,
}

/// Outcome of an effect evaluated under a scope's interrupt context.
pub(crate) enum EvalOutcome {
    Done(Value),
    Failed(Error),
    Interrupted(ScopeId),
}

impl From<InterruptCause> for EvalOutcome {
    fn from(cause: InterruptCause) -> Self {
        match cause {
            InterruptCause::Scope(id) => Self::Interrupted(id),
            InterruptCause::Error(e) => Self::Failed(e),
        }
    }
}

impl Scope {
    /// Creates the root of a new tree.
    pub(crate) fn new_root(executor: Executor) -> Self {
        let tree = Arc::new(ScopeTree {
            records: Mutex::new(Arena::new()),
            executor,
        });
        let node = tree.insert(None, None, ScopeKind::Root);
        trace!(scope = %node.id, "root scope opened");
        Self { tree, node }
    }

    /// This scope's id.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.node.id
    }

    /// Root, forked root or nested scope.
    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        self.node.kind
    }

    /// Id of the parent scope, if any.
    #[must_use]
    pub fn parent_id(&self) -> Option<ScopeId> {
        self.node.parent.as_ref().map(|p| p.id)
    }

    /// The executor the tree was compiled with.
    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.tree.executor
    }

    /// The executor's configuration.
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        self.tree.executor.config()
    }

    /// Returns true until the scope has been closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.tree.records.lock().contains(self.id().arena_index())
    }

    /// Returns true once an interrupt reached this scope's context.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interruption_cause().is_some()
    }

    /// The cause of interruption, if interrupted.
    #[must_use]
    pub fn interruption_cause(&self) -> Option<InterruptCause> {
        self.node.interrupt.as_ref().and_then(|ctx| ctx.cause())
    }

    /// Interrupts evaluation of this scope and its descendants.
    ///
    /// `Ok(())` interrupts quietly: evaluation resumes after the interrupt
    /// root has closed. `Err(e)` makes the stream fail with `e`. Fails if the
    /// scope has no interrupt context (only roots lack one).
    pub fn interrupt(&self, cause: Result<()>) -> Result<()> {
        let Some(ctx) = &self.node.interrupt else {
            return Err(Error::internal(format!(
                "scope {} cannot be interrupted",
                self.id()
            )));
        };
        let cause = match cause {
            Ok(()) => InterruptCause::Scope(ctx.root()),
            Err(e) => InterruptCause::Error(e),
        };
        debug!(scope = %self.id(), cause = ?cause, "interrupting scope");
        ctx.set(cause);
        Ok(())
    }

    /// Closest open scope among this scope and its ancestors, stopping at
    /// the interpreter root.
    #[must_use]
    pub fn open_ancestor(&self) -> Self {
        let records = self.tree.records.lock();
        let mut current = Arc::clone(&self.node);
        loop {
            if current.kind.is_root() {
                return self.with_node(current);
            }
            match &current.parent {
                Some(parent) => {
                    let parent = Arc::clone(parent);
                    if records.contains(parent.id.arena_index()) || parent.kind.is_root() {
                        return self.with_node(parent);
                    }
                    current = parent;
                }
                None => return self.with_node(current),
            }
        }
    }

    /// Root of the interpretation this scope belongs to.
    #[must_use]
    pub fn root(&self) -> Self {
        let mut current = Arc::clone(&self.node);
        while !current.kind.is_root() {
            match &current.parent {
                Some(parent) => current = Arc::clone(parent),
                None => break,
            }
        }
        self.with_node(current)
    }

    /// This scope or the ancestor with the given id, open or not.
    #[must_use]
    pub fn find_self_or_ancestor(&self, id: ScopeId) -> Option<Self> {
        let mut current = Some(Arc::clone(&self.node));
        while let Some(node) = current {
            if node.id == id {
                return Some(self.with_node(node));
            }
            current = node.parent.clone();
        }
        None
    }

    /// This scope or an open descendant with the given id.
    pub(crate) fn find_self_or_child(&self, id: ScopeId) -> Option<Self> {
        if self.id() == id {
            return Some(self.clone());
        }
        let records = self.tree.records.lock();
        let mut stack: Vec<ScopeId> = records
            .get(self.id().arena_index())
            .map(|r| r.children.to_vec())
            .unwrap_or_default();
        while let Some(child) = stack.pop() {
            let Some(record) = records.get(child.arena_index()) else {
                continue;
            };
            if child == id {
                return Some(self.with_node(Arc::clone(&record.node)));
            }
            stack.extend(record.children.iter().copied());
        }
        None
    }

    /// Locates the scope a step should run in: this scope, a relative
    /// reachable from the parent, or anything under the interpreter root.
    pub(crate) fn find_step_scope(&self, id: ScopeId) -> Option<Self> {
        if self.id() == id {
            return Some(self.clone());
        }
        if self.kind().is_root() {
            return self.find_self_or_child(id);
        }
        let parent = self
            .node
            .parent
            .as_ref()
            .map(|p| self.with_node(Arc::clone(p)));
        parent
            .and_then(|p| p.find_self_or_child(id))
            .or_else(|| self.root().find_self_or_child(id))
    }

    /// Opens a child scope.
    ///
    /// If this scope is closed the child is opened on the nearest open
    /// ancestor. If the whole chain is closed, a freestanding root is
    /// created so evaluation can make progress.
    pub(crate) fn open(&self, interruptible: bool) -> Self {
        let mut records = self.tree.records.lock();
        let mut target = Some(Arc::clone(&self.node));
        while let Some(node) = &target {
            if records.contains(node.id.arena_index()) {
                break;
            }
            target = node.parent.clone();
        }
        let Some(parent) = target else {
            drop(records);
            let node = self.tree.insert(None, None, ScopeKind::Root);
            warn!(scope = %node.id, closed = %self.id(), "opened freestanding root: scope chain closed");
            return self.with_node(node);
        };

        let index = records.insert_with(|idx| {
            let id = ScopeId::from_arena(idx);
            let interrupt = Some(match &parent.interrupt {
                None => InterruptContext::new(id),
                Some(ctx) if interruptible => InterruptContext::child_of(ctx, id),
                Some(ctx) => Arc::clone(ctx),
            });
            ScopeRecord::new(Arc::new(ScopeNode {
                id,
                parent: Some(Arc::clone(&parent)),
                interrupt,
                kind: ScopeKind::Child,
            }))
        });
        let child = ScopeId::from_arena(index);
        let node = records
            .get(index)
            .map(|r| Arc::clone(&r.node))
            .unwrap_or_else(|| unreachable!("record inserted under the same lock"));
        if let Some(p) = records.get_mut(parent.id.arena_index()) {
            p.children.push(child);
        }
        drop(records);
        trace!(scope = %child, parent = %parent.id, interruptible, "scope opened");
        self.with_node(node)
    }

    /// Creates the root of a forked interpretation.
    ///
    /// The forked root is not registered as a child: its interpreter closes
    /// it. It keeps this scope as parent for ancestry lookups, and its
    /// interrupt context follows this scope's.
    pub(crate) fn fork(&self) -> Self {
        let mut records = self.tree.records.lock();
        let index = records.insert_with(|idx| {
            let id = ScopeId::from_arena(idx);
            let interrupt = Some(match &self.node.interrupt {
                Some(ctx) => InterruptContext::child_of(ctx, id),
                None => InterruptContext::new(id),
            });
            ScopeRecord::new(Arc::new(ScopeNode {
                id,
                parent: Some(Arc::clone(&self.node)),
                interrupt,
                kind: ScopeKind::Forked,
            }))
        });
        let node = records
            .get(index)
            .map(|r| Arc::clone(&r.node))
            .unwrap_or_else(|| unreachable!("record inserted under the same lock"));
        drop(records);
        debug!(scope = %node.id, parent = %self.id(), "forked interpretation");
        self.with_node(node)
    }

    /// Closes this scope with `exit`. Closing twice is a no-op.
    pub(crate) fn close(&self, exit: ExitCase) -> BoxFuture<'static, Result<()>> {
        let this = self.clone();
        Box::pin(async move { this.close_now(exit).await })
    }

    async fn close_now(&self, exit: ExitCase) -> Result<()> {
        let record = {
            let mut records = self.tree.records.lock();
            let Some(record) = records.remove(self.id().arena_index()) else {
                return Ok(());
            };
            if self.kind() == ScopeKind::Child {
                if let Some(parent) = &self.node.parent {
                    if let Some(p) = records.get_mut(parent.id.arena_index()) {
                        p.unregister_child(self.id());
                    }
                }
            }
            record
        };
        trace!(scope = %self.id(), exit_case = %exit, "closing scope");

        let mut errors = Vec::new();
        for child in record.children.iter().rev() {
            let Some(child) = self.tree.lookup(*child) else {
                continue;
            };
            if let Err(e) = self.with_node(child).close(exit.clone()).await {
                errors.push(e);
            }
        }
        for resource in record.resources.iter().rev() {
            if let Err(e) = resource.release(exit.clone()).await {
                errors.push(e);
            }
        }
        if self.node.owns_interrupt() {
            if let Some(ctx) = &self.node.interrupt {
                ctx.detach();
            }
        }
        match Error::compose_all(errors, self.config().max_suppressed) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Runs `acquire` and registers its finalizer in this scope.
    ///
    /// The resource is registered before `acquire` runs. If the scope closes
    /// while `acquire` is in flight, the finalizer runs immediately with
    /// [`ExitCase::Cancelled`] and a [`ErrorKind::ScopeClosed`] error is
    /// returned. Errors returned by `acquire` pass through unchanged; panics
    /// become [`ErrorKind::ResourceAcquisition`].
    pub(crate) async fn acquire_resource(&self, acquire: &AcquireFn) -> Result<Value> {
        let resource = ScopedResource::new();
        {
            let mut records = self.tree.records.lock();
            match records.get_mut(self.id().arena_index()) {
                Some(record) => record.resources.push(Arc::clone(&resource)),
                None => return Err(Error::scope_closed(self.id())),
            }
        }
        let acquired = match guard::call(ErrorKind::ResourceAcquisition, || acquire()) {
            Ok(fut) => guard::poll(ErrorKind::ResourceAcquisition, fut).await,
            Err(e) => Err(e),
        };
        match acquired {
            Err(e) => {
                if let Some(record) = self.tree.records.lock().get_mut(self.id().arena_index()) {
                    record.unregister_resource(&resource);
                }
                Err(e)
            }
            Ok((value, finalizer)) => match resource.acquired(finalizer) {
                Ok(()) => {
                    trace!(scope = %self.id(), resource = %resource.id(), "resource acquired");
                    Ok(value)
                }
                Err(finalizer) => {
                    let closed = Error::scope_closed(self.id());
                    match run_finalizer(resource.id(), finalizer, ExitCase::Cancelled).await {
                        Ok(()) => Err(closed),
                        Err(e) => Err(closed.with_suppressed(e)),
                    }
                }
            },
        }
    }

    /// Evaluates an effect, racing it against this scope's interruption.
    ///
    /// An interrupted effect is dropped at its current await point.
    pub(crate) async fn interruptible_eval(&self, eval: &EvalFn) -> EvalOutcome {
        let ctx = self.node.interrupt.clone();
        if let Some(cause) = ctx.as_ref().and_then(|c| c.cause()) {
            return cause.into();
        }
        let effect = async {
            match guard::call(ErrorKind::Panicked, || eval()) {
                Ok(fut) => guard::poll(ErrorKind::Panicked, fut).await,
                Err(e) => Err(e),
            }
        };
        let result = match &ctx {
            None => effect.await,
            Some(ctx) => match race(effect, ctx.interrupted()).await {
                RaceResult::First(result) => result,
                RaceResult::Second(cause) => return cause.into(),
            },
        };
        match result {
            Ok(value) => EvalOutcome::Done(value),
            Err(e) => EvalOutcome::Failed(e),
        }
    }

    /// Leases the resources of this scope, its direct children and its
    /// ancestors up to the root of this interpretation. Returns `None` if
    /// this scope is closed.
    ///
    /// Scopes above a forked root are never leased. They belong to the
    /// forking interpretation, whose own finalizers wait for the fork.
    #[must_use]
    pub fn lease(&self) -> Option<Lease> {
        let records = self.tree.records.lock();
        let me = records.get(self.id().arena_index())?;
        let mut resources: Vec<Arc<ScopedResource>> = Vec::new();
        for child in &me.children {
            if let Some(record) = records.get(child.arena_index()) {
                resources.extend(record.resources.iter().cloned());
            }
        }
        resources.extend(me.resources.iter().cloned());
        let mut ancestor = if self.kind().is_root() {
            None
        } else {
            self.node.parent.clone()
        };
        while let Some(node) = ancestor {
            if let Some(record) = records.get(node.id.arena_index()) {
                resources.extend(record.resources.iter().cloned());
            }
            ancestor = if node.kind.is_root() {
                None
            } else {
                node.parent.clone()
            };
        }
        drop(records);
        Some(Lease {
            leases: resources.iter().filter_map(ScopedResource::lease).collect(),
            max_suppressed: self.config().max_suppressed,
        })
    }

    /// Number of resources currently registered in this scope.
    #[cfg(test)]
    pub(crate) fn resource_count(&self) -> usize {
        self.tree
            .records
            .lock()
            .get(self.id().arena_index())
            .map_or(0, |r| r.resources.len())
    }

    /// Ids of the open children, in creation order.
    #[cfg(test)]
    pub(crate) fn child_ids(&self) -> Vec<ScopeId> {
        self.tree
            .records
            .lock()
            .get(self.id().arena_index())
            .map(|r| r.children.to_vec())
            .unwrap_or_default()
    }

    fn with_node(&self, node: Arc<ScopeNode>) -> Self {
        Self {
            tree: Arc::clone(&self.tree),
            node,
        }
    }
}

impl ScopeTree {
    fn insert(
        &self,
        parent: Option<Arc<ScopeNode>>,
        interrupt: Option<Arc<InterruptContext>>,
        kind: ScopeKind,
    ) -> Arc<ScopeNode> {
        let mut records = self.records.lock();
        let index = records.insert_with(|idx| {
            ScopeRecord::new(Arc::new(ScopeNode {
                id: ScopeId::from_arena(idx),
                parent,
                interrupt,
                kind,
            }))
        });
        records
            .get(index)
            .map(|r| Arc::clone(&r.node))
            .unwrap_or_else(|| unreachable!("record inserted under the same lock"))
    }

    fn lookup(&self, id: ScopeId) -> Option<Arc<ScopeNode>> {
        self.records
            .lock()
            .get(id.arena_index())
            .map(|r| Arc::clone(&r.node))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("interruptible", &self.node.interrupt.is_some())
            .finish()
    }
}

/// Resources leased from a scope tree.
///
/// Leased resources stay usable after their scope closes; their finalizers
/// run when the last lease is cancelled.
pub struct Lease {
    leases: Vec<ResourceLease>,
    max_suppressed: usize,
}

impl Lease {
    /// Returns the leased resources, running finalizers whose scopes have
    /// already closed.
    pub async fn cancel(self) -> Result<()> {
        let mut errors = Vec::new();
        for lease in self.leases {
            if let Err(e) = lease.cancel().await {
                errors.push(e);
            }
        }
        match Error::compose_all(errors, self.max_suppressed) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("resources", &self.leases.len())
            .finish()
    }
}
