//! Interrupt contexts.
//!
//! An interruptible scope owns an [`InterruptContext`]. Contexts form their
//! own tree: setting a cause on a context pushes the same cause to every
//! live child context, never to the parent. The cause is write-once.

use crate::error::Error;
use crate::sync::Notify;
use crate::types::ScopeId;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock, Weak};

/// Why a scope was interrupted.
#[derive(Debug, Clone)]
pub enum InterruptCause {
    /// Plain interruption; evaluation resumes after the scope with this id
    /// has been closed.
    Scope(ScopeId),
    /// Interruption carrying an error that fails the stream.
    Error(Error),
}

#[derive(Debug)]
pub(crate) struct InterruptContext {
    /// Scope that owns this context; the resume point for plain interrupts.
    root: ScopeId,
    cause: OnceLock<InterruptCause>,
    notify: Notify,
    parent: Option<Arc<InterruptContext>>,
    children: Mutex<Vec<Weak<InterruptContext>>>,
}

impl InterruptContext {
    /// A context that is not chained to any parent.
    pub(crate) fn new(root: ScopeId) -> Arc<Self> {
        Arc::new(Self {
            root,
            cause: OnceLock::new(),
            notify: Notify::new(),
            parent: None,
            children: Mutex::new(Vec::new()),
        })
    }

    /// A context that observes `parent`'s interruption.
    pub(crate) fn child_of(parent: &Arc<Self>, root: ScopeId) -> Arc<Self> {
        let ctx = Arc::new(Self {
            root,
            cause: OnceLock::new(),
            notify: Notify::new(),
            parent: Some(Arc::clone(parent)),
            children: Mutex::new(Vec::new()),
        });
        let mut children = parent.children.lock();
        if let Some(cause) = parent.cause.get() {
            drop(children);
            ctx.set(cause.clone());
        } else {
            children.retain(|w| w.strong_count() > 0);
            children.push(Arc::downgrade(&ctx));
        }
        ctx
    }

    pub(crate) const fn root(&self) -> ScopeId {
        self.root
    }

    pub(crate) fn cause(&self) -> Option<InterruptCause> {
        self.cause.get().cloned()
    }

    /// Sets the cause if unset and propagates it downwards.
    ///
    /// Returns false if the context was already interrupted.
    pub(crate) fn set(&self, cause: InterruptCause) -> bool {
        if self.cause.set(cause.clone()).is_err() {
            return false;
        }
        self.notify.notify_waiters();
        let children: Vec<Weak<Self>> = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.set(cause.clone());
        }
        true
    }

    /// Stops listening to the parent context.
    pub(crate) fn detach(self: &Arc<Self>) {
        if let Some(parent) = &self.parent {
            let me = Arc::downgrade(self);
            parent.children.lock().retain(|w| !w.ptr_eq(&me));
        }
    }

    /// Resolves once a cause is set.
    pub(crate) async fn interrupted(&self) -> InterruptCause {
        loop {
            let wait = self.notify.notified();
            if let Some(cause) = self.cause.get() {
                return cause.clone();
            }
            wait.await;
        }
    }
}
