//! Pulls: the single-step algebra streams compile to.
//!
//! A [`Pull<O, R>`] outputs chunks of `O` and finishes with a result `R`, a
//! failure, or an interruption. Pulls are descriptions: building one runs no
//! effect, and interpreting the same pull twice runs its effects twice.
//!
//! Most users never touch pulls directly. They are the tool for writing
//! stream transformations that need to look at their input one chunk at a
//! time: see the step operations ([`Pull::uncons`], [`Pull::take`],
//! [`Pull::step_leg`] and friends) and [`Stream::to_pull`](crate::Stream::to_pull).
//!
//! ```ignore
//! // Emit the first chunk only.
//! fn first_chunk<O: Element>(p: Pull<O, ()>) -> Pull<O, ()> {
//!     p.uncons().flat_map(|step| match step {
//!         None => Pull::done(),
//!         Some((head, _tail)) => Pull::output(head),
//!     })
//! }
//! ```

pub(crate) mod algebra;
pub(crate) mod compile;
mod ops;
mod step_leg;

pub use ops::{ChunkStep, Uncons, Uncons1};
pub use step_leg::StepLeg;

use crate::chunk::Chunk;
use crate::error::{Error, Result};
use crate::runtime::BoxFuture;
use crate::scope::{Finalizer, Scope};
use crate::stream::Stream;
use crate::types::{Element, ExitCase, ScopeId};
use algebra::{map_output, take_value, AcquireFn, EvalFn, Instr, Node, Terminal, Value};
use core::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// A pull outputting `O` and finishing with `R`.
pub struct Pull<O, R> {
    pub(crate) node: Node<O>,
    _result: PhantomData<fn() -> R>,
}

impl<O: Clone, R> Clone for Pull<O, R> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            _result: PhantomData,
        }
    }
}

impl<O, R> fmt::Debug for Pull<O, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pull(..)")
    }
}

impl<O: Element, R: Element> Pull<O, R> {
    pub(crate) const fn from_node(node: Node<O>) -> Self {
        Self {
            node,
            _result: PhantomData,
        }
    }

    /// A pull that finishes with `r` without output.
    #[must_use]
    pub fn pure(r: R) -> Self {
        Self::from_node(Node::pure(Arc::new(r)))
    }

    /// A pull that fails with `e`.
    #[must_use]
    pub fn raise_error(e: Error) -> Self {
        Self::from_node(Node::fail(e))
    }

    /// Runs the effect `f` each time the pull is interpreted.
    ///
    /// The effect is raced against interruption of the current scope and is
    /// dropped at its next await point if the scope is interrupted.
    #[must_use]
    pub fn eval<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let eval: EvalFn = Arc::new(move || {
            let fut = f();
            Box::pin(async move { fut.await.map(|r| Arc::new(r) as Value) })
        });
        Self::from_node(Node::Instr(Instr::Eval(eval)))
    }

    /// Acquires a resource in the current scope. `release` runs when the
    /// scope closes.
    #[must_use]
    pub fn acquire<A, AFut, Rel, RFut>(acquire: A, release: Rel) -> Self
    where
        A: Fn() -> AFut + Send + Sync + 'static,
        AFut: Future<Output = Result<R>> + Send + 'static,
        Rel: Fn(R) -> RFut + Send + Sync + 'static,
        RFut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::acquire_case(acquire, move |r, _| release(r))
    }

    /// Like [`Pull::acquire`], handing the scope's exit case to `release`.
    #[must_use]
    pub fn acquire_case<A, AFut, Rel, RFut>(acquire: A, release: Rel) -> Self
    where
        A: Fn() -> AFut + Send + Sync + 'static,
        AFut: Future<Output = Result<R>> + Send + 'static,
        Rel: Fn(R, ExitCase) -> RFut + Send + Sync + 'static,
        RFut: Future<Output = Result<()>> + Send + 'static,
    {
        let release = Arc::new(release);
        let acquire: AcquireFn = Arc::new(move || {
            let fut = acquire();
            let release = Arc::clone(&release);
            Box::pin(async move {
                let r = fut.await?;
                let held = r.clone();
                let finalizer: Finalizer = Box::new(move |exit| {
                    Box::pin(release(held, exit)) as BoxFuture<'static, Result<()>>
                });
                Ok((Arc::new(r) as Value, finalizer))
            })
        });
        Self::from_node(Node::Instr(Instr::Acquire(acquire)))
    }

    /// Builds the pull lazily, each time it is interpreted.
    #[must_use]
    pub fn defer<F>(f: F) -> Self
    where
        F: Fn() -> Self + Send + Sync + 'static,
    {
        Self::from_node(Node::defer(move || f().node))
    }

    /// Loops `using`, feeding each result into the next iteration, until it
    /// finishes with `None`.
    #[must_use]
    pub fn repeat_pull<F>(init: R, using: F) -> Pull<O, Option<R>>
    where
        F: Fn(R) -> Pull<O, Option<R>> + Send + Sync + 'static,
    {
        repeat_pull_with(init, Arc::new(using))
    }

    /// Continues with `f` applied to the result.
    #[must_use]
    pub fn flat_map<R2, F>(self, f: F) -> Pull<O, R2>
    where
        R2: Element,
        F: Fn(R) -> Pull<O, R2> + Send + Sync + 'static,
    {
        Pull::from_node(self.node.bind(move |t| match t {
            Terminal::Pure(v) => match take_value::<R>(v) {
                Ok(r) => f(r).node,
                Err(e) => Node::fail(e),
            },
            other => Node::Result(other),
        }))
    }

    /// Runs `next` after this pull, discarding this pull's result.
    #[must_use]
    pub fn then<R2: Element>(self, next: Pull<O, R2>) -> Pull<O, R2> {
        self.flat_map(move |_| next.clone())
    }

    /// Maps the result.
    #[must_use]
    pub fn map<R2, F>(self, f: F) -> Pull<O, R2>
    where
        R2: Element,
        F: Fn(R) -> R2 + Send + Sync + 'static,
    {
        Pull::from_node(self.node.bind(move |t| match t {
            Terminal::Pure(v) => match take_value::<R>(v) {
                Ok(r) => Node::pure(Arc::new(f(r))),
                Err(e) => Node::fail(e),
            },
            other => Node::Result(other),
        }))
    }

    /// Replaces the result with `()`.
    #[must_use]
    pub fn void(self) -> Pull<O, ()> {
        Pull::from_node(self.node.bind(|t| match t {
            Terminal::Pure(_) => Node::unit(),
            other => Node::Result(other),
        }))
    }

    /// Recovers from a failure of this pull with `f`.
    ///
    /// Interruptions are not failures and pass through.
    #[must_use]
    pub fn handle_error_with<F>(self, f: F) -> Self
    where
        F: Fn(Error) -> Self + Send + Sync + 'static,
    {
        Self::from_node(self.node.bind(move |t| match t {
            Terminal::Fail(e) => f(e).node,
            other => Node::Result(other),
        }))
    }

    /// Finishes with `Ok(r)` on success and `Err(e)` on failure.
    #[must_use]
    pub fn attempt(self) -> Pull<O, Result<R>> {
        self.map(Ok).handle_error_with(|e| Pull::pure(Err(e)))
    }

    /// Maps every output element.
    #[must_use]
    pub fn map_output<P, F>(self, f: F) -> Pull<P, R>
    where
        P: Element,
        F: Fn(&O) -> P + Send + Sync + 'static,
    {
        Pull::from_node(map_output(self.node, Arc::new(f)))
    }

    /// Outputs `chunk` before this pull. Empty chunks are skipped.
    #[must_use]
    pub fn cons(self, chunk: Chunk<O>) -> Self {
        if chunk.is_empty() {
            self
        } else {
            Pull::output(chunk).then(self)
        }
    }

    /// Continues with `f` applied to however this pull ended.
    pub(crate) fn transform_with<R2, F>(self, f: F) -> Pull<O, R2>
    where
        R2: Element,
        F: Fn(Terminal) -> Pull<O, R2> + Send + Sync + 'static,
    {
        Pull::from_node(self.node.bind(move |t| f(t).node))
    }
}

fn repeat_pull_with<O: Element, R: Element>(
    init: R,
    using: Arc<dyn Fn(R) -> Pull<O, Option<R>> + Send + Sync>,
) -> Pull<O, Option<R>> {
    let next = Arc::clone(&using);
    using(init).flat_map(move |step| match step {
        Some(r) => repeat_pull_with(r, Arc::clone(&next)),
        None => Pull::pure(None),
    })
}

impl<O: Element> Pull<O, ()> {
    /// The pull that finishes immediately.
    #[must_use]
    pub fn done() -> Self {
        Self::from_node(Node::unit())
    }

    /// Outputs one chunk.
    #[must_use]
    pub fn output(chunk: Chunk<O>) -> Self {
        Self::from_node(Node::Instr(Instr::Output(chunk)))
    }

    /// Outputs one element.
    #[must_use]
    pub fn output1(value: O) -> Self {
        Self::output(Chunk::singleton(value))
    }

    /// Runs this pull in a new child scope, closed when the pull ends.
    #[must_use]
    pub fn scope(self) -> Self {
        self.scope_with(false)
    }

    /// Runs this pull in a new interruptible child scope.
    #[must_use]
    pub fn interrupt_scope(self) -> Self {
        self.scope_with(true)
    }

    /// Turns this pull into a stream, introducing a scope.
    #[must_use]
    pub fn stream(self) -> Stream<O> {
        Stream::from_pull(self.scope())
    }

    fn scope_with(self, interruptible: bool) -> Self {
        let body = self;
        Pull::<O, ScopeId>::open_scope(interruptible).flat_map(move |id| {
            body.clone().transform_with(move |t| close_after(id, t))
        })
    }

    pub(crate) fn close_scope(
        scope: ScopeId,
        interrupted: Option<(ScopeId, Option<Error>)>,
        exit: ExitCase,
    ) -> Self {
        Self::from_node(Node::Instr(Instr::CloseScope {
            scope,
            interrupted,
            exit,
        }))
    }
}

fn close_after<O: Element>(id: ScopeId, t: Terminal) -> Pull<O, ()> {
    match t {
        Terminal::Pure(_) => Pull::close_scope(id, None, ExitCase::Completed),
        Terminal::Interrupted { scope, deferred } => {
            Pull::close_scope(id, Some((scope, deferred)), ExitCase::Cancelled)
        }
        Terminal::Fail(e) => Pull::close_scope(id, None, ExitCase::Failed(e.clone()))
            .transform_with(move |closed| match closed {
                Terminal::Pure(_) => Pull::raise_error(e.clone()),
                Terminal::Fail(e2) => Pull::raise_error(e.clone().with_suppressed(e2)),
                Terminal::Interrupted { scope, .. } => Pull::raise_error(Error::internal(format!(
                    "close of failed scope {id} was interrupted by {scope}"
                ))),
            }),
    }
}

impl<O: Element> Pull<O, Scope> {
    /// Finishes with the scope the interpreter is currently in.
    #[must_use]
    pub fn get_scope() -> Self {
        Self::from_node(Node::Instr(Instr::GetScope))
    }
}

impl<O: Element> Pull<O, ScopeId> {
    pub(crate) fn open_scope(interruptible: bool) -> Self {
        Self::from_node(Node::Instr(Instr::OpenScope { interruptible }))
    }
}
