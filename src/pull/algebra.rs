//! The untyped instruction algebra behind [`Pull`](super::Pull).
//!
//! A pull is a tree of [`Node`]s: a terminal [`Terminal`], a primitive
//! [`Instr`], or a `Bind` of a node with a continuation. Result values are
//! type-erased ([`Value`]); the typed facade in the parent module downcasts
//! them at the continuation boundary.
//!
//! [`view`] normalizes a node to its leftmost primitive without growing the
//! call stack: left-nested binds are reassociated to the right one level at a
//! time, and binds of an already terminated step are resolved in place.

use crate::chunk::Chunk;
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::BoxFuture;
use crate::scope::{Finalizer, Scope};
use crate::types::{ExitCase, ScopeId};
use crate::util::guard;
use core::fmt;
use std::any::Any;
use std::sync::Arc;

/// A type-erased pull result.
pub(crate) type Value = Arc<dyn Any + Send + Sync>;

/// A restartable effect producing a result.
pub(crate) type EvalFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A restartable acquisition producing a value and its bound finalizer.
pub(crate) type AcquireFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<(Value, Finalizer)>> + Send + Sync>;

/// Continuation of a bind.
pub(crate) type Cont<O> = Arc<dyn Fn(Terminal) -> Node<O> + Send + Sync>;

pub(crate) fn unit() -> Value {
    Arc::new(())
}

/// How a (sub)pull ended.
#[derive(Clone)]
pub(crate) enum Terminal {
    Pure(Value),
    Fail(Error),
    /// Evaluation was interrupted; it resumes once the scope `scope` has
    /// closed. `deferred` collects errors raised while unwinding.
    Interrupted {
        scope: ScopeId,
        deferred: Option<Error>,
    },
}

impl Terminal {
    pub(crate) fn unit() -> Self {
        Self::Pure(unit())
    }
}

impl fmt::Debug for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pure(_) => f.write_str("Pure(..)"),
            Self::Fail(e) => f.debug_tuple("Fail").field(e).finish(),
            Self::Interrupted { scope, deferred } => f
                .debug_struct("Interrupted")
                .field("scope", scope)
                .field("deferred", deferred)
                .finish(),
        }
    }
}

/// Primitive instructions.
pub(crate) enum Instr<O> {
    Output(Chunk<O>),
    Eval(EvalFn),
    Acquire(AcquireFn),
    OpenScope {
        interruptible: bool,
    },
    CloseScope {
        scope: ScopeId,
        /// Interrupt being unwound through this close, with its deferred
        /// errors.
        interrupted: Option<(ScopeId, Option<Error>)>,
        exit: ExitCase,
    },
    GetScope,
    /// Runs another pull up to its first output. Resumes with a typed
    /// `Option<StepOut<X>>`.
    Step(Arc<dyn StepRun>),
}

impl<O: Clone> Clone for Instr<O> {
    fn clone(&self) -> Self {
        match self {
            Self::Output(chunk) => Self::Output(chunk.clone()),
            Self::Eval(f) => Self::Eval(Arc::clone(f)),
            Self::Acquire(f) => Self::Acquire(Arc::clone(f)),
            Self::OpenScope { interruptible } => Self::OpenScope {
                interruptible: *interruptible,
            },
            Self::CloseScope {
                scope,
                interrupted,
                exit,
            } => Self::CloseScope {
                scope: *scope,
                interrupted: interrupted.clone(),
                exit: exit.clone(),
            },
            Self::GetScope => Self::GetScope,
            Self::Step(step) => Self::Step(Arc::clone(step)),
        }
    }
}

impl<O> Instr<O> {
    /// Re-types an instruction that does not mention the output type.
    /// Hands an `Output` chunk back.
    pub(crate) fn cast<P>(self) -> std::result::Result<Instr<P>, Chunk<O>> {
        Ok(match self {
            Self::Output(chunk) => return Err(chunk),
            Self::Eval(f) => Instr::Eval(f),
            Self::Acquire(f) => Instr::Acquire(f),
            Self::OpenScope { interruptible } => Instr::OpenScope { interruptible },
            Self::CloseScope {
                scope,
                interrupted,
                exit,
            } => Instr::CloseScope {
                scope,
                interrupted,
                exit,
            },
            Self::GetScope => Instr::GetScope,
            Self::Step(step) => Instr::Step(step),
        })
    }
}

/// A step of a foreign pull, run by the interpreter in a chosen scope.
pub(crate) trait StepRun: Send + Sync {
    /// Scope the step must run in; `None` for the current one.
    fn token(&self) -> Option<ScopeId>;

    fn run(&self, scope: Scope) -> BoxFuture<'static, Result<Stepped>>;
}

/// What a step produced. `value` is the typed resumption value.
pub(crate) enum Stepped {
    Done {
        scope: Scope,
        value: Value,
    },
    Out {
        scope: Scope,
        value: Value,
    },
    Interrupted {
        scope: ScopeId,
        deferred: Option<Error>,
    },
}

pub(crate) enum Node<O> {
    Result(Terminal),
    Instr(Instr<O>),
    Bind(Arc<Node<O>>, Cont<O>),
}

impl<O: Clone> Clone for Node<O> {
    fn clone(&self) -> Self {
        match self {
            Self::Result(t) => Self::Result(t.clone()),
            Self::Instr(i) => Self::Instr(i.clone()),
            Self::Bind(step, k) => Self::Bind(Arc::clone(step), Arc::clone(k)),
        }
    }
}

impl<O: Clone + Send + Sync + 'static> Node<O> {
    pub(crate) fn pure(value: Value) -> Self {
        Self::Result(Terminal::Pure(value))
    }

    pub(crate) fn unit() -> Self {
        Self::Result(Terminal::unit())
    }

    pub(crate) fn fail(error: Error) -> Self {
        Self::Result(Terminal::Fail(error))
    }

    pub(crate) fn bind<F>(self, k: F) -> Self
    where
        F: Fn(Terminal) -> Self + Send + Sync + 'static,
    {
        Self::Bind(Arc::new(self), Arc::new(k))
    }

    /// Runs `f` lazily, each time the node is interpreted.
    pub(crate) fn defer<F>(f: F) -> Self
    where
        F: Fn() -> Self + Send + Sync + 'static,
    {
        Self::unit().bind(move |_| f())
    }
}

/// A node normalized to its leftmost primitive.
pub(crate) enum View<O> {
    Result(Terminal),
    Instr(Instr<O>, Option<Cont<O>>),
}

/// Applies a continuation, turning a panic into a failure.
pub(crate) fn apply_cont<O: Clone + Send + Sync + 'static>(k: &Cont<O>, t: Terminal) -> Node<O> {
    guard::call(ErrorKind::Panicked, || k(t)).unwrap_or_else(Node::fail)
}

/// Resumes a viewed instruction's continuation, if any.
pub(crate) fn resume<O: Clone + Send + Sync + 'static>(k: Option<&Cont<O>>, t: Terminal) -> Node<O> {
    match k {
        Some(k) => apply_cont(k, t),
        None => Node::Result(t),
    }
}

pub(crate) fn view<O: Clone + Send + Sync + 'static>(mut node: Node<O>) -> View<O> {
    loop {
        match node {
            Node::Result(t) => return View::Result(t),
            Node::Instr(instr) => return View::Instr(instr, None),
            Node::Bind(step, k) => {
                let step = Arc::try_unwrap(step).unwrap_or_else(|shared| (*shared).clone());
                match step {
                    Node::Result(t) => node = apply_cont(&k, t),
                    Node::Instr(instr) => return View::Instr(instr, Some(k)),
                    Node::Bind(inner, k1) => {
                        let outer = Arc::clone(&k);
                        node = Node::Bind(
                            inner,
                            Arc::new(move |r| {
                                Node::Bind(Arc::new(apply_cont(&k1, r)), Arc::clone(&outer))
                            }),
                        );
                    }
                }
            }
        }
    }
}

/// Resumes `node` as if its current instruction had failed with `e`.
///
/// Used when the consumer of an output chunk fails: the producer unwinds
/// through its scopes with the failure.
pub(crate) fn as_handler<O: Clone + Send + Sync + 'static>(node: Node<O>, e: Error) -> Node<O> {
    match view(node) {
        View::Result(Terminal::Pure(_)) => Node::fail(e),
        View::Result(Terminal::Fail(e2)) => Node::fail(e.with_suppressed(e2)),
        View::Result(Terminal::Interrupted { scope, deferred }) => {
            Node::Result(Terminal::Interrupted {
                scope,
                deferred: Error::compose_opt(Some(e), deferred),
            })
        }
        View::Instr(_, k) => resume(k.as_ref(), Terminal::Fail(e)),
    }
}

/// Injects an interruption into the tail of a partially consumed pull so
/// that pending scope closes still run.
pub(crate) fn interrupt_boundary<O: Clone + Send + Sync + 'static>(
    node: Node<O>,
    scope: ScopeId,
    deferred: Option<Error>,
) -> Node<O> {
    match view(node) {
        View::Result(Terminal::Pure(_)) => {
            Node::Result(Terminal::Interrupted { scope, deferred })
        }
        View::Result(Terminal::Fail(e)) => {
            Node::fail(Error::compose_opt(Some(e.clone()), deferred).unwrap_or(e))
        }
        View::Result(t @ Terminal::Interrupted { .. }) => Node::Result(t),
        View::Instr(Instr::CloseScope { scope: close, .. }, k) => {
            let close = Node::Instr(Instr::CloseScope {
                scope: close,
                interrupted: Some((scope, deferred)),
                exit: ExitCase::Cancelled,
            });
            match k {
                Some(k) => Node::Bind(Arc::new(close), k),
                None => close,
            }
        }
        View::Instr(_, k) => resume(k.as_ref(), Terminal::Interrupted { scope, deferred }),
    }
}

/// Maps the output chunks of `node` lazily.
pub(crate) fn map_output<O, P>(node: Node<O>, f: Arc<dyn Fn(&O) -> P + Send + Sync>) -> Node<P>
where
    O: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    Node::defer(move || map_output_now(node.clone(), Arc::clone(&f)))
}

fn map_output_now<O, P>(node: Node<O>, f: Arc<dyn Fn(&O) -> P + Send + Sync>) -> Node<P>
where
    O: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    match view(node) {
        View::Result(t) => Node::Result(t),
        View::Instr(instr, k) => {
            let head = match instr.cast::<P>() {
                Ok(instr) => Node::Instr(instr),
                Err(chunk) => match guard::call(ErrorKind::Panicked, || chunk.map(|o| f(o))) {
                    Ok(mapped) => Node::Instr(Instr::Output(mapped)),
                    Err(e) => Node::fail(e),
                },
            };
            match k {
                None => head,
                Some(k) => head.bind(move |r| map_output(apply_cont(&k, r), Arc::clone(&f))),
            }
        }
    }
}

/// Extracts a typed value from a type-erased result.
pub(crate) fn take_value<R: Clone + Send + Sync + 'static>(value: Value) -> Result<R> {
    match value.downcast::<R>() {
        Ok(typed) => Ok(Arc::try_unwrap(typed).unwrap_or_else(|shared| (*shared).clone())),
        Err(_) => Err(Error::internal(format!(
            "pull result is not a {}",
            std::any::type_name::<R>()
        ))),
    }
}
