//! The pull interpreter.
//!
//! [`go`] runs a pull in a scope until it outputs a chunk or terminates. It
//! is a loop over [`view`]: each turn performs one primitive and resumes the
//! continuation, so a long stream never deepens the call stack. Only a
//! `Step` (running a foreign pull up to its first output) recurses, once per
//! layer of stream transformation.
//!
//! Suspension points are output (the consumer decides when to ask for the
//! next chunk), effect evaluation and resource acquisition. Interruption is
//! checked before each of them.

use super::algebra::{resume, view, Instr, Node, StepRun, Stepped, Terminal, View};
use super::Pull;
use crate::chunk::Chunk;
use crate::error::{Error, ErrorKind, Result};
use crate::runtime::{BoxFuture, Executor};
use crate::scope::{EvalOutcome, InterruptCause, Scope};
use crate::tracing_compat::{debug, trace, warn};
use crate::types::{Element, ExitCase, ScopeId};
use crate::util::guard;
use std::sync::Arc;

/// Result of running a pull to its next output.
pub(crate) enum StepResult<O> {
    Done(Scope),
    Out {
        head: Chunk<O>,
        scope: Scope,
        tail: Node<O>,
    },
    Interrupted {
        scope: ScopeId,
        deferred: Option<Error>,
    },
}

/// What a step resumes its caller with when it produced output.
#[derive(Clone)]
pub(crate) struct StepOut<X> {
    pub(crate) head: Chunk<X>,
    pub(crate) scope: ScopeId,
    pub(crate) tail: Pull<X, ()>,
}

pub(crate) struct StepOf<X> {
    node: Node<X>,
    token: Option<ScopeId>,
}

impl<X: Element> StepOf<X> {
    pub(crate) fn instr<O>(node: Node<X>, token: Option<ScopeId>) -> Instr<O> {
        Instr::Step(Arc::new(Self { node, token }))
    }
}

impl<X: Element> StepRun for StepOf<X> {
    fn token(&self) -> Option<ScopeId> {
        self.token
    }

    fn run(&self, scope: Scope) -> BoxFuture<'static, Result<Stepped>> {
        let node = self.node.clone();
        Box::pin(async move {
            Ok(match go(scope, node).await? {
                StepResult::Done(scope) => Stepped::Done {
                    scope,
                    value: Arc::new(None::<StepOut<X>>),
                },
                StepResult::Out { head, scope, tail } => {
                    let out = StepOut {
                        head,
                        scope: scope.id(),
                        tail: Pull::from_node(tail),
                    };
                    Stepped::Out {
                        scope,
                        value: Arc::new(Some(out)),
                    }
                }
                StepResult::Interrupted { scope, deferred } => {
                    Stepped::Interrupted { scope, deferred }
                }
            })
        })
    }
}

fn interrupt_guard(scope: &Scope) -> Option<Terminal> {
    scope.interruption_cause().map(|cause| match cause {
        InterruptCause::Error(e) => Terminal::Fail(e),
        InterruptCause::Scope(id) => Terminal::Interrupted {
            scope: id,
            deferred: None,
        },
    })
}

/// Interprets `node` in `scope` until it outputs or terminates.
pub(crate) fn go<O: Element>(
    scope: Scope,
    node: Node<O>,
) -> BoxFuture<'static, Result<StepResult<O>>> {
    Box::pin(async move {
        let mut scope = scope;
        let mut node = node;
        loop {
            let (instr, k) = match view(node) {
                View::Result(Terminal::Pure(_)) => return Ok(StepResult::Done(scope)),
                View::Result(Terminal::Fail(e)) => return Err(e),
                View::Result(Terminal::Interrupted { scope, deferred }) => {
                    return Ok(StepResult::Interrupted { scope, deferred })
                }
                View::Instr(instr, k) => (instr, k),
            };
            let k = k.as_ref();
            node = match instr {
                Instr::Output(head) => match interrupt_guard(&scope) {
                    None => {
                        return Ok(StepResult::Out {
                            head,
                            scope,
                            tail: resume(k, Terminal::unit()),
                        })
                    }
                    Some(t) => resume(k, t),
                },

                Instr::Step(step) => {
                    let token = step.token();
                    let target = match token {
                        None => Some(scope.clone()),
                        Some(id) => scope.find_step_scope(id),
                    };
                    match target {
                        None => resume(
                            k,
                            Terminal::Fail(Error::internal(format!(
                                "scope lookup failure: {} is not reachable from {}; \
                                 use step_leg to pull from more than one stream",
                                token.map_or_else(String::new, |id| id.to_string()),
                                scope.id()
                            ))),
                        ),
                        Some(target) => match step.run(target).await {
                            Ok(Stepped::Done { scope: s, value }) => {
                                let next = interrupt_guard(&s).unwrap_or(Terminal::Pure(value));
                                scope = s;
                                resume(k, next)
                            }
                            Ok(Stepped::Out { scope: s, value }) => match interrupt_guard(&s) {
                                None => {
                                    if token.is_none() {
                                        scope = s;
                                    }
                                    resume(k, Terminal::Pure(value))
                                }
                                Some(t) => {
                                    scope = s;
                                    resume(k, t)
                                }
                            },
                            Ok(Stepped::Interrupted { scope: id, deferred }) => {
                                resume(k, Terminal::Interrupted { scope: id, deferred })
                            }
                            Err(e) => resume(k, Terminal::Fail(e)),
                        },
                    }
                }

                Instr::Eval(eval) => {
                    let t = match scope.interruptible_eval(&eval).await {
                        EvalOutcome::Done(v) => Terminal::Pure(v),
                        EvalOutcome::Failed(e) => Terminal::Fail(e),
                        EvalOutcome::Interrupted(id) => Terminal::Interrupted {
                            scope: id,
                            deferred: None,
                        },
                    };
                    resume(k, t)
                }

                Instr::Acquire(acquire) => match interrupt_guard(&scope) {
                    None => {
                        let t = match scope.acquire_resource(&acquire).await {
                            Ok(v) => Terminal::Pure(v),
                            Err(e) => Terminal::Fail(e),
                        };
                        resume(k, t)
                    }
                    Some(t) => resume(k, t),
                },

                Instr::GetScope => resume(k, Terminal::Pure(Arc::new(scope.clone()))),

                Instr::OpenScope { interruptible } => match interrupt_guard(&scope) {
                    None => {
                        let child = scope.open(interruptible);
                        let next = resume(k, Terminal::Pure(Arc::new(child.id())));
                        scope = child;
                        next
                    }
                    Some(t) => resume(k, t),
                },

                Instr::CloseScope {
                    scope: id,
                    interrupted,
                    exit,
                } => {
                    let target = scope
                        .find_self_or_ancestor(id)
                        .or_else(|| scope.find_self_or_child(id));
                    match target {
                        None => {
                            let t = match interrupted {
                                Some((scope, deferred)) => Terminal::Interrupted { scope, deferred },
                                None => Terminal::unit(),
                            };
                            resume(k, t)
                        }
                        Some(target) if target.kind().is_root() => resume(k, Terminal::unit()),
                        Some(target) => {
                            let closed = target.close(exit).await;
                            let ancestor = target.open_ancestor();
                            let t = match interrupted {
                                None => match closed {
                                    Ok(()) => Terminal::unit(),
                                    Err(e) => Terminal::Fail(e),
                                },
                                Some((interrupted_id, deferred)) => {
                                    let deferred = Error::compose_opt(deferred, closed.err());
                                    if ancestor.find_self_or_ancestor(interrupted_id).is_some() {
                                        Terminal::Interrupted {
                                            scope: interrupted_id,
                                            deferred,
                                        }
                                    } else {
                                        deferred.map_or_else(Terminal::unit, Terminal::Fail)
                                    }
                                }
                            };
                            scope = ancestor;
                            resume(k, t)
                        }
                    }
                }
            };
        }
    })
}

/// Folds the chunks output by `node`, starting in `scope`.
///
/// A panic in `f` is delivered to the producer as a failure of its pending
/// instruction, so its scopes unwind before the error is returned. A quiet
/// interruption of the whole pull ends the fold successfully.
pub(crate) async fn fold_chunks<O, B, F>(scope: Scope, node: Node<O>, init: B, mut f: F) -> Result<B>
where
    O: Element,
    F: FnMut(&mut B, Chunk<O>),
{
    let mut acc = init;
    let mut scope = scope;
    let mut node = node;
    loop {
        match go(scope.clone(), node).await? {
            StepResult::Done(_) | StepResult::Interrupted { deferred: None, .. } => return Ok(acc),
            StepResult::Interrupted {
                deferred: Some(e), ..
            } => return Err(e),
            StepResult::Out {
                head,
                scope: next_scope,
                tail,
            } => {
                scope = next_scope;
                node = match guard::call(ErrorKind::Panicked, || f(&mut acc, head)) {
                    Ok(()) => tail,
                    Err(e) => super::algebra::as_handler(tail, e),
                };
            }
        }
    }
}

/// Closes a scope in the background if the future driving it is dropped.
struct CloseOnDrop {
    scope: Option<Scope>,
}

impl CloseOnDrop {
    fn disarm(mut self) {
        self.scope = None;
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        if let Some(scope) = self.scope.take() {
            let executor = scope.executor().clone();
            trace!(scope = %scope.id(), "interpretation dropped; closing scope");
            executor.spawn(async move {
                if let Err(e) = scope.close(ExitCase::Cancelled).await {
                    warn!(scope = %scope.id(), error = %e, "closing dropped scope failed");
                }
            });
        }
    }
}

async fn close_with(scope: &Scope, result: Result<()>) -> Result<()> {
    let closed = scope.close(ExitCase::from_result(&result)).await;
    match (result, closed) {
        (Ok(()), closed) => closed,
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(e2)) => Err(e.with_suppressed(e2)),
    }
}

/// Interprets `node` under a fresh root scope, folding its output.
pub(crate) async fn run_root<O, B, F>(executor: Executor, node: Node<O>, init: B, f: F) -> Result<B>
where
    O: Element,
    F: FnMut(&mut B, Chunk<O>),
{
    let root = Scope::new_root(executor);
    let guard = CloseOnDrop {
        scope: Some(root.clone()),
    };
    let result = fold_chunks(root.clone(), node, init, f).await;
    guard.disarm();
    let (status, acc) = match result {
        Ok(acc) => (Ok(()), Some(acc)),
        Err(e) => (Err(e), None),
    };
    close_with(&root, status).await?;
    acc.ok_or_else(|| Error::internal("fold finished without a value"))
}

/// Interprets `node` as a forked interpretation under `parent`, for its
/// effects only.
///
/// The forked root follows `parent`'s interruption. An interruption that
/// unwinds out of the forked pull ends it quietly.
pub(crate) async fn run_forked<O: Element>(parent: Scope, node: Node<O>) -> Result<()> {
    let root = parent.fork();
    let guard = CloseOnDrop {
        scope: Some(root.clone()),
    };
    debug!(scope = %root.id(), parent = %parent.id(), "forked interpretation started");
    let result = fold_chunks(root.clone(), node, (), |_, _| {}).await;
    guard.disarm();
    let result = close_with(&root, result).await;
    debug!(scope = %root.id(), ok = result.is_ok(), "forked interpretation finished");
    result
}
