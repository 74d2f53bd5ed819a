//! Interrupting a stream from outside its evaluation.
//!
//! Each combinator here runs the stream in a fresh interruptible scope and
//! starts a watcher fiber that interrupts that scope when its signal fires.
//! The watcher is a resource of the scope: it is stopped when the stream
//! ends, however it ends.

use super::Stream;
use crate::chunk::Chunk;
use crate::combinator::race;
use crate::error::{ErrorKind, Result};
use crate::pull::compile::run_root;
use crate::pull::Pull;
use crate::runtime::BoxFuture;
use crate::scope::Scope;
use crate::sync::Deferred;
use crate::tracing_compat::{debug, warn};
use crate::types::Element;
use crate::util::guard;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

impl<O: Element> Stream<O> {
    /// Interrupts this stream when `halt` resolves.
    ///
    /// `Ok(())` ends the stream quietly at its next suspension point: the
    /// stream completes successfully and whatever follows it runs. `Err(e)`
    /// fails the stream with `e`. If the stream ends first, `halt` is
    /// dropped.
    #[must_use]
    pub fn interrupt_when<F, Fut>(self, halt: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.interrupt_with(move |_| Box::pin(halt()))
    }

    /// Interrupts this stream when `signal` emits `true`.
    ///
    /// The signal runs alongside this stream. If it ends without emitting
    /// `true`, this stream is not interrupted; if it fails, this stream
    /// fails with the same error.
    #[must_use]
    pub fn interrupt_when_true(self, signal: Stream<bool>) -> Self {
        let signal = signal.pull;
        self.interrupt_with(move |scope| {
            let executor = scope.executor().clone();
            let first_true = signal
                .clone()
                .first(|b: &bool| *b)
                .flat_map(|hit| match hit {
                    Some(_) => Pull::output1(()),
                    None => Pull::done(),
                });
            Box::pin(async move {
                let hit = run_root(executor, first_true.node, false, |hit, c: Chunk<()>| {
                    *hit |= !c.is_empty();
                })
                .await?;
                if hit {
                    Ok(())
                } else {
                    std::future::pending().await
                }
            })
        })
    }

    /// Interrupts this stream once `duration` has elapsed.
    #[must_use]
    pub fn interrupt_after(self, duration: Duration) -> Self {
        self.interrupt_with(move |scope| {
            let sleep = scope.executor().sleep(duration);
            Box::pin(async move {
                sleep.await;
                Ok(())
            })
        })
    }

    fn interrupt_with<F>(self, halt: F) -> Self
    where
        F: Fn(&Scope) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        let halt = Arc::new(halt);
        let body = self.pull;
        let pull = Pull::<O, Scope>::get_scope().flat_map(move |scope| {
            let halt = Arc::clone(&halt);
            Pull::<O, Watcher>::acquire(
                move || {
                    let watcher = Watcher::spawn(&scope, halt(&scope));
                    async move { Ok(watcher) }
                },
                |watcher: Watcher| async move {
                    watcher.stop();
                    Ok(())
                },
            )
            .then(body.clone())
        });
        Self::from_pull(pull.interrupt_scope())
    }
}

/// A fiber waiting for a signal to interrupt a scope.
#[derive(Clone)]
struct Watcher {
    stop: Arc<Deferred<()>>,
}

impl Watcher {
    fn spawn(scope: &Scope, halt: BoxFuture<'static, Result<()>>) -> Self {
        let stop = Arc::new(Deferred::new());
        let stopped = Arc::clone(&stop);
        let target = scope.clone();
        scope.executor().spawn(async move {
            let halt = guard::poll(ErrorKind::Panicked, halt);
            if let Some(outcome) = race(halt, stopped.get()).await.first() {
                debug!(scope = %target.id(), ok = outcome.is_ok(), "interrupt signal fired");
                if let Err(e) = target.interrupt(outcome) {
                    warn!(scope = %target.id(), error = %e, "interrupt signal could not be delivered");
                }
            }
        });
        Self { stop }
    }

    fn stop(&self) {
        self.stop.complete(());
    }
}
