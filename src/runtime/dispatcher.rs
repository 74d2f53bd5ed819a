//! Task spawning and timers used by the interpreter.
//!
//! The stream core never names a concrete async runtime. Concurrency
//! combinators spawn fibers and sleep through a [`Dispatcher`]; the default
//! implementation delegates to a tokio runtime handle.

use crate::error::{Error, ErrorKind};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Spawns detached fibers and provides timers.
pub trait Dispatcher: Send + Sync + 'static {
    /// Runs `future` to completion in the background.
    fn spawn(&self, future: BoxFuture<'static, ()>);

    /// A future that completes after `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Dispatcher backed by a tokio runtime handle.
#[derive(Debug, Clone)]
pub struct TokioDispatcher {
    handle: tokio::runtime::Handle,
}

impl TokioDispatcher {
    /// Captures the handle of the tokio runtime the caller is running on.
    pub fn current() -> Result<Self, Error> {
        tokio::runtime::Handle::try_current()
            .map(Self::from_handle)
            .map_err(|e| {
                Error::new(ErrorKind::Config)
                    .with_message(format!("no tokio runtime available: {e}"))
            })
    }

    /// Wraps an explicit runtime handle.
    #[must_use]
    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl Dispatcher for TokioDispatcher {
    fn spawn(&self, future: BoxFuture<'static, ()>) {
        // Detached: completion is observed through Deferred handles.
        drop(self.handle.spawn(future));
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn current_outside_runtime_is_config_error() {
        let err = TokioDispatcher::current().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test]
    async fn spawn_runs_detached_future() {
        let dispatcher = TokioDispatcher::current().expect("inside tokio");
        let ran = Arc::new(AtomicBool::new(false));
        let (tx, rx) = tokio::sync::oneshot::channel();
        let flag = Arc::clone(&ran);
        dispatcher.spawn(Box::pin(async move {
            flag.store(true, Ordering::SeqCst);
            let _ = tx.send(());
        }));
        rx.await.expect("spawned task completes");
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn sleep_completes() {
        let dispatcher = TokioDispatcher::current().expect("inside tokio");
        dispatcher.sleep(Duration::from_millis(1)).await;
    }
}
