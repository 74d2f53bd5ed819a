//! Resources registered in a scope.
//!
//! A [`ScopedResource`] is created before its acquire effect runs, so a scope
//! closing concurrently with an acquisition can still account for it:
//!
//! ```text
//! created ──acquired(fin)──► open ──release(ec)──► released
//!    │                        │ lease()               ▲
//!    │                        ▼                       │
//!    │                     leased ──release(ec)──► pending ──last lease cancelled
//!    └──release(ec)──► released; a later acquired(fin) runs fin(Cancelled)
//! ```

use crate::error::{ErrorKind, Result};
use crate::runtime::BoxFuture;
use crate::tracing_compat::{trace, warn};
use crate::types::{ExitCase, ResourceId};
use crate::util::guard;
use core::fmt;
use parking_lot::Mutex;
use std::sync::Arc;

/// Release action bound to an acquired value.
pub(crate) type Finalizer = Box<dyn FnOnce(ExitCase) -> BoxFuture<'static, Result<()>> + Send>;

pub(crate) struct ScopedResource {
    id: ResourceId,
    state: Mutex<ResourceState>,
}

struct ResourceState {
    open: bool,
    finalizer: Option<Finalizer>,
    leases: usize,
    /// Exit case recorded by a release that had to wait for leases.
    pending: Option<ExitCase>,
}

impl ScopedResource {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ResourceId::next(),
            state: Mutex::new(ResourceState {
                open: true,
                finalizer: None,
                leases: 0,
                pending: None,
            }),
        })
    }

    pub(crate) const fn id(&self) -> ResourceId {
        self.id
    }

    /// Binds the finalizer once the acquire effect has produced a value.
    ///
    /// Hands the finalizer back if the resource was released meanwhile; the
    /// caller must run it.
    pub(crate) fn acquired(&self, finalizer: Finalizer) -> std::result::Result<(), Finalizer> {
        let mut state = self.state.lock();
        if state.open {
            state.finalizer = Some(finalizer);
            Ok(())
        } else {
            Err(finalizer)
        }
    }

    /// Releases the resource. Only the first call has any effect; the
    /// finalizer is deferred while leases are outstanding.
    pub(crate) async fn release(&self, exit: ExitCase) -> Result<()> {
        let finalizer = {
            let mut state = self.state.lock();
            if !state.open {
                return Ok(());
            }
            state.open = false;
            if state.leases == 0 {
                state.finalizer.take()
            } else {
                state.pending = Some(exit.clone());
                None
            }
        };
        match finalizer {
            Some(finalizer) => run_finalizer(self.id, finalizer, exit).await,
            None => Ok(()),
        }
    }

    /// Extends the resource's lifetime until the returned lease is cancelled.
    pub(crate) fn lease(self: &Arc<Self>) -> Option<ResourceLease> {
        let mut state = self.state.lock();
        if !state.open {
            return None;
        }
        state.leases += 1;
        Some(ResourceLease {
            resource: Arc::clone(self),
        })
    }

    async fn cancel_lease(&self) -> Result<()> {
        let run = {
            let mut state = self.state.lock();
            state.leases = state.leases.saturating_sub(1);
            if !state.open && state.leases == 0 {
                state.finalizer.take().map(|f| {
                    let exit = state.pending.take().unwrap_or(ExitCase::Completed);
                    (f, exit)
                })
            } else {
                None
            }
        };
        match run {
            Some((finalizer, exit)) => run_finalizer(self.id, finalizer, exit).await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ScopedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ScopedResource")
            .field("id", &self.id)
            .field("open", &state.open)
            .field("leases", &state.leases)
            .finish_non_exhaustive()
    }
}

/// One outstanding lease on a resource.
pub(crate) struct ResourceLease {
    resource: Arc<ScopedResource>,
}

impl ResourceLease {
    pub(crate) async fn cancel(self) -> Result<()> {
        self.resource.cancel_lease().await
    }
}

/// Runs a finalizer, containing panics as [`ErrorKind::ResourceRelease`].
///
/// Errors returned by the finalizer itself pass through unchanged.
pub(crate) async fn run_finalizer(id: ResourceId, finalizer: Finalizer, exit: ExitCase) -> Result<()> {
    trace!(resource = %id, exit_case = %exit, "releasing resource");
    let result = match guard::call(ErrorKind::ResourceRelease, move || finalizer(exit)) {
        Ok(fut) => guard::poll(ErrorKind::ResourceRelease, fut).await,
        Err(e) => Err(e),
    };
    if let Err(e) = &result {
        warn!(resource = %id, error = %e, "finalizer failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_utils::EventLog;

    fn recording(log: &EventLog<String>, name: &'static str) -> Finalizer {
        let log = log.clone();
        Box::new(move |exit| {
            Box::pin(async move {
                log.record(format!("{name}:{exit}"));
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn release_runs_finalizer_once() {
        let log = EventLog::new();
        let res = ScopedResource::new();
        assert!(res.acquired(recording(&log, "a")).is_ok());
        res.release(ExitCase::Completed).await.unwrap();
        res.release(ExitCase::Cancelled).await.unwrap();
        assert_eq!(log.snapshot(), vec!["a:completed".to_string()]);
    }

    #[tokio::test]
    async fn acquired_after_release_hands_finalizer_back() {
        let res = ScopedResource::new();
        res.release(ExitCase::Completed).await.unwrap();
        let log = EventLog::new();
        let Err(fin) = res.acquired(recording(&log, "late")) else {
            panic!("released resource accepted a finalizer");
        };
        run_finalizer(res.id(), fin, ExitCase::Cancelled).await.unwrap();
        assert_eq!(log.snapshot(), vec!["late:cancelled".to_string()]);
    }

    #[tokio::test]
    async fn lease_defers_finalizer_until_cancelled() {
        let log = EventLog::new();
        let res = ScopedResource::new();
        res.acquired(recording(&log, "r")).ok();
        let lease = res.lease().expect("open resource can be leased");
        res.release(ExitCase::Cancelled).await.unwrap();
        assert!(log.snapshot().is_empty());
        assert!(res.lease().is_none());
        lease.cancel().await.unwrap();
        assert_eq!(log.snapshot(), vec!["r:cancelled".to_string()]);
    }

    #[tokio::test]
    async fn finalizer_errors_pass_through_and_panics_are_wrapped() {
        let res = ScopedResource::new();
        res.acquired(Box::new(|_| Box::pin(async { Err::<(), _>(Error::user("release failed")) })))
            .ok();
        let err = res.release(ExitCase::Completed).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::User);

        let res = ScopedResource::new();
        res.acquired(Box::new(|_: ExitCase| -> BoxFuture<'static, Result<()>> {
            panic!("finalizer panicked")
        }))
        .ok();
        let err = res.release(ExitCase::Completed).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceRelease);
    }
}
