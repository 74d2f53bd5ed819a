//! Broadcast wake-up for interrupt contexts, deferred cells and joins.
//!
//! A [`Notified`] future remembers the generation current when it was
//! *created*. Any `notify_waiters` after that point completes it, even one
//! that happens before the first poll, so this pattern cannot miss a wake:
//!
//! ```ignore
//! let wait = notify.notified();
//! if state_is_final() {
//!     return;
//! }
//! wait.await;
//! ```
//!
//! Dropping a pending `Notified` deregisters its waker.

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};

/// Wakes every waiter registered before the call.
#[derive(Debug)]
pub struct Notify {
    generation: AtomicU64,
    waiters: Mutex<Waiters>,
}

/// Registered wakers, keyed by a token unique to each waiting future.
#[derive(Debug)]
struct Waiters {
    next_token: u64,
    wakers: Vec<(u64, Waker)>,
}

impl Waiters {
    const fn new() -> Self {
        Self {
            next_token: 0,
            wakers: Vec::new(),
        }
    }

    fn register(&mut self, token: Option<u64>, waker: &Waker) -> u64 {
        if let Some(token) = token {
            if let Some((_, slot)) = self.wakers.iter_mut().find(|(t, _)| *t == token) {
                if !slot.will_wake(waker) {
                    slot.clone_from(waker);
                }
                return token;
            }
        }
        let token = self.next_token;
        self.next_token += 1;
        self.wakers.push((token, waker.clone()));
        token
    }

    fn deregister(&mut self, token: u64) {
        if let Some(at) = self.wakers.iter().position(|(t, _)| *t == token) {
            self.wakers.swap_remove(at);
        }
    }
}

impl Notify {
    /// A notifier nobody waits on yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            waiters: Mutex::new(Waiters::new()),
        }
    }

    /// Completes on the first `notify_waiters` made after this call.
    pub fn notified(&self) -> Notified<'_> {
        Notified {
            notify: self,
            seen: self.generation.load(Ordering::Acquire),
            token: None,
        }
    }

    /// Wakes every pending [`Notified`].
    pub fn notify_waiters(&self) {
        let woken = {
            let mut waiters = self.waiters.lock();
            self.generation.fetch_add(1, Ordering::AcqRel);
            std::mem::take(&mut waiters.wakers)
        };
        for (_, waker) in woken {
            waker.wake();
        }
    }

    /// Number of futures currently registered.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().wakers.len()
    }
}

impl Default for Notify {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`Notify::notified`].
#[derive(Debug)]
pub struct Notified<'a> {
    notify: &'a Notify,
    seen: u64,
    token: Option<u64>,
}

impl Notified<'_> {
    fn fired(&self) -> bool {
        self.notify.generation.load(Ordering::Acquire) != self.seen
    }

    fn release_token(&mut self) {
        if let Some(token) = self.token.take() {
            self.notify.waiters.lock().deregister(token);
        }
    }
}

impl Future for Notified<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.fired() {
            self.release_token();
            return Poll::Ready(());
        }
        let mut waiters = self.notify.waiters.lock();
        // notify_waiters bumps the generation under this lock.
        if self.fired() {
            drop(waiters);
            self.release_token();
            return Poll::Ready(());
        }
        let token = waiters.register(self.token, cx.waker());
        drop(waiters);
        self.token = Some(token);
        Poll::Pending
    }
}

impl Drop for Notified<'_> {
    fn drop(&mut self) {
        self.release_token();
    }
}
