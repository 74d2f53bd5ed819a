//! Write-once cell with async readers.

use crate::sync::Notify;
use std::sync::OnceLock;

/// A value that is completed at most once and can be awaited.
///
/// Used as the stop and done signals between concurrent stream fibers.
#[derive(Debug)]
pub struct Deferred<T> {
    value: OnceLock<T>,
    notify: Notify,
}

impl<T: Clone> Deferred<T> {
    /// Creates an incomplete deferred.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: OnceLock::new(),
            notify: Notify::new(),
        }
    }

    /// Completes the deferred. Returns `false` if it was already complete.
    pub fn complete(&self, value: T) -> bool {
        let won = self.value.set(value).is_ok();
        if won {
            self.notify.notify_waiters();
        }
        won
    }

    /// The value, if completed.
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        self.value.get().cloned()
    }

    /// Returns true once completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.value.get().is_some()
    }

    /// Waits for completion and returns a copy of the value.
    pub async fn get(&self) -> T {
        loop {
            let wait = self.notify.notified();
            if let Some(v) = self.value.get() {
                return v.clone();
            }
            wait.await;
        }
    }
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}
