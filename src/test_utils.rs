//! Helpers shared by the unit tests.
//!
//! - `init_test_logging` installs a trace-level subscriber once per process
//! - `test_executor` binds an executor to the test's tokio runtime
//! - `EventLog` records effect and finalizer events in order
//! - `env_lock` serializes tests that touch `FXSTREAM_*` variables

use crate::runtime::{Executor, ExecutorBuilder};
use parking_lot::{Mutex, MutexGuard};
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::format::FmtSpan;

static LOGGING: Once = Once::new();
static ENV: Mutex<()> = parking_lot::const_mutex(());

/// Holds the environment for the lifetime of the guard.
pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV.lock()
}

/// Sends `tracing` output at every level to the test writer. Only the
/// first call has an effect.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// An executor spawning onto the current tokio runtime, with default
/// configuration regardless of the environment.
#[must_use]
pub fn test_executor() -> Executor {
    ExecutorBuilder::new()
        .ignore_env()
        .build()
        .expect("tests run inside a tokio runtime")
}

/// Events recorded by effects and finalizers, in the order they ran.
#[derive(Debug)]
pub struct EventLog<E>(Arc<Mutex<Vec<E>>>);

impl<E> Clone for EventLog<E> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<E: Clone> EventLog<E> {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    /// Appends `event`.
    pub fn record(&self, event: E) {
        self.0.lock().push(event);
    }

    /// The events so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<E> {
        self.0.lock().clone()
    }
}

/// Marks the start of a test in the log.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "==== TEST PHASE: {} ====", $name);
    };
}

/// Marks a step inside a longer test.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "---- {} ----", $name);
    };
}

/// Marks a passing test in the log.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
}

/// Logs both sides of an assertion before checking it.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(expected = ?$expected, actual = ?$actual, "asserting: {}", $msg);
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
