//! Logging facade over `tracing`.
//!
//! With the default `tracing-integration` feature the macros below are the
//! `tracing` ones. Without it they expand to nothing, so the interpreter's
//! hot path carries no logging cost.
//!
//! ```rust,ignore
//! use fxstream::tracing_compat::{debug, trace};
//!
//! trace!(scope = %id, "scope opened");
//! debug!(scope = %id, cause = ?cause, "scope interrupted");
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    //! No-op macros used when tracing is disabled.

    /// No-op trace-level logging macro.
    #[macro_export]
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    /// No-op debug-level logging macro.
    #[macro_export]
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    /// No-op info-level logging macro.
    #[macro_export]
    macro_rules! info {
        ($($arg:tt)*) => {};
    }

    /// No-op warn-level logging macro.
    #[macro_export]
    macro_rules! warn {
        ($($arg:tt)*) => {};
    }

    /// No-op error-level logging macro.
    #[macro_export]
    macro_rules! error {
        ($($arg:tt)*) => {};
    }

    pub use crate::{debug, error, info, trace, warn};
}

#[cfg(not(feature = "tracing-integration"))]
pub use noop::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    #[test]
    fn macros_accept_fields_and_messages() {
        init_test_logging();
        crate::test_phase!("macros_accept_fields_and_messages");
        trace!("trace message");
        debug!(count = 42, "debug with field");
        info!(name = "scope", "info with field");
        warn!(scope = %"S1", "warn with display field");
        error!(err = ?"boom", "error with debug field");
        crate::test_complete!("macros_accept_fields_and_messages");
    }
}
