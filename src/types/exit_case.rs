//! Exit cases delivered to finalizers.

use core::fmt;

use crate::error::{Error, Result};

/// How a scope or resource lifetime ended.
///
/// Produced exactly once per lifetime and handed to the matching release
/// function.
#[derive(Debug, Clone)]
pub enum ExitCase {
    /// The body ran to completion.
    Completed,
    /// Evaluation was interrupted or the consumer stopped early.
    Cancelled,
    /// The body failed with the given error.
    Failed(Error),
}

impl ExitCase {
    /// Maps a body result to its exit case.
    #[must_use]
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Completed,
            Err(e) => Self::Failed(e.clone()),
        }
    }

    /// Returns true for [`ExitCase::Completed`].
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true for [`ExitCase::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true for [`ExitCase::Failed`].
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The failure, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&Error> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl PartialEq for ExitCase {
    /// Failures compare by kind and message; sources are not compared.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Completed, Self::Completed) | (Self::Cancelled, Self::Cancelled) => true,
            (Self::Failed(a), Self::Failed(b)) => {
                a.kind() == b.kind() && a.message() == b.message()
            }
            _ => false,
        }
    }
}

impl fmt::Display for ExitCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed(e) => write!(f, "failed({e})"),
        }
    }
}
