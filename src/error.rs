//! Error types and error handling strategy for fxstream.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - The first error on a control path is primary; every error raised while
//!   unwinding after it is attached as *suppressed*, never dropped
//! - Panics in user closures and futures are caught at the interpreter
//!   boundary and converted to [`ErrorKind::Panicked`]
//! - Interruption is a control outcome, not a failure; it only shows up as
//!   an [`Error`] when a caller asks for it explicitly
//!
//! # Error Categories
//!
//! - **User**: failures raised by user effects or `raise_error`
//! - **Resource**: acquisition and release failures
//! - **Control**: interruption and closed-scope conditions
//! - **Internal**: interpreter bugs, bad configuration

use core::fmt;
use std::any::Any;
use std::sync::Arc;

use crate::types::ScopeId;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === User ===
    /// A user-supplied effect failed.
    Effect,
    /// User-provided error (e.g. `Stream::raise_error`).
    User,

    // === Resources ===
    /// A resource acquisition failed. No release is attempted.
    ResourceAcquisition,
    /// A release function failed.
    ResourceRelease,

    // === Control ===
    /// Evaluation was interrupted.
    Interrupted,
    /// The scope was closed before the operation could register.
    ScopeClosed,

    // === Internal ===
    /// A user closure or future panicked.
    Panicked,
    /// Invalid configuration.
    Config,
    /// Internal interpreter error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Effect | Self::User => ErrorCategory::User,
            Self::ResourceAcquisition | Self::ResourceRelease => ErrorCategory::Resource,
            Self::Interrupted | Self::ScopeClosed => ErrorCategory::Control,
            Self::Panicked | Self::Config | Self::Internal => ErrorCategory::Internal,
        }
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// User-originated errors.
    User,
    /// Resource lifecycle failures.
    Resource,
    /// Interruption and scope lifecycle conditions.
    Control,
    /// Internal errors.
    Internal,
}

/// The main error type for fxstream operations.
///
/// Cheap to clone: the source is shared, suppressed errors are copied.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    suppressed: Vec<Error>,
    /// Suppressed errors discarded because of the retention limit.
    overflow: usize,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            suppressed: Vec::new(),
            overflow: 0,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns true if this error represents interruption.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self.kind, ErrorKind::Interrupted)
    }

    /// Returns true if other errors were attached while unwinding.
    #[must_use]
    pub fn is_aggregated(&self) -> bool {
        !self.suppressed.is_empty() || self.overflow > 0
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Attaches an error that occurred after this one.
    #[must_use]
    pub fn with_suppressed(mut self, other: Self) -> Self {
        self.suppressed.push(other);
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Errors raised after this one while unwinding, in the order observed.
    #[must_use]
    pub fn suppressed(&self) -> &[Self] {
        &self.suppressed
    }

    /// Number of suppressed errors dropped because of the retention limit.
    #[must_use]
    pub const fn suppressed_overflow(&self) -> usize {
        self.overflow
    }

    /// Composes `primary` with the errors that followed it.
    ///
    /// At most `limit` suppressed errors are retained; the rest are counted.
    #[must_use]
    pub fn compose(primary: Self, rest: impl IntoIterator<Item = Self>, limit: usize) -> Self {
        let mut primary = primary;
        for err in rest {
            if primary.suppressed.len() < limit {
                primary.suppressed.push(err);
            } else {
                primary.overflow += 1;
            }
        }
        primary
    }

    /// Composes a list of errors, using the first as primary.
    ///
    /// Returns `None` for an empty list.
    #[must_use]
    pub fn compose_all(errors: Vec<Self>, limit: usize) -> Option<Self> {
        let mut iter = errors.into_iter();
        let primary = iter.next()?;
        Some(Self::compose(primary, iter, limit))
    }

    /// Composes two optional errors, keeping the first present one primary.
    #[must_use]
    pub fn compose_opt(first: Option<Self>, second: Option<Self>) -> Option<Self> {
        match (first, second) {
            (Some(a), Some(b)) => Some(a.with_suppressed(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        }
    }

    /// Creates an effect failure.
    #[must_use]
    pub fn effect(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Effect).with_message(detail)
    }

    /// Creates a user error.
    #[must_use]
    pub fn user(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_message(detail)
    }

    /// Wraps a foreign error raised while acquiring a resource.
    #[must_use]
    pub fn acquisition(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        let msg = source.to_string();
        Self::new(ErrorKind::ResourceAcquisition)
            .with_message(msg)
            .with_source(source)
    }

    /// Wraps a foreign error raised while releasing a resource.
    #[must_use]
    pub fn release(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        let msg = source.to_string();
        Self::new(ErrorKind::ResourceRelease)
            .with_message(msg)
            .with_source(source)
    }

    /// Creates an interruption marker error.
    #[must_use]
    pub fn interrupted(scope: ScopeId) -> Self {
        Self::new(ErrorKind::Interrupted).with_message(format!("interrupted at {scope}"))
    }

    /// Creates a closed-scope error.
    #[must_use]
    pub fn scope_closed(scope: ScopeId) -> Self {
        Self::new(ErrorKind::ScopeClosed).with_message(format!("scope {scope} is closed"))
    }

    /// Converts a caught panic payload into an error of the given kind.
    #[must_use]
    pub fn from_panic(kind: ErrorKind, payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "opaque panic payload".to_string());
        Self::new(kind).with_message(format!("panicked: {detail}"))
    }

    /// Creates an internal error (interpreter bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        let hidden = self.suppressed.len() + self.overflow;
        if hidden > 0 {
            write!(f, " (+{hidden} suppressed)")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<crate::runtime::ConfigError> for Error {
    fn from(e: crate::runtime::ConfigError) -> Self {
        let msg = e.to_string();
        Self::new(ErrorKind::Config).with_message(msg).with_source(e)
    }
}

/// Extension trait for adding context to Results.
#[allow(clippy::result_large_err)]
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
    /// Attach context message computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_message(f()))
    }
}

/// A specialized Result type for fxstream operations.
#[allow(clippy::result_large_err)]
pub type Result<T> = core::result::Result<T, Error>;
