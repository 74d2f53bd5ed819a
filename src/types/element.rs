//! The [`Element`] bound.

/// Values that can flow through a [`Stream`](crate::Stream) or be the
/// result of a [`Pull`](crate::Pull).
///
/// Streams are restartable descriptions, so every value captured in one may
/// be handed out more than once and across tasks.
pub trait Element: Clone + Send + Sync + 'static {}

impl<T> Element for T where T: Clone + Send + Sync + 'static {}
