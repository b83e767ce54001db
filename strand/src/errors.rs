//! Error types for the strand engine.
//!
//! Engine-level failures (`InvalidContextError`, `CrossThreadError`) are
//! reported at the `switch`/`throw` call site and never change which context
//! is running. Everything a context raises travels through the same
//! [`ContextError`] channel, across stacks, as an ordinary `Result`.

use crate::core::{ContextRef, EngineId, TraceEvent, Value};
use thiserror::Error;

/// A boxed error raised by user code, an observer, or a profile sink.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for strand operations.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The target cannot be switched to.
    #[error("{0}")]
    InvalidContext(#[from] InvalidContextError),

    /// The target belongs to another engine.
    #[error("{0}")]
    CrossThread(#[from] CrossThreadError),

    /// The trace observer failed; tracing has been disabled.
    #[error("{0}")]
    Observer(#[from] ObserverError),

    /// An error escaped every context that could have received it.
    #[error("{0}")]
    Unhandled(#[from] UnhandledContextError),

    /// A context local was written twice.
    #[error("{0}")]
    LocalConflict(#[from] LocalConflictError),

    /// The exit signal used to kill a context.
    ///
    /// When it escapes an entry, the context finishes normally with the
    /// carried value.
    #[error("context exit")]
    Exit(Value),

    /// An error raised by user code.
    #[error("{0}")]
    Raised(#[source] BoxError),

    /// A context entry panicked.
    #[error("context panicked: {0}")]
    Panicked(String),

    /// The stack for a context could not be allocated.
    #[error("failed to allocate context stack: {0}")]
    StackAllocation(#[source] std::io::Error),

    /// Invalid engine configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ContextError {
    /// Wraps an arbitrary error (or message) raised by user code.
    pub fn raise(error: impl Into<BoxError>) -> Self {
        Self::Raised(error.into())
    }

    /// Creates the exit signal with a `null` payload.
    #[must_use]
    pub fn exit() -> Self {
        Self::Exit(Value::Null)
    }

    /// Returns true for the exit signal.
    #[must_use]
    pub fn is_exit(&self) -> bool {
        matches!(self, Self::Exit(_))
    }

    /// Looks through wrappers for a user error of type `T`.
    #[must_use]
    pub fn downcast_ref<T: std::error::Error + 'static>(&self) -> Option<&T> {
        match self {
            Self::Raised(inner) => inner.downcast_ref::<T>(),
            Self::Observer(err) => err.source.downcast_ref::<T>(),
            Self::Unhandled(err) => err.source.downcast_ref::<T>(),
            _ => None,
        }
    }
}

/// Error raised when a switch/throw target cannot run.
#[derive(Debug, Clone, Error)]
#[error("cannot switch to {context}: {reason}")]
pub struct InvalidContextError {
    /// The rejected context.
    pub context: ContextRef,
    /// Why it was rejected.
    pub reason: String,
}

impl InvalidContextError {
    /// Creates a new invalid context error.
    #[must_use]
    pub fn new(context: ContextRef, reason: impl Into<String>) -> Self {
        Self {
            context,
            reason: reason.into(),
        }
    }

    /// The target has already finished.
    #[must_use]
    pub fn dead(context: ContextRef) -> Self {
        Self::new(context, "context is dead")
    }
}

/// Error raised when a context of another engine is used.
#[derive(Debug, Clone, Error)]
#[error("{context} belongs to engine {owner}, not {engine}")]
pub struct CrossThreadError {
    /// The foreign context.
    pub context: ContextRef,
    /// The engine that owns it.
    pub owner: EngineId,
    /// The engine it was used with.
    pub engine: EngineId,
}

impl CrossThreadError {
    /// Creates a new cross-thread error.
    #[must_use]
    pub fn new(context: ContextRef, engine: EngineId) -> Self {
        Self {
            context,
            owner: context.engine(),
            engine,
        }
    }
}

/// Error raised when the trace observer itself fails.
#[derive(Debug, Error)]
#[error("trace observer failed on {} from {} to {}: {source}", .event.kind, .event.origin, .event.target)]
pub struct ObserverError {
    /// The event being delivered.
    pub event: TraceEvent,
    /// Whatever the observer returned.
    #[source]
    pub source: BoxError,
}

impl ObserverError {
    /// Creates a new observer error.
    #[must_use]
    pub fn new(event: TraceEvent, source: BoxError) -> Self {
        Self { event, source }
    }
}

/// Error raised when writing to an existing context local.
#[derive(Debug, Clone, Error)]
#[error("local '{key}' is already set")]
pub struct LocalConflictError {
    /// The conflicting key.
    pub key: String,
}

impl LocalConflictError {
    /// Creates a new local conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Error raised by a context with nobody left to receive it.
#[derive(Debug, Error)]
#[error("unhandled error in {context}: {source}")]
pub struct UnhandledContextError {
    /// The context whose entry raised.
    pub context: ContextRef,
    /// The escaped error.
    #[source]
    pub source: Box<ContextError>,
}

impl UnhandledContextError {
    /// Creates a new unhandled context error.
    #[must_use]
    pub fn new(context: ContextRef, source: ContextError) -> Self {
        Self {
            context,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ContextId;

    #[derive(Debug, Error)]
    #[error("some error")]
    struct SomeError;

    fn context() -> ContextRef {
        ContextRef::new(EngineId::generate(), ContextId::from_index(2))
    }

    #[test]
    fn test_invalid_context_display() {
        let err = InvalidContextError::dead(context());
        assert_eq!(err.to_string(), "cannot switch to context#2: context is dead");
    }

    #[test]
    fn test_cross_thread_records_owner() {
        let ctx = context();
        let other = EngineId::generate();
        let err = CrossThreadError::new(ctx, other);
        assert_eq!(err.owner, ctx.engine());
        assert_eq!(err.engine, other);
    }

    #[test]
    fn test_raise_from_message() {
        let err = ContextError::raise("boom");
        assert_eq!(err.to_string(), "boom");
        assert!(!err.is_exit());
    }

    #[test]
    fn test_downcast_through_wrappers() {
        let raised = ContextError::raise(SomeError);
        assert!(raised.downcast_ref::<SomeError>().is_some());

        let unhandled: ContextError = UnhandledContextError::new(context(), raised).into();
        assert!(unhandled.downcast_ref::<SomeError>().is_some());

        let event = TraceEvent::switch(context(), context());
        let observer: ContextError = ObserverError::new(event, Box::new(SomeError)).into();
        assert!(observer.downcast_ref::<SomeError>().is_some());
        assert!(observer.to_string().starts_with("trace observer failed on switch"));
    }

    #[test]
    fn test_exit_signal() {
        assert!(ContextError::exit().is_exit());
        assert!(matches!(ContextError::exit(), ContextError::Exit(Value::Null)));
    }
}
