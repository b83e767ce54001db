//! Trace event delivered to the switch observer.

use super::ContextRef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a transfer carried a value or an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    /// A normal, value-carrying transfer.
    Switch,
    /// An error-carrying transfer.
    Throw,
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Switch => write!(f, "switch"),
            Self::Throw => write!(f, "throw"),
        }
    }
}

/// One transfer of control, reported before it takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// The kind of transfer.
    pub kind: TraceKind,
    /// The context that was running when the transfer was requested.
    pub origin: ContextRef,
    /// The context about to run.
    pub target: ContextRef,
}

impl TraceEvent {
    /// Creates a new trace event.
    #[must_use]
    pub fn new(kind: TraceKind, origin: ContextRef, target: ContextRef) -> Self {
        Self {
            kind,
            origin,
            target,
        }
    }

    /// Creates a "switch" event.
    #[must_use]
    pub fn switch(origin: ContextRef, target: ContextRef) -> Self {
        Self::new(TraceKind::Switch, origin, target)
    }

    /// Creates a "throw" event.
    #[must_use]
    pub fn throw(origin: ContextRef, target: ContextRef) -> Self {
        Self::new(TraceKind::Throw, origin, target)
    }

    /// Returns the event as `(kind, (origin, target))`.
    #[must_use]
    pub fn as_tuple(&self) -> (TraceKind, (ContextRef, ContextRef)) {
        (self.kind, (self.origin, self.target))
    }

    /// Converts the event to a JSON payload for structured logging.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind.to_string(),
            "origin": self.origin.id().index(),
            "target": self.target.id().index(),
            "engine": self.origin.engine().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ContextId, EngineId};

    fn refs() -> (ContextRef, ContextRef) {
        let engine = EngineId::generate();
        (
            ContextRef::new(engine, ContextId::ROOT),
            ContextRef::new(engine, ContextId::from_index(1)),
        )
    }

    #[test]
    fn test_trace_kind_display() {
        assert_eq!(TraceKind::Switch.to_string(), "switch");
        assert_eq!(TraceKind::Throw.to_string(), "throw");
    }

    #[test]
    fn test_event_constructors() {
        let (main, g) = refs();
        assert_eq!(TraceEvent::switch(main, g).kind, TraceKind::Switch);
        assert_eq!(TraceEvent::throw(g, main).as_tuple(), (TraceKind::Throw, (g, main)));
    }

    #[test]
    fn test_event_to_json() {
        let (main, g) = refs();
        let json = TraceEvent::switch(main, g).to_json();
        assert_eq!(json["kind"], "switch");
        assert_eq!(json["origin"], 0);
        assert_eq!(json["target"], 1);
    }
}
