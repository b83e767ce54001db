//! Identifier types for engines and contexts.
//!
//! All IDs are lightweight `Copy` newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one engine, i.e. one logical thread and its tree of contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineId(Uuid);

impl EngineId {
    /// Generates a fresh engine ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a context inside its engine's arena.
///
/// Arena slots are never reused, so an index stays unique for the lifetime
/// of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(usize);

impl ContextId {
    /// The root context is always the first arena slot.
    pub(crate) const ROOT: Self = Self(0);

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Returns the arena index.
    #[must_use]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A handle naming one context of one engine.
///
/// This is what observers receive as origin and target, and what callers pass
/// to `switch`/`throw`. It does not own the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextRef {
    engine: EngineId,
    id: ContextId,
}

impl ContextRef {
    pub(crate) fn new(engine: EngineId, id: ContextId) -> Self {
        Self { engine, id }
    }

    /// Returns the engine this context belongs to.
    #[must_use]
    pub fn engine(&self) -> EngineId {
        self.engine
    }

    /// Returns the context's arena ID.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Returns true if this is the root context of its engine.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.id == ContextId::ROOT
    }
}

impl fmt::Display for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context#{}", self.id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_id_generate_is_unique() {
        assert_ne!(EngineId::generate(), EngineId::generate());
    }

    #[test]
    fn test_context_ref_root() {
        let engine = EngineId::generate();
        assert!(ContextRef::new(engine, ContextId::ROOT).is_root());
        assert!(!ContextRef::new(engine, ContextId::from_index(3)).is_root());
    }

    #[test]
    fn test_context_ref_equality_includes_engine() {
        let id = ContextId::from_index(1);
        let a = ContextRef::new(EngineId::generate(), id);
        let b = ContextRef::new(EngineId::generate(), id);
        assert_ne!(a, b);
        assert_eq!(a, ContextRef::new(a.engine(), id));
    }

    #[test]
    fn test_context_ref_display() {
        let r = ContextRef::new(EngineId::generate(), ContextId::from_index(7));
        assert_eq!(r.to_string(), "context#7");
    }
}
