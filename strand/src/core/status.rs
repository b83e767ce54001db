//! Context status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of an execution context.
///
/// `NotStarted -> Running <-> Suspended`, and `Running -> Dead`. No transition
/// leaves `Dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    /// Created but never switched into.
    NotStarted,
    /// Currently executing.
    Running,
    /// Switched away from and waiting to be resumed.
    Suspended,
    /// The entry returned or raised; terminal.
    Dead,
}

impl Default for ContextStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl fmt::Display for ContextStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::Suspended => write!(f, "suspended"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

impl ContextStatus {
    /// Returns true unless the context is dead.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !matches!(self, Self::Dead)
    }

    /// Returns true if the context has been switched into at least once.
    #[must_use]
    pub fn is_started(&self) -> bool {
        !matches!(self, Self::NotStarted)
    }

    /// Returns true if the context has a live stack (running or suspended).
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Suspended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_status_display() {
        assert_eq!(ContextStatus::NotStarted.to_string(), "not_started");
        assert_eq!(ContextStatus::Running.to_string(), "running");
        assert_eq!(ContextStatus::Suspended.to_string(), "suspended");
        assert_eq!(ContextStatus::Dead.to_string(), "dead");
    }

    #[test]
    fn test_context_status_predicates() {
        assert!(ContextStatus::NotStarted.is_alive());
        assert!(!ContextStatus::NotStarted.is_started());
        assert!(!ContextStatus::NotStarted.is_active());

        assert!(ContextStatus::Suspended.is_active());
        assert!(ContextStatus::Running.is_active());

        assert!(!ContextStatus::Dead.is_alive());
        assert!(ContextStatus::Dead.is_started());
        assert!(!ContextStatus::Dead.is_active());
    }

    #[test]
    fn test_context_status_serialization() {
        let json = serde_json::to_string(&ContextStatus::NotStarted).unwrap();
        assert_eq!(json, "\"not_started\"");
        let back: ContextStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ContextStatus::NotStarted);
    }
}
