//! Profiler bridging.
//!
//! A [`ProfileSink`] sees call/return notifications for frames entered with
//! [`EngineHandle::enter_frame`](crate::engine::EngineHandle::enter_frame).
//! Each context has its own logical chain of frames. When control moves to
//! another context the bridge emits synthetic `Return`s for the frames the
//! sink believes are active but the target does not share, then synthetic
//! `Call`s for the target's frames, so the sink always observes one
//! continuous call stack. Native callouts entered with
//! [`EngineHandle::enter_native_frame`](crate::engine::EngineHandle::enter_native_frame)
//! nest the same way and are replayed as `CReturn`/`CCall`.

mod bridge;
mod guard;

pub(crate) use bridge::{PendingProfile, ProfileBridge};
pub use guard::{FrameGuard, NativeFrameGuard};

use crate::core::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, trace, Level};

/// Identifies one entered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(u64);

impl FrameId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw counter value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// A frame as the sink sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFrame {
    /// Unique per engine.
    pub id: FrameId,
    /// Label given when the frame was entered.
    pub name: String,
}

/// The notification kinds a profile sink understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileEventKind {
    /// A frame became active.
    Call,
    /// A frame stopped being active.
    Return,
    /// A native callout started.
    CCall,
    /// A native callout finished.
    CReturn,
}

impl fmt::Display for ProfileEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Return => write!(f, "return"),
            Self::CCall => write!(f, "c_call"),
            Self::CReturn => write!(f, "c_return"),
        }
    }
}

/// The `extra` payload attached to events the bridge emits on a switch.
#[must_use]
pub fn synthetic_extra() -> Value {
    serde_json::json!({ "synthetic": true })
}

/// Returns true if `extra` marks an event emitted on a context switch.
#[must_use]
pub fn is_synthetic(extra: &Value) -> bool {
    extra.get("synthetic").and_then(Value::as_bool) == Some(true)
}

/// Stack-based profiling callback.
#[cfg_attr(test, mockall::automock)]
pub trait ProfileSink {
    /// Called for each frame activation change.
    fn on_event(&self, frame: &ProfileFrame, kind: ProfileEventKind, extra: &Value);
}

impl<F> ProfileSink for F
where
    F: Fn(&ProfileFrame, ProfileEventKind, &Value),
{
    fn on_event(&self, frame: &ProfileFrame, kind: ProfileEventKind, extra: &Value) {
        self(frame, kind, extra);
    }
}

/// A sink that logs every profile event through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingProfileSink {
    level: Level,
}

impl Default for LoggingProfileSink {
    fn default() -> Self {
        Self { level: Level::TRACE }
    }
}

impl LoggingProfileSink {
    /// Creates a new logging sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl ProfileSink for LoggingProfileSink {
    fn on_event(&self, frame: &ProfileFrame, kind: ProfileEventKind, extra: &Value) {
        if self.level == Level::TRACE {
            trace!(frame = %frame.id, name = %frame.name, kind = %kind, synthetic = is_synthetic(extra), "Profile: {}", kind);
        } else {
            debug!(frame = %frame.id, name = %frame.name, kind = %kind, synthetic = is_synthetic(extra), "Profile: {}", kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(ProfileEventKind::Call.to_string(), "call");
        assert_eq!(ProfileEventKind::CReturn.to_string(), "c_return");
    }

    #[test]
    fn test_synthetic_marker() {
        assert!(is_synthetic(&synthetic_extra()));
        assert!(!is_synthetic(&Value::Null));
        assert!(!is_synthetic(&serde_json::json!({ "synthetic": false })));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ProfileEventKind::CCall).unwrap();
        assert_eq!(json, "\"c_call\"");
    }

    #[test]
    fn test_logging_sink() {
        let frame = ProfileFrame {
            id: FrameId::new(1),
            name: "run".to_string(),
        };
        LoggingProfileSink::default().on_event(&frame, ProfileEventKind::Call, &Value::Null);
        LoggingProfileSink::new(Level::DEBUG).on_event(&frame, ProfileEventKind::Return, &synthetic_extra());
    }
}
