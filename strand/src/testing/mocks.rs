//! Recording observers and sinks for tests.

use parking_lot::{Mutex, RwLock};

use crate::core::{ContextRef, TraceEvent, TraceKind, Value};
use crate::errors::BoxError;
use crate::profile::{is_synthetic, FrameId, ProfileEventKind, ProfileFrame, ProfileSink};
use crate::trace::TraceObserver;

/// A trace observer that records every event it receives.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: RwLock<Vec<TraceEvent>>,
}

impl CollectingObserver {
    /// Creates a new collecting observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.read().clone()
    }

    /// Returns events as `(kind, (origin, target))` tuples.
    #[must_use]
    pub fn log(&self) -> Vec<(TraceKind, (ContextRef, ContextRef))> {
        self.events.read().iter().map(TraceEvent::as_tuple).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl TraceObserver for CollectingObserver {
    fn on_event(&self, event: &TraceEvent) -> Result<(), BoxError> {
        self.events.write().push(*event);
        Ok(())
    }
}

/// An observer that records events and fails from a given event on.
#[derive(Debug)]
pub struct FailingObserver {
    fail_from: usize,
    message: String,
    events: Mutex<Vec<TraceEvent>>,
}

impl FailingObserver {
    /// Fails on every event.
    #[must_use]
    pub fn always(message: impl Into<String>) -> Self {
        Self::from_event(1, message)
    }

    /// Succeeds for the first `n - 1` events, then fails.
    #[must_use]
    pub fn from_event(n: usize, message: impl Into<String>) -> Self {
        Self {
            fail_from: n.max(1),
            message: message.into(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Every event delivered, including the failing ones.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    /// Number of delivered events.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl TraceObserver for FailingObserver {
    fn on_event(&self, event: &TraceEvent) -> Result<(), BoxError> {
        let mut events = self.events.lock();
        events.push(*event);
        if events.len() >= self.fail_from {
            return Err(self.message.clone().into());
        }
        Ok(())
    }
}

/// One profile event as recorded by [`CollectingProfileSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRecord {
    /// The frame's ID.
    pub frame: FrameId,
    /// The frame's name.
    pub name: String,
    /// The event kind.
    pub kind: ProfileEventKind,
    /// Whether the event was emitted on a context switch.
    pub synthetic: bool,
}

/// A profile sink that records every event.
#[derive(Debug, Default)]
pub struct CollectingProfileSink {
    records: RwLock<Vec<ProfileRecord>>,
}

impl CollectingProfileSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected records.
    #[must_use]
    pub fn records(&self) -> Vec<ProfileRecord> {
        self.records.read().clone()
    }

    /// Returns `(name, kind)` pairs, the most common shape to compare.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, ProfileEventKind)> {
        self.records
            .read()
            .iter()
            .map(|record| (record.name.clone(), record.kind))
            .collect()
    }

    /// Returns the number of collected records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Clears all collected records.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl ProfileSink for CollectingProfileSink {
    fn on_event(&self, frame: &ProfileFrame, kind: ProfileEventKind, extra: &Value) {
        self.records.write().push(ProfileRecord {
            frame: frame.id,
            name: frame.name.clone(),
            kind,
            synthetic: is_synthetic(extra),
        });
    }
}
