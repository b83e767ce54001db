//! Switch/throw tracing.
//!
//! An engine holds at most one [`TraceObserver`]. It is told about every
//! transfer that changes the running context, before the transfer happens.
//! An observer that fails is removed: the failing transfer reports an
//! `ObserverError` and later transfers run untraced until a new observer is
//! installed.

use crate::core::TraceEvent;
use crate::errors::{BoxError, ObserverError};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info, warn, Level};

/// Receives one notification per context transfer.
#[cfg_attr(test, mockall::automock)]
pub trait TraceObserver {
    /// Called before the transfer described by `event`.
    ///
    /// # Errors
    ///
    /// Any error disables tracing and is reported to whoever requested the
    /// transfer.
    fn on_event(&self, event: &TraceEvent) -> Result<(), BoxError>;
}

impl<F> TraceObserver for F
where
    F: Fn(&TraceEvent) -> Result<(), BoxError>,
{
    fn on_event(&self, event: &TraceEvent) -> Result<(), BoxError> {
        self(event)
    }
}

/// An observer that logs each transfer through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    level: Level,
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingObserver {
    /// Creates a new logging observer with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging observer.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level logging observer.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }
}

impl TraceObserver for LoggingObserver {
    fn on_event(&self, event: &TraceEvent) -> Result<(), BoxError> {
        if self.level == Level::INFO {
            info!(
                kind = %event.kind,
                origin = %event.origin,
                target = %event.target,
                "Transfer: {}", event.kind
            );
        } else {
            debug!(
                kind = %event.kind,
                origin = %event.origin,
                target = %event.target,
                "Transfer: {}", event.kind
            );
        }
        Ok(())
    }
}

#[derive(Default)]
enum TraceState {
    #[default]
    Unset,
    Enabled(Rc<dyn TraceObserver>),
    /// Cleared after a failure.
    Disabled,
}

/// The observer slot of one engine.
#[derive(Default)]
pub(crate) struct TraceDispatcher {
    state: TraceState,
}

impl TraceDispatcher {
    /// Installs (or clears) the observer, returning the previous one.
    pub(crate) fn set_observer(
        &mut self,
        observer: Option<Rc<dyn TraceObserver>>,
    ) -> Option<Rc<dyn TraceObserver>> {
        let previous = self.observer();
        self.state = observer.map_or(TraceState::Unset, TraceState::Enabled);
        previous
    }

    pub(crate) fn observer(&self) -> Option<Rc<dyn TraceObserver>> {
        match &self.state {
            TraceState::Enabled(observer) => Some(Rc::clone(observer)),
            TraceState::Unset | TraceState::Disabled => None,
        }
    }

    pub(crate) fn is_disabled(&self) -> bool {
        matches!(self.state, TraceState::Disabled)
    }

    fn disable(&mut self) {
        self.state = TraceState::Disabled;
    }

    /// Delivers `event` to the installed observer, if any.
    ///
    /// No borrow of the slot is held while the observer runs, so it may
    /// replace itself or query the engine.
    pub(crate) fn dispatch(cell: &RefCell<Self>, event: &TraceEvent) -> Result<(), ObserverError> {
        let Some(observer) = cell.borrow().observer() else {
            return Ok(());
        };

        observer.on_event(event).map_err(|source| {
            cell.borrow_mut().disable();
            warn!(
                kind = %event.kind,
                origin = %event.origin,
                target = %event.target,
                error = %source,
                "Trace observer failed, tracing disabled"
            );
            ObserverError::new(*event, source)
        })
    }
}

impl fmt::Debug for TraceDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            TraceState::Unset => "unset",
            TraceState::Enabled(_) => "enabled",
            TraceState::Disabled => "disabled",
        };
        f.debug_struct("TraceDispatcher").field("state", &state).finish()
    }
}
