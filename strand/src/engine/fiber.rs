//! The handle a running context uses to reach its engine.

use super::transfer::{Begin, Handoff, Signal};
use super::{EngineHandle, Switcher};
use crate::context::LocalBag;
use crate::core::{ContextId, ContextRef, Outcome, Value};
use crate::errors::InvalidContextError;
use corosensei::Yielder;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// Passed to a context's entry; switching through it suspends that context.
///
/// A fiber borrows its context's stack and cannot outlive the entry call.
/// It dereferences to the [`EngineHandle`] for queries and spawning.
pub struct Fiber<'y> {
    handle: EngineHandle,
    id: ContextId,
    yielder: &'y Yielder<Signal, Handoff>,
}

impl<'y> Fiber<'y> {
    pub(crate) fn new(handle: EngineHandle, id: ContextId, yielder: &'y Yielder<Signal, Handoff>) -> Self {
        Self { handle, id, yielder }
    }

    pub(crate) fn context_id(&self) -> ContextId {
        self.id
    }

    /// The context this fiber belongs to.
    #[must_use]
    pub fn context(&self) -> ContextRef {
        self.handle.reference(self.id)
    }

    /// The context that will receive this one's result.
    #[must_use]
    pub fn parent_context(&self) -> Option<ContextRef> {
        self.handle
            .inner
            .contexts
            .borrow()
            .parent(self.id)
            .map(|parent| self.handle.reference(parent))
    }

    /// Switches to the nearest unfinished ancestor.
    pub fn switch_to_parent(&self, value: Value) -> Outcome {
        let parent = self.handle.nearest_living_ancestor(self.id);
        self.switch(self.handle.reference(parent), value)
    }

    /// This context's local storage.
    #[must_use]
    pub fn context_locals(&self) -> Rc<LocalBag> {
        self.handle.locals_of(self.id)
    }
}

impl Switcher for Fiber<'_> {
    fn engine(&self) -> &EngineHandle {
        &self.handle
    }

    fn transfer(&self, target: ContextRef, payload: Outcome) -> Outcome {
        if self.handle.inner.current.get() != self.id {
            return Err(InvalidContextError::new(self.context(), "fiber used while its context is not running").into());
        }
        match self.handle.begin_transfer(self.id, target, payload)? {
            Begin::Noop(outcome) => outcome,
            Begin::Handoff(handoff) => {
                let signal = self.yielder.suspend(handoff);
                self.handle.receive(self.id, signal)
            }
        }
    }
}

impl Deref for Fiber<'_> {
    type Target = EngineHandle;

    fn deref(&self) -> &EngineHandle {
        &self.handle
    }
}

impl fmt::Debug for Fiber<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("engine", &self.handle.id())
            .field("context", &self.id)
            .finish_non_exhaustive()
    }
}
