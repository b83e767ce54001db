//! The execution context record.

use super::LocalBag;
use crate::core::{ContextId, ContextStatus};
use crate::engine::{ContextStack, Entry};
use crate::errors::ContextError;
use std::fmt;
use std::rc::Rc;

/// Everything the engine knows about one context.
///
/// Records live in the engine's arena and are only touched through the
/// engine. The entry is consumed when the stack is built, and the stack is
/// dropped as soon as the context finishes.
pub(crate) struct ExecutionContext {
    pub(crate) name: String,
    pub(crate) status: ContextStatus,
    pub(crate) parent: Option<ContextId>,
    pub(crate) entry: Option<Entry>,
    pub(crate) stack: Option<ContextStack>,
    pub(crate) pending_error: Option<ContextError>,
    pub(crate) locals: Rc<LocalBag>,
}

impl ExecutionContext {
    /// The root record: already running on the thread's own stack.
    pub(crate) fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ContextStatus::Running,
            parent: None,
            entry: None,
            stack: None,
            pending_error: None,
            locals: Rc::new(LocalBag::new()),
        }
    }

    pub(crate) fn spawned(
        name: impl Into<String>,
        parent: ContextId,
        entry: Entry,
        locals: LocalBag,
    ) -> Self {
        Self {
            name: name.into(),
            status: ContextStatus::NotStarted,
            parent: Some(parent),
            entry: Some(entry),
            stack: None,
            pending_error: None,
            locals: Rc::new(locals),
        }
    }

    /// Drops the entry and stack and marks the record dead.
    pub(crate) fn retire(&mut self) -> (Option<Entry>, Option<ContextStack>) {
        self.status = ContextStatus::Dead;
        self.pending_error = None;
        (self.entry.take(), self.stack.take())
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("parent", &self.parent)
            .field("has_entry", &self.entry.is_some())
            .field("has_stack", &self.stack.is_some())
            .field("pending_error", &self.pending_error)
            .finish_non_exhaustive()
    }
}
