//! The switching interface shared by the root and every fiber.

use super::transfer::Begin;
use super::{Engine, EngineHandle};
use crate::core::{ContextId, ContextRef, ContextStatus, Outcome, Value};
use crate::errors::{ContextError, InvalidContextError};

/// Transfers control between contexts of one engine.
///
/// Implemented by [`Engine`] for the root context and by
/// [`Fiber`](super::Fiber) inside every other context.
pub trait Switcher {
    /// The engine this switcher belongs to.
    fn engine(&self) -> &EngineHandle;

    /// Suspends the caller and resumes `target` with `payload`.
    ///
    /// Returns whatever is eventually delivered back to the caller. An `Err`
    /// payload is raised at the target's suspension point.
    ///
    /// # Errors
    ///
    /// `InvalidContextError` if the target is dead or unknown,
    /// `CrossThreadError` if it belongs to another engine, `ObserverError` if
    /// the trace observer failed. In all three cases the caller keeps running.
    fn transfer(&self, target: ContextRef, payload: Outcome) -> Outcome;

    /// Resumes `target`, delivering `value`.
    fn switch(&self, target: ContextRef, value: Value) -> Outcome {
        self.transfer(target, Ok(value))
    }

    /// Resumes `target` with `error` raised at its suspension point.
    ///
    /// A context that never started is killed without running; the error
    /// goes to its parent chain.
    fn throw(&self, target: ContextRef, error: ContextError) -> Outcome {
        self.transfer(target, Err(error))
    }

    /// Throws the exit signal into `target` and waits for it to finish.
    ///
    /// While the kill is in flight the caller is `target`'s parent, so its
    /// result comes straight back here. The root never gets a parent: killing
    /// it raises the exit signal at its suspension point like `throw`.
    /// Killing a dead context does nothing.
    fn kill(&self, target: ContextRef) -> Outcome {
        let engine = self.engine();
        let id = engine.resolve(target)?;
        if engine.status_of(id) == ContextStatus::Dead {
            return Ok(Value::Null);
        }

        let killer = engine.inner.current.get();
        if id == killer {
            return Err(ContextError::exit());
        }
        if id == ContextId::ROOT {
            return self.throw(target, ContextError::exit());
        }
        let previous = engine.replace_parent(id, Some(killer));
        let result = self.throw(target, ContextError::exit());
        engine.replace_parent(id, previous);
        result
    }
}

impl Switcher for Engine {
    fn engine(&self) -> &EngineHandle {
        &self.handle
    }

    fn transfer(&self, target: ContextRef, payload: Outcome) -> Outcome {
        let root = ContextId::ROOT;
        if self.inner.current.get() != root {
            return Err(InvalidContextError::new(
                self.root(),
                "the engine can only switch while the root context is running",
            )
            .into());
        }
        match self.begin_transfer(root, target, payload)? {
            Begin::Noop(outcome) => outcome,
            Begin::Handoff(handoff) => self.drive(handoff),
        }
    }
}
