//! The transfer protocol.
//!
//! Every transfer runs the same steps in the same order:
//! 1. resolve and validate the target,
//! 2. allocate its stack if it has never run,
//! 3. notify the trace observer,
//! 4. move the profile sink's view to the target's frames,
//! 5. update statuses and the running context,
//! 6. hand control over.
//!
//! Steps 1-3 may fail, in which case nothing has changed. Step 6 is a yield
//! to the root (from a context) or a resume loop (on the root).

use super::{EngineHandle, Entry, Fiber};
use crate::core::{ContextId, ContextRef, ContextStatus, Outcome, TraceEvent, TraceKind, Value};
use crate::errors::{ContextError, InvalidContextError};
use crate::trace::TraceDispatcher;
use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, trace, warn};

/// What a resumed context receives.
pub(crate) enum Signal {
    Value(Value),
    /// The error is parked in the receiver's `pending_error`.
    Error,
}

/// Control moving to `target`.
pub(crate) struct Handoff {
    pub(crate) target: ContextId,
    pub(crate) signal: Signal,
}

/// A context's own stack, suspended whenever the context is not running.
pub(crate) type ContextStack = Coroutine<Signal, Handoff, Handoff, DefaultStack>;

/// Result of validating a transfer.
pub(crate) enum Begin {
    /// The target is already running: nothing to do.
    Noop(Outcome),
    Handoff(Handoff),
}

fn kind_of(payload: &Outcome) -> TraceKind {
    if payload.is_ok() {
        TraceKind::Switch
    } else {
        TraceKind::Throw
    }
}

/// The exit signal finishes a context normally.
fn absorb_exit(outcome: Outcome) -> Outcome {
    match outcome {
        Err(ContextError::Exit(value)) => Ok(value),
        other => other,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl EngineHandle {
    /// Steps 1 to 5 for a transfer requested by the running context `origin`.
    pub(crate) fn begin_transfer(
        &self,
        origin: ContextId,
        target: ContextRef,
        payload: Outcome,
    ) -> Result<Begin, ContextError> {
        let target_id = self.resolve(target)?;
        if target_id == origin {
            return Ok(Begin::Noop(payload));
        }

        match self.status_of(target_id) {
            ContextStatus::Dead => return Err(InvalidContextError::dead(target).into()),
            ContextStatus::Running => {
                return Err(InvalidContextError::new(target, "context is already running").into())
            }
            ContextStatus::NotStarted => self.ensure_stack(target_id)?,
            ContextStatus::Suspended => {}
        }

        let event = TraceEvent::new(kind_of(&payload), self.reference(origin), target);
        TraceDispatcher::dispatch(&self.inner.tracer, &event)?;

        Ok(Begin::Handoff(self.commit(
            origin,
            target_id,
            payload,
            ContextStatus::Suspended,
        )))
    }

    /// Builds the stack of a context that has never run.
    fn ensure_stack(&self, id: ContextId) -> Result<(), ContextError> {
        let context = self.reference(id);
        {
            let contexts = self.inner.contexts.borrow();
            match contexts.get(id) {
                Some(record) if record.stack.is_some() => return Ok(()),
                Some(record) if record.entry.is_some() => {}
                _ => return Err(InvalidContextError::new(context, "context has no entry").into()),
            }
        }

        let stack_size = self.inner.config.stack_size;
        let stack = DefaultStack::new(stack_size).map_err(ContextError::StackAllocation)?;

        let mut contexts = self.inner.contexts.borrow_mut();
        let Some(record) = contexts.get_mut(id) else {
            return Err(InvalidContextError::new(context, "unknown context").into());
        };
        let Some(entry) = record.entry.take() else {
            return Err(InvalidContextError::new(context, "context has no entry").into());
        };
        record.stack = Some(self.build_stack(id, entry, stack));
        trace!(engine = %self.inner.id, context = %context, stack_size, "Allocated context stack");
        Ok(())
    }

    fn build_stack(&self, id: ContextId, entry: Entry, stack: DefaultStack) -> ContextStack {
        let handle = self.clone();
        Coroutine::with_stack(stack, move |yielder, signal| {
            let fiber = Fiber::new(handle, id, yielder);
            let outcome = fiber.run_entry(entry, signal);
            fiber.finish(outcome)
        })
    }

    /// Steps 4 and 5. Cannot fail.
    pub(crate) fn commit(
        &self,
        origin: ContextId,
        target: ContextId,
        payload: Outcome,
        origin_status: ContextStatus,
    ) -> Handoff {
        let first_entry = self.status_of(target) == ContextStatus::NotStarted;
        let profile = self
            .inner
            .profiler
            .borrow_mut()
            .transfer(origin, target, first_entry);
        profile.deliver();

        let kind = kind_of(&payload);
        let (released, signal) = {
            let mut contexts = self.inner.contexts.borrow_mut();
            let released = contexts.get_mut(origin).and_then(|record| {
                if origin_status == ContextStatus::Dead {
                    Some(record.retire())
                } else {
                    record.status = origin_status;
                    None
                }
            });
            let signal = match payload {
                Ok(value) => Signal::Value(value),
                Err(err) => {
                    if let Some(record) = contexts.get_mut(target) {
                        record.pending_error = Some(err);
                    }
                    Signal::Error
                }
            };
            if let Some(record) = contexts.get_mut(target) {
                record.status = ContextStatus::Running;
            }
            (released, signal)
        };
        drop(released);

        self.inner.current.set(target);
        debug!(
            engine = %self.inner.id,
            origin = %self.reference(origin),
            target = %self.reference(target),
            kind = %kind,
            "Context transfer"
        );
        Handoff { target, signal }
    }

    /// Turns a signal into what the receiving context's switch returns.
    pub(crate) fn receive(&self, id: ContextId, signal: Signal) -> Outcome {
        match signal {
            Signal::Value(value) => Ok(value),
            Signal::Error => Err(self
                .inner
                .contexts
                .borrow_mut()
                .get_mut(id)
                .and_then(|record| record.pending_error.take())
                .unwrap_or_else(|| {
                    InvalidContextError::new(self.reference(id), "thrown error was lost").into()
                })),
        }
    }

    /// Step 6 on the root: resume contexts until control comes back.
    pub(crate) fn drive(&self, mut handoff: Handoff) -> Outcome {
        while handoff.target != ContextId::ROOT {
            let target = handoff.target;
            let stack = self
                .inner
                .contexts
                .borrow_mut()
                .get_mut(target)
                .and_then(|record| record.stack.take());
            let Some(mut stack) = stack else {
                return Err(InvalidContextError::new(self.reference(target), "context has no stack").into());
            };

            match stack.resume(handoff.signal) {
                CoroutineResult::Yield(next) => {
                    if let Some(record) = self.inner.contexts.borrow_mut().get_mut(target) {
                        record.stack = Some(stack);
                    }
                    handoff = next;
                }
                CoroutineResult::Return(next) => {
                    drop(stack);
                    trace!(engine = %self.inner.id, context = %self.reference(target), "Released context stack");
                    handoff = next;
                }
            }
        }
        self.receive(ContextId::ROOT, handoff.signal)
    }
}

impl Fiber<'_> {
    /// Runs the entry on first switch-in.
    ///
    /// An error as the first signal kills the context without running it.
    /// Panics become `ContextError::Panicked`, except while the engine is
    /// being dropped, when the unwind must be allowed to leave the stack.
    fn run_entry(&self, entry: Entry, signal: Signal) -> Outcome {
        let value = match self.receive(self.context_id(), signal) {
            Ok(value) => value,
            Err(err) => {
                drop(entry);
                return absorb_exit(Err(err));
            }
        };

        let frame = self.enter_frame(&self.name_of(self.context_id()));
        let result = panic::catch_unwind(AssertUnwindSafe(|| entry(self, value)));
        drop(frame);

        match result {
            Ok(outcome) => absorb_exit(outcome),
            Err(payload) => {
                if self.inner.closing.get() {
                    panic::resume_unwind(payload);
                }
                let message = panic_message(payload.as_ref());
                warn!(engine = %self.inner.id, context = %self.context(), panic = %message, "Context entry panicked");
                Err(ContextError::Panicked(message))
            }
        }
    }

    /// Hands the outcome to the nearest living ancestor and marks this
    /// context dead.
    ///
    /// The dying context cannot keep running, so a failing observer does not
    /// stop this transfer: tracing is disabled and the observer's error
    /// replaces the outcome.
    fn finish(&self, mut outcome: Outcome) -> Handoff {
        let id = self.context_id();
        match &outcome {
            Ok(_) => debug!(engine = %self.inner.id, context = %self.context(), "Context finished"),
            Err(err) => debug!(engine = %self.inner.id, context = %self.context(), error = %err, "Context finished with error"),
        }

        loop {
            let target = self.nearest_living_ancestor(id);
            if self.status_of(target) == ContextStatus::NotStarted {
                if let Err(err) = self.ensure_stack(target) {
                    warn!(engine = %self.inner.id, context = %self.reference(target), error = %err, "Ancestor cannot start");
                    self.retire(target);
                    outcome = Err(err);
                    continue;
                }
            }

            let event = TraceEvent::new(kind_of(&outcome), self.context(), self.reference(target));
            if let Err(err) = TraceDispatcher::dispatch(&self.inner.tracer, &event) {
                outcome = Err(err.into());
            }

            let handoff = self.commit(id, target, outcome, ContextStatus::Dead);
            self.inner.profiler.borrow_mut().release(id);
            return handoff;
        }
    }
}
