//! The switch/throw execution engine.
//!
//! An [`Engine`] owns one tree of execution contexts sharing one logical
//! thread. The thread's own stack is the root context; every other context
//! runs on its own stack, allocated on first switch-in and released when
//! its entry finishes.
//!
//! Transfers are symmetric from the caller's point of view: any running
//! context may `switch` to any live context of the same engine. Physically,
//! each context yields back to the root, which resumes the next one.

mod fiber;
mod switcher;
mod transfer;


pub use fiber::Fiber;
pub use switcher::Switcher;
pub(crate) use transfer::ContextStack;

use crate::config::EngineConfig;
use crate::context::{ContextArena, ExecutionContext, LocalBag};
use crate::core::{ContextId, ContextRef, ContextStatus, EngineId, Outcome, Value};
use crate::errors::{ContextError, CrossThreadError, InvalidContextError, UnhandledContextError};
use crate::profile::{FrameGuard, FrameId, NativeFrameGuard, ProfileBridge, ProfileSink};
use crate::trace::{LoggingObserver, TraceDispatcher, TraceObserver};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;
use tracing::{debug, error, trace};

/// A context's body: receives its fiber and the first switched-in value.
pub(crate) type Entry = Box<dyn FnOnce(&Fiber<'_>, Value) -> Outcome>;

/// Options for [`EngineHandle::spawn_with`].
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Context name; defaults to the configured context name.
    pub name: Option<String>,
    /// Context receiving control when the new one finishes; defaults to the
    /// running context.
    pub parent: Option<ContextRef>,
    /// Start from a copy of the spawner's locals instead of an empty bag.
    pub inherit_locals: bool,
}

impl ContextOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the context name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the parent context.
    #[must_use]
    pub fn with_parent(mut self, parent: ContextRef) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Copies the spawner's locals into the new context.
    #[must_use]
    pub fn with_inherited_locals(mut self) -> Self {
        self.inherit_locals = true;
        self
    }
}

struct EngineInner {
    id: EngineId,
    config: EngineConfig,
    contexts: RefCell<ContextArena>,
    current: Cell<ContextId>,
    tracer: RefCell<TraceDispatcher>,
    profiler: RefCell<ProfileBridge>,
    closing: Cell<bool>,
}

/// A shared, non-owning handle to an engine.
///
/// Handles are cheap to clone and give access to everything except
/// switching: transfers need an [`Engine`] (from the root) or a [`Fiber`]
/// (from inside a context).
#[derive(Clone)]
pub struct EngineHandle {
    inner: Rc<EngineInner>,
}

impl EngineHandle {
    /// Returns the engine's ID.
    #[must_use]
    pub fn id(&self) -> EngineId {
        self.inner.id
    }

    /// Returns the engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Returns the root context.
    #[must_use]
    pub fn root(&self) -> ContextRef {
        self.reference(ContextId::ROOT)
    }

    /// Returns the running context.
    #[must_use]
    pub fn current(&self) -> ContextRef {
        self.reference(self.inner.current.get())
    }

    /// Returns the status of a context.
    pub fn status(&self, context: ContextRef) -> Result<ContextStatus, ContextError> {
        let id = self.resolve(context)?;
        Ok(self.status_of(id))
    }

    /// Returns the parent of a context; `None` for the root.
    pub fn parent(&self, context: ContextRef) -> Result<Option<ContextRef>, ContextError> {
        let id = self.resolve(context)?;
        let parent = self.inner.contexts.borrow().parent(id);
        Ok(parent.map(|p| self.reference(p)))
    }

    /// Returns the name of a context.
    pub fn name(&self, context: ContextRef) -> Result<String, ContextError> {
        let id = self.resolve(context)?;
        Ok(self.name_of(id))
    }

    /// Returns the local storage of a context.
    pub fn locals(&self, context: ContextRef) -> Result<Rc<LocalBag>, ContextError> {
        let id = self.resolve(context)?;
        Ok(self.locals_of(id))
    }

    /// Number of contexts ever created, including the root and dead ones.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.inner.contexts.borrow().len()
    }

    /// Number of contexts that have not finished, including the root.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner.contexts.borrow().live_count()
    }

    /// Creates a context whose parent is the running context.
    ///
    /// Nothing runs until the first switch into it.
    pub fn spawn<F>(&self, entry: F) -> ContextRef
    where
        F: FnOnce(&Fiber<'_>, Value) -> Outcome + 'static,
    {
        let parent = self.inner.current.get();
        let name = self.inner.config.context_name.clone();
        self.spawn_entry(name, parent, LocalBag::new(), Box::new(entry))
    }

    /// Creates a context with explicit options.
    pub fn spawn_with<F>(&self, options: ContextOptions, entry: F) -> Result<ContextRef, ContextError>
    where
        F: FnOnce(&Fiber<'_>, Value) -> Outcome + 'static,
    {
        let parent = match options.parent {
            Some(parent) => self.resolve(parent)?,
            None => self.inner.current.get(),
        };
        let locals = if options.inherit_locals {
            LocalBag::clone(&self.locals_of(self.inner.current.get()))
        } else {
            LocalBag::new()
        };
        let name = options
            .name
            .unwrap_or_else(|| self.inner.config.context_name.clone());
        Ok(self.spawn_entry(name, parent, locals, Box::new(entry)))
    }

    fn spawn_entry(&self, name: String, parent: ContextId, locals: LocalBag, entry: Entry) -> ContextRef {
        let id = self
            .inner
            .contexts
            .borrow_mut()
            .alloc(ExecutionContext::spawned(name, parent, entry, locals));
        let context = self.reference(id);
        debug!(engine = %self.inner.id, context = %context, parent = %self.reference(parent), "Spawned context");
        context
    }

    /// Changes the context that receives control when `context` finishes.
    ///
    /// # Errors
    ///
    /// `InvalidContextError` for the root or when the new parent chain would
    /// loop back to `context`; `CrossThreadError` if either belongs to
    /// another engine.
    pub fn set_parent(&self, context: ContextRef, parent: ContextRef) -> Result<(), ContextError> {
        let id = self.resolve(context)?;
        let parent_id = self.resolve(parent)?;
        if id == ContextId::ROOT {
            return Err(InvalidContextError::new(context, "the root context cannot have a parent").into());
        }

        let mut contexts = self.inner.contexts.borrow_mut();
        if contexts.is_ancestor_or_self(id, parent_id) {
            return Err(InvalidContextError::new(context, format!("parent cycle through {parent}")).into());
        }
        if let Some(record) = contexts.get_mut(id) {
            record.parent = Some(parent_id);
        }
        Ok(())
    }

    /// Installs or clears the trace observer, returning the previous one.
    pub fn set_trace(&self, observer: Option<Rc<dyn TraceObserver>>) -> Option<Rc<dyn TraceObserver>> {
        self.inner.tracer.borrow_mut().set_observer(observer)
    }

    /// Returns the installed trace observer.
    #[must_use]
    pub fn get_trace(&self) -> Option<Rc<dyn TraceObserver>> {
        self.inner.tracer.borrow().observer()
    }

    /// Returns true if tracing was switched off by a failing observer.
    #[must_use]
    pub fn trace_disabled(&self) -> bool {
        self.inner.tracer.borrow().is_disabled()
    }

    /// Installs or clears the profile sink, returning the previous one.
    ///
    /// The outgoing sink receives a `Return` for every frame it still sees as
    /// active. Frames already entered are never reported to the new sink.
    pub fn set_profile_sink(&self, sink: Option<Rc<dyn ProfileSink>>) -> Option<Rc<dyn ProfileSink>> {
        let (previous, flush) = self.inner.profiler.borrow_mut().set_sink(sink);
        flush.deliver();
        previous
    }

    /// Returns the installed profile sink.
    #[must_use]
    pub fn profile_sink(&self) -> Option<Rc<dyn ProfileSink>> {
        self.inner.profiler.borrow().sink()
    }

    /// Enters a profiled frame in the running context.
    pub fn enter_frame(&self, name: &str) -> FrameGuard {
        let context = self.inner.current.get();
        let (frame, pending) = self.inner.profiler.borrow_mut().enter(context, name);
        pending.deliver();
        FrameGuard::new(self.clone(), context, frame)
    }

    /// Reports a native callout to the sink as `CCall`/`CReturn`.
    ///
    /// The callout nests in the running context's frames like any other
    /// frame, so switching out while it is open closes and reopens it.
    pub fn enter_native_frame(&self, name: &str) -> NativeFrameGuard {
        let context = self.inner.current.get();
        let (frame, pending) = self.inner.profiler.borrow_mut().enter_native(context, name);
        pending.deliver();
        NativeFrameGuard::new(self.clone(), context, frame)
    }

    pub(crate) fn exit_frame(&self, context: ContextId, frame: FrameId) {
        // Guards may drop while the engine tears down.
        let Ok(mut profiler) = self.inner.profiler.try_borrow_mut() else {
            return;
        };
        let pending = profiler.exit(context, frame);
        drop(profiler);
        pending.deliver();
    }

    pub(crate) fn reference(&self, id: ContextId) -> ContextRef {
        ContextRef::new(self.inner.id, id)
    }

    /// Maps a handle to an arena ID of this engine.
    pub(crate) fn resolve(&self, context: ContextRef) -> Result<ContextId, ContextError> {
        if context.engine() != self.inner.id {
            return Err(CrossThreadError::new(context, self.inner.id).into());
        }
        if self.inner.contexts.borrow().get(context.id()).is_none() {
            return Err(InvalidContextError::new(context, "unknown context").into());
        }
        Ok(context.id())
    }

    pub(crate) fn status_of(&self, id: ContextId) -> ContextStatus {
        self.inner
            .contexts
            .borrow()
            .status(id)
            .unwrap_or(ContextStatus::Dead)
    }

    pub(crate) fn name_of(&self, id: ContextId) -> String {
        self.inner
            .contexts
            .borrow()
            .get(id)
            .map(|record| record.name.clone())
            .unwrap_or_default()
    }

    pub(crate) fn locals_of(&self, id: ContextId) -> Rc<LocalBag> {
        self.inner
            .contexts
            .borrow()
            .get(id)
            .map_or_else(|| Rc::new(LocalBag::new()), |record| Rc::clone(&record.locals))
    }

    pub(crate) fn nearest_living_ancestor(&self, id: ContextId) -> ContextId {
        self.inner.contexts.borrow().nearest_living_ancestor(id)
    }

    /// Sets the parent without any checks, returning the old one.
    pub(crate) fn replace_parent(&self, id: ContextId, parent: Option<ContextId>) -> Option<ContextId> {
        self.inner
            .contexts
            .borrow_mut()
            .get_mut(id)
            .and_then(|record| std::mem::replace(&mut record.parent, parent))
    }

    /// Marks a context dead without running it, releasing what it holds.
    fn retire(&self, id: ContextId) {
        let released = self
            .inner
            .contexts
            .borrow_mut()
            .get_mut(id)
            .map(ExecutionContext::retire);
        self.inner.profiler.borrow_mut().release(id);
        drop(released);
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("id", &self.inner.id)
            .field("current", &self.inner.current.get())
            .field("contexts", &self.inner.contexts.try_borrow().map(|c| c.len()).ok())
            .finish()
    }
}

/// The owner of an engine, running on the root context.
///
/// Dropping the engine force-unwinds every context that is still suspended.
/// Use [`Engine::close`] first to let them finish through the exit signal.
pub struct Engine {
    handle: EngineHandle,
}

impl Engine {
    /// Creates an engine with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(EngineConfig::default())
    }

    /// Creates an engine with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::Config` if the configuration is invalid.
    pub fn with_config(config: EngineConfig) -> Result<Self, ContextError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        let root = ExecutionContext::root(config.root_name.clone());
        let log_transfers = config.log_transfers;
        let inner = EngineInner {
            id: EngineId::generate(),
            config,
            contexts: RefCell::new(ContextArena::with_root(root)),
            current: Cell::new(ContextId::ROOT),
            tracer: RefCell::new(TraceDispatcher::default()),
            profiler: RefCell::new(ProfileBridge::default()),
            closing: Cell::new(false),
        };
        let handle = EngineHandle {
            inner: Rc::new(inner),
        };
        if log_transfers {
            handle.set_trace(Some(Rc::new(LoggingObserver::debug())));
        }
        debug!(engine = %handle.id(), stack_size = handle.config().stack_size, "Engine created");
        Self { handle }
    }

    /// Returns a shareable handle.
    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Kills every unfinished context.
    ///
    /// Suspended contexts receive the exit signal; contexts that never
    /// started are discarded without running. Errors other than the exit
    /// signal that come back from a killed context are returned.
    ///
    /// # Errors
    ///
    /// Returns `InvalidContextError` unless called while the root is running.
    pub fn close(&self) -> Result<Vec<UnhandledContextError>, ContextError> {
        let root = ContextId::ROOT;
        if self.inner.current.get() != root {
            return Err(InvalidContextError::new(self.current(), "close must run on the root context").into());
        }

        let mut unhandled = Vec::new();
        let mut index = 1;
        while index < self.context_count() {
            let id = ContextId::from_index(index);
            index += 1;
            match self.status_of(id) {
                ContextStatus::NotStarted => {
                    self.retire(id);
                    trace!(engine = %self.id(), context = %self.reference(id), "Discarded unstarted context");
                }
                ContextStatus::Suspended => {
                    let context = self.reference(id);
                    if let Err(err) = self.kill(context) {
                        error!(engine = %self.id(), context = %context, error = %err, "Unhandled error while closing");
                        unhandled.push(UnhandledContextError::new(context, err));
                    }
                }
                ContextStatus::Running | ContextStatus::Dead => {}
            }
        }
        debug!(engine = %self.id(), unhandled = unhandled.len(), "Engine closed");
        Ok(unhandled)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Engine {
    type Target = EngineHandle;

    fn deref(&self) -> &EngineHandle {
        &self.handle
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Engine").field(&self.handle).finish()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let inner = &self.handle.inner;
        inner.closing.set(true);

        let released: Vec<_> = match inner.contexts.try_borrow_mut() {
            Ok(mut contexts) => contexts
                .iter_mut()
                .skip(1)
                .filter(|record| record.status.is_alive())
                .map(ExecutionContext::retire)
                .collect(),
            Err(_) => Vec::new(),
        };
        if !released.is_empty() {
            trace!(engine = %inner.id, contexts = released.len(), "Unwinding unfinished contexts");
        }
        // Suspended stacks unwind here, with no engine borrow held.
        drop(released);

        let observer = inner.tracer.borrow_mut().set_observer(None);
        let (sink, flush) = inner.profiler.borrow_mut().set_sink(None);
        flush.deliver();
        inner.profiler.borrow_mut().clear();
        drop(observer);
        drop(sink);
    }
}
