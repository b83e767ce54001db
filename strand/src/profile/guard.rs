//! RAII guards for profiled frames.

use super::FrameId;
use crate::core::ContextId;
use crate::engine::EngineHandle;

/// An entered frame; dropping the guard exits it.
#[must_use = "the frame is exited as soon as the guard is dropped"]
#[derive(Debug)]
pub struct FrameGuard {
    engine: EngineHandle,
    context: ContextId,
    frame: FrameId,
}

impl FrameGuard {
    pub(crate) fn new(engine: EngineHandle, context: ContextId, frame: FrameId) -> Self {
        Self {
            engine,
            context,
            frame,
        }
    }

    /// Returns the frame's ID.
    #[must_use]
    pub fn id(&self) -> FrameId {
        self.frame
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        self.engine.exit_frame(self.context, self.frame);
    }
}

/// An open native callout; dropping the guard reports its end.
#[must_use = "the callout ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct NativeFrameGuard {
    inner: FrameGuard,
}

impl NativeFrameGuard {
    pub(crate) fn new(engine: EngineHandle, context: ContextId, frame: FrameId) -> Self {
        Self {
            inner: FrameGuard::new(engine, context, frame),
        }
    }

    /// Returns the callout's frame ID.
    #[must_use]
    pub fn id(&self) -> FrameId {
        self.inner.id()
    }
}
