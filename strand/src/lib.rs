//! # Strand
//!
//! Cooperative, stackful execution contexts for Rust.
//!
//! An [`Engine`](engine::Engine) owns a tree of contexts that share one
//! thread. Any running context can `switch` to another, passing a value, or
//! `throw` an error into it. The call returns when some context switches
//! back. When a context's entry finishes, its result goes to its nearest
//! unfinished ancestor.
//!
//! On top of that:
//!
//! - **Tracing**: one observer per engine is told about every transfer
//!   before it happens. An observer that fails is switched off.
//! - **Profile bridging**: a frame-oriented profiler sees one continuous
//!   call stack, even though each context runs on its own physical stack.
//! - **Context locals**: each context has its own key/value bag.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strand::prelude::*;
//!
//! let engine = Engine::new();
//! let worker = engine.spawn(|fiber, first| {
//!     let second = fiber.switch_to_parent(first)?;
//!     Ok(second)
//! });
//!
//! assert_eq!(engine.switch(worker, json!(1))?, json!(1));
//! assert_eq!(engine.switch(worker, json!(2))?, json!(2));
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod core;
pub mod engine;
pub mod errors;
pub mod profile;
pub mod testing;
pub mod trace;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::context::LocalBag;
    pub use crate::core::{
        ContextId, ContextRef, ContextStatus, EngineId, Outcome, TraceEvent, TraceKind, Value,
    };
    pub use crate::engine::{ContextOptions, Engine, EngineHandle, Fiber, Switcher};
    pub use crate::errors::{
        BoxError, ContextError, CrossThreadError, InvalidContextError, LocalConflictError,
        ObserverError, UnhandledContextError,
    };
    pub use crate::profile::{
        FrameGuard, FrameId, LoggingProfileSink, NativeFrameGuard, ProfileEventKind,
        ProfileFrame, ProfileSink,
    };
    pub use crate::trace::{LoggingObserver, TraceObserver};
    pub use serde_json::json;
}
