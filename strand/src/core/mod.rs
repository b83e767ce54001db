//! Core domain model types for strand.
//!
//! This module contains the fundamental types shared by every layer:
//! - Engine and context identifiers
//! - The context status enum
//! - The trace event delivered to observers

mod event;
mod ids;
mod status;

pub use event::{TraceEvent, TraceKind};
pub use ids::{ContextId, ContextRef, EngineId};
pub use status::ContextStatus;

use crate::errors::ContextError;

/// The dynamic payload carried by `switch`.
pub type Value = serde_json::Value;

/// What a transfer delivers: a value, or an error raised at the resumption point.
pub type Outcome = Result<Value, ContextError>;
