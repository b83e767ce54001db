//! Execution context records and their storage.
//!
//! This module provides:
//! - The per-context record the engine switches between
//! - The append-only arena holding every record of one engine
//! - Per-context local storage

mod arena;
mod locals;
mod record;

pub(crate) use arena::ContextArena;
pub use locals::LocalBag;
pub(crate) use record::ExecutionContext;
