//! Testing utilities for strand engines.
//!
//! This module provides:
//! - Recording trace observers, including one that fails on demand
//! - A recording profile sink and balance assertions over its output
//! - Engine and logging setup for tests

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_profile_balanced, assert_profile_well_nested, open_frames};
pub use fixtures::{init_test_logging, test_engine, TEST_STACK_SIZE};
pub use mocks::{CollectingObserver, CollectingProfileSink, FailingObserver, ProfileRecord};
