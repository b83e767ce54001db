//! Engine and logging setup for tests.

use crate::config::EngineConfig;
use crate::engine::Engine;
use tracing_subscriber::EnvFilter;

/// Stack size used by [`test_engine`].
pub const TEST_STACK_SIZE: usize = 256 * 1024;

/// Installs a test-friendly `tracing` subscriber once per process.
///
/// The filter comes from `RUST_LOG`, defaulting to `warn`.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// An engine with small stacks, named like the usual `main`/`run` pair.
#[must_use]
pub fn test_engine() -> Engine {
    init_test_logging();
    let config = EngineConfig::new().with_stack_size(TEST_STACK_SIZE);
    Engine::with_config(config).unwrap_or_default()
}
