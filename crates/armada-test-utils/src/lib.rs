//! Shared test utilities, mocks, and fixtures for Armada crates.

pub mod fixtures;
pub mod history;
pub mod invoker;
pub mod sink;

pub use fixtures::{agent, capability};
pub use history::{DelayedHistory, StaticHistory};
pub use invoker::{Invocation, MockInvoker, Reply};
pub use sink::RecordingSink;

use tracing_subscriber::EnvFilter;

/// Route tracing output through the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}
