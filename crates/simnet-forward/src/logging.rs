//! Tracing subscriber configuration for simulation hosts.
//!
//! Log levels follow these conventions:
//! - ERROR: local errors on explicit requests (missing interface target)
//! - WARN: recovered drops (no route, no delivery port, fragment timeout)
//! - INFO: configuration changes, route table events
//! - DEBUG: packet arrivals, forwarding decisions
//! - TRACE: dispatcher state machine transitions

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with sensible defaults.
///
/// Log level can be controlled via the `RUST_LOG` environment variable.
/// Defaults to `info` if not set.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Initialize the tracing subscriber with JSON output.
///
/// Intended for batch simulation runs whose event streams are parsed
/// afterwards, for example to correlate drop reasons with route churn.
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .init();
}

/// Initialize the tracing subscriber for tests.
///
/// Uses `try_init` to avoid panicking if called multiple times.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
