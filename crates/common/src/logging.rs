//! Logging initialization for binaries.

use tracing_subscriber::EnvFilter;

/// Initialize structured logging.
///
/// Reads the filter from `RUST_LOG`, defaulting to `info`. Call once at
/// process start; a second call panics because the global subscriber is
/// already set.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
