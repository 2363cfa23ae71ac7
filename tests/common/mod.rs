//! Shared helpers for the integration tests.

/// Install a test-friendly tracing subscriber once per test binary.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter("tree_convert=debug,json_convert=debug")
        .with_test_writer()
        .try_init()
        .ok(); // Ignore if already initialized
}
