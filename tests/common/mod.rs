#![allow(dead_code)]
//! Shared integration test utilities.

use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Initializes tracing output for tests, honoring `RUST_LOG`. Safe to call
/// from every test; only the first call installs the subscriber.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A name no other test (or stale run) is using.
pub fn unique_name(tag: &str) -> String {
    format!("procsync-e2e-{tag}-{}", std::process::id())
}
