//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Initialize tracing. Callers can install their own subscriber; this helper
/// only installs an env-filtered fmt subscriber if none is set yet, defaulting
/// to `info` for this crate when `RUST_LOG` is absent.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("outreach_engine=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
