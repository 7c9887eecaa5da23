//! Tracing/logging initialization.

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Default verbosity when `RUST_LOG` is unset: the service crates at info,
/// the chatty drivers capped at warn.
const DEFAULT_DIRECTIVES: &str = "info,sqlx=warn,rdkafka=warn,librdkafka=warn";

/// Service name stamped on the startup record so aggregated logs can be
/// filtered per deployment.
const SERVICE_NAME: &str = "stockflow-inventory";

/// Initialize tracing/logging for the process.
///
/// JSON lines with span context, configurable via `RUST_LOG`. Safe to call
/// multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let initialized = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(true)
        .with_target(true)
        .try_init()
        .is_ok();

    if initialized {
        info!(service = SERVICE_NAME, "tracing initialized");
    }
}
