//! Development-time tracing for the orchestrator.
//!
//! Diagnostics go to stderr and are filtered by `RUST_LOG`. They are separate
//! from the audit log (`io/audit`), which is product output and is written
//! regardless of the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "warn";

/// Install the stderr subscriber. Safe to call once per process.
///
/// # Example
/// ```bash
/// RUST_LOG=orchestrator=debug orchestrator plan.json --execute
/// ```
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
