//! Diagnostic tracing for the gate.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. The failure report
//! printed by `gatecheck run` is separate and always shown.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn` so slow-check warnings are visible.
///
/// # Example
/// ```bash
/// RUST_LOG=gatecheck=debug gatecheck run
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
