//! Diagnostic tracing for the tracker.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. It is separate
//! from the records under `.worktrack/records` and the optional event log,
//! which are written regardless of the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn` when unset or unparsable.
///
/// # Example
/// ```bash
/// RUST_LOG=worktrack=debug worktrack complete --unit u1 --status success
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
