//! Telemetry initialization.
//!
//! `cling` is a CLI, not a long-running service, so there's no OTLP
//! exporter here — just structured events to stderr, level controlled by
//! `RUST_LOG` (falling back to `info`).

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
