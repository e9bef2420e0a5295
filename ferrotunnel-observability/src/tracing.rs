//! Structured logging setup. `RUST_LOG` controls verbosity; defaults to
//! `info` so a bare `ferrotunnel-server` run is quiet but not silent.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber writing human-readable lines to
/// stdout. Call once, at process start.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
