//! Logging configuration for ch-http.
//!
//! The library only emits `tracing` events; binaries decide where they go.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info";

/// Initializes logging to stderr, leaving stdout for query output.
///
/// `verbose` lowers the default level to `debug` for this crate.
pub fn init_stderr_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbose))
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the filter from `RUST_LOG`, falling back to the crate default.
pub fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new(format!("{DEFAULT_FILTER},ch_http=debug"))
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    })
}
