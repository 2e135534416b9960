use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the tracing subscriber for standalone binaries and tests.
///
/// Honors `RUST_LOG` when set and defaults to `info` otherwise. Safe to
/// call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
