//! Logging setup for binaries.
//!
//! Library code only emits `tracing` events. A binary calls [`init`] once
//! at startup to print them; `RUST_LOG` overrides the default filter.

use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber filtered by `RUST_LOG`, or by `info`
/// when it isn't set.
///
/// Calling it twice is harmless: the second call does nothing.
pub fn init() {
    init_with_default("info");
}

/// Like [`init`], with a different fallback filter (e.g. `"gatehouse=debug"`).
pub fn init_with_default(directives: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
