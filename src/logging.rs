//! Logging bootstrap (SPEC_FULL.md §2 ambient stack): a `tracing`
//! subscriber initialized once, driven by `RUST_LOG`, defaulting to `info`.
//! The core's own modules never configure a subscriber themselves - they
//! only emit events - so a single process-wide call here is the only place
//! this happens.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a process-wide `tracing` subscriber. Safe to call more than
/// once; subsequent calls are no-ops (the global default can only be set
/// once per process).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
