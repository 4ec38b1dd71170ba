//! Opt-in tracing setup for embedding applications and tests.
//!
//! The engine only emits `tracing` events; routing them is the caller's
//! business. This helper wires a compact stderr subscriber honoring
//! `RUST_LOG` for callers that have nothing better.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initializes a compact stderr subscriber at `info` level.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    init_with_level("info");
}

/// Initializes a compact stderr subscriber at the given level unless
/// `RUST_LOG` is set, which always wins.
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("weft_core={level}")));
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();
    let _ = tracing_subscriber::registry().with(filter).with(fmt).try_init();
}
