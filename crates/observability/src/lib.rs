//! Tracing/logging setup shared by embedders of the pipeline session.

pub use crate::tracing::{ENV_LOG_FORMAT, LogFormat};

/// Initialize process-wide tracing with the default filter (`info`) and the
/// format named by `PIPELINE_LOG_FORMAT` (JSON unless set to `compact`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init("info", LogFormat::from_env());
}

/// Initialize tracing with `default_filter` used when `RUST_LOG` is unset.
pub fn init_with_filter(default_filter: &str) {
    tracing::init(default_filter, LogFormat::from_env());
}

/// Subscriber configuration (filters, formatting).
pub mod tracing;
