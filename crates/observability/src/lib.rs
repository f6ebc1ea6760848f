//! Process-wide tracing/logging setup shared by every Trellis entry point.

pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize structured JSON logging, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; only the first call installs a subscriber.
pub fn init() {
    tracing::init(LogFormat::Json);
}
