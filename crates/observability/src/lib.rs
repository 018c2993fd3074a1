//! Process-wide tracing setup shared by the binaries.

pub mod tracing;

pub use self::tracing::LogFormat;

/// Initialize tracing from the environment (`RUST_LOG`, `LOG_FORMAT`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    self::tracing::init(LogFormat::from_env());
}
