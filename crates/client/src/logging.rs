//! Logging setup and the crate's logging macros.
//!
//! The macros forward to `tracing` so every event keeps the module path of
//! the call site as its target.

#[doc(hidden)]
pub use tracing;

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "jobfair_client=debug,jobfair_listen=info";

/// Install the global `tracing` subscriber.
///
/// Safe to call more than once; only the first call wins.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .try_init();
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::tracing::info!($($arg)*)
    };
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::tracing::error!($($arg)*)
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::tracing::warn!($($arg)*)
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::tracing::debug!($($arg)*)
    };
}
