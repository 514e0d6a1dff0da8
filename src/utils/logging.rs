//! Logging macros for the high-frequency loops, switched per module.
//!
//! The frame loop runs at ~20 Hz; leaving its diagnostics on permanently
//! drowns everything else, so each module opts in with a constant:
//! ```ignore
//! const ENABLE_LOGS: bool = false;
//!
//! use crate::{log_debug, log_info};
//!
//! log_debug!("tick took {}ms", elapsed);
//! ```
//! The macros are exported at the crate root and resolve `ENABLE_LOGS` at the
//! call site.

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Warnings from hot loops, e.g. a pose source that keeps failing.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Errors from hot loops. Persistence failures are reported through here and
/// then swallowed so the session keeps running.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
