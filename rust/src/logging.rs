//! Logging macros for the analysis pipeline with verbosity level control.
//!
//! Provides zero-cost logging when disabled (verbosity=0).
//! Verbosity levels:
//! - 0: SILENT (nothing; fatal problems surface as errors)
//! - 1: WARNINGS (inference limitations, orphan stops, excluded instances)
//! - 2: STAGES (per-stage counts: rows built, edges inferred, critical rows)
//! - 3: DEBUG (every asserted dependency and pass internals)

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_WARNINGS: u8 = 1;
pub const VERBOSITY_STAGES: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Log at WARNINGS level (verbosity >= 1).
///
/// Used for: skipped start conditions, unmapped objects, orphan log entries.
#[macro_export]
macro_rules! log_warning {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_WARNINGS {
            eprintln!("[simcrit] warning: {}", format_args!($($arg)*));
        }
    };
}

/// Log at STAGES level (verbosity >= 2).
#[macro_export]
macro_rules! log_stage {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_STAGES {
            eprintln!("[simcrit] {}", format_args!($($arg)*));
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
///
/// Used for: individual dependency edges, forward/backward pass values.
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            eprintln!("[simcrit]   {}", format_args!($($arg)*));
        }
    };
}
