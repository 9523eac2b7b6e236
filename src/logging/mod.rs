//! Logging and observability
//!
//! This module provides structured logging with:
//! - Configurable log levels, overridable through `RUST_LOG`
//! - Console output on stderr
//! - JSON log files with daily or hourly rotation
//!
//! # Example
//!
//! ```no_run
//! use ehrglot::logging::init_logging;
//! use ehrglot::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(source_system = "epic", "Conversion started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a conversion run
///
/// # Example
///
/// ```no_run
/// use ehrglot::log_conversion_start;
///
/// let run_id = uuid::Uuid::new_v4();
/// log_conversion_start!("epic", "Patient", run_id);
/// ```
#[macro_export]
macro_rules! log_conversion_start {
    ($source_system:expr, $target_resource:expr, $run_id:expr) => {
        tracing::info!(
            source_system = %$source_system,
            target_resource = %$target_resource,
            run_id = %$run_id,
            "Starting conversion"
        );
    };
}

/// Log the completion of a conversion run
///
/// # Example
///
/// ```no_run
/// use ehrglot::log_conversion_complete;
/// use std::time::Duration;
///
/// log_conversion_complete!("epic", "Patient", 42, Duration::from_millis(350));
/// ```
#[macro_export]
macro_rules! log_conversion_complete {
    ($source_system:expr, $target_resource:expr, $rows:expr, $duration:expr) => {
        tracing::info!(
            source_system = %$source_system,
            target_resource = %$target_resource,
            rows = $rows,
            duration_ms = $duration.as_millis(),
            "Conversion completed"
        );
    };
}

/// Log rows that finished mapping with errors
///
/// # Example
///
/// ```no_run
/// use ehrglot::log_row_errors;
///
/// log_row_errors!(3, 100);
/// ```
#[macro_export]
macro_rules! log_row_errors {
    ($rows_with_errors:expr, $total:expr) => {
        tracing::warn!(
            rows_with_errors = $rows_with_errors,
            total = $total,
            error_pct = ($rows_with_errors as f64 / ($total as f64).max(1.0) * 100.0),
            "Rows mapped with errors"
        );
    };
}
