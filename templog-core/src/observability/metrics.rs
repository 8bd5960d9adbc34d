//! Core metrics definitions.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - `_seconds` suffix for histograms measuring duration

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all core metrics with descriptions.
pub fn register_core_metrics() {
    // Ingestion
    describe_counter!("templog_files_imported_total", "Log files imported by the coordinator");
    describe_counter!(
        "templog_import_failures_total",
        "Log files that could not be imported (unreadable file, table creation)"
    );
    describe_histogram!("templog_import_duration_seconds", "Time spent importing one log file");
    describe_counter!(
        "templog_lines_rejected_total",
        "Log lines skipped (by reason: malformed, timestamp, unknown_sensor)"
    );

    // Store
    describe_counter!("templog_readings_inserted_total", "New readings stored (by sensor)");
    describe_counter!(
        "templog_readings_duplicate_total",
        "Readings ignored because their timestamp was already stored (by sensor)"
    );
    describe_gauge!("templog_table_rows", "Rows per sensor table after the last import");
    describe_counter!("templog_db_errors_total", "Database failures (by operation)");
}
