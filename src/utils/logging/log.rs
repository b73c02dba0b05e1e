//! Logging helpers for file reads and writes and for intermediate tables.

use std::path::Path;
use std::time::Duration;

use arrow::record_batch::RecordBatch;

/// Log the start of a read or write
///
/// # Arguments
/// * `operation` - What is being done, e.g. "Reading layer"
/// * `path` - File being read or written
pub fn log_operation_start(operation: &str, path: &Path) {
    log::info!("{operation} {}", path.display());
}

/// Log a finished read or write with its row count
///
/// # Arguments
/// * `operation` - Past-tense verb, e.g. "Read" or "Wrote"
/// * `path` - File that was read or written
/// * `rows` - Rows (or features) transferred
/// * `elapsed` - Time taken, when measured
pub fn log_operation_complete(operation: &str, path: &Path, rows: usize, elapsed: Option<Duration>) {
    let file = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |f| f.to_string_lossy().into_owned());
    match elapsed {
        Some(duration) => log::info!("{operation} {rows} rows ({file}) in {duration:.2?}"),
        None => log::info!("{operation} {rows} rows ({file})"),
    }
}

/// Log the shape of a table, and its column types at debug level
pub fn log_batch_summary(name: &str, batch: &RecordBatch) {
    log::info!(
        "{name}: {} rows x {} columns",
        batch.num_rows(),
        batch.num_columns()
    );
    if log::log_enabled!(log::Level::Debug) {
        for field in batch.schema().fields() {
            log::debug!("  - {} ({})", field.name(), field.data_type());
        }
    }
}
