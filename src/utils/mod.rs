//! Utility functions shared by the pipeline stages

use std::io;
use std::path::Path;

pub mod arrow;
pub mod logging;

use crate::error::{AnalysisError, Result};

pub use logging::{log_operation_complete, log_operation_start};

/// Create a directory, tolerating one that already exists
///
/// # Returns
/// `true` when the directory was created, `false` when it was already there
///
/// # Errors
/// Returns an error if the path exists but is not a directory, or creation fails
pub fn create_dir_and_check_existence(path: &Path) -> Result<bool> {
    if path.is_dir() {
        log::info!("directory already exists: {}", path.display());
        return Ok(false);
    }
    match std::fs::create_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => {
            log::info!("directory already exists: {}", path.display());
            Ok(false)
        }
        Err(e) => Err(AnalysisError::file_open(path, e)),
    }
}

/// Validates that a directory exists and is a directory
pub fn validate_directory(dir: &Path) -> Result<()> {
    if !dir.exists() || !dir.is_dir() {
        return Err(not_a_directory(dir));
    }
    Ok(())
}

fn not_a_directory(path: &Path) -> AnalysisError {
    AnalysisError::file_open(
        path,
        io::Error::new(io::ErrorKind::NotFound, "not a directory"),
    )
}
