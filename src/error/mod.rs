//! Error handling for the analysis pipeline.

use std::io;
use std::path::{Path, PathBuf};

use arrow::datatypes::DataType;
use arrow::error::ArrowError;

/// Errors that can occur while loading, joining or analysing the layers
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Error opening, reading or writing a file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error raised by an Arrow kernel or the Arrow CSV codec
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// Error reading or writing an ESRI shapefile
    #[error("Shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    /// Error reading or writing a dBase attribute table
    #[error("dBase error: {0}")]
    Dbase(#[from] dbase::Error),

    /// Error reading a spreadsheet
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    /// Error converting records to or from Arrow through serde
    #[error("Record conversion error: {0}")]
    Records(#[from] serde_arrow::Error),

    /// Error serialising the run summary
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A file could not be opened, with the path that failed
    #[error("Failed to open {path}: {source}")]
    FileOpen {
        /// Path that could not be opened
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Data that cannot be represented in the requested file format
    #[error("Format error: {0}")]
    Format(String),

    /// A column required by an operation is not present
    #[error("Column '{0}' not found")]
    MissingColumn(String),

    /// Join keys of different data types
    #[error("Cannot join '{left}' ({left_type}) with '{right}' ({right_type}): key types differ")]
    KeyTypeMismatch {
        /// Left key column
        left: String,
        /// Left key data type
        left_type: DataType,
        /// Right key column
        right: String,
        /// Right key data type
        right_type: DataType,
    },

    /// Two aggregation paths disagree
    #[error("Aggregation mismatch: {0}")]
    AggregationMismatch(String),

    /// Layers with absent or incompatible coordinate reference systems
    #[error("Coordinate reference system mismatch: {0}")]
    CrsMismatch(String),

    /// Geometry of an unexpected kind
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// A statistic or model cannot be computed for the given input
    #[error("Statistics error: {0}")]
    Statistics(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AnalysisError {
    /// Wrap an IO error with the path that triggered it
    pub fn file_open(path: &Path, source: io::Error) -> Self {
        Self::FileOpen {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Shorthand for a statistics error
    pub fn statistics(message: impl Into<String>) -> Self {
        Self::Statistics(message.into())
    }
}

impl From<calamine::XlsxError> for AnalysisError {
    fn from(error: calamine::XlsxError) -> Self {
        Self::Spreadsheet(calamine::Error::Xlsx(error))
    }
}

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;
