//! Configuration for the Syracuse analysis run.
//!
//! All parameters are fixed in [`AnalysisConfig::default`]; tests and callers
//! override individual fields with struct update syntax.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Configuration for a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Directory holding the input layers and tables
    pub in_dir: PathBuf,
    /// Directory under which the output folder is created
    pub out_dir: PathBuf,
    /// Create `output_data_<suffix>` under `out_dir` when true
    pub create_out_dir: bool,
    /// Suffix used for the output folder and file names
    pub out_suffix: String,
    /// Numeric sentinel treated as missing when reading tables
    pub na_value: f64,
    /// Default raster file extension (not used by the vector pipeline)
    pub file_format: String,
    /// Census tracts 2000
    pub tract_file: String,
    /// Census block groups 2000
    pub block_group_file: String,
    /// Census blocks 2000
    pub block_file: String,
    /// Census attributes keyed by `BKG_KEY`
    pub census_table_file: String,
    /// Soil lead samples, headerless `x, y, ID, ppm`
    pub soil_pb_file: String,
    /// Metals measurements keyed by `ID` (xlsx or csv)
    pub metals_table_file: String,
    /// Number of random permutations for Moran's I inference
    pub permutations: usize,
    /// Seed for the permutation RNG
    pub seed: u64,
    /// Number of classes for the population classification
    pub classification_k: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            in_dir: PathBuf::from("data"),
            out_dir: PathBuf::from("outputs"),
            create_out_dir: true,
            out_suffix: "exercise1_03042019".to_string(),
            na_value: -9999.0,
            file_format: ".tif".to_string(),
            tract_file: "ct_00.shp".to_string(),
            block_group_file: "bg_00.shp".to_string(),
            block_file: "bk_00.shp".to_string(),
            census_table_file: "census.csv".to_string(),
            soil_pb_file: "Soil_PB.csv".to_string(),
            metals_table_file: "SYR_metals.xlsx".to_string(),
            permutations: 999,
            seed: 12_345,
            classification_k: 7,
        }
    }
}

impl AnalysisConfig {
    /// Check the values that would otherwise fail deep inside a stage
    pub fn validate(&self) -> Result<()> {
        if self.out_suffix.is_empty() {
            return Err(AnalysisError::Config("out_suffix must not be empty".into()));
        }
        if self.permutations == 0 {
            return Err(AnalysisError::Config(
                "permutations must be at least 1".into(),
            ));
        }
        if self.classification_k < 2 {
            return Err(AnalysisError::Config(
                "classification_k must be at least 2".into(),
            ));
        }
        Ok(())
    }

    /// Directory all outputs are written to
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        if self.create_out_dir {
            self.out_dir.join(format!("output_data_{}", self.out_suffix))
        } else {
            self.out_dir.clone()
        }
    }

    /// Full path of an input file
    #[must_use]
    pub fn input_path(&self, file_name: &str) -> PathBuf {
        self.in_dir.join(file_name)
    }

    /// Full path of an output file, `<stem>__<suffix>.<ext>`
    #[must_use]
    pub fn output_file(&self, stem: &str, extension: &str) -> PathBuf {
        self.output_dir()
            .join(format!("{stem}__{}.{extension}", self.out_suffix))
    }

}

/// Whether `value` is the missing-data sentinel `na_value`
#[must_use]
pub fn is_na(value: f64, na_value: f64) -> bool {
    (value - na_value).abs() < f64::EPSILON
}

impl fmt::Display for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Analysis Configuration:")?;
        writeln!(f, "  Input Dir: {}", display_path(&self.in_dir))?;
        writeln!(f, "  Output Dir: {}", display_path(&self.output_dir()))?;
        writeln!(f, "  Output Suffix: {}", self.out_suffix)?;
        writeln!(f, "  NA Value: {}", self.na_value)?;
        writeln!(f, "  Permutations: {}", self.permutations)?;
        writeln!(f, "  Seed: {}", self.seed)?;
        write!(f, "  Classes: {}", self.classification_k)
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
