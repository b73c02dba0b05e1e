//! Machine-readable summary of a finished run.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::algorithm::{
    Classification, CrossCheck, MlLag, Moran, Ols, SpatialJoinSummary, WeightsSummary,
};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};

/// Shape of one input
#[derive(Debug, Clone, Serialize)]
pub struct InputShape {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
}

/// Block groups reduced to tracts by both aggregation routes
#[derive(Debug, Clone, Serialize)]
pub struct AggregationReport {
    pub block_groups: usize,
    pub tracts: usize,
    pub check: CrossCheck,
}

/// Files written by the run
#[derive(Debug, Clone, Serialize)]
pub struct OutputFiles {
    pub csv: PathBuf,
    pub shapefile: PathBuf,
    pub summary: PathBuf,
}

/// Everything a run computed, serialised next to its outputs
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub config: AnalysisConfig,
    pub inputs: Vec<InputShape>,
    pub aggregation: AggregationReport,
    pub population_classes: Vec<Classification>,
    pub spatial_join: SpatialJoinSummary,
    pub tracts_with_lead: usize,
    pub weights: WeightsSummary,
    pub moran: Moran,
    pub moran_scatter_slope: f64,
    pub ols: Ols,
    pub residual_moran: Moran,
    pub ml_lag: MlLag,
    pub outputs: OutputFiles,
}

impl AnalysisReport {
    /// Write as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| AnalysisError::file_open(path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}
