//! Spatial analysis of 2000 census demographics and soil lead in Syracuse, NY.
//!
//! Reads the census tract, block-group and block layers with their attribute
//! tables, aggregates block groups to tracts, attaches soil lead samples by
//! point-in-polygon join and fits spatial autocorrelation and regression models
//! on mean lead per tract.

pub mod algorithm;
pub mod config;
pub mod error;
pub mod frame;
pub mod io;
pub mod pipeline;
pub mod schema;
pub mod utils;

// Core types
pub use config::AnalysisConfig;
pub use error::{AnalysisError, Result};
pub use frame::{Crs, GeoFrame};
pub use pipeline::{AnalysisReport, run};

// Arrow types
pub use arrow::datatypes::Schema as ArrowSchema;
pub use arrow::record_batch::RecordBatch;

// Analysis building blocks
pub use algorithm::{
    Classification, Moran, MlLag, Ols, Scheme, SpatialWeights, Transform, assign_crs, dissolve,
    group_mean, group_sum, inner_join, merge_frame, sjoin_within,
};

// Readers and writers
pub use io::{read_csv, read_shapefile, read_table, write_csv, write_shapefile};
