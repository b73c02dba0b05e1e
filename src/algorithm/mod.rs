//! Analysis steps of the census and soil lead workflow
//!
//! Attribute and spatial joins, aggregation, map classification, spatial
//! weights, global autocorrelation and the regression models.

pub mod aggregate;
pub mod classify;
pub mod describe;
pub mod join;
pub mod moran;
pub mod regression;
pub mod spatial_join;
pub mod weights;

pub use aggregate::{CrossCheck, cross_check, dissolve, group_mean, group_sum};
pub use classify::{
    Classification, Scheme, assign_classes, classify, equal_interval_breaks, quantile_breaks,
};
pub use describe::{ColumnSummary, describe, describe_columns};
pub use join::{inner_join, merge_frame};
pub use moran::{Moran, MoranScatter};
pub use regression::{Design, MlLag, Ols};
pub use spatial_join::{SpatialJoinSummary, assign_crs, sjoin_within};
pub use weights::{SpatialWeights, Transform, WeightsSummary, lag_spatial};
