//! Summary statistics for the numeric columns of a table.

use arrow::datatypes::FieldRef;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use serde_arrow::schema::{SchemaLike, TracingOptions};

use crate::error::{AnalysisError, Result};
use crate::utils::arrow::{column_f64, numeric_columns};

/// Count, moments and quartiles of one column; nulls are ignored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: u64,
    pub mean: Option<f64>,
    /// Sample standard deviation
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

/// Quantile `q` of sorted values, interpolating linearly between ranks
#[must_use]
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Summarise a slice of values
#[must_use]
pub fn summarise(column: &str, values: &[Option<f64>]) -> ColumnSummary {
    let mut present: Vec<f64> = values.iter().flatten().copied().collect();
    present.sort_by(f64::total_cmp);
    let count = present.len();

    let mean = (count > 0).then(|| present.iter().sum::<f64>() / count as f64);
    let std = mean.filter(|_| count > 1).map(|m| {
        (present.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (count - 1) as f64).sqrt()
    });

    ColumnSummary {
        column: column.to_string(),
        count: count as u64,
        mean,
        std,
        min: present.first().copied(),
        p25: quantile(&present, 0.25),
        p50: quantile(&present, 0.5),
        p75: quantile(&present, 0.75),
        max: present.last().copied(),
    }
}

/// Summaries of every numeric column
pub fn describe_columns(batch: &RecordBatch) -> Result<Vec<ColumnSummary>> {
    let schema = batch.schema();
    numeric_columns(batch, &[])
        .into_iter()
        .map(|idx| {
            let name = schema.field(idx).name();
            Ok(summarise(name, &column_f64(batch, name)?))
        })
        .collect()
}

/// Summaries of every numeric column as a table, one row per column
pub fn describe(batch: &RecordBatch) -> Result<RecordBatch> {
    let summaries = describe_columns(batch)?;
    if summaries.is_empty() {
        return Err(AnalysisError::Format(
            "table has no numeric columns to describe".to_string(),
        ));
    }
    let fields = Vec::<FieldRef>::from_samples(
        &summaries,
        TracingOptions::default().allow_null_fields(true),
    )?;
    Ok(serde_arrow::to_record_batch(&fields, &summaries)?)
}
