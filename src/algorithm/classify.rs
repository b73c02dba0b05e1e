//! Map classification of a numeric variable into `k` classes.

use std::fmt;

use arrow::datatypes::FieldRef;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use serde_arrow::schema::{SchemaLike, TracingOptions};

use crate::algorithm::describe::quantile;
use crate::error::{AnalysisError, Result};

/// How class breaks are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scheme {
    /// Roughly equal counts per class
    Quantiles,
    /// Equal-width classes between min and max
    EqualInterval,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quantiles => f.write_str("Quantiles"),
            Self::EqualInterval => f.write_str("EqualInterval"),
        }
    }
}

/// Class breaks and membership for one variable
#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub scheme: Scheme,
    pub k: usize,
    /// Upper bound of each class, ascending
    pub bins: Vec<f64>,
    pub counts: Vec<usize>,
    pub min: f64,
    #[serde(skip)]
    pub classes: Vec<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClassRow {
    class: u32,
    lower: f64,
    upper: f64,
    count: u64,
}

/// Class of each value: the first bin whose upper bound is not below it
///
/// Values above the last bound fall in the last class.
#[must_use]
pub fn assign_classes(values: &[f64], bins: &[f64]) -> Vec<usize> {
    let last = bins.len().saturating_sub(1);
    values
        .iter()
        .map(|v| bins.partition_point(|b| b < v).min(last))
        .collect()
}

/// Upper bounds of `k` quantile classes over sorted values
#[must_use]
pub fn quantile_breaks(sorted: &[f64], k: usize) -> Vec<f64> {
    (1..=k)
        .filter_map(|i| quantile(sorted, i as f64 / k as f64))
        .collect()
}

/// Upper bounds of `k` equal-width classes; the last is exactly `max`
#[must_use]
pub fn equal_interval_breaks(min: f64, max: f64, k: usize) -> Vec<f64> {
    let width = (max - min) / k as f64;
    (1..k).map(|i| min + width * i as f64).chain([max]).collect()
}

/// Split `values` into `k` classes
///
/// Quantile breaks can coincide on tied data; duplicates are merged, so fewer
/// than `k` classes may come back.
pub fn classify(values: &[f64], scheme: Scheme, k: usize) -> Result<Classification> {
    if k == 0 {
        return Err(AnalysisError::Config("classification needs k >= 1".to_string()));
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return Err(AnalysisError::statistics("nothing to classify"));
    }
    if sorted.len() < values.len() {
        log::warn!(
            "{} missing values left out of the classification",
            values.len() - sorted.len()
        );
    }
    sorted.sort_by(f64::total_cmp);
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];

    let mut bins = match scheme {
        Scheme::Quantiles => quantile_breaks(&sorted, k),
        Scheme::EqualInterval => equal_interval_breaks(min, max, k),
    };
    bins.dedup();
    if bins.len() < k {
        log::warn!("{scheme} produced {} distinct classes instead of {k}", bins.len());
    }

    let mut counts = vec![0; bins.len()];
    for class in assign_classes(&sorted, &bins) {
        counts[class] += 1;
    }

    let classes = assign_classes(values, &bins);
    Ok(Classification {
        scheme,
        k: bins.len(),
        bins,
        counts,
        min,
        classes,
    })
}

impl Classification {
    /// One row per class with its bounds and size
    pub fn table(&self) -> Result<RecordBatch> {
        let rows: Vec<ClassRow> = self
            .bins
            .iter()
            .zip(&self.counts)
            .enumerate()
            .map(|(i, (&upper, &count))| ClassRow {
                class: i as u32,
                lower: if i == 0 { self.min } else { self.bins[i - 1] },
                upper,
                count: count as u64,
            })
            .collect();
        let fields = Vec::<FieldRef>::from_samples(&rows, TracingOptions::default())?;
        Ok(serde_arrow::to_record_batch(&fields, &rows)?)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (k = {})", self.scheme, self.k)?;
        let mut lower = self.min;
        for (i, (upper, count)) in self.bins.iter().zip(&self.counts).enumerate() {
            let open = if i == 0 { '[' } else { '(' };
            writeln!(f, "  {open}{lower:>12.2}, {upper:>12.2}] {count:>6}")?;
            lower = *upper;
        }
        Ok(())
    }
}
