//! Grouped sums, geometry dissolve and grouped means.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, UInt32Array};
use arrow::compute::take;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use geo::{BooleanOps, Geometry, MultiPolygon};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::{AnalysisError, Result};
use crate::frame::{GeoFrame, to_multipolygon};
use crate::utils::arrow::{KeyValue, column_f64, column_keys, get_column, numeric_columns};

/// Rows of each group, groups in ascending key order
///
/// Rows with a null key belong to no group.
fn group_rows(key_column: &ArrayRef) -> Result<BTreeMap<KeyValue, Vec<u32>>> {
    let mut groups: BTreeMap<KeyValue, Vec<u32>> = BTreeMap::new();
    let mut dropped = 0usize;
    for (row, key) in column_keys(key_column)?.into_iter().enumerate() {
        match key {
            Some(key) => groups.entry(key).or_default().push(row as u32),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        log::warn!("{dropped} rows have no group key and are left out of the aggregation");
    }
    Ok(groups)
}

/// Key column of the output: one value per group, original type kept
fn group_keys(key_column: &ArrayRef, groups: &BTreeMap<KeyValue, Vec<u32>>) -> Result<ArrayRef> {
    let firsts = UInt32Array::from(groups.values().map(|rows| rows[0]).collect::<Vec<_>>());
    Ok(take(key_column.as_ref(), &firsts, None)?)
}

/// Sum every numeric column per group
///
/// Integer columns sum to `Int64`, floating columns to `Float64`; nulls are
/// skipped and an all-null group sums to zero. Non-numeric columns are dropped.
/// The key column comes first, followed by the sums in their original order.
pub fn group_sum(batch: &RecordBatch, by: &str) -> Result<RecordBatch> {
    let key_column = get_column(batch, by)?;
    let groups = group_rows(key_column)?;
    let schema = batch.schema();

    let key_field = schema.field_with_name(by)?;
    let mut fields = vec![Field::new(by, key_field.data_type().clone(), true)];
    let mut columns = vec![group_keys(key_column, &groups)?];

    let summed = numeric_columns(batch, &[by]);
    let skipped = batch.num_columns() - summed.len() - 1;
    if skipped > 0 {
        log::debug!("Group sum on {by} drops {skipped} non-numeric columns");
    }

    for idx in summed {
        let field = schema.field(idx);
        let values = column_f64(batch, field.name())?;
        if field.data_type().is_integer() {
            let sums: Vec<i64> = groups
                .values()
                .map(|rows| {
                    rows.iter()
                        .filter_map(|&r| values[r as usize])
                        .map(|v| v as i64)
                        .sum()
                })
                .collect();
            fields.push(Field::new(field.name(), DataType::Int64, true));
            columns.push(Arc::new(Int64Array::from(sums)) as ArrayRef);
        } else {
            let sums: Vec<f64> = groups
                .values()
                .map(|rows| rows.iter().filter_map(|&r| values[r as usize]).sum())
                .collect();
            fields.push(Field::new(field.name(), DataType::Float64, true));
            columns.push(Arc::new(Float64Array::from(sums)) as ArrayRef);
        }
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Union the polygons of one group
fn union_all(parts: &[&Geometry<f64>]) -> Result<MultiPolygon<f64>> {
    let mut merged = MultiPolygon::new(Vec::new());
    for geometry in parts {
        let polygon = to_multipolygon(geometry)?;
        merged = if merged.0.is_empty() {
            polygon
        } else {
            merged.union(&polygon)
        };
    }
    Ok(merged)
}

/// Dissolve a polygon layer on a key column
///
/// Each output row holds the union of its group's polygons and the sum of
/// every numeric attribute, exactly as [`group_sum`] computes them. The CRS is
/// carried over.
pub fn dissolve(frame: &GeoFrame, by: &str) -> Result<GeoFrame> {
    let key_column = get_column(frame.batch(), by)?;
    let groups = group_rows(key_column)?;
    let batch = group_sum(frame.batch(), by)?;

    let members: Vec<Vec<&Geometry<f64>>> = groups
        .values()
        .map(|rows| rows.iter().map(|&r| &frame.geometry()[r as usize]).collect())
        .collect();

    let geometry = members
        .par_iter()
        .map(|parts| union_all(parts).map(Geometry::MultiPolygon))
        .collect::<Result<Vec<_>>>()?;

    log::info!(
        "Dissolved {} features into {} on {by}",
        frame.num_rows(),
        geometry.len()
    );
    GeoFrame::new(batch, geometry, frame.crs().cloned())
}

/// Mean of `value` per group, named `output`
///
/// Only groups that appear in `batch` are present; a group whose values are
/// all null gets a null mean.
pub fn group_mean(batch: &RecordBatch, by: &str, value: &str, output: &str) -> Result<RecordBatch> {
    let key_column = get_column(batch, by)?;
    let groups = group_rows(key_column)?;
    let values = column_f64(batch, value)?;

    let means: Vec<Option<f64>> = groups
        .values()
        .map(|rows| {
            let present: Vec<f64> = rows.iter().filter_map(|&r| values[r as usize]).collect();
            (!present.is_empty()).then(|| present.iter().sum::<f64>() / present.len() as f64)
        })
        .collect();

    let key_type = key_column.data_type().clone();
    let schema = Schema::new(vec![
        Field::new(by, key_type, true),
        Field::new(output, DataType::Float64, true),
    ]);
    Ok(RecordBatch::try_new(
        Arc::new(schema),
        vec![
            group_keys(key_column, &groups)?,
            Arc::new(Float64Array::from(means)),
        ],
    )?)
}

/// Outcome of comparing two aggregations of the same data
#[derive(Debug, Clone, Serialize)]
pub struct CrossCheck {
    /// Number of groups
    pub groups: usize,
    /// Numeric columns compared
    pub columns: Vec<String>,
}

fn values_agree(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0),
        (None, None) => true,
        _ => false,
    }
}

/// Confirm two aggregations agree row for row on every shared numeric column
pub fn cross_check(first: &RecordBatch, second: &RecordBatch, key: &str) -> Result<CrossCheck> {
    if first.num_rows() != second.num_rows() {
        return Err(AnalysisError::AggregationMismatch(format!(
            "{} groups against {} groups",
            first.num_rows(),
            second.num_rows()
        )));
    }

    let second_rows: FxHashMap<KeyValue, usize> = column_keys(get_column(second, key)?)?
        .into_iter()
        .enumerate()
        .filter_map(|(row, k)| k.map(|k| (k, row)))
        .collect();
    let first_keys = column_keys(get_column(first, key)?)?;

    let mut pairs = Vec::with_capacity(first_keys.len());
    for (row, k) in first_keys.into_iter().enumerate() {
        let k = k.ok_or_else(|| {
            AnalysisError::AggregationMismatch(format!("null {key} at row {row}"))
        })?;
        let other = second_rows.get(&k).ok_or_else(|| {
            AnalysisError::AggregationMismatch(format!("group {k} missing from second result"))
        })?;
        pairs.push((row, *other));
    }

    let second_schema = second.schema();
    let mut columns = Vec::new();
    for idx in numeric_columns(first, &[key]) {
        let name = first.schema().field(idx).name().clone();
        if second_schema.field_with_name(&name).is_err() {
            continue;
        }
        let a = column_f64(first, &name)?;
        let b = column_f64(second, &name)?;
        if let Some(&(i, j)) = pairs.iter().find(|(i, j)| !values_agree(a[*i], b[*j])) {
            return Err(AnalysisError::AggregationMismatch(format!(
                "{name} differs at group row {i}: {:?} vs {:?}",
                a[i], b[j]
            )));
        }
        columns.push(name);
    }

    Ok(CrossCheck {
        groups: pairs.len(),
        columns,
    })
}
