//! Attribute joins between tables on a key column.
//!
//! Joins are inner joins: rows without a partner on the other side are
//! dropped and counted in the log. Output rows follow the left table's order,
//! and for each left row its right partners in their order.

use std::sync::Arc;

use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{AnalysisError, Result};
use crate::frame::GeoFrame;
use crate::utils::arrow::{KeyValue, column_keys, get_column};

/// Row pairs produced by a join
#[derive(Debug, Clone)]
pub struct JoinIndices {
    /// Matched rows of the left table
    pub left: Vec<u32>,
    /// Matched rows of the right table, aligned with `left`
    pub right: Vec<u32>,
    /// Left rows with no partner
    pub left_unmatched: usize,
    /// Right rows with no partner
    pub right_unmatched: usize,
}

/// Pair up rows of two tables with equal, non-null keys
///
/// The key columns must have the same Arrow type; normalise them with
/// [`crate::schema::cast_column`] first.
pub fn join_indices(
    left: &RecordBatch,
    right: &RecordBatch,
    left_on: &str,
    right_on: &str,
) -> Result<JoinIndices> {
    let left_col = get_column(left, left_on)?;
    let right_col = get_column(right, right_on)?;

    if left_col.data_type() != right_col.data_type() {
        return Err(AnalysisError::KeyTypeMismatch {
            left: left_on.to_string(),
            left_type: left_col.data_type().clone(),
            right: right_on.to_string(),
            right_type: right_col.data_type().clone(),
        });
    }

    let mut lookup: FxHashMap<KeyValue, SmallVec<[u32; 2]>> = FxHashMap::default();
    for (row, key) in column_keys(right_col)?.into_iter().enumerate() {
        if let Some(key) = key {
            lookup.entry(key).or_default().push(row as u32);
        }
    }

    let mut indices = JoinIndices {
        left: Vec::with_capacity(left.num_rows()),
        right: Vec::with_capacity(left.num_rows()),
        left_unmatched: 0,
        right_unmatched: 0,
    };
    let mut right_hit = vec![false; right.num_rows()];

    for (row, key) in column_keys(left_col)?.into_iter().enumerate() {
        match key.as_ref().and_then(|k| lookup.get(k)) {
            Some(partners) => {
                for &partner in partners {
                    indices.left.push(row as u32);
                    indices.right.push(partner);
                    right_hit[partner as usize] = true;
                }
            }
            None => indices.left_unmatched += 1,
        }
    }
    indices.right_unmatched = right_hit.iter().filter(|hit| !**hit).count();

    Ok(indices)
}

/// Place the columns of `right` after those of `left`
///
/// `skip_right` drops a right column (a shared key); any other name present
/// on both sides gets `suffixes.0` on the left and `suffixes.1` on the right.
pub fn combine_columns(
    left: &RecordBatch,
    right: &RecordBatch,
    skip_right: Option<&str>,
    suffixes: (&str, &str),
) -> Result<RecordBatch> {
    let left_schema = left.schema();
    let right_schema = right.schema();

    let right_fields: Vec<(usize, &Arc<Field>)> = right_schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| Some(f.name().as_str()) != skip_right)
        .collect();

    let clashes = |name: &str| -> bool {
        left_schema.field_with_name(name).is_ok()
            && right_fields.iter().any(|(_, f)| f.name() == name)
    };

    let mut fields = Vec::with_capacity(left.num_columns() + right_fields.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.capacity());

    for (field, column) in left_schema.fields().iter().zip(left.columns()) {
        let name = if clashes(field.name()) {
            format!("{}{}", field.name(), suffixes.0)
        } else {
            field.name().clone()
        };
        fields.push(Field::new(name, field.data_type().clone(), true));
        columns.push(Arc::clone(column));
    }
    for (idx, field) in &right_fields {
        let name = if clashes(field.name()) {
            format!("{}{}", field.name(), suffixes.1)
        } else {
            field.name().clone()
        };
        fields.push(Field::new(name, field.data_type().clone(), true));
        columns.push(Arc::clone(right.column(*idx)));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

fn log_unmatched(indices: &JoinIndices, left_on: &str, right_on: &str) {
    if indices.left_unmatched > 0 || indices.right_unmatched > 0 {
        log::warn!(
            "Join on {left_on} = {right_on} dropped {} left and {} right rows without a match",
            indices.left_unmatched,
            indices.right_unmatched
        );
    }
}

/// Inner join of two tables
///
/// When both keys have the same name the key appears once in the output;
/// otherwise both key columns are kept. Other shared names get `_x` / `_y`.
pub fn inner_join(
    left: &RecordBatch,
    right: &RecordBatch,
    left_on: &str,
    right_on: &str,
) -> Result<RecordBatch> {
    let indices = join_indices(left, right, left_on, right_on)?;
    log_unmatched(&indices, left_on, right_on);

    let left_rows = take_record_batch(left, &UInt32Array::from(indices.left))?;
    let right_rows = take_record_batch(right, &UInt32Array::from(indices.right))?;
    let skip = (left_on == right_on).then_some(right_on);

    combine_columns(&left_rows, &right_rows, skip, ("_x", "_y"))
}

/// Inner join of a table onto a layer, keeping the layer's geometry
pub fn merge_frame(
    frame: &GeoFrame,
    right: &RecordBatch,
    left_on: &str,
    right_on: &str,
) -> Result<GeoFrame> {
    let indices = join_indices(frame.batch(), right, left_on, right_on)?;
    log_unmatched(&indices, left_on, right_on);

    let left_rows = frame.take(&indices.left)?;
    let right_rows = take_record_batch(right, &UInt32Array::from(indices.right))?;
    let skip = (left_on == right_on).then_some(right_on);

    let batch = combine_columns(left_rows.batch(), &right_rows, skip, ("_x", "_y"))?;
    left_rows.with_batch(batch)
}
