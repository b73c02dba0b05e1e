//! Utilities for working with Arrow arrays.

use std::fmt;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::kernels::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use arrow::record_batch::RecordBatch;

use crate::error::{AnalysisError, Result};
use crate::schema::adapt::is_text;

/// A hashable join or grouping key taken from an integer or string column
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    /// Integer key
    Int(i64),
    /// Text key
    Str(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// Index of a named column
pub fn column_index(batch: &RecordBatch, column_name: &str) -> Result<usize> {
    batch
        .schema()
        .index_of(column_name)
        .map_err(|_| AnalysisError::MissingColumn(column_name.to_string()))
}

/// Get a column from a record batch by name
pub fn get_column<'a>(batch: &'a RecordBatch, column_name: &str) -> Result<&'a ArrayRef> {
    Ok(batch.column(column_index(batch, column_name)?))
}

/// Read a numeric column as `f64`, nulls preserved
pub fn column_f64(batch: &RecordBatch, column_name: &str) -> Result<Vec<Option<f64>>> {
    let column = get_column(batch, column_name)?;
    if !column.data_type().is_numeric() {
        return Err(AnalysisError::Arrow(arrow::error::ArrowError::InvalidArgumentError(
            format!(
                "Column '{column_name}' is {} and not numeric",
                column.data_type()
            ),
        )));
    }
    let floats = cast::cast(column, &DataType::Float64)?;
    Ok(floats.as_primitive::<Float64Type>().iter().collect())
}

/// Read a numeric column as `f64`, failing on nulls
pub fn required_f64(batch: &RecordBatch, column_name: &str) -> Result<Vec<f64>> {
    column_f64(batch, column_name)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| {
                AnalysisError::statistics(format!(
                    "Column '{column_name}' has a missing value at row {row}"
                ))
            })
        })
        .collect()
}

/// Extract hashable keys from an integer or string column
pub fn column_keys(array: &ArrayRef) -> Result<Vec<Option<KeyValue>>> {
    let data_type = array.data_type();
    if data_type.is_integer() {
        let ints = cast::cast(array, &DataType::Int64)?;
        Ok(ints
            .as_primitive::<Int64Type>()
            .iter()
            .map(|v| v.map(KeyValue::Int))
            .collect())
    } else if is_text(data_type) {
        let strings = cast::cast(array, &DataType::Utf8)?;
        Ok(strings
            .as_string::<i32>()
            .iter()
            .map(|v| v.map(|s| KeyValue::Str(s.to_string())))
            .collect())
    } else {
        Err(AnalysisError::Arrow(arrow::error::ArrowError::InvalidArgumentError(
            format!("{data_type} cannot be used as a key; cast it to Int64 or Utf8 first"),
        )))
    }
}

/// Indices of the numeric columns of a batch, excluding `skip`
#[must_use]
pub fn numeric_columns(batch: &RecordBatch, skip: &[&str]) -> Vec<usize> {
    batch
        .schema()
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| f.data_type().is_numeric() && !skip.contains(&f.name().as_str()))
        .map(|(i, _)| i)
        .collect()
}
