//! Module for converting key columns between types.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Int64Builder};
use arrow::compute::kernels::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::{AnalysisError, Result};
use crate::schema::adapt::compatibility::{determine_adaptation_strategy, is_text};
use crate::schema::adapt::types::AdaptationStrategy;

/// Convert an Arrow array to match the target data type
///
/// Values that cannot be represented in the target type are an error rather
/// than silently becoming null, since a null key drops the row from any join.
pub fn convert_array(array: &ArrayRef, target_type: &DataType) -> Result<ArrayRef> {
    let source_type = array.data_type();

    let strategy = determine_adaptation_strategy(source_type, target_type).ok_or_else(|| {
        AdaptationFailed::new(source_type, target_type, "incompatible types").into_error()
    })?;

    match strategy {
        AdaptationStrategy::Identity => Ok(Arc::clone(array)),
        AdaptationStrategy::StringParsing if target_type == &DataType::Int64 => {
            parse_string_to_int64(array)
        }
        _ => {
            if source_type.is_floating() && target_type.is_integer() {
                check_integral(array, target_type)?;
            }
            let options = cast::CastOptions {
                safe: false,
                ..Default::default()
            };
            cast::cast_with_options(array, target_type, &options).map_err(|e| {
                AdaptationFailed::new(source_type, target_type, &e.to_string()).into_error()
            })
        }
    }
}

/// Return `batch` with column `name` converted to `target_type`
pub fn cast_column(batch: &RecordBatch, name: &str, target_type: &DataType) -> Result<RecordBatch> {
    let schema = batch.schema();
    let idx = schema
        .index_of(name)
        .map_err(|_| AnalysisError::MissingColumn(name.to_string()))?;

    let converted = convert_array(batch.column(idx), target_type)?;

    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    fields[idx] = Field::new(name, target_type.clone(), fields[idx].is_nullable());
    let mut columns = batch.columns().to_vec();
    columns[idx] = converted;

    if log::log_enabled!(log::Level::Debug) {
        log::debug!(
            "Cast column '{name}' from {} to {target_type}",
            schema.field(idx).data_type()
        );
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Fail on the first non-null float with a fractional part
fn check_integral(array: &ArrayRef, target_type: &DataType) -> Result<()> {
    let floats = cast::cast(array, &DataType::Float64)?;
    let fractional = floats
        .as_primitive::<Float64Type>()
        .iter()
        .enumerate()
        .find_map(|(row, v)| v.filter(|f| f.fract() != 0.0).map(|f| (row, f)));
    match fractional {
        Some((row, value)) => Err(AdaptationFailed::new(
            array.data_type(),
            target_type,
            &format!("value {value} at row {row} is not an integer"),
        )
        .into_error()),
        None => Ok(()),
    }
}

/// Parse text keys such as `"005400"` or `" 5400.0 "` into Int64
fn parse_string_to_int64(array: &ArrayRef) -> Result<ArrayRef> {
    if !is_text(array.data_type()) {
        return Err(AdaptationFailed::new(array.data_type(), &DataType::Int64, "not a string").into_error());
    }
    let utf8 = cast::cast(array, &DataType::Utf8)?;
    let strings = utf8.as_string::<i32>();

    let mut builder = Int64Builder::with_capacity(strings.len());
    for i in 0..strings.len() {
        if strings.is_null(i) {
            builder.append_null();
            continue;
        }
        let text = strings.value(i).trim();
        if text.is_empty() {
            builder.append_null();
            continue;
        }
        let value = match text.parse::<i64>() {
            Ok(v) => v,
            Err(_) => match text.parse::<f64>() {
                Ok(f) if f.fract() == 0.0 && f.is_finite() => f as i64,
                _ => {
                    return Err(AdaptationFailed::new(
                        &DataType::Utf8,
                        &DataType::Int64,
                        &format!("value '{text}' at row {i} is not an integer"),
                    )
                    .into_error());
                }
            },
        };
        builder.append_value(value);
    }

    Ok(Arc::new(builder.finish()) as ArrayRef)
}

struct AdaptationFailed<'a> {
    from: &'a DataType,
    to: &'a DataType,
    reason: &'a str,
}

impl<'a> AdaptationFailed<'a> {
    fn new(from: &'a DataType, to: &'a DataType, reason: &'a str) -> Self {
        Self { from, to, reason }
    }

    fn into_error(self) -> AnalysisError {
        AnalysisError::Arrow(arrow::error::ArrowError::CastError(format!(
            "Failed to convert from {:?} to {:?}: {}",
            self.from, self.to, self.reason
        )))
    }
}
