//! Delimited text and spreadsheet tables as Arrow record batches.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanBuilder, Float64Array, Float64Builder, Int64Array,
    Int64Builder, StringBuilder,
};
use arrow::compute::concat_batches;
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use calamine::{Data, Reader, Xlsx, open_workbook};

use crate::config::is_na;
use crate::error::{AnalysisError, Result};
use crate::utils::{log_operation_complete, log_operation_start};

/// Rows sampled for CSV type inference
const INFER_RECORDS: usize = 10_000;

static EMPTY_CELL: Data = Data::Empty;

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| AnalysisError::file_open(path, e))
}

/// Read a comma-delimited file with a header row, inferring column types
pub fn read_csv(path: &Path, na_value: f64) -> Result<RecordBatch> {
    log_operation_start("Reading table", path);
    let start = Instant::now();

    let mut file = open(path)?;
    let format = Format::default().with_header(true).with_delimiter(b',');
    let (schema, _) = format.infer_schema(&mut file, Some(INFER_RECORDS))?;
    file.seek(SeekFrom::Start(0))?;

    let batch = read_with_schema(file, Arc::new(schema), true)?;
    let batch = mask_sentinel(&batch, na_value)?;

    log_operation_complete("Read", path, batch.num_rows(), Some(start.elapsed()));
    Ok(batch)
}

/// Read a comma-delimited file without a header, naming the columns positionally
///
/// Column types are inferred; `names` must have one entry per column.
pub fn read_csv_headerless(path: &Path, names: &[&str], na_value: f64) -> Result<RecordBatch> {
    log_operation_start("Reading headerless table", path);
    let start = Instant::now();

    let mut file = open(path)?;
    let format = Format::default().with_header(false).with_delimiter(b',');
    let (inferred, _) = format.infer_schema(&mut file, Some(INFER_RECORDS))?;
    file.seek(SeekFrom::Start(0))?;

    if inferred.fields().len() != names.len() {
        return Err(AnalysisError::Format(format!(
            "{} has {} columns, expected {} ({})",
            path.display(),
            inferred.fields().len(),
            names.len(),
            names.join(", ")
        )));
    }
    let schema = Schema::new(
        inferred
            .fields()
            .iter()
            .zip(names)
            .map(|(f, name)| Field::new(*name, f.data_type().clone(), true))
            .collect::<Vec<_>>(),
    );

    let batch = read_with_schema(file, Arc::new(schema), false)?;
    let batch = mask_sentinel(&batch, na_value)?;

    log_operation_complete("Read", path, batch.num_rows(), Some(start.elapsed()));
    Ok(batch)
}

fn read_with_schema(file: File, schema: SchemaRef, has_header: bool) -> Result<RecordBatch> {
    let reader = ReaderBuilder::new(Arc::clone(&schema))
        .with_header(has_header)
        .build(BufReader::new(file))?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(concat_batches(&schema, &batches)?)
}

/// Read the first sheet of an xlsx workbook; the first row holds column names
pub fn read_xlsx(path: &Path, na_value: f64) -> Result<RecordBatch> {
    log_operation_start("Reading workbook", path);
    let start = Instant::now();

    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| AnalysisError::Format(format!("{} has no sheets", path.display())))?;
    let range = workbook.worksheet_range(&sheet)?;

    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .ok_or_else(|| AnalysisError::Format(format!("Sheet '{sheet}' is empty")))?
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Data::Empty => format!("column_{}", i + 1),
            other => other.to_string(),
        })
        .collect();
    let body: Vec<&[Data]> = rows.collect();

    let mut fields = Vec::with_capacity(header.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(header.len());
    for (idx, name) in header.iter().enumerate() {
        let cells: Vec<&Data> = body.iter().map(|row| row.get(idx).unwrap_or(&EMPTY_CELL)).collect();
        let column = sheet_column(&cells);
        fields.push(Field::new(name, column.data_type().clone(), true));
        columns.push(column);
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    let batch = mask_sentinel(&batch, na_value)?;

    log_operation_complete("Read", path, batch.num_rows(), Some(start.elapsed()));
    Ok(batch)
}

/// Type a spreadsheet column: integral numbers become Int64, other numbers
/// Float64, booleans Boolean and anything mixed or textual Utf8
fn sheet_column(cells: &[&Data]) -> ArrayRef {
    let present = cells.iter().filter(|c| !matches!(c, Data::Empty));
    let (mut numeric, mut integral, mut boolean, mut any) = (true, true, true, false);
    for cell in present {
        any = true;
        match cell {
            Data::Int(_) => boolean = false,
            Data::Float(f) => {
                boolean = false;
                integral &= f.fract() == 0.0 && f.abs() < 9.0e15;
            }
            Data::Bool(_) => {
                numeric = false;
                integral = false;
            }
            _ => {
                numeric = false;
                integral = false;
                boolean = false;
            }
        }
    }

    if any && numeric && integral {
        let mut builder = Int64Builder::with_capacity(cells.len());
        for cell in cells {
            match cell {
                Data::Int(i) => builder.append_value(*i),
                Data::Float(f) => builder.append_value(*f as i64),
                _ => builder.append_null(),
            }
        }
        Arc::new(builder.finish())
    } else if any && numeric {
        let mut builder = Float64Builder::with_capacity(cells.len());
        for cell in cells {
            match cell {
                Data::Int(i) => builder.append_value(*i as f64),
                Data::Float(f) => builder.append_value(*f),
                _ => builder.append_null(),
            }
        }
        Arc::new(builder.finish())
    } else if any && boolean {
        let mut builder = BooleanBuilder::with_capacity(cells.len());
        for cell in cells {
            match cell {
                Data::Bool(b) => builder.append_value(*b),
                _ => builder.append_null(),
            }
        }
        Arc::new(builder.finish())
    } else {
        let mut builder = StringBuilder::with_capacity(cells.len(), cells.len() * 8);
        for cell in cells {
            match cell {
                Data::Empty => builder.append_null(),
                other => builder.append_value(other.to_string()),
            }
        }
        Arc::new(builder.finish())
    }
}

/// Read a table, choosing the reader from the file extension
pub fn read_table(path: &Path, na_value: f64) -> Result<RecordBatch> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "xlsx" | "xlsm" => read_xlsx(path, na_value),
        "csv" | "txt" => read_csv(path, na_value),
        other => Err(AnalysisError::Format(format!(
            "Unsupported table extension '{other}' for {}",
            path.display()
        ))),
    }
}

/// Replace the missing-data sentinel with nulls in every numeric column
pub fn mask_sentinel(batch: &RecordBatch, na_value: f64) -> Result<RecordBatch> {
    let mut masked = 0usize;
    let columns = batch
        .columns()
        .iter()
        .map(|column| -> ArrayRef {
            match column.data_type() {
                DataType::Float64 => {
                    let values = column.as_primitive::<Float64Type>();
                    let out: Float64Array = values
                        .iter()
                        .map(|v| v.filter(|&x| !is_na(x, na_value)))
                        .collect();
                    masked += out.null_count() - values.null_count();
                    Arc::new(out)
                }
                DataType::Int64 if na_value.fract() == 0.0 => {
                    let sentinel = na_value as i64;
                    let values = column.as_primitive::<Int64Type>();
                    let out: Int64Array = values.iter().map(|v| v.filter(|x| *x != sentinel)).collect();
                    masked += out.null_count() - values.null_count();
                    Arc::new(out)
                }
                _ => Arc::clone(column),
            }
        })
        .collect::<Vec<_>>();

    if masked > 0 {
        log::info!("Treated {masked} values equal to {na_value} as missing");
    }
    Ok(RecordBatch::try_new(batch.schema(), columns)?)
}

/// Write a table as comma-delimited text with a header row
pub fn write_csv(batch: &RecordBatch, path: &Path) -> Result<()> {
    log_operation_start("Writing table", path);
    let start = Instant::now();
    let file = File::create(path).map_err(|e| AnalysisError::file_open(path, e))?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer.write(batch)?;
    log_operation_complete("Wrote", path, batch.num_rows(), Some(start.elapsed()));
    Ok(())
}
