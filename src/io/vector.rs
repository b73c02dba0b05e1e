//! ESRI shapefile layers as [`GeoFrame`]s.
//!
//! Shapes come from the `.shp`, attributes from the `.dbf` (column order is
//! the dBase field order) and the CRS from the `.prj` when present.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray,
};
use arrow::compute::kernels::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Schema};
use arrow::record_batch::RecordBatch;
use dbase::{FieldName, FieldType, FieldValue, Record, TableWriterBuilder};
use geo::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon, Winding};
use shapefile::{PolygonRing, Shape, ShapeReader};

use crate::config::is_na;
use crate::error::{AnalysisError, Result};
use crate::frame::{Crs, GeoFrame};
use crate::utils::{log_operation_complete, log_operation_start};

/// Longest field name a dBase table accepts
const DBF_NAME_LEN: usize = 10;

/// Widest dBase character field, in bytes
const DBF_TEXT_LEN: usize = 254;

/// Read a shapefile with its attribute table and CRS
pub fn read_shapefile(path: &Path, na_value: f64) -> Result<GeoFrame> {
    log_operation_start("Reading layer", path);
    let start = Instant::now();

    let shapes = ShapeReader::from_path(path)?.read()?;
    let geometry = shapes
        .into_iter()
        .map(shape_to_geometry)
        .collect::<Result<Vec<_>>>()?;

    let batch = read_attributes(&path.with_extension("dbf"), na_value)?;

    let prj = path.with_extension("prj");
    let crs = if prj.exists() {
        let wkt = std::fs::read_to_string(&prj).map_err(|e| AnalysisError::file_open(&prj, e))?;
        Some(Crs::from_wkt(wkt))
    } else {
        log::warn!("No .prj next to {}, layer has no CRS", path.display());
        None
    };

    let frame = GeoFrame::new(batch, geometry, crs)?;
    log_operation_complete("Read", path, frame.num_rows(), Some(start.elapsed()));
    Ok(frame)
}

enum DbfColumn {
    Text(Vec<Option<String>>),
    Number {
        values: Vec<Option<f64>>,
        integral_type: bool,
    },
    Flag(Vec<Option<bool>>),
}

fn read_attributes(dbf: &Path, na_value: f64) -> Result<RecordBatch> {
    let mut reader = dbase::Reader::from_path(dbf)?;
    let field_info: Vec<(String, FieldType)> = reader
        .fields()
        .iter()
        .map(|f| (f.name().to_string(), f.field_type()))
        .collect();
    let records = reader.read()?;
    let decimals = declared_decimals(dbf)?;

    let mut columns: Vec<DbfColumn> = field_info
        .iter()
        .enumerate()
        .map(|(idx, (_, field_type))| match field_type {
            FieldType::Logical => DbfColumn::Flag(Vec::with_capacity(records.len())),
            FieldType::Numeric
            | FieldType::Integer
            | FieldType::Float
            | FieldType::Double
            | FieldType::Currency => DbfColumn::Number {
                values: Vec::with_capacity(records.len()),
                integral_type: match field_type {
                    FieldType::Integer => true,
                    FieldType::Numeric => decimals.get(idx).copied() == Some(0),
                    _ => false,
                },
            },
            _ => DbfColumn::Text(Vec::with_capacity(records.len())),
        })
        .collect();

    for record in &records {
        for ((name, _), column) in field_info.iter().zip(columns.iter_mut()) {
            let value = record.get(name);
            match column {
                DbfColumn::Text(values) => values.push(value.and_then(field_text)),
                DbfColumn::Number { values, .. } => values.push(
                    value
                        .and_then(field_number)
                        .filter(|&v| !is_na(v, na_value)),
                ),
                DbfColumn::Flag(values) => values.push(match value {
                    Some(FieldValue::Logical(b)) => *b,
                    _ => None,
                }),
            }
        }
    }

    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());
    for ((name, _), column) in field_info.iter().zip(columns) {
        let array: ArrayRef = match column {
            DbfColumn::Text(values) => Arc::new(StringArray::from(values)),
            DbfColumn::Flag(values) => Arc::new(BooleanArray::from(values)),
            DbfColumn::Number {
                values,
                integral_type,
            } => {
                let representable = values
                    .iter()
                    .flatten()
                    .all(|v| v.fract() == 0.0 && v.abs() < 9.0e15);
                if integral_type && !representable {
                    log::warn!("Field '{name}' declares no decimals but holds non-integers");
                }
                if integral_type && representable {
                    Arc::new(Int64Array::from(
                        values
                            .iter()
                            .map(|v| v.map(|x| x as i64))
                            .collect::<Vec<_>>(),
                    ))
                } else {
                    Arc::new(Float64Array::from(values))
                }
            }
        };
        fields.push(Field::new(name, array.data_type().clone(), true));
        arrays.push(array);
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Decimal counts of the dBase fields, in field order
///
/// Field descriptors are 32 bytes each from offset 32 and end at a 0x0D
/// byte; the decimal count is byte 17 of a descriptor.
fn declared_decimals(dbf: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(dbf).map_err(|e| AnalysisError::file_open(dbf, e))?;
    let mut head = [0u8; 32];
    file.read_exact(&mut head)?;
    let header_len = usize::from(u16::from_le_bytes([head[8], head[9]]));
    let mut descriptors = vec![0u8; header_len.saturating_sub(head.len())];
    file.read_exact(&mut descriptors)?;
    Ok(descriptors
        .chunks_exact(32)
        .take_while(|descriptor| descriptor[0] != 0x0D)
        .map(|descriptor| descriptor[17])
        .collect())
}

fn field_text(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Character(s) => s.as_ref().map(|s| s.trim().to_string()),
        FieldValue::Memo(s) => Some(s.clone()),
        FieldValue::Date(d) => d
            .as_ref()
            .map(|d| format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day())),
        FieldValue::Numeric(n) => n.map(|v| v.to_string()),
        FieldValue::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

fn field_number(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Numeric(n) => *n,
        FieldValue::Float(f) => f.map(f64::from),
        FieldValue::Integer(i) => Some(f64::from(*i)),
        FieldValue::Double(d) | FieldValue::Currency(d) => Some(*d),
        FieldValue::Character(Some(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

macro_rules! polygon_rings {
    ($polygon:expr) => {
        $polygon
            .rings()
            .iter()
            .map(|ring| {
                let coords = ring
                    .points()
                    .iter()
                    .map(|p| Coord { x: p.x, y: p.y })
                    .collect::<Vec<_>>();
                (matches!(ring, PolygonRing::Outer(_)), coords)
            })
            .collect::<Vec<_>>()
    };
}

fn shape_to_geometry(shape: Shape) -> Result<Geometry<f64>> {
    match shape {
        Shape::Polygon(p) => Ok(rings_to_multipolygon(polygon_rings!(p))),
        Shape::PolygonZ(p) => Ok(rings_to_multipolygon(polygon_rings!(p))),
        Shape::PolygonM(p) => Ok(rings_to_multipolygon(polygon_rings!(p))),
        Shape::Point(p) => Ok(Geometry::Point(Point::new(p.x, p.y))),
        Shape::PointZ(p) => Ok(Geometry::Point(Point::new(p.x, p.y))),
        Shape::PointM(p) => Ok(Geometry::Point(Point::new(p.x, p.y))),
        other => Err(AnalysisError::Geometry(format!(
            "Unsupported shape type {:?}",
            other.shapetype()
        ))),
    }
}

/// Each outer ring opens a polygon; inner rings are holes of the last one
fn rings_to_multipolygon(rings: Vec<(bool, Vec<Coord<f64>>)>) -> Geometry<f64> {
    let mut parts: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    for (outer, coords) in rings {
        let ring = LineString::from(coords);
        if !outer {
            if let Some((_, holes)) = parts.last_mut() {
                holes.push(ring);
                continue;
            }
        }
        parts.push((ring, Vec::new()));
    }
    Geometry::MultiPolygon(MultiPolygon::new(
        parts
            .into_iter()
            .map(|(exterior, holes)| Polygon::new(exterior, holes))
            .collect(),
    ))
}

fn geometry_to_shape(geometry: &Geometry<f64>) -> Result<shapefile::Polygon> {
    let polygons: Vec<&Polygon<f64>> = match geometry {
        Geometry::Polygon(p) => vec![p],
        Geometry::MultiPolygon(mp) => mp.0.iter().collect(),
        other => {
            return Err(AnalysisError::Geometry(format!(
                "Only polygon layers can be written, found {other:?}"
            )));
        }
    };

    let to_points = |ring: &LineString<f64>| {
        ring.coords()
            .map(|c| shapefile::Point::new(c.x, c.y))
            .collect::<Vec<_>>()
    };

    let mut rings = Vec::new();
    for polygon in polygons {
        // Shapefile outer rings run clockwise, holes counter-clockwise
        let mut exterior = polygon.exterior().clone();
        exterior.make_cw_winding();
        rings.push(PolygonRing::Outer(to_points(&exterior)));
        for interior in polygon.interiors() {
            let mut hole = interior.clone();
            hole.make_ccw_winding();
            rings.push(PolygonRing::Inner(to_points(&hole)));
        }
    }
    Ok(shapefile::Polygon::with_rings(rings))
}

/// Truncate column names to the dBase limit, keeping them unique
fn dbf_field_names(batch: &RecordBatch) -> Vec<String> {
    let mut used = HashSet::new();
    batch
        .schema()
        .fields()
        .iter()
        .map(|field| {
            let base: String = field
                .name()
                .chars()
                .filter(char::is_ascii)
                .take(DBF_NAME_LEN)
                .collect();
            let mut name = base.clone();
            let mut n = 1;
            while !used.insert(name.clone()) {
                let suffix = n.to_string();
                let keep = DBF_NAME_LEN.saturating_sub(suffix.len()).min(base.len());
                name = format!("{}{suffix}", &base[..keep]);
                n += 1;
            }
            name
        })
        .collect()
}

fn field_name(name: &str) -> Result<FieldName> {
    FieldName::try_from(name)
        .map_err(|_| AnalysisError::Format(format!("'{name}' is not a valid dBase field name")))
}

/// Write a polygon layer as `.shp/.shx/.dbf`, plus `.prj` when the layer has a CRS
///
/// Column names longer than ten characters are truncated.
pub fn write_shapefile(frame: &GeoFrame, path: &Path) -> Result<()> {
    log_operation_start("Writing layer", path);
    let start = Instant::now();

    let batch = frame.batch();
    let names = dbf_field_names(batch);
    let mut builder = TableWriterBuilder::new();
    let mut columns: Vec<(String, ArrayRef)> = Vec::with_capacity(names.len());

    for (field, name) in batch.schema().fields().iter().zip(&names) {
        let column = batch.column_by_name(field.name()).map(Arc::clone).ok_or_else(|| {
            AnalysisError::MissingColumn(field.name().clone())
        })?;
        let data_type = field.data_type();
        let column = if data_type.is_integer() {
            builder = builder.add_numeric_field(field_name(name)?, 18, 0);
            cast::cast(&column, &DataType::Float64)?
        } else if data_type.is_numeric() {
            builder = builder.add_numeric_field(field_name(name)?, 24, 11);
            cast::cast(&column, &DataType::Float64)?
        } else if data_type == &DataType::Boolean {
            builder = builder.add_logical_field(field_name(name)?);
            column
        } else {
            let text = cast::cast(&column, &DataType::Utf8).map_err(|_| {
                AnalysisError::Format(format!(
                    "Column '{}' of type {data_type} cannot be written to a dBase table",
                    field.name()
                ))
            })?;
            let width = text
                .as_string::<i32>()
                .iter()
                .flatten()
                .map(|text| truncate_text(text).len())
                .max()
                .unwrap_or(1)
                .max(1);
            builder = builder.add_character_field(field_name(name)?, width as u8);
            text
        };
        columns.push((name.clone(), column));
    }

    let mut writer = shapefile::Writer::from_path(path, builder)?;
    for (row, geometry) in frame.geometry().iter().enumerate() {
        let shape = geometry_to_shape(geometry)?;
        let mut record = Record::default();
        for (name, column) in &columns {
            record.insert(name.clone(), field_value(column, row));
        }
        writer.write_shape_and_record(&shape, &record)?;
    }
    drop(writer);

    if let Some(crs) = frame.crs() {
        let prj = path.with_extension("prj");
        std::fs::write(&prj, crs.wkt()).map_err(|e| AnalysisError::file_open(&prj, e))?;
    }

    log_operation_complete("Wrote", path, frame.num_rows(), Some(start.elapsed()));
    Ok(())
}

/// Cut `text` to at most [`DBF_TEXT_LEN`] bytes without splitting a character
fn truncate_text(text: &str) -> &str {
    if text.len() <= DBF_TEXT_LEN {
        return text;
    }
    let mut end = DBF_TEXT_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn field_value(column: &ArrayRef, row: usize) -> FieldValue {
    match column.data_type() {
        DataType::Float64 => {
            let values = column.as_primitive::<Float64Type>();
            FieldValue::Numeric((!values.is_null(row)).then(|| values.value(row)))
        }
        DataType::Boolean => {
            let values = column.as_boolean();
            FieldValue::Logical((!values.is_null(row)).then(|| values.value(row)))
        }
        _ => {
            let values = column.as_string::<i32>();
            let text: Option<String> =
                (!values.is_null(row)).then(|| truncate_text(values.value(row)).to_string());
            FieldValue::Character(text)
        }
    }
}
