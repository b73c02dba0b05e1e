//! Tables with a geometry column.
//!
//! A [`GeoFrame`] is an Arrow [`RecordBatch`] of attributes with one geometry
//! per row and an optional coordinate reference system.

use std::fmt;
use std::sync::Arc;

use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use geo::{BoundingRect, Coord, Geometry, MultiPolygon, Point, Rect};
use itertools::Itertools;

use crate::error::{AnalysisError, Result};
use crate::utils::arrow::required_f64;

/// Coordinate reference system, kept as the WKT text of a `.prj` file
#[derive(Debug, Clone)]
pub struct Crs {
    wkt: String,
}

impl Crs {
    /// Wrap WKT text
    #[must_use]
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: wkt.into().trim().to_string(),
        }
    }

    /// The WKT text
    #[must_use]
    pub fn wkt(&self) -> &str {
        &self.wkt
    }

    fn normalized(&self) -> String {
        self.wkt.split_whitespace().join("")
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Crs {}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // PROJCS["NAD_1983_UTM_Zone_18N",... -> NAD_1983_UTM_Zone_18N
        let name = self
            .wkt
            .split('"')
            .nth(1)
            .unwrap_or(self.wkt.as_str());
        f.write_str(name)
    }
}

/// Attribute table plus one geometry per row
#[derive(Debug, Clone)]
pub struct GeoFrame {
    batch: RecordBatch,
    geometry: Vec<Geometry<f64>>,
    crs: Option<Crs>,
}

impl GeoFrame {
    /// Create a frame; `geometry` must have one entry per row of `batch`
    pub fn new(batch: RecordBatch, geometry: Vec<Geometry<f64>>, crs: Option<Crs>) -> Result<Self> {
        if batch.num_rows() != geometry.len() {
            return Err(AnalysisError::Geometry(format!(
                "{} attribute rows but {} geometries",
                batch.num_rows(),
                geometry.len()
            )));
        }
        Ok(Self {
            batch,
            geometry,
            crs,
        })
    }

    /// Build point geometries from two numeric columns; the result has no CRS
    pub fn points_from_xy(batch: RecordBatch, x: &str, y: &str) -> Result<Self> {
        let xs = required_f64(&batch, x)?;
        let ys = required_f64(&batch, y)?;
        let geometry = xs
            .into_iter()
            .zip(ys)
            .map(|(x, y)| Geometry::Point(Point::new(x, y)))
            .collect();
        Self::new(batch, geometry, None)
    }

    /// Attribute table
    #[must_use]
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Geometries in row order
    #[must_use]
    pub fn geometry(&self) -> &[Geometry<f64>] {
        &self.geometry
    }

    /// Coordinate reference system, if any
    #[must_use]
    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    /// Set the coordinate reference system without transforming coordinates
    pub fn set_crs(&mut self, crs: Option<Crs>) {
        self.crs = crs;
    }

    /// Number of rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Replace the attribute table, keeping geometry and CRS
    pub fn with_batch(self, batch: RecordBatch) -> Result<Self> {
        Self::new(batch, self.geometry, self.crs)
    }

    /// Select rows by index, in the given order
    pub fn take(&self, indices: &[u32]) -> Result<Self> {
        let idx = UInt32Array::from(indices.to_vec());
        let batch = take_record_batch(&self.batch, &idx)?;
        let geometry = indices
            .iter()
            .map(|&i| self.geometry[i as usize].clone())
            .collect();
        Self::new(batch, geometry, self.crs.clone())
    }

    /// Add a column, or replace one of the same name
    pub fn set_column(&mut self, name: &str, values: ArrayRef) -> Result<()> {
        let schema = self.batch.schema();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        let mut columns = self.batch.columns().to_vec();
        let field = Field::new(name, values.data_type().clone(), true);
        match schema.index_of(name) {
            Ok(idx) => {
                fields[idx] = field;
                columns[idx] = values;
            }
            Err(_) => {
                fields.push(field);
                columns.push(values);
            }
        }
        self.batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Ok(())
    }

    /// Bounding box of all geometries
    #[must_use]
    pub fn total_bounds(&self) -> Option<Rect<f64>> {
        self.geometry
            .iter()
            .filter_map(|g| g.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    Coord {
                        x: a.min().x.min(b.min().x),
                        y: a.min().y.min(b.min().y),
                    },
                    Coord {
                        x: a.max().x.max(b.max().x),
                        y: a.max().y.max(b.max().y),
                    },
                )
            })
    }
}

/// View a polygonal geometry as a multipolygon
pub fn to_multipolygon(geometry: &Geometry<f64>) -> Result<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Ok(mp.clone()),
        other => Err(AnalysisError::Geometry(format!(
            "Expected a polygon, found {other:?}"
        ))),
    }
}
