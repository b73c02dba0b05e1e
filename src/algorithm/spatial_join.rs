//! Point-in-polygon attribute join.
//!
//! Points pick up the attributes of the polygon containing them. Candidate
//! polygons come from an R-tree over their bounding boxes and are confirmed
//! with an exact intersection test, so points on a shared boundary count as
//! inside. When several polygons qualify the one with the lowest row wins.

use std::sync::Arc;

use arrow::array::UInt32Array;
use arrow::compute::take_record_batch;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use geo::{BoundingRect, Geometry, Intersects, MultiPolygon, Point};
use rayon::prelude::*;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{AABB, RTree};
use serde::Serialize;

use crate::algorithm::join::combine_columns;
use crate::error::{AnalysisError, Result};
use crate::frame::{GeoFrame, to_multipolygon};

type IndexedBox = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Name of the column holding the matched polygon row
pub const INDEX_RIGHT: &str = "index_right";

/// Counts describing a finished spatial join
#[derive(Debug, Clone, Serialize)]
pub struct SpatialJoinSummary {
    pub points: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub polygons_with_points: usize,
}

/// Give a point layer the CRS of a polygon layer
///
/// Coordinates are taken as already expressed in that CRS; nothing is
/// reprojected. Points outside the polygons' extent are reported, and if none
/// fall inside it the coordinates are assumed to be in another system.
pub fn assign_crs(points: &mut GeoFrame, polygons: &GeoFrame) -> Result<()> {
    let crs = polygons.crs().cloned();
    let Some(extent) = polygons.total_bounds() else {
        points.set_crs(crs);
        return Ok(());
    };

    let outside = points
        .geometry()
        .iter()
        .filter(|g| match g {
            Geometry::Point(p) => !extent.intersects(&p.0),
            _ => true,
        })
        .count();

    if points.num_rows() > 0 && outside == points.num_rows() {
        return Err(AnalysisError::CrsMismatch(format!(
            "none of the {} points fall within the polygon extent {:?} to {:?}",
            points.num_rows(),
            extent.min(),
            extent.max()
        )));
    }
    if outside > 0 {
        log::warn!(
            "{outside} of {} points lie outside the polygon extent",
            points.num_rows()
        );
    }

    if let Some(crs) = &crs {
        log::info!("Assigned CRS {crs} to {} points", points.num_rows());
    }
    points.set_crs(crs);
    Ok(())
}

fn build_index(polygons: &[MultiPolygon<f64>]) -> RTree<IndexedBox> {
    let boxes = polygons
        .iter()
        .enumerate()
        .filter_map(|(idx, polygon)| {
            polygon.bounding_rect().map(|rect| {
                let aabb = AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                );
                GeomWithData::new(Rectangle::from_aabb(aabb), idx)
            })
        })
        .collect();
    RTree::bulk_load(boxes)
}

/// Row of the first polygon containing each point
pub fn locate_points(points: &GeoFrame, polygons: &GeoFrame) -> Result<Vec<Option<u32>>> {
    let shapes = polygons
        .geometry()
        .iter()
        .map(to_multipolygon)
        .collect::<Result<Vec<_>>>()?;
    let tree = build_index(&shapes);

    points
        .geometry()
        .par_iter()
        .map(|geometry| {
            let Geometry::Point(point) = geometry else {
                return Err(AnalysisError::Geometry(format!(
                    "Spatial join expects points, found {geometry:?}"
                )));
            };
            Ok(first_containing(&tree, &shapes, *point))
        })
        .collect()
}

fn first_containing(
    tree: &RTree<IndexedBox>,
    shapes: &[MultiPolygon<f64>],
    point: Point<f64>,
) -> Option<u32> {
    tree.locate_all_at_point(&[point.x(), point.y()])
        .map(|candidate| candidate.data)
        .filter(|&idx| shapes[idx].intersects(&point.0))
        .min()
        .map(|idx| idx as u32)
}

/// Attach to each point the attributes of the polygon it falls in
///
/// A left join: every point is kept, with nulls where no polygon contains it.
/// The output holds the point columns, then `index_right`, then the polygon
/// columns; names present on both sides get `_left` / `_right`. Both layers
/// must share a CRS.
pub fn sjoin_within(points: &GeoFrame, polygons: &GeoFrame) -> Result<(GeoFrame, SpatialJoinSummary)> {
    if points.crs() != polygons.crs() {
        return Err(AnalysisError::CrsMismatch(format!(
            "points are in {} but polygons are in {}",
            points.crs().map_or_else(|| "no CRS".to_string(), ToString::to_string),
            polygons.crs().map_or_else(|| "no CRS".to_string(), ToString::to_string),
        )));
    }

    let located = locate_points(points, polygons)?;
    let matched = located.iter().flatten().count();
    let mut hit = vec![false; polygons.num_rows()];
    for idx in located.iter().flatten() {
        hit[*idx as usize] = true;
    }

    let index_right = UInt32Array::from(located);
    let polygon_rows = take_record_batch(polygons.batch(), &index_right)?;

    let index_batch = RecordBatch::try_new(
        Arc::new(Schema::new(vec![Field::new(INDEX_RIGHT, DataType::UInt32, true)])),
        vec![Arc::new(index_right)],
    )?;
    let left = combine_columns(points.batch(), &index_batch, None, ("_left", "_right"))?;
    let batch = combine_columns(&left, &polygon_rows, None, ("_left", "_right"))?;

    let summary = SpatialJoinSummary {
        points: points.num_rows(),
        matched,
        unmatched: points.num_rows() - matched,
        polygons_with_points: hit.iter().filter(|h| **h).count(),
    };
    if summary.unmatched > 0 {
        log::warn!(
            "{} of {} points fall in no polygon",
            summary.unmatched,
            summary.points
        );
    }
    log::info!(
        "Spatial join matched {} points into {} polygons",
        summary.matched,
        summary.polygons_with_points
    );

    let joined = GeoFrame::new(batch, points.geometry().to_vec(), points.crs().cloned())?;
    Ok((joined, summary))
}
