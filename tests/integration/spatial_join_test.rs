use std::sync::Arc;

use arrow::array::{Array, AsArray, Float64Array, Int64Array};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema, UInt32Type};
use arrow::record_batch::RecordBatch;
use syracuse_pb::algorithm::spatial_join::INDEX_RIGHT;
use syracuse_pb::pipeline::{
    LEAD_MEAN, METALS_KEY, TRACT, aggregate_to_tracts, join_lead_samples, load_inputs,
    spatial_statistics,
};
use syracuse_pb::{AnalysisError, GeoFrame, assign_crs, sjoin_within};

use crate::utils::{
    expected_lead, sample_count, soil_csv_skipping, tract_cell, tract_code, tract_layer, write_inputs,
};

const SIDE: usize = 4;

fn points(xs: Vec<f64>, ys: Vec<f64>) -> GeoFrame {
    let ids: Vec<i64> = (1..=xs.len() as i64).collect();
    let batch = RecordBatch::try_new(
        Arc::new(Schema::new(vec![
            Field::new("x", DataType::Float64, true),
            Field::new("y", DataType::Float64, true),
            Field::new("ID", DataType::Int64, true),
        ])),
        vec![
            Arc::new(Float64Array::from(xs)),
            Arc::new(Float64Array::from(ys)),
            Arc::new(Int64Array::from(ids)),
        ],
    )
    .unwrap();
    GeoFrame::points_from_xy(batch, "x", "y").unwrap()
}

#[test]
fn mean_lead_is_attached_to_every_tract() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), SIDE);
    let inputs = load_inputs(&config).unwrap();
    let aggregation = aggregate_to_tracts(&inputs).unwrap();
    let lead = join_lead_samples(&inputs, &aggregation).unwrap();

    assert_eq!(lead.join.points, sample_count(SIDE));
    assert_eq!(lead.join.matched, sample_count(SIDE) - 1);
    assert_eq!(lead.join.unmatched, 1);
    assert_eq!(lead.join.polygons_with_points, SIDE * SIDE);

    let batch = lead.frame.batch();
    assert_eq!(batch.num_rows(), SIDE * SIDE);
    assert!(batch.column_by_name(METALS_KEY).is_some());
    assert!(batch.column_by_name("Pb").is_some());

    let tracts = batch.column_by_name(TRACT).unwrap().as_primitive::<Int64Type>();
    let means = batch.column_by_name(LEAD_MEAN).unwrap().as_primitive::<Float64Type>();
    assert_eq!(means.null_count(), 0);
    for row in 0..batch.num_rows() {
        let (r, c) = tract_cell(tracts.value(row), SIDE);
        assert!((means.value(row) - expected_lead(r, c)).abs() < 1e-9);
    }
}

#[test]
fn unsampled_tract_drops_out_of_the_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), SIDE);
    std::fs::write(
        config.input_path(&config.soil_pb_file),
        soil_csv_skipping(SIDE, &[(0, 0)]),
    )
    .unwrap();

    let inputs = load_inputs(&config).unwrap();
    let aggregation = aggregate_to_tracts(&inputs).unwrap();
    let lead = join_lead_samples(&inputs, &aggregation).unwrap();
    assert_eq!(lead.join.points, sample_count(SIDE) - 3);
    assert_eq!(lead.join.polygons_with_points, SIDE * SIDE - 1);

    let mut frame = lead.frame;
    assert_eq!(frame.num_rows(), SIDE * SIDE - 1);
    let tracts = frame.batch().column_by_name(TRACT).unwrap().as_primitive::<Int64Type>();
    assert!(!tracts.values().contains(&tract_code(0, 0, SIDE)));

    let statistics = spatial_statistics(&mut frame, &config).unwrap();
    assert_eq!(statistics.weights.n(), SIDE * SIDE - 1);
    assert!(statistics.weights.islands().is_empty());
    assert_eq!(statistics.moran.sim.len(), config.permutations);
    assert!(statistics.moran.i > 0.0);
    assert_eq!(frame.batch().column_by_name("y_lag").unwrap().len(), SIDE * SIDE - 1);
}

#[test]
fn points_take_the_polygon_crs() {
    let tracts = tract_layer(2);
    let mut samples = points(vec![400_500.0, 401_500.0], vec![4_760_500.0, 4_761_500.0]);
    assert!(samples.crs().is_none());

    assign_crs(&mut samples, &tracts).unwrap();
    assert_eq!(samples.crs(), tracts.crs());

    let (joined, summary) = sjoin_within(&samples, &tracts).unwrap();
    assert_eq!(summary.matched, 2);
    let index = joined.batch().column_by_name(INDEX_RIGHT).unwrap();
    let index = index.as_primitive::<UInt32Type>();
    assert_eq!(index.value(0), 0);
    assert_eq!(index.value(1), 3);
}

#[test]
fn geographic_coordinates_are_rejected() {
    let tracts = tract_layer(2);
    let mut samples = points(vec![-76.15, -76.14], vec![43.04, 43.05]);
    let err = assign_crs(&mut samples, &tracts).unwrap_err();
    assert!(matches!(err, AnalysisError::CrsMismatch(_)));
}

#[test]
fn join_without_crs_is_rejected() {
    let tracts = tract_layer(2);
    let samples = points(vec![400_500.0], vec![4_760_500.0]);
    assert!(matches!(
        sjoin_within(&samples, &tracts),
        Err(AnalysisError::CrsMismatch(_))
    ));
}

#[test]
fn samples_outside_every_tract_keep_a_null_match() {
    let tracts = tract_layer(2);
    let mut samples = points(vec![400_500.0, 399_000.0], vec![4_760_500.0, 4_760_500.0]);
    assign_crs(&mut samples, &tracts).unwrap();

    let (joined, summary) = sjoin_within(&samples, &tracts).unwrap();
    assert_eq!(joined.num_rows(), 2);
    assert_eq!(summary.unmatched, 1);
    let tract = joined.batch().column_by_name(TRACT).unwrap();
    assert!(!tract.is_null(0));
    assert!(tract.is_null(1));
}
