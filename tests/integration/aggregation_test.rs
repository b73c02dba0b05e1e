use arrow::array::AsArray;
use arrow::datatypes::{DataType, Float64Type, Int64Type, UInt64Type};
use geo::Area;
use syracuse_pb::algorithm::{Scheme, describe};
use syracuse_pb::pipeline::{BKG_KEY, HISPANIC, POPULATION, TRACT, aggregate_to_tracts, classify_population, load_inputs};

use crate::utils::{
    block_group_hispanic, block_group_population, sample_count, tract_cell, write_inputs,
};

const SIDE: usize = 4;

#[test]
fn inputs_load_with_expected_shapes() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), SIDE);
    let inputs = load_inputs(&config).unwrap();

    assert_eq!(inputs.tracts.num_rows(), SIDE * SIDE);
    assert_eq!(inputs.block_groups.num_rows(), 2 * SIDE * SIDE);
    assert_eq!(inputs.census.num_rows(), 2 * SIDE * SIDE);
    assert_eq!(inputs.metals.num_rows(), SIDE * SIDE);
    assert_eq!(inputs.soil.num_rows(), sample_count(SIDE));
    assert_eq!(inputs.soil.num_columns(), 4);
    assert!(inputs.tracts.crs().is_some());

    let shapes = inputs.shapes();
    assert_eq!(shapes.len(), 6);
    assert_eq!(shapes[0].name, "tracts");
}

#[test]
fn block_groups_aggregate_to_tracts() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), SIDE);
    let inputs = load_inputs(&config).unwrap();
    let aggregation = aggregate_to_tracts(&inputs).unwrap();

    assert_eq!(aggregation.report.block_groups, 2 * SIDE * SIDE);
    assert_eq!(aggregation.report.tracts, SIDE * SIDE);
    assert_eq!(aggregation.dissolved.num_rows(), SIDE * SIDE);
    assert_eq!(aggregation.tracts.num_rows(), SIDE * SIDE);
    assert!(aggregation.report.check.columns.iter().any(|c| c == POPULATION));

    let batch = aggregation.dissolved.batch();
    let tracts = batch.column_by_name(TRACT).unwrap();
    assert_eq!(tracts.data_type(), &DataType::Int64);
    assert!(batch.column_by_name(BKG_KEY).is_some());

    let tracts = tracts.as_primitive::<Int64Type>();
    let population = batch.column_by_name(POPULATION).unwrap().as_primitive::<Int64Type>();
    let hispanic = batch.column_by_name(HISPANIC).unwrap().as_primitive::<Float64Type>();
    for row in 0..batch.num_rows() {
        let (r, c) = tract_cell(tracts.value(row), SIDE);
        assert_eq!(
            population.value(row),
            block_group_population(r, c, 1) + block_group_population(r, c, 2)
        );
        // Each half was written with three decimals
        assert!((hispanic.value(row) - 2.0 * block_group_hispanic(r, c)).abs() < 2e-3);
    }

    // Dissolved tracts come back sorted by key
    let keys: Vec<i64> = tracts.values().to_vec();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(keys, sorted);
}

#[test]
fn dissolved_tracts_cover_both_halves() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), SIDE);
    let inputs = load_inputs(&config).unwrap();
    let aggregation = aggregate_to_tracts(&inputs).unwrap();

    assert_eq!(aggregation.dissolved.crs(), inputs.block_groups.crs());
    for geometry in aggregation.dissolved.geometry() {
        let area = geometry.unsigned_area();
        assert!((area - 1.0e6).abs() < 1.0, "tract area {area}");
    }
}

#[test]
fn population_is_classified_both_ways() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), SIDE);
    let inputs = load_inputs(&config).unwrap();
    let aggregation = aggregate_to_tracts(&inputs).unwrap();

    let classes = classify_population(&aggregation.dissolved, config.classification_k).unwrap();
    assert_eq!(classes.len(), 2);
    assert_eq!(classes[0].scheme, Scheme::Quantiles);
    assert_eq!(classes[1].scheme, Scheme::EqualInterval);
    for classification in &classes {
        assert_eq!(classification.counts.iter().sum::<usize>(), SIDE * SIDE);
        assert_eq!(classification.classes.len(), SIDE * SIDE);
        assert!(classification.k <= config.classification_k);
        assert!(classification.bins.windows(2).all(|w| w[0] < w[1]));

        let table = classification.table().unwrap();
        assert_eq!(table.num_rows(), classification.bins.len());
        let counts = table.column_by_name("count").unwrap().as_primitive::<UInt64Type>();
        assert_eq!(counts.values().iter().sum::<u64>(), (SIDE * SIDE) as u64);
    }
}

#[test]
fn tract_attributes_are_described() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), SIDE);
    let inputs = load_inputs(&config).unwrap();

    let description = describe(inputs.tracts.batch()).unwrap();
    let columns = description.column_by_name("column").unwrap().as_string::<i64>();
    assert!(columns.iter().flatten().any(|name| name == "AREA"));
    let counts = description.column_by_name("count").unwrap().as_primitive::<UInt64Type>();
    assert!(counts.values().iter().all(|&n| n == (SIDE * SIDE) as u64));
}
