use std::path::PathBuf;

use syracuse_pb::pipeline::{LEAD_MEAN, OUTPUT_STEM, SUMMARY_STEM};
use syracuse_pb::{AnalysisConfig, AnalysisError, read_csv, read_shapefile, run};

use crate::utils::write_inputs;

const SIDE: usize = 4;

#[test]
fn run_writes_all_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), SIDE);
    let report = run(&config).unwrap();

    let out = dir.path().join("outputs").join("output_data_test");
    assert!(out.is_dir());
    let csv = out.join(format!("{OUTPUT_STEM}__test.csv"));
    let shapefile = out.join(format!("{OUTPUT_STEM}__test.shp"));
    let summary = out.join(format!("{SUMMARY_STEM}__test.json"));
    assert_eq!(report.outputs.csv, csv);
    assert_eq!(report.outputs.shapefile, shapefile);
    assert_eq!(report.outputs.summary, summary);

    let text = std::fs::read_to_string(&csv).unwrap();
    assert_eq!(text.lines().count(), SIDE * SIDE + 1);
    assert!(text.lines().next().unwrap().contains(LEAD_MEAN));

    for extension in ["shp", "shx", "dbf", "prj"] {
        assert!(shapefile.with_extension(extension).exists(), "missing .{extension}");
    }
    let layer = read_shapefile(&shapefile, config.na_value).unwrap();
    assert_eq!(layer.num_rows(), SIDE * SIDE);
    assert!(layer.batch().column_by_name(LEAD_MEAN).is_some());
    assert!(layer.crs().is_some());

    let table = read_csv(&csv, config.na_value).unwrap();
    assert_eq!(table.num_rows(), SIDE * SIDE);

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(json["tracts_with_lead"], SIDE * SIDE);
    assert_eq!(json["aggregation"]["tracts"], SIDE * SIDE);
    assert!(json["moran"]["i"].as_f64().unwrap() > 0.0);
    assert!(json["ml_lag"]["rho"].is_number());
    assert_eq!(json["population_classes"].as_array().unwrap().len(), 2);
    assert_eq!(json["config"]["permutations"], 99);
}

#[test]
fn repeated_runs_give_identical_tables() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), SIDE);

    let first = run(&config).unwrap();
    let csv = std::fs::read(&first.outputs.csv).unwrap();
    let second = run(&config).unwrap();
    assert_eq!(csv, std::fs::read(&second.outputs.csv).unwrap());
    assert_eq!(first.moran.p_sim, second.moran.p_sim);
    assert_eq!(first.ml_lag.rho, second.ml_lag.rho);
}

#[test]
fn outputs_go_straight_to_out_dir_when_not_creating() {
    let dir = tempfile::tempdir().unwrap();
    let config = AnalysisConfig {
        create_out_dir: false,
        out_dir: dir.path().join("flat"),
        ..write_inputs(dir.path(), SIDE)
    };
    assert!(matches!(run(&config), Err(AnalysisError::FileOpen { .. })));

    std::fs::create_dir_all(&config.out_dir).unwrap();
    let report = run(&config).unwrap();
    assert_eq!(report.outputs.csv.parent(), Some(config.out_dir.as_path()));
}

#[test]
fn missing_inputs_fail_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = AnalysisConfig {
        soil_pb_file: "missing.csv".to_string(),
        ..write_inputs(dir.path(), SIDE)
    };
    assert!(run(&config).is_err());

    let config = AnalysisConfig {
        in_dir: PathBuf::from("/definitely/not/here"),
        ..config
    };
    assert!(run(&config).is_err());
}

#[test]
fn invalid_config_is_rejected_before_reading() {
    let dir = tempfile::tempdir().unwrap();
    let config = AnalysisConfig {
        permutations: 0,
        ..write_inputs(dir.path(), SIDE)
    };
    assert!(matches!(run(&config), Err(AnalysisError::Config(_))));
}
