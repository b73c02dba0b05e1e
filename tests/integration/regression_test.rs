use arrow::array::AsArray;
use arrow::datatypes::Float64Type;
use syracuse_pb::pipeline::{
    HISPANIC, LEAD_MEAN, aggregate_to_tracts, join_lead_samples, load_inputs, spatial_statistics,
};

use crate::utils::write_inputs;

const SIDE: usize = 5;

#[test]
fn models_of_mean_lead() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_inputs(dir.path(), SIDE);
    let inputs = load_inputs(&config).unwrap();
    let aggregation = aggregate_to_tracts(&inputs).unwrap();
    let mut frame = join_lead_samples(&inputs, &aggregation).unwrap().frame;

    let stats = spatial_statistics(&mut frame, &config).unwrap();
    let n = SIDE * SIDE;

    assert_eq!(stats.weights.n(), n);
    assert!(stats.moran.i > 0.5);
    assert_eq!(stats.moran.permutations, config.permutations);

    let names: Vec<&str> = stats.ols.coefficients.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["CONSTANT", HISPANIC]);
    assert_eq!(stats.ols.n, n);
    assert!((0.0..=1.0).contains(&stats.ols.r2));
    assert_eq!(stats.residual_moran.n, n);

    let lag = &stats.ml_lag;
    assert_eq!(lag.k, 3);
    assert_eq!(lag.coefficients[2].name, format!("W_{LEAD_MEAN}"));
    assert!(lag.rho > -1.0 && lag.rho < 1.0);
    assert!(lag.logll >= stats.ols.logll - 1e-6);
    assert!(lag.sig2 > 0.0);

    let batch = frame.batch();
    let y = batch.column_by_name("y").unwrap().as_primitive::<Float64Type>();
    let y_lag = batch.column_by_name("y_lag").unwrap().as_primitive::<Float64Type>();
    let lead = batch.column_by_name(LEAD_MEAN).unwrap().as_primitive::<Float64Type>();
    assert_eq!(y.values(), lead.values());
    assert_eq!(y_lag.len(), n);
}
