use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use syracuse_pb::algorithm::weights::lag_spatial;
use syracuse_pb::algorithm::{Moran, MoranScatter, SpatialWeights, Transform};

use crate::utils::{expected_lead, tract_layer};

const SIDE: usize = 5;

fn gradient() -> Vec<f64> {
    (0..SIDE)
        .flat_map(|r| (0..SIDE).map(move |c| expected_lead(r, c)))
        .collect()
}

fn row_weights() -> SpatialWeights {
    let mut w = SpatialWeights::queen(&tract_layer(SIDE), Some("TRACT")).unwrap();
    w.set_transform(Transform::Row);
    w
}

#[test]
fn queen_weights_on_tract_grid() {
    let w = SpatialWeights::queen(&tract_layer(SIDE), Some("TRACT")).unwrap();
    assert_eq!(w.n(), SIDE * SIDE);
    assert_eq!(w.transform(), Transform::Binary);
    assert!(w.islands().is_empty());

    let cardinalities = w.cardinalities();
    assert_eq!(cardinalities[0], 3);
    assert_eq!(cardinalities[1], 5);
    assert_eq!(cardinalities[SIDE + 1], 8);
    assert!((w.mean_neighbors() - 5.76).abs() < 1e-12);

    let summary = w.summary();
    assert_eq!(summary.min_neighbors, 3);
    assert_eq!(summary.max_neighbors, 8);
    assert_eq!(summary.transform, "B");
}

#[test]
fn lag_of_row_weights_averages_neighbours() {
    let w = row_weights();
    let y = gradient();
    let lag = lag_spatial(&w, &y).unwrap();
    // Corner (0, 0) borders (0, 1), (1, 0) and (1, 1)
    let corner = (expected_lead(0, 1) + expected_lead(1, 0) + expected_lead(1, 1)) / 3.0;
    assert!((lag[0] - corner).abs() < 1e-9);
    // Interior cells of a linear surface average to themselves
    let centre = 2 * SIDE + 2;
    assert!((lag[centre] - y[centre]).abs() < 1e-9);
}

#[test]
fn clustered_lead_is_significant() {
    let w = row_weights();
    let moran = Moran::new(&gradient(), &w, 99, 12_345).unwrap();

    assert!((moran.ei + 1.0 / 24.0).abs() < 1e-12);
    assert!(moran.i > 0.5, "I = {}", moran.i);
    assert!(moran.z_norm > 3.0);
    assert!(moran.p_norm < 0.01);
    assert_eq!(moran.permutations, 99);
    assert_eq!(moran.sim.len(), 99);
    assert!(moran.p_sim.unwrap() <= 0.02);
    assert!(moran.z_sim.unwrap() > 2.0);
}

#[test]
fn shuffled_lead_is_rarely_significant() {
    let w = row_weights();
    let mut significant = 0;
    for seed in 0..20 {
        let mut y = gradient();
        y.shuffle(&mut StdRng::seed_from_u64(seed));
        let moran = Moran::new(&y, &w, 99, seed).unwrap();
        if moran.p_sim.unwrap() <= 0.05 {
            significant += 1;
        }
    }
    assert!(significant <= 8, "{significant} of 20 shuffles significant");
}

#[test]
fn permutations_are_reproducible() {
    let w = row_weights();
    let y = gradient();
    let first = Moran::new(&y, &w, 99, 7).unwrap();
    let second = Moran::new(&y, &w, 99, 7).unwrap();
    assert_eq!(first.sim, second.sim);
    assert_eq!(first.p_sim, second.p_sim);

    let other = Moran::new(&y, &w, 99, 8).unwrap();
    assert_ne!(first.sim, other.sim);
    assert_eq!(first.i, other.i);
}

#[test]
fn checkerboard_is_negatively_autocorrelated() {
    let mut w = SpatialWeights::queen(&tract_layer(SIDE), None).unwrap();
    w.set_transform(Transform::Row);
    let y: Vec<f64> = (0..SIDE * SIDE)
        .map(|i| if (i / SIDE + i % SIDE) % 2 == 0 { 10.0 } else { 1.0 })
        .collect();
    let moran = Moran::new(&y, &w, 99, 1).unwrap();
    assert!(moran.i < moran.ei);
}

#[test]
fn scatter_slope_equals_moran_i_for_row_weights() {
    let w = row_weights();
    let y = gradient();
    let moran = Moran::new(&y, &w, 9, 1).unwrap();
    let scatter = MoranScatter::new(&y, &w).unwrap();
    assert_eq!(scatter.z.len(), SIDE * SIDE);
    assert!((scatter.slope - moran.i).abs() < 1e-9);
}

#[test]
fn constant_values_are_rejected() {
    let w = row_weights();
    assert!(Moran::new(&[3.0; SIDE * SIDE], &w, 9, 1).is_err());
}
