//! Global Moran's I with analytical and permutation inference.

use indicatif::ParallelProgressIterator;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::algorithm::weights::SpatialWeights;
use crate::error::{AnalysisError, Result};
use crate::utils::logging::{finish_permutations, permutation_progress};

/// Moran's I for one variable
#[derive(Debug, Clone, Serialize)]
pub struct Moran {
    pub n: usize,
    pub i: f64,
    pub ei: f64,
    pub vi_norm: f64,
    pub se_i_norm: f64,
    pub z_norm: f64,
    /// Two-sided, normality assumption
    pub p_norm: f64,
    pub vi_rand: f64,
    pub se_i_rand: f64,
    pub z_rand: f64,
    /// Two-sided, randomisation assumption
    pub p_rand: f64,
    pub permutations: usize,
    /// Pseudo p-value, `(larger + 1) / (permutations + 1)`
    pub p_sim: Option<f64>,
    pub ei_sim: Option<f64>,
    pub se_i_sim: Option<f64>,
    pub vi_sim: Option<f64>,
    pub z_sim: Option<f64>,
    /// One-sided p-value of `z_sim`
    pub p_z_sim: Option<f64>,
    #[serde(skip)]
    pub sim: Vec<f64>,
}

/// Standardised values against their spatial lag
#[derive(Debug, Clone)]
pub struct MoranScatter {
    pub z: Vec<f64>,
    pub lag: Vec<f64>,
    /// Least-squares slope of `lag` on `z`
    pub slope: f64,
}

fn standard_normal() -> Result<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| AnalysisError::statistics(e.to_string()))
}

/// Upper or lower tail, whichever `z` sits in
fn one_tailed(normal: &Normal, z: f64) -> f64 {
    if z > 0.0 { normal.sf(z) } else { normal.cdf(z) }
}

fn deviations(y: &[f64]) -> Vec<f64> {
    let mean = y.iter().sum::<f64>() / y.len() as f64;
    y.iter().map(|v| v - mean).collect()
}

/// `n / S0 · zᵀWz / zᵀz` on centred values
fn statistic(z: &[f64], w: &SpatialWeights, scale: f64, z2ss: f64) -> Result<f64> {
    let lag = w.lag(z)?;
    let cross: f64 = z.iter().zip(&lag).map(|(a, b)| a * b).sum();
    Ok(scale * cross / z2ss)
}

impl Moran {
    /// Compute Moran's I of `y` under `w`
    ///
    /// `permutations` random relabellings build the reference distribution;
    /// permutation `k` draws from a generator seeded with `seed + k`, so the
    /// result does not depend on thread scheduling. Zero permutations skips
    /// the simulated statistics.
    pub fn new(y: &[f64], w: &SpatialWeights, permutations: usize, seed: u64) -> Result<Self> {
        let n = y.len();
        if n != w.n() {
            return Err(AnalysisError::statistics(format!(
                "{n} values for weights over {} observations",
                w.n()
            )));
        }
        if n < 4 {
            return Err(AnalysisError::statistics(format!(
                "Moran's I needs at least 4 observations, got {n}"
            )));
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::statistics("Moran's I input has missing values"));
        }

        let z = deviations(y);
        let z2ss: f64 = z.iter().map(|v| v * v).sum();
        if z2ss == 0.0 {
            return Err(AnalysisError::statistics("Moran's I input is constant"));
        }

        let nf = n as f64;
        let s0 = w.s0();
        let s1 = w.s1();
        let s2 = w.s2();
        let s02 = s0 * s0;
        let scale = nf / s0;

        let i = statistic(&z, w, scale, z2ss)?;
        let ei = -1.0 / (nf - 1.0);

        let vi_norm = (nf * nf * s1 - nf * s2 + 3.0 * s02) / ((nf - 1.0) * (nf + 1.0) * s02)
            - ei * ei;
        let se_i_norm = vi_norm.sqrt();

        let k = (z.iter().map(|v| v.powi(4)).sum::<f64>() / nf) / (z2ss / nf).powi(2);
        let a = nf * ((nf * nf - 3.0 * nf + 3.0) * s1 - nf * s2 + 3.0 * s02);
        let b = k * ((nf * nf - nf) * s1 - 2.0 * nf * s2 + 6.0 * s02);
        let vi_rand = (a - b) / ((nf - 1.0) * (nf - 2.0) * (nf - 3.0) * s02) - ei * ei;
        let se_i_rand = vi_rand.sqrt();

        let normal = standard_normal()?;
        let z_norm = (i - ei) / se_i_norm;
        let z_rand = (i - ei) / se_i_rand;

        let mut moran = Self {
            n,
            i,
            ei,
            vi_norm,
            se_i_norm,
            z_norm,
            p_norm: 2.0 * one_tailed(&normal, z_norm),
            vi_rand,
            se_i_rand,
            z_rand,
            p_rand: 2.0 * one_tailed(&normal, z_rand),
            permutations,
            p_sim: None,
            ei_sim: None,
            se_i_sim: None,
            vi_sim: None,
            z_sim: None,
            p_z_sim: None,
            sim: Vec::new(),
        };

        if permutations > 0 {
            moran.simulate(&z, w, scale, z2ss, seed, &normal)?;
        }
        Ok(moran)
    }

    fn simulate(
        &mut self,
        z: &[f64],
        w: &SpatialWeights,
        scale: f64,
        z2ss: f64,
        seed: u64,
        normal: &Normal,
    ) -> Result<()> {
        let pb = permutation_progress(self.permutations, "Moran permutations");
        let sim = (0..self.permutations)
            .into_par_iter()
            .progress_with(pb.clone())
            .map(|k| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(k as u64));
                let mut shuffled = z.to_vec();
                shuffled.shuffle(&mut rng);
                statistic(&shuffled, w, scale, z2ss)
            })
            .collect::<Result<Vec<f64>>>()?;
        finish_permutations(&pb, &format!("{} permutations drawn", self.permutations));

        let perms = self.permutations as f64;
        let mut larger = sim.iter().filter(|&&s| s >= self.i).count();
        if self.permutations - larger < larger {
            larger = self.permutations - larger;
        }
        let ei_sim = sim.iter().sum::<f64>() / perms;
        let vi_sim = sim.iter().map(|s| (s - ei_sim).powi(2)).sum::<f64>() / perms;
        let se_i_sim = vi_sim.sqrt();
        let z_sim = (self.i - ei_sim) / se_i_sim;

        self.p_sim = Some((larger as f64 + 1.0) / (perms + 1.0));
        self.ei_sim = Some(ei_sim);
        self.vi_sim = Some(vi_sim);
        self.se_i_sim = Some(se_i_sim);
        self.z_sim = Some(z_sim);
        self.p_z_sim = Some(one_tailed(normal, z_sim));
        self.sim = sim;
        Ok(())
    }
}

impl MoranScatter {
    /// Standardise `y` (population standard deviation) and lag it
    pub fn new(y: &[f64], w: &SpatialWeights) -> Result<Self> {
        let centred = deviations(y);
        let sd = (centred.iter().map(|v| v * v).sum::<f64>() / y.len() as f64).sqrt();
        if sd == 0.0 || !sd.is_finite() {
            return Err(AnalysisError::statistics("cannot standardise a constant series"));
        }
        let z: Vec<f64> = centred.iter().map(|v| v / sd).collect();
        let lag = w.lag(&z)?;
        let slope = z.iter().zip(&lag).map(|(a, b)| a * b).sum::<f64>()
            / z.iter().map(|v| v * v).sum::<f64>();
        Ok(Self { z, lag, slope })
    }
}
