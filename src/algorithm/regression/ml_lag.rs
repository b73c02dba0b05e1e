//! Spatial lag model `y = ρWy + Xβ + ε` estimated by maximum likelihood.
//!
//! The likelihood is concentrated on ρ: for fixed ρ the coefficients are
//! `b0 - ρ·b1`, where `b0` and `b1` regress `y` and `Wy` on `X`. The remaining
//! one-dimensional problem is minimised over `(-1, 1)`, the log-determinant of
//! `I - ρW` taken from a dense LU factorisation. Standard errors come from the
//! inverse of the full information matrix over `(β, ρ, σ²)`.

use std::f64::consts::PI;
use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

use super::optimize::minimize_bounded;
use super::{Coefficient, Design, squared_correlation, write_coefficients};
use crate::algorithm::weights::SpatialWeights;
use crate::error::{AnalysisError, Result};

const RHO_TOLERANCE: f64 = 1e-7;
const MAX_EVALUATIONS: usize = 500;

/// Fitted spatial lag model
#[derive(Debug, Clone, Serialize)]
pub struct MlLag {
    pub name_y: String,
    pub n: usize,
    /// Number of estimated coefficients including ρ
    pub k: usize,
    /// β followed by ρ, the latter named `W_<y>`
    pub coefficients: Vec<Coefficient>,
    pub rho: f64,
    #[serde(skip)]
    pub betas: DVector<f64>,
    /// Residuals against the naive prediction `Xβ + ρWy`
    #[serde(skip)]
    pub u: DVector<f64>,
    #[serde(skip)]
    pub predy: DVector<f64>,
    /// Reduced-form prediction `(I - ρW)⁻¹Xβ`
    #[serde(skip)]
    pub predy_e: DVector<f64>,
    /// Covariance of β and ρ
    #[serde(skip)]
    pub vm: DMatrix<f64>,
    /// `uᵀu / n`
    pub sig2: f64,
    pub sig2_std_err: f64,
    /// Squared correlation of `y` and `predy`
    pub pr2: f64,
    /// Squared correlation of `y` and `predy_e`
    pub pr2_e: f64,
    pub logll: f64,
    pub aic: f64,
    pub schwarz: f64,
    pub evaluations: usize,
}

/// `ln |det A|` via LU
fn log_abs_det(a: DMatrix<f64>) -> Result<f64> {
    let lu = a.lu();
    let u = lu.u();
    let mut total = 0.0;
    for pivot in u.diagonal().iter() {
        if *pivot == 0.0 {
            return Err(AnalysisError::statistics("I - ρW is singular"));
        }
        total += pivot.abs().ln();
    }
    Ok(total)
}

fn identity_minus(rho: f64, w: &DMatrix<f64>) -> DMatrix<f64> {
    let n = w.nrows();
    DMatrix::identity(n, n) - w * rho
}

impl MlLag {
    pub fn fit(design: &Design, weights: &SpatialWeights) -> Result<Self> {
        let n = design.n();
        let k = design.k();
        if weights.n() != n {
            return Err(AnalysisError::statistics(format!(
                "{n} observations with weights over {}",
                weights.n()
            )));
        }
        let nf = n as f64;
        let w = weights.to_dense();
        let x = &design.x;
        let y = &design.y;

        let wy = &w * y;
        let xtx = x.transpose() * x;
        let xtxi = design.xtx_inverse()?;
        let b0 = &xtxi * x.transpose() * y;
        let b1 = &xtxi * x.transpose() * &wy;
        let e0 = y - x * &b0;
        let e1 = &wy - x * &b1;

        let concentrated = |rho: f64| -> Result<f64> {
            let er = &e0 - &e1 * rho;
            let sig2 = er.dot(&er) / nf;
            Ok(nf / 2.0 * sig2.ln() - log_abs_det(identity_minus(rho, &w))?)
        };
        let optimum = minimize_bounded(concentrated, -1.0, 1.0, RHO_TOLERANCE, MAX_EVALUATIONS)?;
        if !optimum.converged {
            log::warn!(
                "ρ search stopped after {} evaluations without converging",
                optimum.evaluations
            );
        }
        let rho = optimum.x;
        let logll = -optimum.fx - nf / 2.0 * (2.0 * PI).ln() - nf / 2.0;

        let betas = &b0 - &b1 * rho;
        let xb = x * &betas;
        let predy = &xb + &wy * rho;
        let u = y - &predy;
        let sig2 = u.dot(&u) / nf;

        let a = identity_minus(rho, &w);
        let ai = a
            .try_inverse()
            .ok_or_else(|| AnalysisError::statistics("I - ρW is singular at the optimum"))?;
        let predy_e = &ai * &xb;
        let wai = &w * &ai;
        let tr1 = wai.trace();
        let tr2 = (&wai * &wai).trace();
        let tr3 = (wai.transpose() * &wai).trace();

        let wpredy = &w * &predy_e;
        let wpy_wpy = wpredy.dot(&wpredy);
        let x_wpy = x.transpose() * &wpredy;

        // Parameter order: β, ρ, σ²
        let dim = k + 2;
        let mut info = DMatrix::zeros(dim, dim);
        info.view_mut((0, 0), (k, k)).copy_from(&(&xtx / sig2));
        for j in 0..k {
            info[(j, k)] = x_wpy[j] / sig2;
            info[(k, j)] = x_wpy[j] / sig2;
        }
        info[(k, k)] = tr2 + tr3 + wpy_wpy / sig2;
        info[(k, k + 1)] = tr1 / sig2;
        info[(k + 1, k)] = tr1 / sig2;
        info[(k + 1, k + 1)] = nf / (2.0 * sig2 * sig2);

        let vm_full = info
            .try_inverse()
            .ok_or_else(|| AnalysisError::statistics("information matrix is singular"))?;
        let vm = vm_full.view((0, 0), (k + 1, k + 1)).into_owned();

        let normal =
            Normal::new(0.0, 1.0).map_err(|e| AnalysisError::statistics(e.to_string()))?;
        let estimates: Vec<f64> = betas.iter().copied().chain(std::iter::once(rho)).collect();
        let names = design
            .name_x
            .iter()
            .cloned()
            .chain(std::iter::once(format!("W_{}", design.name_y)));
        let coefficients = names
            .zip(&estimates)
            .enumerate()
            .map(|(j, (name, &estimate))| {
                let std_err = vm[(j, j)].sqrt();
                let z = estimate / std_err;
                Coefficient {
                    name,
                    estimate,
                    std_err,
                    statistic: z,
                    p_value: 2.0 * normal.sf(z.abs()),
                }
            })
            .collect();

        let params = (k + 1) as f64;
        log::debug!(
            "ML lag on {}: rho = {rho:.4} after {} evaluations",
            design.name_y,
            optimum.evaluations
        );

        Ok(Self {
            name_y: design.name_y.clone(),
            n,
            k: k + 1,
            coefficients,
            rho,
            pr2: squared_correlation(y, &predy),
            pr2_e: squared_correlation(y, &predy_e),
            betas,
            u,
            predy,
            predy_e,
            vm,
            sig2,
            sig2_std_err: vm_full[(k + 1, k + 1)].sqrt(),
            logll,
            aic: -2.0 * logll + 2.0 * params,
            schwarz: -2.0 * logll + params * nf.ln(),
            evaluations: optimum.evaluations,
        })
    }
}

impl fmt::Display for MlLag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "REGRESSION RESULTS: MAXIMUM LIKELIHOOD SPATIAL LAG")?;
        writeln!(f, "Dependent variable : {}", self.name_y)?;
        writeln!(f, "Observations       : {}", self.n)?;
        writeln!(f, "Coefficients       : {}", self.k)?;
        writeln!(f, "Pseudo R-squared   : {:.4}", self.pr2)?;
        writeln!(f, "Spatial pseudo R2  : {:.4}", self.pr2_e)?;
        writeln!(f, "Sigma-square ML    : {:.4}", self.sig2)?;
        writeln!(f, "Log likelihood     : {:.3}", self.logll)?;
        writeln!(
            f,
            "AIC / Schwarz      : {:.3} / {:.3}",
            self.aic, self.schwarz
        )?;
        write_coefficients(f, &self.coefficients, "z-Statistic")
    }
}
