//! Ordinary least squares.

use std::f64::consts::PI;
use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

use super::{Coefficient, Design, write_coefficients};
use crate::error::{AnalysisError, Result};

/// Fitted OLS model
#[derive(Debug, Clone, Serialize)]
pub struct Ols {
    pub name_y: String,
    pub n: usize,
    pub k: usize,
    pub coefficients: Vec<Coefficient>,
    #[serde(skip)]
    pub betas: DVector<f64>,
    #[serde(skip)]
    pub u: DVector<f64>,
    #[serde(skip)]
    pub predy: DVector<f64>,
    #[serde(skip)]
    pub vm: DMatrix<f64>,
    /// `uᵀu / (n - k)`
    pub sig2: f64,
    pub r2: f64,
    pub ar2: f64,
    pub f_stat: f64,
    pub f_p_value: f64,
    pub logll: f64,
    pub aic: f64,
    pub schwarz: f64,
}

impl Ols {
    pub fn fit(design: &Design) -> Result<Self> {
        let n = design.n();
        let k = design.k();
        let nf = n as f64;
        let df = (n - k) as f64;

        let xtxi = design.xtx_inverse()?;
        let betas = &xtxi * design.x.transpose() * &design.y;
        let predy = &design.x * &betas;
        let u = &design.y - &predy;

        let utu = u.dot(&u);
        let sig2 = utu / df;
        let vm = &xtxi * sig2;

        let ybar = design.y.mean();
        let tss: f64 = design.y.iter().map(|v| (v - ybar).powi(2)).sum();
        let r2 = 1.0 - utu / tss;
        let ar2 = 1.0 - (1.0 - r2) * (nf - 1.0) / df;

        let t_dist =
            StudentsT::new(0.0, 1.0, df).map_err(|e| AnalysisError::statistics(e.to_string()))?;
        let coefficients = design
            .name_x
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let std_err = vm[(j, j)].sqrt();
                let t = betas[j] / std_err;
                Coefficient {
                    name: name.clone(),
                    estimate: betas[j],
                    std_err,
                    statistic: t,
                    p_value: 2.0 * t_dist.sf(t.abs()),
                }
            })
            .collect();

        let (f_stat, f_p_value) = if k > 1 {
            let f_stat = (r2 / (k - 1) as f64) / ((1.0 - r2) / df);
            let f_dist = FisherSnedecor::new((k - 1) as f64, df)
                .map_err(|e| AnalysisError::statistics(e.to_string()))?;
            (f_stat, f_dist.sf(f_stat))
        } else {
            (f64::NAN, f64::NAN)
        };

        let logll = -0.5 * nf * ((2.0 * PI).ln() + 1.0) - 0.5 * nf * (utu / nf).ln();
        let kf = k as f64;

        log::debug!("OLS on {} with {k} coefficients: R2 = {r2:.4}", design.name_y);

        Ok(Self {
            name_y: design.name_y.clone(),
            n,
            k,
            coefficients,
            betas,
            u,
            predy,
            vm,
            sig2,
            r2,
            ar2,
            f_stat,
            f_p_value,
            logll,
            aic: -2.0 * logll + 2.0 * kf,
            schwarz: -2.0 * logll + kf * nf.ln(),
        })
    }

    /// Residuals as a plain vector
    #[must_use]
    pub fn residuals(&self) -> Vec<f64> {
        self.u.iter().copied().collect()
    }
}

impl fmt::Display for Ols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "REGRESSION RESULTS: ORDINARY LEAST SQUARES")?;
        writeln!(f, "Dependent variable : {}", self.name_y)?;
        writeln!(f, "Observations       : {}", self.n)?;
        writeln!(f, "Coefficients       : {}", self.k)?;
        writeln!(f, "R-squared          : {:.4}", self.r2)?;
        writeln!(f, "Adjusted R-squared : {:.4}", self.ar2)?;
        writeln!(f, "Sigma-square       : {:.4}", self.sig2)?;
        writeln!(
            f,
            "F-statistic        : {:.4} (p = {:.4e})",
            self.f_stat, self.f_p_value
        )?;
        writeln!(f, "Log likelihood     : {:.3}", self.logll)?;
        writeln!(
            f,
            "AIC / Schwarz      : {:.3} / {:.3}",
            self.aic, self.schwarz
        )?;
        write_coefficients(f, &self.coefficients, "t-Statistic")
    }
}
