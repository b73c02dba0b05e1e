//! Linear regression models: OLS and the maximum-likelihood spatial lag model.

pub mod ml_lag;
pub mod ols;
pub mod optimize;

use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::error::{AnalysisError, Result};

pub use ml_lag::MlLag;
pub use ols::Ols;

/// Response and design matrix of a regression
///
/// The design matrix always starts with a constant column.
#[derive(Debug, Clone)]
pub struct Design {
    pub y: DVector<f64>,
    pub x: DMatrix<f64>,
    pub name_y: String,
    pub name_x: Vec<String>,
}

impl Design {
    /// Assemble a design from named covariates, adding the constant
    pub fn new(name_y: &str, y: &[f64], covariates: &[(&str, &[f64])]) -> Result<Self> {
        let n = y.len();
        let k = covariates.len() + 1;
        if let Some((name, _)) = covariates.iter().find(|(_, c)| c.len() != n) {
            return Err(AnalysisError::statistics(format!(
                "covariate {name} does not have {n} observations"
            )));
        }
        if n <= k {
            return Err(AnalysisError::statistics(format!(
                "{n} observations cannot identify {k} coefficients"
            )));
        }
        let all_finite = y
            .iter()
            .chain(covariates.iter().flat_map(|(_, c)| c.iter()))
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(AnalysisError::statistics(
                "regression input contains missing values",
            ));
        }

        let x = DMatrix::from_fn(n, k, |row, col| {
            if col == 0 { 1.0 } else { covariates[col - 1].1[row] }
        });
        let mut name_x = vec!["CONSTANT".to_string()];
        name_x.extend(covariates.iter().map(|(name, _)| (*name).to_string()));

        Ok(Self {
            y: DVector::from_column_slice(y),
            x,
            name_y: name_y.to_string(),
            name_x,
        })
    }

    #[must_use]
    pub fn n(&self) -> usize {
        self.x.nrows()
    }

    #[must_use]
    pub fn k(&self) -> usize {
        self.x.ncols()
    }

    /// `(XᵀX)⁻¹`, refusing (near) collinear designs
    pub fn xtx_inverse(&self) -> Result<DMatrix<f64>> {
        let xtx = self.x.transpose() * &self.x;
        let singular = xtx.singular_values();
        if singular.min() <= singular.max() * 1e-12 {
            return Err(AnalysisError::statistics("design matrix is singular"));
        }
        xtx.try_inverse()
            .ok_or_else(|| AnalysisError::statistics("design matrix is singular"))
    }
}

/// One row of a coefficient table
#[derive(Debug, Clone, Serialize)]
pub struct Coefficient {
    pub name: String,
    pub estimate: f64,
    pub std_err: f64,
    /// t statistic for OLS, z statistic for maximum likelihood
    pub statistic: f64,
    pub p_value: f64,
}

/// Squared Pearson correlation
pub(crate) fn squared_correlation(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    let ma = a.mean();
    let mb = b.mean();
    let (mut cov, mut va, mut vb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b.iter()) {
        cov += (x - ma) * (y - mb);
        va += (x - ma).powi(2);
        vb += (y - mb).powi(2);
    }
    cov * cov / (va * vb)
}

pub(crate) fn write_coefficients(
    f: &mut fmt::Formatter<'_>,
    coefficients: &[Coefficient],
    statistic: &str,
) -> fmt::Result {
    writeln!(
        f,
        "{:>18} {:>14} {:>14} {:>14} {:>12}",
        "Variable", "Coefficient", "Std.Error", statistic, "Probability"
    )?;
    for c in coefficients {
        writeln!(
            f,
            "{:>18} {:>14.7} {:>14.7} {:>14.7} {:>12.7}",
            c.name, c.estimate, c.std_err, c.statistic, c.p_value
        )?;
    }
    Ok(())
}
