//! Bounded scalar minimisation (Brent's method with golden-section fallback).

use crate::error::{AnalysisError, Result};

/// Location and value of a minimum
#[derive(Debug, Clone, Copy)]
pub struct Minimum {
    pub x: f64,
    pub fx: f64,
    pub evaluations: usize,
    pub converged: bool,
}

const GOLDEN: f64 = 0.381_966_011_250_105_1;

/// Minimise `f` on `[lower, upper]`
///
/// Successive parabolic interpolation, falling back to golden-section steps
/// whenever the parabola is unreliable. Stops when the bracket has shrunk to
/// about `xatol` around the current best point or after `max_evaluations`.
pub fn minimize_bounded<F>(
    mut f: F,
    lower: f64,
    upper: f64,
    xatol: f64,
    max_evaluations: usize,
) -> Result<Minimum>
where
    F: FnMut(f64) -> Result<f64>,
{
    if !lower.is_finite() || !upper.is_finite() || lower >= upper {
        return Err(AnalysisError::statistics(format!(
            "invalid bounds [{lower}, {upper}]"
        )));
    }
    let sqrt_eps = f64::EPSILON.sqrt();
    let (mut a, mut b) = (lower, upper);

    let mut xf = a + GOLDEN * (b - a);
    let mut fx = f(xf)?;
    let (mut nfc, mut fnfc) = (xf, fx);
    let (mut fulc, mut ffulc) = (xf, fx);
    let (mut rat, mut e) = (0.0_f64, 0.0_f64);
    let mut evaluations = 1;

    let mut xm = 0.5 * (a + b);
    let mut tol1 = sqrt_eps * xf.abs() + xatol / 3.0;
    let mut tol2 = 2.0 * tol1;

    while (xf - xm).abs() > tol2 - 0.5 * (b - a) {
        if evaluations >= max_evaluations {
            return Ok(Minimum {
                x: xf,
                fx,
                evaluations,
                converged: false,
            });
        }

        let mut golden = true;
        if e.abs() > tol1 {
            golden = false;
            let mut r = (xf - nfc) * (fx - ffulc);
            let mut q = (xf - fulc) * (fx - fnfc);
            let mut p = (xf - fulc) * q - (xf - nfc) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            r = e;
            e = rat;

            if p.abs() < (0.5 * q * r).abs() && p > q * (a - xf) && p < q * (b - xf) {
                rat = p / q;
                let x = xf + rat;
                if (x - a) < tol2 || (b - x) < tol2 {
                    rat = tol1 * signum_or_one(xm - xf);
                }
            } else {
                golden = true;
            }
        }
        if golden {
            e = if xf >= xm { a - xf } else { b - xf };
            rat = GOLDEN * e;
        }

        let x = xf + signum_or_one(rat) * rat.abs().max(tol1);
        let fu = f(x)?;
        evaluations += 1;

        if fu <= fx {
            if x >= xf {
                a = xf;
            } else {
                b = xf;
            }
            (fulc, ffulc) = (nfc, fnfc);
            (nfc, fnfc) = (xf, fx);
            (xf, fx) = (x, fu);
        } else {
            if x < xf {
                a = x;
            } else {
                b = x;
            }
            if fu <= fnfc || nfc == xf {
                (fulc, ffulc) = (nfc, fnfc);
                (nfc, fnfc) = (x, fu);
            } else if fu <= ffulc || fulc == xf || fulc == nfc {
                (fulc, ffulc) = (x, fu);
            }
        }

        xm = 0.5 * (a + b);
        tol1 = sqrt_eps * xf.abs() + xatol / 3.0;
        tol2 = 2.0 * tol1;
    }

    Ok(Minimum {
        x: xf,
        fx,
        evaluations,
        converged: true,
    })
}

fn signum_or_one(v: f64) -> f64 {
    if v == 0.0 { 1.0 } else { v.signum() }
}
