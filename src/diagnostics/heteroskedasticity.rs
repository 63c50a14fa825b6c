//! Residual variance and normality tests.

use faer::{Col, Mat};
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};

use super::DiagnosticsError;
use crate::solvers::{FittedRegressor, OlsRegressor, Regressor};

#[derive(Debug, Clone, Serialize)]
pub struct BreuschPaganResult {
    pub statistic: f64,
    pub df: usize,
    pub p_value: f64,
    /// `p < 0.05`; robust standard errors are advisable.
    pub heteroskedastic: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct JarqueBeraResult {
    pub statistic: f64,
    pub p_value: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub normal: bool,
}

pub(crate) fn chi2_sf(statistic: f64, df: f64) -> f64 {
    if !statistic.is_finite() || df <= 0.0 {
        return f64::NAN;
    }
    ChiSquared::new(df).map_or(f64::NAN, |d| 1.0 - d.cdf(statistic))
}

/// Studentised Breusch–Pagan test: `n R²` of the squared residuals
/// regressed on `x` with an intercept, χ² with one degree of freedom per
/// identified regressor.
pub fn breusch_pagan(
    residuals: &Col<f64>,
    x: &Mat<f64>,
) -> Result<BreuschPaganResult, DiagnosticsError> {
    let n = residuals.nrows();
    if x.nrows() != n {
        return Err(DiagnosticsError::DimensionMismatch {
            expected: n,
            got: x.nrows(),
        });
    }
    let e2 = Col::from_fn(n, |i| residuals[i] * residuals[i]);
    let e2_mean = e2.iter().sum::<f64>() / n as f64;
    if e2.iter().all(|v| (v - e2_mean).abs() <= 1e-12 * e2_mean.abs().max(1.0)) {
        // Equal squared residuals carry no variance signal.
        return Ok(BreuschPaganResult {
            statistic: 0.0,
            df: x.ncols(),
            p_value: 1.0,
            heteroskedastic: false,
        });
    }
    let aux = OlsRegressor::builder()
        .with_intercept(true)
        .compute_inference(false)
        .build()
        .fit(x, &e2)?;

    let df = aux.result().rank;
    let statistic = n as f64 * aux.r_squared();
    let p_value = chi2_sf(statistic, df as f64);
    Ok(BreuschPaganResult {
        statistic,
        df,
        p_value,
        heteroskedastic: p_value < 0.05,
    })
}

/// Fit `y` on `x` by OLS and test its residuals.
pub fn breusch_pagan_ols(
    x: &Mat<f64>,
    y: &Col<f64>,
) -> Result<BreuschPaganResult, DiagnosticsError> {
    let fitted = OlsRegressor::builder()
        .with_intercept(true)
        .compute_inference(false)
        .build()
        .fit(x, y)?;
    breusch_pagan(fitted.residuals(), x)
}

/// Jarque–Bera normality test.
pub fn jarque_bera(values: &[f64]) -> Result<JarqueBeraResult, DiagnosticsError> {
    let n = values.len();
    if n < 4 {
        return Err(DiagnosticsError::InsufficientObservations { needed: 4, got: n });
    }
    let nf = n as f64;
    let mean = values.iter().sum::<f64>() / nf;
    let moment = |k: i32| values.iter().map(|v| (v - mean).powi(k)).sum::<f64>() / nf;
    let m2 = moment(2);
    if m2 <= 0.0 {
        return Err(DiagnosticsError::ConstantSeries("residuals".to_string()));
    }
    let skewness = moment(3) / m2.powf(1.5);
    let kurtosis = moment(4) / (m2 * m2);
    let statistic = nf / 6.0 * (skewness * skewness + (kurtosis - 3.0).powi(2) / 4.0);
    let p_value = chi2_sf(statistic, 2.0);

    Ok(JarqueBeraResult {
        statistic,
        p_value,
        skewness,
        kurtosis,
        normal: p_value >= 0.05,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bp_detects_variance_growth() {
        let n = 200;
        let x = Mat::from_fn(n, 1, |i, _| i as f64 / n as f64);
        let residuals = Col::from_fn(n, |i| {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            sign * (0.1 + 5.0 * x[(i, 0)])
        });

        let bp = breusch_pagan(&residuals, &x).expect("valid shapes");
        assert_eq!(bp.df, 1);
        assert!(bp.heteroskedastic, "p = {}", bp.p_value);
    }

    #[test]
    fn test_bp_constant_variance() {
        let n = 200;
        let x = Mat::from_fn(n, 1, |i, _| i as f64);
        let residuals = Col::from_fn(n, |i| if i % 2 == 0 { 1.0 } else { -1.0 });

        let bp = breusch_pagan(&residuals, &x).expect("valid shapes");
        assert!(bp.statistic.abs() < 1e-8);
        assert!(!bp.heteroskedastic);
    }

    #[test]
    fn test_jarque_bera_symmetric() {
        let values: Vec<f64> = (0..100).map(|i| ((i as f64) * 0.37).sin()).collect();
        let jb = jarque_bera(&values).expect("enough values");
        assert!(jb.skewness.abs() < 0.2);
        assert!(jb.statistic >= 0.0);
    }

    #[test]
    fn test_jarque_bera_skewed() {
        let values: Vec<f64> = (0..200).map(|i| ((i % 20) as f64).exp()).collect();
        let jb = jarque_bera(&values).expect("enough values");
        assert!(!jb.normal);
        assert!(jb.skewness > 1.0);
    }
}
