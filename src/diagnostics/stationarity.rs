//! Augmented Dickey–Fuller unit-root test with a constant.

use faer::{Col, Mat};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{debug, warn};

use super::DiagnosticsError;
use crate::solvers::{FittedRegressor, OlsRegressor, Regressor};

// MacKinnon (1994) response surface for one variable with a constant.
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

// MacKinnon (2010) finite-sample critical values, in powers of 1/n.
const CRIT_1: [f64; 4] = [-3.43035, -6.5393, -16.786, -79.433];
const CRIT_5: [f64; 4] = [-2.86154, -2.8903, -4.234, -40.04];
const CRIT_10: [f64; 4] = [-2.56677, -1.5384, -2.809, 0.0];

#[derive(Debug, Clone, Serialize)]
pub struct AdfResult {
    pub variable: String,
    pub statistic: f64,
    pub p_value: f64,
    pub used_lag: usize,
    pub n_obs: usize,
    pub critical_1pct: f64,
    pub critical_5pct: f64,
    pub critical_10pct: f64,
    /// `p < 0.05`.
    pub stationary: bool,
}

fn polyval(coef: &[f64], x: f64) -> f64 {
    coef.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Approximate p-value of an ADF statistic.
pub fn mackinnon_p_value(stat: f64) -> f64 {
    if stat > TAU_MAX {
        return 1.0;
    }
    if stat < TAU_MIN {
        return 0.0;
    }
    let z = if stat <= TAU_STAR {
        polyval(&TAU_SMALL_P, stat)
    } else {
        polyval(&TAU_LARGE_P, stat)
    };
    Normal::new(0.0, 1.0).map_or(f64::NAN, |d| d.cdf(z))
}

/// 1%, 5% and 10% critical values for a regression on `n_obs` rows.
pub fn mackinnon_critical_values(n_obs: usize) -> [f64; 3] {
    let inv = 1.0 / n_obs as f64;
    [
        polyval(&CRIT_1, inv),
        polyval(&CRIT_5, inv),
        polyval(&CRIT_10, inv),
    ]
}

/// Default maximum lag `⌈12 (n/100)^{1/4}⌉`.
pub fn schwert_max_lag(n: usize) -> usize {
    (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize
}

/// Test-regression pieces for a given number of lagged differences,
/// on the sample that leaves room for `sample_lag` lags.
fn lagged_design(x: &[f64], lags: usize, sample_lag: usize) -> (Mat<f64>, Col<f64>) {
    let diff: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let nobs = diff.len() - sample_lag;
    let y = Col::from_fn(nobs, |i| diff[sample_lag + i]);
    let design = Mat::from_fn(nobs, lags + 1, |i, j| {
        let t = sample_lag + i;
        if j == 0 {
            x[t]
        } else {
            diff[t - j]
        }
    });
    (design, y)
}

/// ADF test with a constant and AIC lag selection.
///
/// Lags `0..=max_lag` are compared on a common sample; the chosen
/// specification is then refit on the longest sample it allows.
pub fn adf_test(
    variable: &str,
    series: &[f64],
    max_lag: Option<usize>,
) -> Result<AdfResult, DiagnosticsError> {
    let n = series.len();
    let cap = (n / 2).saturating_sub(2);
    let max_lag = max_lag.unwrap_or_else(|| schwert_max_lag(n)).min(cap);
    if n < 6 || n - 1 <= max_lag + 3 {
        return Err(DiagnosticsError::InsufficientObservations {
            needed: max_lag + 5,
            got: n,
        });
    }
    if series.iter().all(|v| (v - series[0]).abs() < 1e-12) {
        return Err(DiagnosticsError::ConstantSeries(variable.to_string()));
    }

    let model = OlsRegressor::builder()
        .with_intercept(true)
        .compute_inference(false)
        .build();

    let (full, y_common) = lagged_design(series, max_lag, max_lag);
    let mut best = (f64::INFINITY, 0usize);
    for lag in 0..=max_lag {
        let design = Mat::from_fn(full.nrows(), lag + 1, |i, j| full[(i, j)]);
        let fitted = model.fit(&design, &y_common)?;
        let aic = fitted.result().aic;
        if aic < best.0 {
            best = (aic, lag);
        }
    }
    let used_lag = best.1;

    let (design, y) = lagged_design(series, used_lag, used_lag);
    let fitted = OlsRegressor::builder()
        .with_intercept(true)
        .build()
        .fit(&design, &y)?;
    let statistic = fitted
        .result()
        .t_statistics
        .as_ref()
        .map_or(f64::NAN, |t| t[0]);
    if !statistic.is_finite() {
        return Err(DiagnosticsError::ConstantSeries(variable.to_string()));
    }

    let n_obs = y.nrows();
    let p_value = mackinnon_p_value(statistic);
    let [c1, c5, c10] = mackinnon_critical_values(n_obs);
    let stationary = p_value < 0.05;

    debug!(variable, statistic, p_value, used_lag, "ADF test");
    if !stationary {
        warn!(variable, p_value, "series looks non-stationary");
    }

    Ok(AdfResult {
        variable: variable.to_string(),
        statistic,
        p_value,
        used_lag,
        n_obs,
        critical_1pct: c1,
        critical_5pct: c5,
        critical_10pct: c10,
        stationary,
    })
}
