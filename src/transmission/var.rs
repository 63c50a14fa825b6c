//! Vector autoregression, impulse responses and Granger causality.

use faer::{Col, Mat};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use tracing::{debug, info};

use super::TransmissionError;
use crate::diagnostics::chi2_sf;
use crate::solvers::{FittedRegressor, OlsRegressor, Regressor};
use crate::utils::log_abs_det;

/// Multivariate series, one column per variable.
#[derive(Debug, Clone)]
pub struct SeriesSet {
    names: Vec<String>,
    data: Mat<f64>,
}

impl SeriesSet {
    pub fn new(names: Vec<String>, series: &[Vec<f64>]) -> Result<Self, TransmissionError> {
        if names.len() != series.len() || series.is_empty() {
            return Err(TransmissionError::LengthMismatch {
                expected: names.len(),
                got: series.len(),
            });
        }
        let t = series[0].len();
        if let Some(bad) = series.iter().find(|s| s.len() != t) {
            return Err(TransmissionError::LengthMismatch {
                expected: t,
                got: bad.len(),
            });
        }
        Ok(Self {
            names,
            data: Mat::from_fn(t, series.len(), |i, j| series[j][i]),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_periods(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_variables(&self) -> usize {
        self.data.ncols()
    }

    /// Periods × variables.
    pub(crate) fn data(&self) -> &Mat<f64> {
        &self.data
    }

    /// One variable's values in time order.
    pub fn column(&self, name: &str) -> Result<Vec<f64>, TransmissionError> {
        let j = self.index_of(name)?;
        Ok((0..self.n_periods()).map(|i| self.data[(i, j)]).collect())
    }

    pub fn index_of(&self, name: &str) -> Result<usize, TransmissionError> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| TransmissionError::UnknownSeries(name.to_string()))
    }

    /// `[y_{t−1}, …, y_{t−p}]` for `t` in `start..T`.
    fn lagged(&self, columns: &[usize], lags: usize, start: usize) -> Mat<f64> {
        let rows = self.n_periods() - start;
        let k = columns.len();
        Mat::from_fn(rows, k * lags, |i, c| {
            let (l, j) = (c / k + 1, c % k);
            self.data[(start + i - l, columns[j])]
        })
    }

    fn target(&self, column: usize, start: usize) -> Col<f64> {
        Col::from_fn(self.n_periods() - start, |i| self.data[(start + i, column)])
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LagSelection {
    pub lag: usize,
    pub aic: f64,
}

/// Fitted VAR(p) with a constant.
#[derive(Debug, Clone)]
pub struct VarModel {
    names: Vec<String>,
    lag_order: usize,
    intercepts: Col<f64>,
    /// `A_l[i, j]`: effect of variable `j` at lag `l` on equation `i`.
    coefficients: Vec<Mat<f64>>,
    sigma: Mat<f64>,
    n_obs: usize,
    aic: f64,
    selection: Vec<LagSelection>,
}

struct EquationFits {
    intercepts: Col<f64>,
    coefficients: Vec<Mat<f64>>,
    residuals: Mat<f64>,
}

fn fit_equations(
    series: &SeriesSet,
    lags: usize,
    start: usize,
) -> Result<EquationFits, TransmissionError> {
    let k = series.n_variables();
    let all: Vec<usize> = (0..k).collect();
    let x = series.lagged(&all, lags, start);
    let nobs = x.nrows();
    let model = OlsRegressor::builder()
        .with_intercept(true)
        .compute_inference(false)
        .build();

    let mut intercepts = Col::zeros(k);
    let mut coefficients = vec![Mat::zeros(k, k); lags];
    let mut residuals = Mat::zeros(nobs, k);
    for i in 0..k {
        let fitted = model.fit(&x, &series.target(i, start))?;
        let result = fitted.result();
        if result.has_aliased() {
            return Err(TransmissionError::Singular("VAR equation"));
        }
        intercepts[i] = result.intercept.unwrap_or(0.0);
        for c in 0..k * lags {
            coefficients[c / k][(i, c % k)] = result.coefficients[c];
        }
        for r in 0..nobs {
            residuals[(r, i)] = result.residuals[r];
        }
    }
    Ok(EquationFits {
        intercepts,
        coefficients,
        residuals,
    })
}

fn mle_covariance(residuals: &Mat<f64>) -> Mat<f64> {
    let n = residuals.nrows() as f64;
    let k = residuals.ncols();
    Mat::from_fn(k, k, |a, b| {
        (0..residuals.nrows())
            .map(|r| residuals[(r, a)] * residuals[(r, b)])
            .sum::<f64>()
            / n
    })
}

/// `ln|Σ| + 2 (k²p + k) / T`.
fn information_criterion(residuals: &Mat<f64>, lags: usize) -> f64 {
    let k = residuals.ncols();
    let free = (k * k * lags + k) as f64;
    log_abs_det(&mle_covariance(residuals)) + 2.0 * free / residuals.nrows() as f64
}

impl VarModel {
    /// Pick `p ∈ 1..=max_lags` by AIC on the common sample, then refit.
    pub fn fit(series: &SeriesSet, max_lags: usize) -> Result<Self, TransmissionError> {
        let k = series.n_variables();
        let t = series.n_periods();
        if max_lags == 0 {
            return Err(TransmissionError::InvalidLag(0));
        }
        // Each equation needs more rows than its k·p + 1 parameters.
        let feasible = (1..=max_lags)
            .take_while(|&p| t > p + k * p + 1)
            .last()
            .ok_or(TransmissionError::InsufficientObservations {
                needed: max_lags + k + 2,
                got: t,
            })?;

        let mut selection = Vec::with_capacity(feasible);
        for p in 1..=feasible {
            let fits = fit_equations(series, p, feasible)?;
            let aic = information_criterion(&fits.residuals, p);
            debug!(lag = p, aic, "VAR lag candidate");
            selection.push(LagSelection { lag: p, aic });
        }
        let best = selection
            .iter()
            .filter(|s| s.aic.is_finite())
            .min_by(|a, b| a.aic.total_cmp(&b.aic))
            .map(|s| s.lag)
            .ok_or(TransmissionError::Singular("residual covariance"))?;

        Self::fit_order(series, best).map(|mut model| {
            model.selection = selection;
            model
        })
    }

    /// Fit a fixed lag order on the longest available sample.
    pub fn fit_order(series: &SeriesSet, lags: usize) -> Result<Self, TransmissionError> {
        let k = series.n_variables();
        let t = series.n_periods();
        if lags == 0 {
            return Err(TransmissionError::InvalidLag(0));
        }
        if t <= lags + k * lags + 1 {
            return Err(TransmissionError::InsufficientObservations {
                needed: lags + k * lags + 2,
                got: t,
            });
        }
        let fits = fit_equations(series, lags, lags)?;
        let sigma = mle_covariance(&fits.residuals);
        let aic = information_criterion(&fits.residuals, lags);
        info!(variables = k, lag_order = lags, aic, "fitted VAR");

        Ok(Self {
            names: series.names().to_vec(),
            lag_order: lags,
            intercepts: fits.intercepts,
            coefficients: fits.coefficients,
            sigma,
            n_obs: fits.residuals.nrows(),
            aic,
            selection: Vec::new(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn lag_order(&self) -> usize {
        self.lag_order
    }

    pub fn intercepts(&self) -> &Col<f64> {
        &self.intercepts
    }

    pub fn coefficient_matrices(&self) -> &[Mat<f64>] {
        &self.coefficients
    }

    pub fn sigma(&self) -> &Mat<f64> {
        &self.sigma
    }

    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn lag_selection(&self) -> &[LagSelection] {
        &self.selection
    }

    /// Non-orthogonalised MA coefficients `Φ_0 = I`,
    /// `Φ_h = Σ_{l=1}^{min(h,p)} Φ_{h−l} A_l`.
    pub fn impulse_responses(&self, horizon: usize) -> Vec<Mat<f64>> {
        let k = self.names.len();
        let mut phi: Vec<Mat<f64>> = Vec::with_capacity(horizon + 1);
        phi.push(Mat::from_fn(k, k, |i, j| if i == j { 1.0 } else { 0.0 }));
        for h in 1..=horizon {
            let mut acc = Mat::zeros(k, k);
            for l in 1..=h.min(self.lag_order) {
                let step = &phi[h - l] * &self.coefficients[l - 1];
                acc = &acc + &step;
            }
            phi.push(acc);
        }
        phi
    }

    /// Response of `response` to a unit shock in `impulse`, periods `0..=horizon`.
    pub fn impulse_response(
        &self,
        impulse: &str,
        response: &str,
        horizon: usize,
    ) -> Result<Vec<f64>, TransmissionError> {
        let position = |name: &str| {
            self.names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| TransmissionError::UnknownSeries(name.to_string()))
        };
        let (i, j) = (position(response)?, position(impulse)?);
        Ok(self
            .impulse_responses(horizon)
            .iter()
            .map(|phi| phi[(i, j)])
            .collect())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GrangerResult {
    pub cause: String,
    pub effect: String,
    pub lag: usize,
    pub n_obs: usize,
    /// SSR-based χ² statistic `n (SSR_r − SSR_u) / SSR_u`.
    pub chi2: f64,
    pub chi2_p_value: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
}

/// Does `cause` help predict `effect` beyond `effect`'s own `lag` lags?
pub fn granger_causality(
    series: &SeriesSet,
    cause: &str,
    effect: &str,
    lag: usize,
) -> Result<GrangerResult, TransmissionError> {
    if lag == 0 {
        return Err(TransmissionError::InvalidLag(0));
    }
    let c = series.index_of(cause)?;
    let e = series.index_of(effect)?;
    let t = series.n_periods();
    if t <= 3 * lag + 1 {
        return Err(TransmissionError::InsufficientObservations {
            needed: 3 * lag + 2,
            got: t,
        });
    }

    let model = OlsRegressor::builder()
        .with_intercept(true)
        .compute_inference(false)
        .build();
    let y = series.target(e, lag);
    let restricted = model.fit(&series.lagged(&[e], lag, lag), &y)?;
    let unrestricted = model.fit(&series.lagged(&[e, c], lag, lag), &y)?;

    let ssr_r = restricted.result().rss();
    let ssr_u = unrestricted.result().rss();
    if !(ssr_u > 0.0) {
        return Err(TransmissionError::Singular("unrestricted Granger regression"));
    }
    let nobs = y.nrows();
    let df_resid = (nobs - 2 * lag - 1) as f64;
    let chi2 = nobs as f64 * (ssr_r - ssr_u) / ssr_u;
    let f_statistic = (ssr_r - ssr_u) / lag as f64 / (ssr_u / df_resid);
    let f_p_value = FisherSnedecor::new(lag as f64, df_resid)
        .map_or(f64::NAN, |d| 1.0 - d.cdf(f_statistic.max(0.0)));

    Ok(GrangerResult {
        cause: cause.to_string(),
        effect: effect.to_string(),
        lag,
        n_obs: nobs,
        chi2,
        chi2_p_value: chi2_sf(chi2.max(0.0), lag as f64),
        f_statistic,
        f_p_value,
    })
}
