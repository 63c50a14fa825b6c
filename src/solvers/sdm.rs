//! Spatial Durbin Model estimation.
//!
//! `y = ρ W y + X β + W X_d θ + ε` on a balanced panel stacked by location,
//! then period. The spatial lag acts period by period (`I_T ⊗ W`).
//!
//! Two estimators are available:
//!
//! - **GM**: spatial two-stage least squares with instruments
//!   `[1, X, W X_d, W² X_d, ...]`
//! - **ML**: concentrated likelihood maximised over ρ by Brent's method,
//!   covariance from the analytical information matrix
//!
//! The default strategy tries GM and falls back to ML when GM fails.

use faer::{Col, Mat};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::{EstimationStrategy, OptionsError, SdmOptions, SdmOptionsBuilder};
use crate::data::SpatialDesign;
use crate::inference::{normal_two_sided, significance_stars, CoefficientEstimate};
use crate::solvers::ols::solve_with_qr;
use crate::utils::{
    correlation, dot, frobenius_inner, hstack, invert, invert_symmetric, log_abs_det, trace,
};
use crate::weights::{apply_panel, SpatialWeights, WeightsError};

/// Name of the intercept in coefficient tables.
pub const CONSTANT: &str = "CONSTANT";
/// Name of the spatial autoregressive parameter.
pub const RHO: &str = "rho";
/// Prefix of spatially lagged covariates.
pub const LAG_PREFIX: &str = "W_";

/// Relative rank tolerance on unit-norm columns.
const ALIAS_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EstimationMethod {
    Gm,
    Ml,
}

impl fmt::Display for EstimationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimationMethod::Gm => write!(f, "GM"),
            EstimationMethod::Ml => write!(f, "ML"),
        }
    }
}

/// Why a single estimator gave up.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EstimationFailure {
    #[error("moment matrix is singular")]
    SingularMoments,
    #[error("rho = {0} is outside the unit interval")]
    UnstableRho(f64),
    #[error("non-finite {0}")]
    NonFinite(&'static str),
    #[error("{observations} observations cannot identify {parameters} parameters")]
    Underidentified {
        observations: usize,
        parameters: usize,
    },
}

#[derive(Debug, Error)]
pub enum SdmError {
    #[error("invalid options: {0}")]
    InvalidOptions(#[from] OptionsError),
    #[error("panel locations {panel:?} do not match weight matrix order {weights:?}")]
    LocationOrderMismatch {
        panel: Vec<String>,
        weights: Vec<String>,
    },
    #[error(transparent)]
    Weights(#[from] WeightsError),
    #[error("GM estimation failed: {0}")]
    Gm(EstimationFailure),
    #[error("ML estimation failed: {0}")]
    Ml(EstimationFailure),
    #[error("both estimators failed (GM: {gm}; ML: {ml})")]
    BothEstimatorsFailed {
        gm: EstimationFailure,
        ml: EstimationFailure,
    },
}

/// Lead time implied by the most significant rainfall lag.
#[derive(Debug, Clone, Serialize)]
pub struct EarlyWarning {
    pub variable: String,
    pub lag_months: usize,
    pub lead_days: usize,
    pub coefficient: f64,
    pub p_value: f64,
    pub significant: bool,
}

/// A fitted Spatial Durbin Model.
///
/// Coefficients are ordered `[CONSTANT, X..., W_X_d..., rho]`. Columns found
/// collinear before estimation are reported with `NaN`.
#[derive(Debug, Clone)]
pub struct SdmResult {
    method: EstimationMethod,
    names: Vec<String>,
    coefficients: Col<f64>,
    std_errors: Col<f64>,
    z_statistics: Col<f64>,
    p_values: Col<f64>,
    vcov: Mat<f64>,
    aliased: Vec<bool>,
    rho: f64,
    sigma2: f64,
    pseudo_r_squared: f64,
    log_likelihood: f64,
    aic: f64,
    bic: f64,
    rmse: f64,
    mape: f64,
    residuals: Col<f64>,
    fitted_values: Col<f64>,
    locations: Vec<String>,
    n_periods: usize,
    fallback_cause: Option<EstimationFailure>,
}

impl SdmResult {
    pub fn method(&self) -> EstimationMethod {
        self.method
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn coefficients(&self) -> &Col<f64> {
        &self.coefficients
    }

    pub fn std_errors(&self) -> &Col<f64> {
        &self.std_errors
    }

    pub fn z_statistics(&self) -> &Col<f64> {
        &self.z_statistics
    }

    pub fn p_values(&self) -> &Col<f64> {
        &self.p_values
    }

    /// Covariance of the coefficient vector, `NaN` for aliased terms.
    pub fn vcov(&self) -> &Mat<f64> {
        &self.vcov
    }

    pub fn aliased(&self) -> &[bool] {
        &self.aliased
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn rho_p_value(&self) -> f64 {
        self.p_values[self.names.len() - 1]
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    /// Squared correlation between observed and predicted values.
    pub fn pseudo_r_squared(&self) -> f64 {
        self.pseudo_r_squared
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn bic(&self) -> f64 {
        self.bic
    }

    pub fn rmse(&self) -> f64 {
        self.rmse
    }

    /// Mean absolute percentage error, in percent.
    pub fn mape(&self) -> f64 {
        self.mape
    }

    pub fn residuals(&self) -> &Col<f64> {
        &self.residuals
    }

    pub fn fitted_values(&self) -> &Col<f64> {
        &self.fitted_values
    }

    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn n_locations(&self) -> usize {
        self.locations.len()
    }

    pub fn n_periods(&self) -> usize {
        self.n_periods
    }

    pub fn n_observations(&self) -> usize {
        self.residuals.nrows()
    }

    /// GM failure that triggered the ML fallback, if any.
    pub fn fallback_cause(&self) -> Option<&EstimationFailure> {
        self.fallback_cause.as_ref()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn coefficient(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|j| self.coefficients[j])
    }

    pub fn p_value(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|j| self.p_values[j])
    }

    pub fn std_error(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|j| self.std_errors[j])
    }

    /// Direct coefficient β of a covariate; `NaN` when aliased.
    pub fn beta(&self, name: &str) -> Option<f64> {
        self.coefficient(name)
    }

    /// Durbin coefficient θ of a covariate; zero when it is not spatially
    /// lagged and `NaN` when aliased.
    pub fn theta(&self, name: &str) -> f64 {
        self.coefficient(&format!("{LAG_PREFIX}{name}"))
            .unwrap_or(0.0)
    }

    pub fn is_significant(&self, name: &str, level: f64) -> bool {
        self.p_value(name).is_some_and(|p| p < level)
    }

    pub fn coefficient_table(&self) -> Vec<CoefficientEstimate> {
        self.names
            .iter()
            .enumerate()
            .map(|(j, name)| CoefficientEstimate {
                name: name.clone(),
                estimate: self.coefficients[j],
                std_error: self.std_errors[j],
                z_statistic: self.z_statistics[j],
                p_value: self.p_values[j],
                stars: significance_stars(self.p_values[j]),
            })
            .collect()
    }

    /// Rainfall lag with the smallest p-value, translated to a lead time of
    /// 30 days per month of lag.
    pub fn early_warning(&self, lag_prefix: &str, level: f64) -> Option<EarlyWarning> {
        self.names
            .iter()
            .enumerate()
            .filter_map(|(j, name)| {
                let lag = name.strip_prefix(lag_prefix)?.parse::<usize>().ok()?;
                let p = self.p_values[j];
                (!p.is_nan()).then_some((j, lag, p))
            })
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(j, lag, p)| EarlyWarning {
                variable: self.names[j].clone(),
                lag_months: lag,
                lead_days: lag * 30,
                coefficient: self.coefficients[j],
                p_value: p,
                significant: p < level,
            })
    }
}

/// Matrices shared by both estimators.
struct SdmSystem {
    /// `[1, X, W X_d]` restricted to identified columns.
    z: Mat<f64>,
    /// Full-width column names and aliasing mask of `z`.
    names: Vec<String>,
    aliased: Vec<bool>,
    y: Col<f64>,
    wy: Col<f64>,
    /// Higher-order lags `W² X_d, ...` used as extra instruments.
    extra_instruments: Mat<f64>,
    w: Mat<f64>,
    locations: Vec<String>,
    n_periods: usize,
}

impl SdmSystem {
    fn n(&self) -> usize {
        self.y.nrows()
    }

    fn log_det(&self, rho: f64) -> f64 {
        let n = self.w.nrows();
        let a = Mat::from_fn(n, n, |i, j| {
            f64::from(u8::from(i == j)) - rho * self.w[(i, j)]
        });
        self.n_periods as f64 * log_abs_det(&a)
    }
}

/// Estimated parameters before they are expanded to full width.
struct Estimate {
    method: EstimationMethod,
    /// Coefficients on the identified columns of `z`, then ρ.
    delta: Col<f64>,
    /// Covariance of `delta`.
    vcov: Mat<f64>,
    sigma2: f64,
}

/// Spatial Durbin Model estimator.
///
/// # Example
///
/// ```rust,ignore
/// use spatial_price::solvers::SdmRegressor;
///
/// let design = panel.spatial_design()?;
/// let fit = SdmRegressor::builder().build().fit(&design, &weights)?;
/// println!("rho = {:.3} ({})", fit.rho(), fit.method());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SdmRegressor {
    options: SdmOptions,
}

impl SdmRegressor {
    pub fn new(options: SdmOptions) -> Self {
        Self { options }
    }

    pub fn builder() -> SdmRegressorBuilder {
        SdmRegressorBuilder::default()
    }

    pub fn options(&self) -> &SdmOptions {
        &self.options
    }

    /// Estimate the model following the configured strategy.
    pub fn fit(
        &self,
        design: &SpatialDesign,
        weights: &SpatialWeights,
    ) -> Result<SdmResult, SdmError> {
        self.options.validate()?;
        let system = self.prepare(design, weights)?;

        let result = match self.options.strategy {
            EstimationStrategy::GmOnly => {
                let est = self.gm(&system).map_err(SdmError::Gm)?;
                finish(&system, est, None)
            }
            EstimationStrategy::MlOnly => {
                let est = self.ml(&system).map_err(SdmError::Ml)?;
                finish(&system, est, None)
            }
            EstimationStrategy::GmWithMlFallback => match self.gm(&system) {
                Ok(est) => finish(&system, est, None),
                Err(gm) => {
                    warn!(cause = %gm, "GM estimation failed, retrying with ML");
                    match self.ml(&system) {
                        Ok(est) => finish(&system, est, Some(gm)),
                        Err(ml) => return Err(SdmError::BothEstimatorsFailed { gm, ml }),
                    }
                }
            },
        };

        info!(
            method = %result.method,
            rho = result.rho,
            pseudo_r2 = result.pseudo_r_squared,
            log_likelihood = result.log_likelihood,
            n = result.n_observations(),
            "fitted spatial Durbin model"
        );
        Ok(result)
    }

    fn prepare(
        &self,
        design: &SpatialDesign,
        weights: &SpatialWeights,
    ) -> Result<SdmSystem, SdmError> {
        if design.locations() != weights.locations() {
            return Err(SdmError::LocationOrderMismatch {
                panel: design.locations().to_vec(),
                weights: weights.locations().to_vec(),
            });
        }
        weights.validate()?;

        let t = design.n_periods();
        let n = design.n_obs();
        let x = design.x();
        let xd = design.durbin_block();
        let wxd = weights.panel_lag_matrix(&xd, t)?;
        let wy = weights.panel_lag(design.y(), t)?;

        let ones = Mat::from_fn(n, 1, |_, _| 1.0);
        let z_full = hstack(&[&ones, x, &wxd]);

        let mut names = Vec::with_capacity(z_full.ncols());
        names.push(CONSTANT.to_string());
        names.extend(design.names().iter().cloned());
        names.extend(
            design
                .durbin_names()
                .iter()
                .map(|d| format!("{LAG_PREFIX}{d}")),
        );

        let (_, aliased) = scaled_least_squares(&z_full, design.y());
        let dropped: Vec<&str> = names
            .iter()
            .zip(&aliased)
            .filter(|(_, &a)| a)
            .map(|(name, _)| name.as_str())
            .collect();
        if !dropped.is_empty() {
            warn!(columns = ?dropped, "collinear columns excluded from the SDM design");
        }

        let keep: Vec<usize> = (0..z_full.ncols()).filter(|&j| !aliased[j]).collect();
        let z = Mat::from_fn(n, keep.len(), |i, c| z_full[(i, keep[c])]);

        let mut lags = Vec::with_capacity(self.options.instrument_lags);
        let mut current = wxd;
        for _ in 0..self.options.instrument_lags {
            current = weights.panel_lag_matrix(&current, t)?;
            lags.push(current.clone());
        }
        let lag_refs: Vec<&Mat<f64>> = lags.iter().collect();
        let extra_instruments = if lag_refs.is_empty() {
            Mat::zeros(n, 0)
        } else {
            hstack(&lag_refs)
        };

        debug!(
            columns = z.ncols(),
            instruments = extra_instruments.ncols(),
            durbin = ?design.durbin_names(),
            "prepared SDM system"
        );

        Ok(SdmSystem {
            z,
            names,
            aliased,
            y: design.y().clone(),
            wy,
            extra_instruments,
            w: weights.matrix().clone(),
            locations: design.locations().to_vec(),
            n_periods: t,
        })
    }

    /// Spatial two-stage least squares.
    fn gm(&self, sys: &SdmSystem) -> Result<Estimate, EstimationFailure> {
        let n = sys.n();
        let p = sys.z.ncols() + 1;
        if n <= p {
            return Err(EstimationFailure::Underidentified {
                observations: n,
                parameters: p,
            });
        }

        // First stage: project W y on the instrument space.
        let h = hstack(&[&sys.z, &sys.extra_instruments]);
        let (gamma, h_aliased) = scaled_least_squares(&h, &sys.wy);
        let wy_hat = Col::from_fn(n, |i| {
            (0..h.ncols())
                .filter(|&j| !h_aliased[j])
                .map(|j| h[(i, j)] * gamma[j])
                .sum::<f64>()
        });

        // Second stage on [Z, Ŵy].
        let zf = Mat::from_fn(n, p, |i, j| if j < p - 1 { sys.z[(i, j)] } else { wy_hat[i] });
        let zfzf = zf.transpose() * &zf;
        let zfy = zf.transpose() * &sys.y;
        let inv = invert_symmetric(&zfzf).ok_or(EstimationFailure::SingularMoments)?;
        let delta = &inv * &zfy;

        let rho = delta[p - 1];
        if !rho.is_finite() {
            return Err(EstimationFailure::NonFinite("rho"));
        }
        if rho.abs() >= 1.0 {
            return Err(EstimationFailure::UnstableRho(rho));
        }

        // Structural residuals use the observed spatial lag.
        let u = structural_residuals(sys, &delta);
        let sigma2 = dot(&u, &u) / n as f64;
        if !sigma2.is_finite() {
            return Err(EstimationFailure::NonFinite("residual variance"));
        }

        Ok(Estimate {
            method: EstimationMethod::Gm,
            vcov: Mat::from_fn(p, p, |i, j| sigma2 * inv[(i, j)]),
            delta,
            sigma2,
        })
    }

    /// Concentrated maximum likelihood.
    fn ml(&self, sys: &SdmSystem) -> Result<Estimate, EstimationFailure> {
        let n = sys.n();
        let k = sys.z.ncols();
        if n <= k + 2 {
            return Err(EstimationFailure::Underidentified {
                observations: n,
                parameters: k + 2,
            });
        }

        let ztz = sys.z.transpose() * &sys.z;
        let ztz_inv = invert_symmetric(&ztz).ok_or(EstimationFailure::SingularMoments)?;
        let zty = sys.z.transpose() * &sys.y;
        let ztwy = sys.z.transpose() * &sys.wy;
        let b0 = &ztz_inv * &zty;
        let bl = &ztz_inv * &ztwy;
        let fit0 = &sys.z * &b0;
        let fitl = &sys.z * &bl;
        let e0 = Col::from_fn(n, |i| sys.y[i] - fit0[i]);
        let el = Col::from_fn(n, |i| sys.wy[i] - fitl[i]);

        let (e0e0, e0el, elel) = (dot(&e0, &e0), dot(&e0, &el), dot(&el, &el));
        let nf = n as f64;
        let neg_concentrated = |rho: f64| {
            let s2 = (e0e0 - 2.0 * rho * e0el + rho * rho * elel) / nf;
            0.5 * nf * s2.ln() - sys.log_det(rho)
        };

        let rho = brent_minimize(
            neg_concentrated,
            self.options.rho_lower,
            self.options.rho_upper,
            self.options.tolerance.max(f64::EPSILON.sqrt()),
            self.options.max_iterations,
        );
        if !rho.is_finite() {
            return Err(EstimationFailure::NonFinite("rho"));
        }
        if rho.abs() >= 1.0 {
            return Err(EstimationFailure::UnstableRho(rho));
        }

        let beta = Col::from_fn(k, |j| b0[j] - rho * bl[j]);
        let e = Col::from_fn(n, |i| e0[i] - rho * el[i]);
        let sigma2 = dot(&e, &e) / nf;
        if !(sigma2.is_finite() && sigma2 > 0.0) {
            return Err(EstimationFailure::NonFinite("residual variance"));
        }

        // Information matrix over (β, ρ, σ²).
        let n_loc = sys.w.nrows();
        let a = Mat::from_fn(n_loc, n_loc, |i, j| {
            f64::from(u8::from(i == j)) - rho * sys.w[(i, j)]
        });
        let a_inv = invert(&a).ok_or(EstimationFailure::SingularMoments)?;
        let b = &sys.w * &a_inv;
        let bb = &b * &b;
        let t = sys.n_periods as f64;

        let xb = &sys.z * &beta;
        let wa_xb = apply_panel(&b, &xb, sys.n_periods);
        let zt_waxb = sys.z.transpose() * &wa_xb;

        let size = k + 2;
        let mut info = Mat::zeros(size, size);
        for i in 0..k {
            for j in 0..k {
                info[(i, j)] = ztz[(i, j)] / sigma2;
            }
            info[(i, k)] = zt_waxb[i] / sigma2;
            info[(k, i)] = info[(i, k)];
        }
        info[(k, k)] = t * trace(&bb) + t * frobenius_inner(&b, &b) + dot(&wa_xb, &wa_xb) / sigma2;
        info[(k, k + 1)] = t * trace(&b) / sigma2;
        info[(k + 1, k)] = info[(k, k + 1)];
        info[(k + 1, k + 1)] = nf / (2.0 * sigma2 * sigma2);

        let cov = invert_symmetric(&info).ok_or(EstimationFailure::SingularMoments)?;
        let delta = Col::from_fn(k + 1, |j| if j < k { beta[j] } else { rho });

        Ok(Estimate {
            method: EstimationMethod::Ml,
            vcov: Mat::from_fn(k + 1, k + 1, |i, j| cov[(i, j)]),
            delta,
            sigma2,
        })
    }
}

/// `u = y − Z β − ρ W y` for `delta = [β, ρ]`.
fn structural_residuals(sys: &SdmSystem, delta: &Col<f64>) -> Col<f64> {
    let k = sys.z.ncols();
    let rho = delta[k];
    Col::from_fn(sys.n(), |i| {
        let xb: f64 = (0..k).map(|j| sys.z[(i, j)] * delta[j]).sum();
        sys.y[i] - xb - rho * sys.wy[i]
    })
}

/// Expand an estimate to full width and compute fit statistics.
fn finish(sys: &SdmSystem, est: Estimate, fallback_cause: Option<EstimationFailure>) -> SdmResult {
    let n = sys.n();
    let k_full = sys.names.len();
    let p = k_full + 1;

    // full index -> position in delta
    let mut position = vec![None; p];
    let mut next = 0;
    for (j, &a) in sys.aliased.iter().enumerate() {
        if !a {
            position[j] = Some(next);
            next += 1;
        }
    }
    position[k_full] = Some(next);

    let coefficients = Col::from_fn(p, |j| position[j].map_or(f64::NAN, |c| est.delta[c]));
    let vcov = Mat::from_fn(p, p, |i, j| match (position[i], position[j]) {
        (Some(a), Some(b)) => est.vcov[(a, b)],
        _ => f64::NAN,
    });
    let std_errors = Col::from_fn(p, |j| {
        let v = vcov[(j, j)];
        if v >= 0.0 {
            v.sqrt()
        } else {
            f64::NAN
        }
    });
    let z_statistics = Col::from_fn(p, |j| {
        if std_errors[j] > 0.0 {
            coefficients[j] / std_errors[j]
        } else {
            f64::NAN
        }
    });
    let p_values = Col::from_fn(p, |j| normal_two_sided(z_statistics[j]));

    let rho = est.delta[est.delta.nrows() - 1];
    let residuals = structural_residuals(sys, &est.delta);
    let fitted_values = Col::from_fn(n, |i| sys.y[i] - residuals[i]);

    let y: Vec<f64> = sys.y.iter().copied().collect();
    let yhat: Vec<f64> = fitted_values.iter().copied().collect();
    let r = correlation(&y, &yhat);
    let pseudo_r_squared = r * r;

    let nf = n as f64;
    let log_likelihood = -0.5 * nf * ((2.0 * std::f64::consts::PI).ln() + est.sigma2.ln() + 1.0)
        + sys.log_det(rho);
    let k = est.delta.nrows() as f64;
    let aic = -2.0 * log_likelihood + 2.0 * k;
    let bic = -2.0 * log_likelihood + k * nf.ln();

    let rmse = (residuals.iter().map(|u| u * u).sum::<f64>() / nf).sqrt();
    let mape = 100.0
        * (0..n)
            .filter(|&i| sys.y[i] != 0.0)
            .map(|i| (residuals[i] / sys.y[i]).abs())
            .sum::<f64>()
        / (0..n).filter(|&i| sys.y[i] != 0.0).count().max(1) as f64;

    let mut names = sys.names.clone();
    names.push(RHO.to_string());
    let mut aliased = sys.aliased.clone();
    aliased.push(false);

    SdmResult {
        method: est.method,
        names,
        coefficients,
        std_errors,
        z_statistics,
        p_values,
        vcov,
        aliased,
        rho,
        sigma2: est.sigma2,
        pseudo_r_squared,
        log_likelihood,
        aic,
        bic,
        rmse,
        mape,
        residuals,
        fitted_values,
        locations: sys.locations.clone(),
        n_periods: sys.n_periods,
        fallback_cause,
    }
}

/// Least squares on unit-norm columns. Returns coefficients on the original
/// scale (`NaN` where aliased) and the aliasing mask.
pub(crate) fn scaled_least_squares(a: &Mat<f64>, v: &Col<f64>) -> (Col<f64>, Vec<bool>) {
    let norms: Vec<f64> = (0..a.ncols())
        .map(|j| (0..a.nrows()).map(|i| a[(i, j)].powi(2)).sum::<f64>().sqrt())
        .collect();
    let degenerate: Vec<bool> = norms.iter().map(|s| !(s.is_finite() && *s > 0.0)).collect();
    let scaled = Mat::from_fn(a.nrows(), a.ncols(), |i, j| {
        if degenerate[j] {
            0.0
        } else {
            a[(i, j)] / norms[j]
        }
    });

    let (coef, aliased, _) = solve_with_qr(&scaled, v, &degenerate, ALIAS_TOLERANCE);
    let coef = Col::from_fn(a.ncols(), |j| {
        if aliased[j] {
            f64::NAN
        } else {
            coef[j] / norms[j]
        }
    });
    (coef, aliased)
}

/// Brent's bounded scalar minimisation.
fn brent_minimize<F: Fn(f64) -> f64>(f: F, lower: f64, upper: f64, tol: f64, max_iter: usize) -> f64 {
    const GOLDEN: f64 = 0.381_966_011_250_105_1;
    const ZEPS: f64 = 1e-12;

    let (mut a, mut b) = (lower, upper);
    let mut x = a + GOLDEN * (b - a);
    let (mut w, mut v) = (x, x);
    let mut fx = f(x);
    let (mut fw, mut fv) = (fx, fx);
    let (mut d, mut e) = (0.0_f64, 0.0_f64);

    for _ in 0..max_iter {
        let xm = 0.5 * (a + b);
        let tol1 = tol * x.abs() + ZEPS;
        let tol2 = 2.0 * tol1;
        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            break;
        }

        let mut golden = true;
        if e.abs() > tol1 {
            // Parabolic step through x, w, v.
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            let e_prev = e;
            e = d;
            if p.abs() < (0.5 * q * e_prev).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = tol1.copysign(xm - x);
                }
                golden = false;
            }
        }
        if golden {
            e = if x >= xm { a - x } else { b - x };
            d = GOLDEN * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else {
            x + tol1.copysign(d)
        };
        let fu = f(u);

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }
    x
}

/// Builder for [`SdmRegressor`].
#[derive(Debug, Clone, Default)]
pub struct SdmRegressorBuilder {
    options: SdmOptionsBuilder,
}

impl SdmRegressorBuilder {
    pub fn strategy(mut self, strategy: EstimationStrategy) -> Self {
        self.options = self.options.strategy(strategy);
        self
    }

    pub fn rho_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.options = self.options.rho_bounds(lower, upper);
        self
    }

    pub fn tolerance(mut self, tol: f64) -> Self {
        self.options = self.options.tolerance(tol);
        self
    }

    pub fn max_iterations(mut self, max_iter: usize) -> Self {
        self.options = self.options.max_iterations(max_iter);
        self
    }

    pub fn instrument_lags(mut self, lags: usize) -> Self {
        self.options = self.options.instrument_lags(lags);
        self
    }

    /// Build the regressor; options are validated when fitting.
    pub fn build(self) -> SdmRegressor {
        SdmRegressor::new(self.options.build_unchecked())
    }
}
