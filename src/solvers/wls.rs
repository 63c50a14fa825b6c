//! Weighted Least Squares solver.

use crate::core::{RegressionOptions, RegressionOptionsBuilder, RegressionResult};
use crate::solvers::ols::{fill_inference, fill_statistics, solve_with_qr, OlsRegressor};
use crate::solvers::traits::{linear_predict, FittedRegressor, RegressionError, Regressor};
use crate::utils::detect_constant_columns;
use faer::{Col, Mat};

/// Weighted Least Squares regression estimator.
///
/// Minimizes: Σ w_i (y_i - x_i'β)²
///
/// Used for the kernel-weighted local regressions; when all weights are equal
/// this reduces to OLS.
///
/// # Example
///
/// ```rust,ignore
/// use spatial_price::solvers::{WlsRegressor, Regressor, FittedRegressor};
///
/// let fitted = WlsRegressor::builder()
///     .with_intercept(true)
///     .weights(kernel_weights)
///     .build()
///     .fit(&x, &y)?;
/// ```
#[derive(Debug, Clone)]
pub struct WlsRegressor {
    options: RegressionOptions,
    weights: Option<Col<f64>>,
}

impl WlsRegressor {
    /// Create a new WLS regressor with the given options.
    pub fn new(options: RegressionOptions) -> Self {
        Self {
            options,
            weights: None,
        }
    }

    /// Set the observation weights.
    pub fn with_weights(mut self, weights: Col<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Create a builder for configuring the regressor.
    pub fn builder() -> WlsRegressorBuilder {
        WlsRegressorBuilder::default()
    }
}

impl Regressor for WlsRegressor {
    type Fitted = FittedWls;

    fn fit(&self, x: &Mat<f64>, y: &Col<f64>) -> Result<Self::Fitted, RegressionError> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if x.nrows() != y.nrows() {
            return Err(RegressionError::DimensionMismatch {
                x_rows: x.nrows(),
                y_len: y.nrows(),
            });
        }

        if n_samples < 2 {
            return Err(RegressionError::InsufficientObservations {
                needed: 2,
                got: n_samples,
            });
        }

        let weights = match &self.weights {
            Some(w) => {
                if w.nrows() != n_samples {
                    return Err(RegressionError::DimensionMismatch {
                        x_rows: n_samples,
                        y_len: w.nrows(),
                    });
                }
                if w.iter().any(|&wi| wi < 0.0 || !wi.is_finite()) {
                    return Err(RegressionError::InvalidWeights);
                }
                w.clone()
            }
            None => Col::from_fn(n_samples, |_| 1.0),
        };

        let weight_sum: f64 = weights.iter().sum();
        if weight_sum < 1e-14 {
            return Err(RegressionError::InvalidWeights);
        }

        let n_effective = weights.iter().filter(|&&w| w > 1e-14).count();
        let n_params = n_features + usize::from(self.options.with_intercept);
        if n_effective < n_params {
            return Err(RegressionError::InsufficientObservations {
                needed: n_params,
                got: n_effective,
            });
        }

        // Equal weights: delegate to OLS
        let first_weight = weights[0];
        if weights.iter().all(|&w| (w - first_weight).abs() < 1e-14) {
            let ols_fitted = OlsRegressor::new(self.options.clone()).fit(x, y)?;
            return Ok(FittedWls {
                weights,
                result: ols_fitted.into_result(),
            });
        }

        let sqrt_w = Col::from_fn(n_samples, |i| weights[i].sqrt());

        let (coefficients, aliased, rank, intercept) = if self.options.with_intercept {
            let (x_cw, y_cw, x_means, y_mean) = weighted_center(x, y, &weights);
            let constant_cols = detect_constant_columns(&x_cw, self.options.rank_tolerance);
            let (coefficients, aliased, rank) =
                solve_with_qr(&x_cw, &y_cw, &constant_cols, self.options.rank_tolerance);

            let mut intercept = y_mean;
            for j in 0..n_features {
                if !aliased[j] {
                    intercept -= x_means[j] * coefficients[j];
                }
            }
            (coefficients, aliased, rank, Some(intercept))
        } else {
            let x_w = Mat::from_fn(n_samples, n_features, |i, j| x[(i, j)] * sqrt_w[i]);
            let y_w = Col::from_fn(n_samples, |i| y[i] * sqrt_w[i]);
            let no_constants = vec![false; n_features];
            let (coefficients, aliased, rank) =
                solve_with_qr(&x_w, &y_w, &no_constants, self.options.rank_tolerance);
            (coefficients, aliased, rank, None)
        };

        let mut result = RegressionResult::empty(n_features, n_samples);
        result.coefficients = coefficients;
        result.intercept = intercept;
        result.aliased = aliased;
        result.rank = rank;
        result.n_parameters = rank + usize::from(intercept.is_some());
        result.fitted_values = linear_predict(&result, x);
        result.residuals = Col::from_fn(n_samples, |i| y[i] - result.fitted_values[i]);

        fill_statistics(&mut result, y, Some(&weights), &self.options);
        if self.options.compute_inference {
            fill_inference(&mut result, x, Some(&weights), &self.options);
        }

        Ok(FittedWls { weights, result })
    }
}

/// Weighted centering: returns `sqrt(w) * (x - x̄_w)`, `sqrt(w) * (y - ȳ_w)` and the weighted means.
fn weighted_center(
    x: &Mat<f64>,
    y: &Col<f64>,
    weights: &Col<f64>,
) -> (Mat<f64>, Col<f64>, Col<f64>, f64) {
    let n_samples = x.nrows();
    let sum_w: f64 = weights.iter().sum();

    let x_means = Col::from_fn(x.ncols(), |j| {
        (0..n_samples).map(|i| weights[i] * x[(i, j)]).sum::<f64>() / sum_w
    });
    let y_mean = (0..n_samples).map(|i| weights[i] * y[i]).sum::<f64>() / sum_w;

    let x_cw = Mat::from_fn(n_samples, x.ncols(), |i, j| {
        weights[i].sqrt() * (x[(i, j)] - x_means[j])
    });
    let y_cw = Col::from_fn(n_samples, |i| weights[i].sqrt() * (y[i] - y_mean));

    (x_cw, y_cw, x_means, y_mean)
}

/// A fitted WLS regression model.
#[derive(Debug, Clone)]
pub struct FittedWls {
    weights: Col<f64>,
    result: RegressionResult,
}

impl FittedWls {
    /// Get the weights used for fitting.
    pub fn weights(&self) -> &Col<f64> {
        &self.weights
    }
}

impl FittedRegressor for FittedWls {
    fn predict(&self, x: &Mat<f64>) -> Col<f64> {
        linear_predict(&self.result, x)
    }

    fn result(&self) -> &RegressionResult {
        &self.result
    }
}

/// Builder for `WlsRegressor`.
#[derive(Debug, Clone, Default)]
pub struct WlsRegressorBuilder {
    builder: RegressionOptionsBuilder,
    weights: Option<Col<f64>>,
}

impl WlsRegressorBuilder {
    /// Set whether to include an intercept term.
    pub fn with_intercept(mut self, include: bool) -> Self {
        self.builder = self.builder.with_intercept(include);
        self
    }

    /// Set whether to compute inference statistics.
    pub fn compute_inference(mut self, compute: bool) -> Self {
        self.builder = self.builder.compute_inference(compute);
        self
    }

    /// Set the observation weights.
    pub fn weights(mut self, weights: Col<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Build the WLS regressor.
    pub fn build(self) -> WlsRegressor {
        let mut regressor = WlsRegressor::new(self.builder.build_unchecked());
        regressor.weights = self.weights;
        regressor
    }
}
