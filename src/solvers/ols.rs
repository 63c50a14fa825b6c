//! Ordinary Least Squares regression solver.

use crate::core::{RegressionOptions, RegressionOptionsBuilder, RegressionResult};
use crate::inference::CoefficientInference;
use crate::solvers::traits::{linear_predict, FittedRegressor, RegressionError, Regressor};
use crate::utils::{center_columns, center_vector, detect_constant_columns};
use faer::{Col, Mat};
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

/// Ordinary Least Squares regression estimator.
///
/// Uses QR decomposition with column pivoting to handle rank-deficient matrices.
/// Aliased (collinear) coefficients are set to NaN. This is the auxiliary fit
/// behind the VIF, Breusch–Pagan, LM and ADF diagnostics.
///
/// # Example
///
/// ```rust,ignore
/// use spatial_price::solvers::{OlsRegressor, Regressor, FittedRegressor};
/// use faer::{Mat, Col};
///
/// let x = Mat::from_fn(100, 2, |i, j| (i + j) as f64);
/// let y = Col::from_fn(100, |i| 1.0 + 2.0 * i as f64);
///
/// let fitted = OlsRegressor::builder()
///     .with_intercept(true)
///     .build()
///     .fit(&x, &y)?;
///
/// println!("R² = {}", fitted.r_squared());
/// ```
#[derive(Debug, Clone)]
pub struct OlsRegressor {
    options: RegressionOptions,
}

impl OlsRegressor {
    /// Create a new OLS regressor with the given options.
    pub fn new(options: RegressionOptions) -> Self {
        Self { options }
    }

    /// Create a builder for configuring the regressor.
    pub fn builder() -> OlsRegressorBuilder {
        OlsRegressorBuilder::default()
    }
}

impl Regressor for OlsRegressor {
    type Fitted = FittedOls;

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

        let constant_cols = detect_constant_columns(x, self.options.rank_tolerance);

        let (coefficients, aliased, rank, intercept) = if self.options.with_intercept {
            let (x_centered, x_means) = center_columns(x);
            let (y_centered, y_mean) = center_vector(y);

            let (coefficients, aliased, rank) = solve_with_qr(
                &x_centered,
                &y_centered,
                &constant_cols,
                self.options.rank_tolerance,
            );

            // intercept = y_mean - x_means' * coefficients
            let mut intercept = y_mean;
            for j in 0..n_features {
                if !aliased[j] {
                    intercept -= x_means[j] * coefficients[j];
                }
            }
            (coefficients, aliased, rank, Some(intercept))
        } else {
            let all_zero =
                (0..n_features).all(|j| (0..n_samples).all(|i| x[(i, j)] == 0.0));
            if n_features > 0 && all_zero {
                return Err(RegressionError::AllFeaturesConstant);
            }
            // Without an intercept a constant column is a legitimate regressor.
            let no_constants = vec![false; n_features];
            let (coefficients, aliased, rank) =
                solve_with_qr(x, y, &no_constants, self.options.rank_tolerance);
            (coefficients, aliased, rank, None)
        };

        let n_params = rank + usize::from(intercept.is_some());
        if n_samples < n_params {
            return Err(RegressionError::InsufficientObservations {
                needed: n_params,
                got: n_samples,
            });
        }

        let mut result = RegressionResult::empty(n_features, n_samples);
        result.coefficients = coefficients;
        result.intercept = intercept;
        result.aliased = aliased;
        result.rank = rank;
        result.n_parameters = n_params;
        result.fitted_values = linear_predict(&result, x);
        result.residuals = Col::from_fn(n_samples, |i| y[i] - result.fitted_values[i]);

        fill_statistics(&mut result, y, None, &self.options);
        if self.options.compute_inference {
            fill_inference(&mut result, x, None, &self.options);
        }

        Ok(FittedOls {
            options: self.options.clone(),
            result,
        })
    }
}

/// Solve the least squares problem using QR decomposition with column pivoting.
///
/// Returns coefficients in original column order, the aliased mask and the
/// numerical rank.
pub(crate) fn solve_with_qr(
    x: &Mat<f64>,
    y: &Col<f64>,
    constant_cols: &[bool],
    rank_tolerance: f64,
) -> (Col<f64>, Vec<bool>, usize) {
    let n_features = x.ncols();
    let n_samples = x.nrows();

    let mut aliased = constant_cols.to_vec();
    if n_features == 0 {
        return (Col::zeros(0), aliased, 0);
    }

    let qr = x.col_piv_qr();
    let q = qr.compute_Q();
    let r = qr.R();
    let perm = qr.P();

    // perm_inv[j] = position of original column j in the pivoted factor
    let perm_inv = perm.arrays().1;

    let mut rank = 0;
    for i in 0..n_features.min(n_samples) {
        if r[(i, i)].abs() > rank_tolerance {
            rank += 1;
        } else {
            break;
        }
    }

    if rank == 0 {
        return (
            Col::from_fn(n_features, |_| f64::NAN),
            vec![true; n_features],
            0,
        );
    }

    for j in 0..n_features {
        if constant_cols[j] || perm_inv[j] >= rank {
            aliased[j] = true;
        }
    }

    // R * beta_perm = Q' * y, back-substitution on the leading block
    let qty = q.transpose() * y;
    let mut beta_reduced = Col::zeros(rank);
    for i in (0..rank).rev() {
        let mut sum = qty[i];
        for j in (i + 1)..rank {
            sum -= r[(i, j)] * beta_reduced[j];
        }
        beta_reduced[i] = sum / r[(i, i)];
    }

    let coefficients = Col::from_fn(n_features, |j| {
        if aliased[j] {
            f64::NAN
        } else {
            beta_reduced[perm_inv[j]]
        }
    });

    (coefficients, aliased, rank)
}

/// Fit statistics shared by the OLS and WLS solvers (weighted when `weights` is set).
pub(crate) fn fill_statistics(
    result: &mut RegressionResult,
    y: &Col<f64>,
    weights: Option<&Col<f64>>,
    options: &RegressionOptions,
) {
    let n = y.nrows();
    let w = |i: usize| weights.map_or(1.0, |w| w[i]);
    let sum_w: f64 = (0..n).map(w).sum();

    let y_mean = if result.intercept.is_some() {
        (0..n).map(|i| w(i) * y[i]).sum::<f64>() / sum_w
    } else {
        0.0
    };
    let tss: f64 = (0..n).map(|i| w(i) * (y[i] - y_mean).powi(2)).sum();
    let rss: f64 = (0..n).map(|i| w(i) * result.residuals[i].powi(2)).sum();

    let r_squared = if tss > 0.0 {
        (1.0 - rss / tss).clamp(0.0, 1.0)
    } else if rss < 1e-10 {
        1.0
    } else {
        0.0
    };

    let n_params = result.n_parameters;
    let df_total = (n - usize::from(result.intercept.is_some())) as f64;
    let df_resid = n.saturating_sub(n_params) as f64;
    let adj_r_squared = if df_resid > 0.0 && df_total > 0.0 {
        1.0 - (1.0 - r_squared) * df_total / df_resid
    } else {
        f64::NAN
    };

    let mse = if df_resid > 0.0 { rss / df_resid } else { f64::NAN };

    let df_model = result.model_df() as f64;
    let f_statistic = if df_model > 0.0 && df_resid > 0.0 && mse > 0.0 {
        ((tss - rss) / df_model) / mse
    } else {
        f64::NAN
    };
    let f_pvalue = if f_statistic.is_finite() {
        FisherSnedecor::new(df_model, df_resid)
            .ok()
            .map_or(f64::NAN, |d| 1.0 - d.cdf(f_statistic))
    } else {
        f64::NAN
    };

    // Gaussian log-likelihood at the ML variance estimate.
    let sigma2_ml = rss / n as f64;
    let log_likelihood = if sigma2_ml > 0.0 {
        -0.5 * n as f64 * (1.0 + (2.0 * std::f64::consts::PI).ln() + sigma2_ml.ln())
    } else {
        f64::NAN
    };
    let k = n_params as f64;

    result.r_squared = r_squared;
    result.adj_r_squared = adj_r_squared;
    result.mse = mse;
    result.rmse = mse.sqrt();
    result.f_statistic = f_statistic;
    result.f_pvalue = f_pvalue;
    result.log_likelihood = log_likelihood;
    result.aic = 2.0 * k - 2.0 * log_likelihood;
    result.bic = k * (n as f64).ln() - 2.0 * log_likelihood;
    result.confidence_level = options.confidence_level;
}

/// Standard errors, t statistics, p-values and confidence intervals.
pub(crate) fn fill_inference(
    result: &mut RegressionResult,
    x: &Mat<f64>,
    weights: Option<&Col<f64>>,
    options: &RegressionOptions,
) {
    let df = result.residual_df() as f64;
    if df <= 0.0 || !result.mse.is_finite() {
        return;
    }

    let Ok((se, se_int)) = CoefficientInference::standard_errors(
        x,
        weights,
        result.mse,
        &result.aliased,
        result.intercept.is_some(),
    ) else {
        // Failed to compute standard errors, leave as None
        return;
    };

    let t_stats = CoefficientInference::t_statistics(&result.coefficients, &se);
    let p_vals = CoefficientInference::p_values(&t_stats, df);
    let (ci_lower, ci_upper) = CoefficientInference::confidence_intervals(
        &result.coefficients,
        &se,
        df,
        options.confidence_level,
    );

    if let (Some(intercept), Some(se_int)) = (result.intercept, se_int) {
        let t_int = if se_int > 0.0 { intercept / se_int } else { f64::NAN };
        result.intercept_std_error = Some(se_int);
        result.intercept_p_value = StudentsT::new(0.0, 1.0, df)
            .ok()
            .filter(|_| t_int.is_finite())
            .map(|d| 2.0 * (1.0 - d.cdf(t_int.abs())));
    }

    result.std_errors = Some(se);
    result.t_statistics = Some(t_stats);
    result.p_values = Some(p_vals);
    result.conf_interval_lower = Some(ci_lower);
    result.conf_interval_upper = Some(ci_upper);
}

/// A fitted OLS regression model.
#[derive(Debug, Clone)]
pub struct FittedOls {
    options: RegressionOptions,
    result: RegressionResult,
}

impl FittedOls {
    /// Get the options used to fit this model.
    pub fn options(&self) -> &RegressionOptions {
        &self.options
    }

    /// Consume the fit and keep only the result.
    pub fn into_result(self) -> RegressionResult {
        self.result
    }
}

impl FittedRegressor for FittedOls {
    fn predict(&self, x: &Mat<f64>) -> Col<f64> {
        linear_predict(&self.result, x)
    }

    fn result(&self) -> &RegressionResult {
        &self.result
    }
}

/// Builder for `OlsRegressor`.
#[derive(Debug, Clone, Default)]
pub struct OlsRegressorBuilder {
    builder: RegressionOptionsBuilder,
}

impl OlsRegressorBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

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

    /// Set the confidence level for confidence intervals.
    pub fn confidence_level(mut self, level: f64) -> Self {
        self.builder = self.builder.confidence_level(level);
        self
    }

    /// Set the rank tolerance for QR decomposition.
    pub fn rank_tolerance(mut self, tol: f64) -> Self {
        self.builder = self.builder.rank_tolerance(tol);
        self
    }

    /// Build the OLS regressor.
    pub fn build(self) -> OlsRegressor {
        OlsRegressor::new(self.builder.build_unchecked())
    }
}
