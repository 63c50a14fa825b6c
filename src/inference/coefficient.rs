//! Coefficient inference calculations.

use crate::utils::invert_symmetric;
use faer::{Col, Mat};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Computes inference statistics for regression coefficients.
pub struct CoefficientInference;

impl CoefficientInference {
    /// Standard errors from `mse * (X_a' W X_a)⁻¹`.
    ///
    /// `X_a` is `[1 | X]` when `with_intercept` is set and only keeps the
    /// non-aliased columns; aliased coefficients get `NaN`. `weights` of `None`
    /// means unit weights.
    ///
    /// Returns (coefficient_SE, intercept_SE).
    pub fn standard_errors(
        x: &Mat<f64>,
        weights: Option<&Col<f64>>,
        mse: f64,
        aliased: &[bool],
        with_intercept: bool,
    ) -> Result<(Col<f64>, Option<f64>), &'static str> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let offset = usize::from(with_intercept);

        let active: Vec<usize> = (0..n_features).filter(|&j| !aliased[j]).collect();
        let size = active.len() + offset;
        if size == 0 {
            return Err("all features are aliased");
        }

        let value = |i: usize, c: usize| -> f64 {
            if with_intercept && c == 0 {
                1.0
            } else {
                x[(i, active[c - offset])]
            }
        };

        let mut xtwx: Mat<f64> = Mat::zeros(size, size);
        for i in 0..n_samples {
            let w = weights.map_or(1.0, |w| w[i]);
            for a in 0..size {
                let va = value(i, a);
                for b in a..size {
                    xtwx[(a, b)] += w * va * value(i, b);
                }
            }
        }
        for a in 0..size {
            for b in 0..a {
                xtwx[(a, b)] = xtwx[(b, a)];
            }
        }

        let inv = invert_symmetric(&xtwx).ok_or("cross-product matrix is singular")?;

        let se_of = |c: usize| {
            let var = mse * inv[(c, c)];
            if var >= 0.0 {
                var.sqrt()
            } else {
                f64::NAN
            }
        };

        let mut se = Col::from_fn(n_features, |_| f64::NAN);
        for (c, &j) in active.iter().enumerate() {
            se[j] = se_of(c + offset);
        }
        let se_intercept = with_intercept.then(|| se_of(0));

        Ok((se, se_intercept))
    }

    /// Compute t-statistics for coefficients.
    ///
    /// t_j = β_j / SE(β_j)
    pub fn t_statistics(coefficients: &Col<f64>, std_errors: &Col<f64>) -> Col<f64> {
        Col::from_fn(coefficients.nrows(), |j| {
            if std_errors[j].is_nan() || std_errors[j] == 0.0 {
                f64::NAN
            } else {
                coefficients[j] / std_errors[j]
            }
        })
    }

    /// Two-sided p-values from Student t statistics.
    ///
    /// p_j = 2 * P(|T| > |t_j|) where T ~ t(df)
    pub fn p_values(t_statistics: &Col<f64>, df: f64) -> Col<f64> {
        let n = t_statistics.nrows();
        let t_dist = match StudentsT::new(0.0, 1.0, df) {
            Ok(d) if df > 0.0 => d,
            _ => return Col::from_fn(n, |_| f64::NAN),
        };

        Col::from_fn(n, |j| {
            let t = t_statistics[j];
            if t.is_nan() {
                f64::NAN
            } else {
                2.0 * (1.0 - t_dist.cdf(t.abs()))
            }
        })
    }

    /// Two-sided p-values from asymptotically normal z statistics.
    pub fn normal_p_values(z_statistics: &Col<f64>) -> Col<f64> {
        Col::from_fn(z_statistics.nrows(), |j| normal_two_sided(z_statistics[j]))
    }

    /// Compute confidence intervals for coefficients.
    ///
    /// CI_j = β_j ± t_{α/2, df} * SE(β_j)
    pub fn confidence_intervals(
        coefficients: &Col<f64>,
        std_errors: &Col<f64>,
        df: f64,
        confidence_level: f64,
    ) -> (Col<f64>, Col<f64>) {
        let n = coefficients.nrows();
        let t_crit = match StudentsT::new(0.0, 1.0, df) {
            Ok(d) if df > 0.0 => d.inverse_cdf(1.0 - (1.0 - confidence_level) / 2.0),
            _ => f64::NAN,
        };

        let lower = Col::from_fn(n, |j| coefficients[j] - t_crit * std_errors[j]);
        let upper = Col::from_fn(n, |j| coefficients[j] + t_crit * std_errors[j]);
        (lower, upper)
    }
}

/// Two-sided standard-normal p-value, `NaN` in, `NaN` out.
pub fn normal_two_sided(z: f64) -> f64 {
    if !z.is_finite() {
        return if z.is_nan() { f64::NAN } else { 0.0 };
    }
    match Normal::new(0.0, 1.0) {
        Ok(n) => 2.0 * (1.0 - n.cdf(z.abs())),
        Err(_) => f64::NAN,
    }
}

/// Conventional significance markers: `***` < 0.001, `**` < 0.01, `*` < 0.05.
pub fn significance_stars(p_value: f64) -> &'static str {
    if p_value < 0.001 {
        "***"
    } else if p_value < 0.01 {
        "**"
    } else if p_value < 0.05 {
        "*"
    } else {
        ""
    }
}

/// One row of a coefficient table.
#[derive(Debug, Clone, Serialize)]
pub struct CoefficientEstimate {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub z_statistic: f64,
    pub p_value: f64,
    pub stars: &'static str,
}

impl CoefficientEstimate {
    pub fn new(name: impl Into<String>, estimate: f64, std_error: f64) -> Self {
        let z = if std_error > 0.0 {
            estimate / std_error
        } else {
            f64::NAN
        };
        let p = normal_two_sided(z);
        Self {
            name: name.into(),
            estimate,
            std_error,
            z_statistic: z,
            p_value: p,
            stars: significance_stars(p),
        }
    }

    pub fn is_significant(&self, level: f64) -> bool {
        self.p_value < level
    }
}
