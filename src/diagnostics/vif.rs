//! Variance Inflation Factor (VIF) for multicollinearity detection.

use crate::solvers::{FittedRegressor, OlsRegressor, Regressor};
use faer::{Col, Mat};
use serde::Serialize;
use tracing::warn;

use super::DiagnosticsError;

/// Name of the intercept row in a VIF report.
pub const VIF_CONSTANT: &str = "const";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Multicollinearity {
    Low,
    Moderate,
    High,
}

impl Multicollinearity {
    /// `> 10` high, `> 5` moderate.
    pub fn classify(vif: f64) -> Self {
        if vif > 10.0 {
            Multicollinearity::High
        } else if vif > 5.0 {
            Multicollinearity::Moderate
        } else {
            Multicollinearity::Low
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VifRow {
    pub variable: String,
    pub vif: f64,
    pub tolerance: f64,
    pub level: Multicollinearity,
}

/// Compute Variance Inflation Factor for each predictor.
///
/// VIF_j = 1 / (1 - R²_j), where R²_j comes from regressing x_j on the
/// other predictors with an intercept.
///
/// # Interpretation
/// - VIF = 1: No correlation with other predictors
/// - VIF > 5: Moderate multicollinearity
/// - VIF > 10: High multicollinearity
pub fn variance_inflation_factor(x: &Mat<f64>) -> Col<f64> {
    let n = x.nrows();
    let p = x.ncols();

    if n < 3 || p < 2 {
        return Col::from_fn(p, |_| 1.0);
    }

    let model = OlsRegressor::builder()
        .with_intercept(true)
        .compute_inference(false)
        .build();

    Col::from_fn(p, |j| {
        let others: Vec<usize> = (0..p).filter(|&k| k != j).collect();
        let x_other = Mat::from_fn(n, p - 1, |i, c| x[(i, others[c])]);
        let y_j = Col::from_fn(n, |i| x[(i, j)]);

        match model.fit(&x_other, &y_j) {
            Ok(fitted) => inflation(fitted.r_squared()),
            // Regressing on nothing informative.
            Err(_) => 1.0,
        }
    })
}

/// Inflation of the intercept: `1 / (1 − R²)` with the uncentered R² of the
/// constant regressed on `x` without an intercept.
pub fn constant_vif(x: &Mat<f64>) -> f64 {
    let n = x.nrows();
    let ones = Col::from_fn(n, |_| 1.0);
    let model = OlsRegressor::builder()
        .with_intercept(false)
        .compute_inference(false)
        .build();
    match model.fit(x, &ones) {
        Ok(fitted) => {
            let rss = fitted.result().rss();
            inflation(1.0 - rss / n as f64)
        }
        Err(_) => 1.0,
    }
}

fn inflation(r_squared: f64) -> f64 {
    if r_squared < 1.0 - 1e-14 {
        (1.0 / (1.0 - r_squared)).max(1.0)
    } else {
        f64::INFINITY
    }
}

/// VIF table for `[const, x...]`.
pub fn vif_report(x: &Mat<f64>, names: &[String]) -> Result<Vec<VifRow>, DiagnosticsError> {
    if names.len() != x.ncols() {
        return Err(DiagnosticsError::DimensionMismatch {
            expected: x.ncols(),
            got: names.len(),
        });
    }
    if x.nrows() < x.ncols() + 2 {
        return Err(DiagnosticsError::InsufficientObservations {
            needed: x.ncols() + 2,
            got: x.nrows(),
        });
    }

    let vif = variance_inflation_factor(x);
    let row = |variable: &str, v: f64| VifRow {
        variable: variable.to_string(),
        vif: v,
        tolerance: 1.0 / v,
        level: Multicollinearity::classify(v),
    };

    let mut rows = Vec::with_capacity(names.len() + 1);
    rows.push(row(VIF_CONSTANT, constant_vif(x)));
    for (j, name) in names.iter().enumerate() {
        rows.push(row(name, vif[j]));
    }

    let high: Vec<&str> = rows
        .iter()
        .skip(1)
        .filter(|r| r.level == Multicollinearity::High)
        .map(|r| r.variable.as_str())
        .collect();
    if !high.is_empty() {
        warn!(variables = ?high, "high multicollinearity (VIF > 10)");
    }
    Ok(rows)
}

/// Identify predictors with high multicollinearity.
///
/// Returns indices of predictors with VIF > threshold.
pub fn high_vif_predictors(vif: &Col<f64>, threshold: f64) -> Vec<usize> {
    vif.iter()
        .enumerate()
        .filter(|(_, &v)| v > threshold)
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vif_orthogonal_predictors() {
        let x = Mat::from_fn(100, 2, |i, j| {
            let t = i as f64 * 0.1;
            if j == 0 {
                t.sin()
            } else {
                t.cos()
            }
        });

        let vif = variance_inflation_factor(&x);

        assert!((vif[0] - 1.0).abs() < 0.5, "VIF[0] = {}", vif[0]);
        assert!((vif[1] - 1.0).abs() < 0.5, "VIF[1] = {}", vif[1]);
    }

    #[test]
    fn test_vif_near_duplicate() {
        let x = Mat::from_fn(100, 2, |i, j| {
            let t = i as f64;
            if j == 0 {
                t
            } else {
                t + 0.01 * t.sin()
            }
        });

        let vif = variance_inflation_factor(&x);
        assert!(vif[0] > 10.0, "VIF[0] = {}", vif[0]);
        assert!(vif[1] > 10.0, "VIF[1] = {}", vif[1]);
    }

    #[test]
    fn test_vif_minimum_is_one() {
        let x = Mat::from_fn(50, 3, |i, j| ((i + j * 17) as f64).sin());
        let vif = variance_inflation_factor(&x);
        for j in 0..vif.nrows() {
            assert!(vif[j] >= 1.0, "VIF[{}] = {}", j, vif[j]);
        }
    }

    #[test]
    fn test_report_includes_constant_and_levels() {
        let x = Mat::from_fn(60, 3, |i, j| {
            let t = i as f64;
            match j {
                0 => 100.0 + t,
                1 => (t * 0.7).sin(),
                _ => 100.0 + t * 1.001 + 0.05 * (t * 1.3).cos(),
            }
        });
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let rows = vif_report(&x, &names).expect("enough rows");

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].variable, VIF_CONSTANT);
        assert_eq!(rows[1].level, Multicollinearity::High);
        assert_eq!(rows[2].level, Multicollinearity::Low);
        assert!((rows[2].tolerance * rows[2].vif - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_classify_bands() {
        assert_eq!(Multicollinearity::classify(11.0), Multicollinearity::High);
        assert_eq!(Multicollinearity::classify(7.0), Multicollinearity::Moderate);
        assert_eq!(Multicollinearity::classify(5.0), Multicollinearity::Low);
    }
}
