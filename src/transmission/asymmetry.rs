//! Asymmetric price transmission between two markets.
//!
//! `Δy_t = c + β⁺ Δx⁺_{t−1} + β⁻ Δx⁻_{t−1} + ε_t` where `Δx⁺ = max(Δx, 0)`
//! and `Δx⁻ = min(Δx, 0)`. Unequal `β⁺` and `β⁻` mean increases and
//! decreases travel differently.

use faer::{Col, Mat};
use serde::Serialize;
use tracing::info;

use super::TransmissionError;
use crate::solvers::{FittedRegressor, OlsRegressor, Regressor};

#[derive(Debug, Clone, Serialize)]
pub struct AsymmetryResult {
    pub source: String,
    pub target: String,
    pub n_obs: usize,
    pub intercept: f64,
    pub beta_increase: f64,
    pub beta_decrease: f64,
    pub p_increase: f64,
    pub p_decrease: f64,
    pub shock: f64,
    /// Target response to a `+shock` change at the source.
    pub response_increase: f64,
    /// Target response to a `−shock` change at the source.
    pub response_decrease: f64,
}

impl AsymmetryResult {
    /// Increases pass through more strongly than decreases.
    pub fn rockets_and_feathers(&self) -> bool {
        self.response_increase.abs() > self.response_decrease.abs()
    }
}

pub fn asymmetric_transmission(
    source: (&str, &[f64]),
    target: (&str, &[f64]),
    shock: f64,
) -> Result<AsymmetryResult, TransmissionError> {
    let (source_name, x) = source;
    let (target_name, y) = target;
    if x.len() != y.len() {
        return Err(TransmissionError::LengthMismatch {
            expected: x.len(),
            got: y.len(),
        });
    }
    // Two differences are lost to Δ and the lag; three parameters remain.
    if x.len() < 6 {
        return Err(TransmissionError::InsufficientObservations {
            needed: 6,
            got: x.len(),
        });
    }

    let dx: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let dy: Vec<f64> = y.windows(2).map(|w| w[1] - w[0]).collect();
    let n = dy.len() - 1;
    let design = Mat::from_fn(n, 2, |i, j| {
        let d = dx[i];
        if j == 0 {
            d.max(0.0)
        } else {
            d.min(0.0)
        }
    });
    let response = Col::from_fn(n, |i| dy[i + 1]);

    let fitted = OlsRegressor::builder()
        .with_intercept(true)
        .build()
        .fit(&design, &response)?;
    let result = fitted.result();
    let coef = |j: usize| {
        if result.aliased[j] {
            f64::NAN
        } else {
            result.coefficients[j]
        }
    };
    let p = |j: usize| result.p_values.as_ref().map_or(f64::NAN, |p| p[j]);

    let beta_increase = coef(0);
    let beta_decrease = coef(1);
    info!(
        source = source_name,
        target = target_name,
        beta_increase,
        beta_decrease,
        "asymmetric transmission"
    );

    Ok(AsymmetryResult {
        source: source_name.to_string(),
        target: target_name.to_string(),
        n_obs: n,
        intercept: result.intercept.unwrap_or(0.0),
        beta_increase,
        beta_decrease,
        p_increase: p(0),
        p_decrease: p(1),
        shock,
        response_increase: beta_increase * shock,
        response_decrease: beta_decrease * -shock,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovers_asymmetric_passthrough() {
        let n = 80;
        let x: Vec<f64> = (0..n)
            .scan(1000.0, |level, t| {
                *level += 25.0 * ((t as f64) * 0.9).sin();
                Some(*level)
            })
            .collect();
        let dx: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();

        let mut y = vec![500.0; n];
        for t in 2..n {
            let d = dx[t - 2];
            y[t] = y[t - 1] + 0.8 * d.max(0.0) + 0.3 * d.min(0.0);
        }

        let result =
            asymmetric_transmission(("source", &x), ("target", &y), 1000.0).expect("long series");
        assert!((result.beta_increase - 0.8).abs() < 1e-8);
        assert!((result.beta_decrease - 0.3).abs() < 1e-8);
        assert!((result.response_increase - 800.0).abs() < 1e-5);
        assert!((result.response_decrease + 300.0).abs() < 1e-5);
        assert!(result.rockets_and_feathers());
    }

    #[test]
    fn test_short_series() {
        let x = [1.0, 2.0, 3.0];
        assert!(matches!(
            asymmetric_transmission(("a", &x), ("b", &x), 1.0),
            Err(TransmissionError::InsufficientObservations { .. })
        ));
    }
}
