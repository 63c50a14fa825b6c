//! Direct, indirect and total effects through the spatial multiplier.

use faer::Mat;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::solvers::SdmResult;
use crate::utils::{identity, invert, trace};
use crate::weights::SpatialWeights;

/// Significance level below which ρ is treated as distinguishable from zero.
pub const DEFAULT_RHO_SIGNIFICANCE: f64 = 0.05;

#[derive(Debug, Error)]
pub enum EffectsError {
    #[error("rho = {0} is outside (-1, 1); the spatial multiplier is undefined")]
    UnstableRho(f64),
    #[error("I - rho W is singular")]
    SingularMultiplier,
    #[error("covariate '{0}' is not in the fitted model")]
    UnknownCovariate(String),
    #[error("no baseline value for relative shock to '{0}'")]
    MissingBaseline(String),
    #[error("weight matrix order does not match the fitted model")]
    LocationMismatch,
}

/// `(I − ρW)⁻¹`; exactly the identity when ρ is zero.
pub fn spatial_multiplier(w: &Mat<f64>, rho: f64) -> Result<Mat<f64>, EffectsError> {
    if !rho.is_finite() || rho.abs() >= 1.0 {
        return Err(EffectsError::UnstableRho(rho));
    }
    let n = w.nrows();
    if rho == 0.0 {
        return Ok(identity(n));
    }
    let a = Mat::from_fn(n, n, |i, j| {
        f64::from(u8::from(i == j)) - rho * w[(i, j)]
    });
    invert(&a).ok_or(EffectsError::SingularMultiplier)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectsMethod {
    /// Averages of `S_k = M(β_k I + θ_k W)` (LeSage and Pace).
    #[default]
    Full,
    /// `direct = β`, `total = (β + θ) / (1 − ρ)`.
    Simple,
}

/// Direct and Durbin coefficient of one covariate.
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateCoefficients {
    pub name: String,
    pub beta: f64,
    pub theta: f64,
}

impl CovariateCoefficients {
    pub fn new(name: impl Into<String>, beta: f64, theta: f64) -> Self {
        Self {
            name: name.into(),
            beta,
            theta,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EffectRow {
    pub variable: String,
    pub beta: f64,
    pub theta: f64,
    pub direct: f64,
    pub indirect: f64,
    pub total: f64,
    /// False when ρ is not significant and the indirect part cannot be told
    /// apart from zero.
    pub indirect_identified: bool,
    pub method: EffectsMethod,
}

/// Own, spillover and total multiplier of one location.
#[derive(Debug, Clone, Serialize)]
pub struct MultiplierRow {
    pub location: String,
    pub own: f64,
    pub spillover: f64,
    pub total: f64,
}

/// Evaluates effects for one (ρ, W) pair.
#[derive(Debug, Clone)]
pub struct EffectsDecomposer<'a> {
    weights: &'a SpatialWeights,
    rho: f64,
    rho_p_value: f64,
    significance: f64,
    multiplier: Mat<f64>,
}

impl<'a> EffectsDecomposer<'a> {
    pub fn new(weights: &'a SpatialWeights, rho: f64, rho_p_value: f64) -> Result<Self, EffectsError> {
        let multiplier = spatial_multiplier(weights.matrix(), rho)?;
        debug!(rho, trace = trace(&multiplier), "computed spatial multiplier");
        Ok(Self {
            weights,
            rho,
            rho_p_value,
            significance: DEFAULT_RHO_SIGNIFICANCE,
            multiplier,
        })
    }

    /// Decomposer for a fitted model estimated with `weights`.
    pub fn from_result(weights: &'a SpatialWeights, result: &SdmResult) -> Result<Self, EffectsError> {
        if weights.locations() != result.locations() {
            return Err(EffectsError::LocationMismatch);
        }
        Self::new(weights, result.rho(), result.rho_p_value())
    }

    pub fn with_significance(mut self, level: f64) -> Self {
        self.significance = level;
        self
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn weights(&self) -> &SpatialWeights {
        self.weights
    }

    pub fn multiplier(&self) -> &Mat<f64> {
        &self.multiplier
    }

    pub fn rho_is_significant(&self) -> bool {
        self.rho_p_value < self.significance
    }

    /// `S = M(β I + θ W)`.
    pub fn impact_matrix(&self, beta: f64, theta: f64) -> Mat<f64> {
        let w = self.weights.matrix();
        let n = w.nrows();
        let inner = Mat::from_fn(n, n, |i, j| {
            let d = if i == j { beta } else { 0.0 };
            d + theta * w[(i, j)]
        });
        &self.multiplier * &inner
    }

    pub fn effect(&self, coef: &CovariateCoefficients, method: EffectsMethod) -> EffectRow {
        let (direct, total) = match method {
            EffectsMethod::Simple => (coef.beta, (coef.beta + coef.theta) / (1.0 - self.rho)),
            EffectsMethod::Full => {
                let s = self.impact_matrix(coef.beta, coef.theta);
                let n = s.nrows() as f64;
                let total: f64 = (0..s.nrows())
                    .map(|i| (0..s.ncols()).map(|j| s[(i, j)]).sum::<f64>())
                    .sum();
                (trace(&s) / n, total / n)
            }
        };
        EffectRow {
            variable: coef.name.clone(),
            beta: coef.beta,
            theta: coef.theta,
            direct,
            indirect: total - direct,
            total,
            indirect_identified: self.rho_is_significant(),
            method,
        }
    }

    pub fn decompose(&self, coefs: &[CovariateCoefficients], method: EffectsMethod) -> Vec<EffectRow> {
        if !self.rho_is_significant() {
            warn!(
                rho = self.rho,
                p_value = self.rho_p_value,
                "rho not significant, indirect effects are not distinguishable from zero"
            );
        }
        coefs.iter().map(|c| self.effect(c, method)).collect()
    }

    /// Effects of the named covariates of a fitted model. Aliased covariates
    /// are skipped.
    pub fn decompose_result(
        &self,
        result: &SdmResult,
        variables: &[String],
        method: EffectsMethod,
    ) -> Result<Vec<EffectRow>, EffectsError> {
        let coefs = coefficients_of(result, variables)?;
        Ok(self.decompose(&coefs, method))
    }

    /// Per-location summary of the multiplier.
    pub fn multiplier_summary(&self) -> Vec<MultiplierRow> {
        let m = &self.multiplier;
        self.weights
            .locations()
            .iter()
            .enumerate()
            .map(|(i, location)| {
                let total: f64 = (0..m.ncols()).map(|j| m[(i, j)]).sum();
                MultiplierRow {
                    location: location.clone(),
                    own: m[(i, i)],
                    spillover: total - m[(i, i)],
                    total,
                }
            })
            .collect()
    }
}

/// β and θ of the named covariates; aliased ones are dropped with a warning.
pub fn coefficients_of(
    result: &SdmResult,
    variables: &[String],
) -> Result<Vec<CovariateCoefficients>, EffectsError> {
    let mut out = Vec::with_capacity(variables.len());
    for name in variables {
        let beta = result
            .beta(name)
            .ok_or_else(|| EffectsError::UnknownCovariate(name.clone()))?;
        let theta = result.theta(name);
        if beta.is_nan() || theta.is_nan() {
            warn!(variable = %name, "skipping aliased covariate in effects");
            continue;
        }
        out.push(CovariateCoefficients::new(name.clone(), beta, theta));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(n: usize) -> SpatialWeights {
        let raw = Mat::from_fn(n, n, |i, j| {
            if (i + 1) % n == j || (j + 1) % n == i {
                1.0
            } else {
                0.0
            }
        });
        let names = (0..n).map(|i| format!("L{i}")).collect();
        SpatialWeights::from_raw(names, raw, crate::weights::WeightsKind::Custom)
            .expect("valid ring")
    }

    #[test]
    fn test_multiplier_identity_at_zero() {
        let w = ring(5);
        let m = spatial_multiplier(w.matrix(), 0.0).expect("rho in range");
        for i in 0..5 {
            for j in 0..5 {
                assert_eq!(m[(i, j)], if i == j { 1.0 } else { 0.0 });
            }
        }
    }

    #[test]
    fn test_multiplier_rejects_unit_rho() {
        let w = ring(4);
        assert!(matches!(
            spatial_multiplier(w.matrix(), 1.0),
            Err(EffectsError::UnstableRho(_))
        ));
    }

    #[test]
    fn test_full_matches_simple_total_for_row_stochastic() {
        let w = ring(6);
        let dec = EffectsDecomposer::new(&w, 0.4, 0.001).expect("rho in range");
        let coef = CovariateCoefficients::new("x", 2.0, 0.5);
        let full = dec.effect(&coef, EffectsMethod::Full);
        let simple = dec.effect(&coef, EffectsMethod::Simple);

        assert!((full.total - simple.total).abs() < 1e-10);
        assert!(full.direct > coef.beta);
        assert!(full.indirect_identified);
    }

    #[test]
    fn test_multiplier_summary_rows() {
        let w = ring(5);
        let dec = EffectsDecomposer::new(&w, 0.5, 0.2).expect("rho in range");
        for row in dec.multiplier_summary() {
            assert!((row.total - 2.0).abs() < 1e-10);
            assert!((row.own + row.spillover - row.total).abs() < 1e-12);
        }
        assert!(!dec.rho_is_significant());
    }
}
