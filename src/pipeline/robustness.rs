//! Re-estimation of the spatial model under alternative weight matrices.

use serde::Serialize;
use tracing::{info, warn};

use crate::data::SpatialDesign;
use crate::solvers::{EstimationMethod, SdmRegressor, SdmResult};
use crate::utils::{mean, std_dev};
use crate::weights::{SpatialWeights, WeightsBuilder, WeightsSpec, WeightsSummary};

#[derive(Debug, Clone, Serialize)]
pub struct RobustnessRow {
    pub weights: String,
    pub method: EstimationMethod,
    pub rho: f64,
    pub rho_p_value: f64,
    pub focus_coefficient: f64,
    pub focus_p_value: f64,
    pub pseudo_r_squared: f64,
    pub aic: f64,
}

impl RobustnessRow {
    pub fn from_result(weights: &str, result: &SdmResult, focus: &str) -> Self {
        Self {
            weights: weights.to_string(),
            method: result.method(),
            rho: result.rho(),
            rho_p_value: result.rho_p_value(),
            focus_coefficient: result.coefficient(focus).unwrap_or(f64::NAN),
            focus_p_value: result.p_value(focus).unwrap_or(f64::NAN),
            pseudo_r_squared: result.pseudo_r_squared(),
            aic: result.aic(),
        }
    }
}

/// A specification that produced no estimate.
#[derive(Debug, Clone, Serialize)]
pub struct RobustnessFailure {
    pub weights: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RobustnessSummary {
    pub focus: String,
    pub rows: Vec<RobustnessRow>,
    pub failures: Vec<RobustnessFailure>,
    pub rho_cv: f64,
    pub focus_cv: f64,
    pub r_squared_cv: f64,
}

impl RobustnessSummary {
    /// ρ varies by less than `threshold` (as a coefficient of variation).
    pub fn rho_is_stable(&self, threshold: f64) -> bool {
        self.rho_cv.is_finite() && self.rho_cv < threshold
    }
}

/// `sd / |mean|` over the finite values; `NaN` with fewer than two.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return f64::NAN;
    }
    let m = mean(&finite);
    if m == 0.0 {
        return f64::NAN;
    }
    std_dev(&finite) / m.abs()
}

/// KNN sizes followed by combined blends.
pub fn robustness_specs(knn_grid: &[usize], alpha_grid: &[f64], combined_k: usize) -> Vec<WeightsSpec> {
    knn_grid
        .iter()
        .map(|&k| WeightsSpec::Knn { k })
        .chain(alpha_grid.iter().map(|&alpha| WeightsSpec::Combined {
            alpha,
            k: combined_k,
        }))
        .collect()
}

/// Outcome of one robustness pass: the summary plus the matrices that
/// could be built, for the weights comparison.
#[derive(Debug, Clone)]
pub struct RobustnessRun {
    pub summary: RobustnessSummary,
    pub weights: Vec<WeightsSummary>,
}

/// Fit `design` under every spec. A spec whose matrix or fit fails is
/// recorded as a failure and skipped.
pub fn robustness_check(
    design: &SpatialDesign,
    builder: &WeightsBuilder,
    facility_counts: &[f64],
    specs: &[WeightsSpec],
    estimator: &SdmRegressor,
    focus: &str,
) -> RobustnessRun {
    let mut rows = Vec::with_capacity(specs.len());
    let mut failures = Vec::new();
    let mut summaries = Vec::with_capacity(specs.len());

    for spec in specs {
        let weights: SpatialWeights = match builder.build(spec, Some(facility_counts)) {
            Ok(w) => w,
            Err(e) => {
                warn!(?spec, error = %e, "robustness weights could not be built");
                failures.push(RobustnessFailure {
                    weights: format!("{spec:?}"),
                    error: e.to_string(),
                });
                continue;
            }
        };
        let label = weights.kind().label();
        summaries.push(weights.summary());

        match estimator.fit(design, &weights) {
            Ok(result) => rows.push(RobustnessRow::from_result(&label, &result, focus)),
            Err(e) => {
                warn!(weights = %label, error = %e, "robustness fit failed");
                failures.push(RobustnessFailure {
                    weights: label,
                    error: e.to_string(),
                });
            }
        }
    }

    let column = |f: fn(&RobustnessRow) -> f64| rows.iter().map(f).collect::<Vec<_>>();
    let rho_cv = coefficient_of_variation(&column(|r| r.rho));
    let focus_cv = coefficient_of_variation(&column(|r| r.focus_coefficient));
    let r_squared_cv = coefficient_of_variation(&column(|r| r.pseudo_r_squared));
    info!(
        specifications = rows.len(),
        failed = failures.len(),
        rho_cv,
        focus_cv,
        "robustness check"
    );

    RobustnessRun {
        summary: RobustnessSummary {
            focus: focus.to_string(),
            rows,
            failures,
            rho_cv,
            focus_cv,
            r_squared_cv,
        },
        weights: summaries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cv() {
        assert!((coefficient_of_variation(&[1.0, 3.0]) - 2f64.sqrt() / 2.0).abs() < 1e-12);
        assert!(coefficient_of_variation(&[1.0]).is_nan());
        assert!(coefficient_of_variation(&[1.0, f64::NAN]).is_nan());
    }

    #[test]
    fn test_spec_grid_order() {
        let specs = robustness_specs(&[3, 5, 8], &[0.3, 0.5, 0.7], 5);
        assert_eq!(specs.len(), 6);
        assert_eq!(specs[0], WeightsSpec::Knn { k: 3 });
        assert_eq!(specs[5], WeightsSpec::Combined { alpha: 0.7, k: 5 });
    }
}
