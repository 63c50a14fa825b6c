//! Deterministic what-if shocks propagated through the spatial multiplier.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use super::decomposition::{coefficients_of, CovariateCoefficients, EffectsDecomposer, EffectsError};
use crate::solvers::SdmResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ShockSize {
    /// Change in the covariate's own units.
    Absolute(f64),
    /// Fraction of the covariate's baseline (0.15 = +15%).
    Relative(f64),
}

/// A uniform change to one covariate at every location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shock {
    pub name: String,
    pub variable: String,
    pub size: ShockSize,
}

impl Shock {
    pub fn new(name: impl Into<String>, variable: impl Into<String>, size: ShockSize) -> Self {
        Self {
            name: name.into(),
            variable: variable.into(),
            size,
        }
    }
}

/// Fuel +15%, rainfall −200 mm, temperature +2 °C.
pub fn canonical_scenarios() -> Vec<Shock> {
    vec![
        Shock::new("fuel_plus_15pct", "fuel_price", ShockSize::Relative(0.15)),
        Shock::new(
            "rainfall_minus_200mm",
            "precipitation_mm",
            ShockSize::Absolute(-200.0),
        ),
        Shock::new(
            "temperature_plus_2c",
            "temperature_mean_c",
            ShockSize::Absolute(2.0),
        ),
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationImpact {
    pub location: String,
    pub direct: f64,
    pub spillover: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub scenario: String,
    pub variable: String,
    pub delta_x: f64,
    pub beta: f64,
    pub theta: f64,
    pub impacts: Vec<LocationImpact>,
    pub average_direct: f64,
    pub average_spillover: f64,
    pub average_total: f64,
}

/// Applies shocks with the multiplier of a fitted model.
#[derive(Debug, Clone)]
pub struct PolicySimulator<'d, 'w> {
    decomposer: &'d EffectsDecomposer<'w>,
    coefficients: BTreeMap<String, CovariateCoefficients>,
    baselines: BTreeMap<String, f64>,
}

impl<'d, 'w> PolicySimulator<'d, 'w> {
    pub fn new(decomposer: &'d EffectsDecomposer<'w>) -> Self {
        Self {
            decomposer,
            coefficients: BTreeMap::new(),
            baselines: BTreeMap::new(),
        }
    }

    /// Simulator over the named covariates of a fitted model.
    pub fn from_result(
        decomposer: &'d EffectsDecomposer<'w>,
        result: &SdmResult,
        variables: &[String],
    ) -> Result<Self, EffectsError> {
        let mut sim = Self::new(decomposer);
        for coef in coefficients_of(result, variables)? {
            sim = sim.with_coefficients(coef);
        }
        Ok(sim)
    }

    pub fn with_coefficients(mut self, coef: CovariateCoefficients) -> Self {
        self.coefficients.insert(coef.name.clone(), coef);
        self
    }

    /// Reference level for relative shocks, typically the panel mean.
    pub fn with_baseline(mut self, variable: impl Into<String>, value: f64) -> Self {
        self.baselines.insert(variable.into(), value);
        self
    }

    /// Whether the simulator has coefficients for `variable`.
    pub fn knows(&self, variable: &str) -> bool {
        self.coefficients.contains_key(variable)
    }

    pub fn simulate(&self, shock: &Shock) -> Result<SimulationResult, EffectsError> {
        let coef = self
            .coefficients
            .get(&shock.variable)
            .ok_or_else(|| EffectsError::UnknownCovariate(shock.variable.clone()))?;
        let delta_x = match shock.size {
            ShockSize::Absolute(d) => d,
            ShockSize::Relative(r) => {
                let base = self
                    .baselines
                    .get(&shock.variable)
                    .ok_or_else(|| EffectsError::MissingBaseline(shock.variable.clone()))?;
                r * base
            }
        };

        let s = self.decomposer.impact_matrix(coef.beta, coef.theta);
        let impacts: Vec<LocationImpact> = self
            .decomposer
            .weights()
            .locations()
            .iter()
            .enumerate()
            .map(|(i, location)| {
                let row_sum: f64 = (0..s.ncols()).map(|j| s[(i, j)]).sum();
                let direct = s[(i, i)] * delta_x;
                let total = row_sum * delta_x;
                LocationImpact {
                    location: location.clone(),
                    direct,
                    spillover: total - direct,
                    total,
                }
            })
            .collect();

        let n = impacts.len().max(1) as f64;
        let average_direct = impacts.iter().map(|r| r.direct).sum::<f64>() / n;
        let average_total = impacts.iter().map(|r| r.total).sum::<f64>() / n;

        info!(
            scenario = %shock.name,
            delta_x,
            average_total,
            "simulated shock"
        );

        Ok(SimulationResult {
            scenario: shock.name.clone(),
            variable: shock.variable.clone(),
            delta_x,
            beta: coef.beta,
            theta: coef.theta,
            average_direct,
            average_spillover: average_total - average_direct,
            average_total,
            impacts,
        })
    }

    /// Run every shock; fails on the first unknown covariate.
    pub fn run(&self, shocks: &[Shock]) -> Result<Vec<SimulationResult>, EffectsError> {
        shocks.iter().map(|s| self.simulate(s)).collect()
    }
}
