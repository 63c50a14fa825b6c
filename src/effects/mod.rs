//! Spatial effects and policy simulation.
//!
//! Both work on the multiplier `M = (I − ρW)⁻¹` of a fitted model:
//!
//! - [`EffectsDecomposer`] splits each covariate's impact `S_k = M(β_k I + θ_k W)`
//!   into direct, indirect and total effects
//! - [`PolicySimulator`] applies a uniform shock `Δx` and reports the price
//!   response per location

mod decomposition;
mod simulation;

pub use decomposition::{
    coefficients_of, spatial_multiplier, CovariateCoefficients, EffectRow, EffectsDecomposer,
    EffectsError, EffectsMethod, MultiplierRow, DEFAULT_RHO_SIGNIFICANCE,
};
pub use simulation::{
    canonical_scenarios, LocationImpact, PolicySimulator, Shock, ShockSize, SimulationResult,
};
