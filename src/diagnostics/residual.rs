//! Post-estimation checks on SDM residuals.

use faer::Col;
use serde::Serialize;
use tracing::warn;

use super::heteroskedasticity::{jarque_bera, JarqueBeraResult};
use super::moran::{moran_i, MoranResult};
use super::DiagnosticsError;
use crate::solvers::SdmResult;
use crate::utils::{mean, std_dev};
use crate::weights::SpatialWeights;

#[derive(Debug, Clone, Serialize)]
pub struct ResidualDiagnostics {
    /// Moran's I of the per-location average residual.
    pub moran: MoranResult,
    pub jarque_bera: JarqueBeraResult,
    pub mean: f64,
    pub std_dev: f64,
}

impl ResidualDiagnostics {
    /// No remaining spatial autocorrelation at `alpha`.
    pub fn spatially_clean(&self, alpha: f64) -> bool {
        self.moran.p_value >= alpha
    }
}

/// Average a location-major panel vector over periods.
pub fn location_means(values: &Col<f64>, n_locations: usize, n_periods: usize) -> Col<f64> {
    Col::from_fn(n_locations, |i| {
        (0..n_periods).map(|t| values[i * n_periods + t]).sum::<f64>() / n_periods as f64
    })
}

pub fn residual_diagnostics(
    result: &SdmResult,
    weights: &SpatialWeights,
    permutations: usize,
    seed: u64,
) -> Result<ResidualDiagnostics, DiagnosticsError> {
    let n = result.n_locations();
    let t = result.n_periods();
    let residuals = result.residuals();
    if weights.n() != n || residuals.nrows() != n * t {
        return Err(DiagnosticsError::DimensionMismatch {
            expected: weights.n() * t,
            got: residuals.nrows(),
        });
    }

    let averaged = location_means(residuals, n, t);
    let moran = moran_i("residual", &averaged, weights, permutations, seed)?;
    let values: Vec<f64> = residuals.iter().copied().collect();
    let jarque_bera = jarque_bera(&values)?;

    if moran.p_value < 0.05 {
        warn!(i = moran.i, p = moran.p_value, "spatial autocorrelation left in residuals");
    }

    Ok(ResidualDiagnostics {
        moran,
        jarque_bera,
        mean: mean(&values),
        std_dev: std_dev(&values),
    })
}
