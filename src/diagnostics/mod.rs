//! Specification and residual diagnostics.
//!
//! - **ADF**: unit-root test per variable, never auto-differenced
//! - **VIF**: multicollinearity per regressor including the intercept
//! - **Breusch–Pagan / Jarque–Bera**: residual variance and normality
//! - **Moran's I / LISA**: global and local spatial autocorrelation
//! - **LM tests**: lag versus error dependence and the model they suggest
//!
//! Every function is read-only on its inputs.

mod heteroskedasticity;
mod moran;
mod residual;
mod stationarity;
mod vif;

use thiserror::Error;

use crate::solvers::RegressionError;
use crate::weights::WeightsError;

#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("insufficient observations: need at least {needed}, got {got}")]
    InsufficientObservations { needed: usize, got: usize },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("'{0}' has no variation")]
    ConstantSeries(String),

    #[error("weight matrix has no links")]
    EmptyWeights,

    #[error("auxiliary regression failed: {0}")]
    Regression(#[from] RegressionError),

    #[error(transparent)]
    Weights(#[from] WeightsError),
}

pub(crate) use heteroskedasticity::chi2_sf;
pub use heteroskedasticity::{
    breusch_pagan, breusch_pagan_ols, jarque_bera, BreuschPaganResult, JarqueBeraResult,
};
pub use lm_tests::{lm_tests, LmDiagnostics, LmTestResult, ModelRecommendation};
pub use moran::{
    local_moran, moran_i, LisaRow, MoranResult, Quadrant, DEFAULT_PERMUTATIONS,
    LISA_SIGNIFICANCE,
};
pub use residual::{location_means, residual_diagnostics, ResidualDiagnostics};
pub use stationarity::{
    adf_test, mackinnon_critical_values, mackinnon_p_value, schwert_max_lag, AdfResult,
};
pub use vif::{
    constant_vif, high_vif_predictors, variance_inflation_factor, vif_report, Multicollinearity,
    VifRow, VIF_CONSTANT,
};
