//! Estimators: auxiliary least squares and the Spatial Durbin Model.

mod traits;
mod ols;
mod wls;
mod sdm;

pub use traits::{FittedRegressor, Regressor, RegressionError};
pub use ols::{FittedOls, OlsRegressor, OlsRegressorBuilder};
pub use wls::{FittedWls, WlsRegressor, WlsRegressorBuilder};
pub use sdm::{
    EarlyWarning, EstimationFailure, EstimationMethod, SdmError, SdmRegressor,
    SdmRegressorBuilder, SdmResult, CONSTANT, LAG_PREFIX, RHO,
};
