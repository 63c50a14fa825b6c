//! Core types: options, results and the location registry.

mod location;
mod options;
mod result;

pub use location::{Coordinate, LocationEntry, LocationError, LocationRegistry, KM_PER_DEGREE};
pub use options::{
    EstimationStrategy, OptionsError, RegressionOptions, RegressionOptionsBuilder, SdmOptions,
    SdmOptionsBuilder,
};
pub use result::RegressionResult;
