//! Spatial weight matrices.
//!
//! - **KNN**: k nearest neighbours by planar distance, uniform weights
//! - **Economic**: facility interaction over distance
//! - **Combined**: convex blend of the two
//! - **Inverse distance** and **distance band** variants for robustness checks
//!
//! Every matrix is row-standardised with a zero diagonal and carries the
//! location order it was built for.

mod builder;
mod matrix;

pub use builder::{WeightsBuilder, WeightsSpec, DISTANCE_FLOOR_KM};
pub use matrix::{
    SpatialWeights, WeightsError, WeightsKind, WeightsSummary, ROW_SUM_TOLERANCE,
};
pub(crate) use matrix::apply_panel;
