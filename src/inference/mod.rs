//! Statistical inference (standard errors, p-values, significance markers).

mod coefficient;

pub use coefficient::{
    normal_two_sided, significance_stars, CoefficientEstimate, CoefficientInference,
};
