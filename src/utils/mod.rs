//! Utility functions.

mod matrix;

pub use matrix::{
    center_columns, center_vector, column, correlation, detect_constant_columns, dot,
    frobenius_inner, hstack, identity, invert, invert_symmetric, log_abs_det, mean,
    std_dev, symmetric_eigen, trace,
};
