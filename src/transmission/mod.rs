//! How price shocks travel between markets.
//!
//! - [`LocalRegression`]: kernel-weighted regressions per location
//! - [`VarModel`]: VAR with AIC lag choice and impulse responses, plus
//!   [`granger_causality`]
//! - [`johansen_trace`]: cointegration rank ahead of the VAR
//! - [`weekly_series`]: daily prices resampled to weekly means
//! - [`asymmetric_transmission`]: separate pass-through of increases and
//!   decreases

mod asymmetry;
mod cointegration;
mod gwr;
mod resample;
mod var;

use thiserror::Error;

use crate::solvers::RegressionError;

#[derive(Debug, Error)]
pub enum TransmissionError {
    #[error("insufficient observations: need at least {needed}, got {got}")]
    InsufficientObservations { needed: usize, got: usize },

    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("location '{0}' has no registered coordinate")]
    UnknownLocation(String),

    #[error("no series named '{0}'")]
    UnknownSeries(String),

    #[error("'{0}' has no variation")]
    ConstantSeries(String),

    #[error("bandwidth must be positive, got {0}")]
    InvalidBandwidth(f64),

    #[error("{got} series exceed the {max} covered by the critical values")]
    TooManySeries { max: usize, got: usize },

    #[error("lag order must be at least 1, got {0}")]
    InvalidLag(usize),

    #[error("singular {0}")]
    Singular(&'static str),

    #[error(transparent)]
    Regression(#[from] RegressionError),
}

pub use asymmetry::{asymmetric_transmission, AsymmetryResult};
pub use cointegration::{johansen_trace, JohansenResult, RankTest, MAX_JOHANSEN_SERIES};
pub use gwr::{gaussian_kernel, GwrResult, LocalFit, LocalRegression, DEFAULT_BANDWIDTH};
pub use resample::{week_ending, weekly_series, Frequency};
pub use var::{granger_causality, GrangerResult, LagSelection, SeriesSet, VarModel};
