//! Orchestration of a full run: load, merge, assemble, diagnose, estimate,
//! decompose, simulate, check robustness.
//!
//! Diagnostics and transmission analyses are informational: a failure there
//! is logged and the corresponding report entry stays empty. Everything on
//! the estimation path fails the run with a typed [`PipelineError`].

mod config;
mod robustness;
mod runner;

use std::path::PathBuf;
use thiserror::Error;

use crate::core::{LocationError, OptionsError};
use crate::data::DataError;
use crate::effects::EffectsError;
use crate::report::ReportError;
use crate::solvers::SdmError;
use crate::weights::WeightsError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid options: {0}")]
    Options(#[from] OptionsError),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration in {path}: {source}")]
    Config {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Location(#[from] LocationError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Weights(#[from] WeightsError),
    #[error(transparent)]
    Estimation(#[from] SdmError),
    #[error(transparent)]
    Effects(#[from] EffectsError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

pub use config::{
    PipelineConfig, PipelineOptions, TransmissionOptions, DEFAULT_COVARIATES,
    DEFAULT_VAR_LOCATIONS,
};
pub use robustness::{
    coefficient_of_variation, robustness_check, robustness_specs, RobustnessFailure,
    RobustnessRow, RobustnessRun, RobustnessSummary,
};
pub use runner::{ImpulseResponse, Pipeline, PipelineReport, TransmissionReport};
