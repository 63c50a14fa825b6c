//! Spatial econometrics of regional food prices.
//!
//! This library estimates a Spatial Durbin Model (SDM) on a monthly
//! location × period price panel, with the diagnostics that motivate it,
//! the direct/indirect effect decomposition that interprets it, policy
//! scenario simulation and time-series price transmission analyses.
//!
//! # Example
//!
//! ```rust,ignore
//! use spatial_price::prelude::*;
//!
//! let registry = LocationRegistry::west_java();
//! let pipeline = Pipeline::new(registry, PipelineOptions::default())?;
//! let report = pipeline.run(&inputs)?;
//!
//! println!("ρ = {:.3} ({})", report.model.rho(), report.model.method());
//! ReportWriter::new("output")?.write_all(&report)?;
//! ```

pub mod core;
pub mod data;
pub mod diagnostics;
pub mod effects;
pub mod inference;
pub mod pipeline;
pub mod report;
pub mod solvers;
pub mod transmission;
pub mod utils;
pub mod weights;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        Coordinate, EstimationStrategy, LocationRegistry, RegressionOptions, RegressionResult,
        SdmOptions,
    };
    pub use crate::data::{CrossSection, InputPaths, LagSpec, Panel, SourceTables, SpatialDesign};
    pub use crate::diagnostics::{
        adf_test, breusch_pagan, jarque_bera, lm_tests, local_moran, moran_i, vif_report,
        ModelRecommendation,
    };
    pub use crate::effects::{EffectsDecomposer, EffectsMethod, PolicySimulator, Shock};
    pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineOptions, PipelineReport};
    pub use crate::report::ReportWriter;
    pub use crate::solvers::{
        FittedRegressor, OlsRegressor, Regressor, SdmRegressor, SdmResult, WlsRegressor,
    };
    pub use crate::transmission::{granger_causality, LocalRegression, SeriesSet, VarModel};
    pub use crate::weights::{SpatialWeights, WeightsBuilder, WeightsSpec};
}

pub use crate::core::{LocationRegistry, SdmOptions};
pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineReport};
pub use crate::solvers::{SdmRegressor, SdmResult};
pub use crate::weights::{SpatialWeights, WeightsSpec};
