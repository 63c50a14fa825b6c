//! Estimator options and configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration options for the auxiliary least-squares fits.
#[derive(Debug, Clone)]
pub struct RegressionOptions {
    /// Whether to include an intercept term (default: true).
    pub with_intercept: bool,
    /// Whether to compute standard errors and inference statistics (default: true).
    pub compute_inference: bool,
    /// Confidence level for confidence intervals (default: 0.95).
    pub confidence_level: f64,
    /// Rank tolerance for QR decomposition.
    pub rank_tolerance: f64,
}

impl Default for RegressionOptions {
    fn default() -> Self {
        Self {
            with_intercept: true,
            compute_inference: true,
            confidence_level: 0.95,
            rank_tolerance: 1e-10,
        }
    }
}

/// Errors that can occur when validating options.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("confidence_level must be in (0, 1), got {0}")]
    InvalidConfidenceLevel(f64),
    #[error("tolerance must be positive, got {0}")]
    InvalidTolerance(f64),
    #[error("max_iterations must be at least 1, got {0}")]
    InvalidMaxIterations(usize),
    #[error("rho bounds must satisfy -1 < lower < upper < 1, got ({0}, {1})")]
    InvalidRhoBounds(f64, f64),
    #[error("significance level must be in (0, 1), got {0}")]
    InvalidSignificance(f64),
    #[error("alpha must be in [0, 1], got {0}")]
    InvalidAlpha(f64),
    #[error("number of neighbours must be at least 1")]
    InvalidNeighbours,
    #[error("bandwidth must be positive, got {0}")]
    InvalidBandwidth(f64),
    #[error("at least one instrument lag is required")]
    InvalidInstrumentLags,
    #[error("{0} must not be empty")]
    EmptyGrid(&'static str),
    #[error("lag order must be at least 1 for {0}")]
    InvalidLagOrder(&'static str),
}

impl RegressionOptions {
    /// Create a new builder for regression options.
    pub fn builder() -> RegressionOptionsBuilder {
        RegressionOptionsBuilder::default()
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.confidence_level <= 0.0 || self.confidence_level >= 1.0 {
            return Err(OptionsError::InvalidConfidenceLevel(self.confidence_level));
        }
        if self.rank_tolerance <= 0.0 {
            return Err(OptionsError::InvalidTolerance(self.rank_tolerance));
        }
        Ok(())
    }
}

/// Builder for `RegressionOptions`.
#[derive(Debug, Clone, Default)]
pub struct RegressionOptionsBuilder {
    options: RegressionOptions,
}

impl RegressionOptionsBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to include an intercept term.
    pub fn with_intercept(mut self, include: bool) -> Self {
        self.options.with_intercept = include;
        self
    }

    /// Set whether to compute inference statistics.
    pub fn compute_inference(mut self, compute: bool) -> Self {
        self.options.compute_inference = compute;
        self
    }

    /// Set the confidence level for confidence intervals.
    pub fn confidence_level(mut self, level: f64) -> Self {
        self.options.confidence_level = level;
        self
    }

    /// Set the rank tolerance for QR decomposition.
    pub fn rank_tolerance(mut self, tol: f64) -> Self {
        self.options.rank_tolerance = tol;
        self
    }

    /// Build and validate the options.
    pub fn build(self) -> Result<RegressionOptions, OptionsError> {
        self.options.validate()?;
        Ok(self.options)
    }

    /// Build without validation.
    pub fn build_unchecked(self) -> RegressionOptions {
        self.options
    }
}

/// Order in which the spatial-lag estimators are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationStrategy {
    /// Spatial two-stage least squares, maximum likelihood if it fails.
    #[default]
    GmWithMlFallback,
    /// Spatial two-stage least squares only.
    GmOnly,
    /// Concentrated maximum likelihood only.
    MlOnly,
}

/// Options for the Spatial Durbin estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdmOptions {
    pub strategy: EstimationStrategy,
    /// Search interval for ρ in the likelihood step.
    pub rho_lower: f64,
    pub rho_upper: f64,
    /// Convergence tolerance of the ρ line search.
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Spatial lag orders beyond the Durbin block used as instruments:
    /// `W²X_d, ..., W^(1+q)X_d`.
    pub instrument_lags: usize,
}

impl Default for SdmOptions {
    fn default() -> Self {
        Self {
            strategy: EstimationStrategy::GmWithMlFallback,
            rho_lower: -0.99,
            rho_upper: 0.99,
            tolerance: 1e-8,
            max_iterations: 200,
            instrument_lags: 1,
        }
    }
}

impl SdmOptions {
    pub fn builder() -> SdmOptionsBuilder {
        SdmOptionsBuilder::default()
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if !(self.rho_lower > -1.0 && self.rho_lower < self.rho_upper && self.rho_upper < 1.0) {
            return Err(OptionsError::InvalidRhoBounds(self.rho_lower, self.rho_upper));
        }
        if self.tolerance <= 0.0 {
            return Err(OptionsError::InvalidTolerance(self.tolerance));
        }
        if self.max_iterations < 1 {
            return Err(OptionsError::InvalidMaxIterations(self.max_iterations));
        }
        if self.instrument_lags < 1 {
            return Err(OptionsError::InvalidInstrumentLags);
        }
        Ok(())
    }
}

/// Builder for `SdmOptions`.
#[derive(Debug, Clone, Default)]
pub struct SdmOptionsBuilder {
    options: SdmOptions,
}

impl SdmOptionsBuilder {
    pub fn strategy(mut self, strategy: EstimationStrategy) -> Self {
        self.options.strategy = strategy;
        self
    }

    pub fn rho_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.options.rho_lower = lower;
        self.options.rho_upper = upper;
        self
    }

    pub fn tolerance(mut self, tol: f64) -> Self {
        self.options.tolerance = tol;
        self
    }

    pub fn max_iterations(mut self, max_iter: usize) -> Self {
        self.options.max_iterations = max_iter;
        self
    }

    pub fn instrument_lags(mut self, lags: usize) -> Self {
        self.options.instrument_lags = lags;
        self
    }

    /// Build and validate the options.
    pub fn build(self) -> Result<SdmOptions, OptionsError> {
        self.options.validate()?;
        Ok(self.options)
    }

    /// Build without validation; the estimator validates before fitting.
    pub fn build_unchecked(self) -> SdmOptions {
        self.options
    }
}
