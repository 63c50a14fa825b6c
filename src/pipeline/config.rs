//! Run configuration, read from JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::PipelineError;
use crate::core::{LocationEntry, LocationRegistry, OptionsError, SdmOptions};
use crate::data::{InputPaths, LagSpec};
use crate::diagnostics::DEFAULT_PERMUTATIONS;
use crate::effects::EffectsMethod;
use crate::transmission::{Frequency, DEFAULT_BANDWIDTH};
use crate::weights::WeightsSpec;

/// Covariates used for the cross-sectional tests, the effects table and the
/// local regressions.
pub const DEFAULT_COVARIATES: [&str; 5] = [
    "precipitation_mm",
    "temperature_mean_c",
    "fuel_price",
    "harvested_area_ha",
    "avg_distance_km",
];

/// Markets whose price series enter the VAR.
pub const DEFAULT_VAR_LOCATIONS: [&str; 5] =
    ["Bandung", "Tasikmalaya", "Cirebon", "Jakarta Pusat", "Bogor"];

/// Options for the time-series transmission analyses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmissionOptions {
    pub enabled: bool,
    pub gwr_bandwidth: f64,
    pub var_locations: Vec<String>,
    /// Grain of the VAR, Johansen, Granger and asymmetry series.
    pub frequency: Frequency,
    /// Lagged differences in the Johansen test.
    pub johansen_lags: usize,
    pub var_max_lags: usize,
    pub irf_horizon: usize,
    /// `(cause, effect)` for Granger causality, the impulse response and the
    /// asymmetry regression.
    pub pair: (String, String),
    pub granger_lag: usize,
    pub asymmetry_shock: f64,
}

impl Default for TransmissionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            gwr_bandwidth: DEFAULT_BANDWIDTH,
            var_locations: DEFAULT_VAR_LOCATIONS.iter().map(|s| s.to_string()).collect(),
            frequency: Frequency::Weekly,
            johansen_lags: 1,
            var_max_lags: 4,
            irf_horizon: 10,
            pair: ("Bandung".to_string(), "Jakarta Pusat".to_string()),
            granger_lag: 2,
            asymmetry_shock: 1000.0,
        }
    }
}

/// What to estimate for one commodity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Commodity name or id, matched case-insensitively.
    pub commodity: String,
    /// Primary weight matrix.
    pub weights: WeightsSpec,
    /// KNN sizes re-estimated in the robustness check.
    pub knn_grid: Vec<usize>,
    /// Geographic shares of the combined matrix re-estimated in the
    /// robustness check.
    pub alpha_grid: Vec<f64>,
    /// Neighbour count of the geographic part of combined matrices.
    pub combined_k: usize,
    pub lags: LagSpec,
    pub significance: f64,
    pub permutations: usize,
    pub seed: u64,
    pub sdm: SdmOptions,
    pub effects_method: EffectsMethod,
    pub covariates: Vec<String>,
    /// Coefficient tracked across robustness specifications.
    pub focus_coefficient: String,
    /// Name prefix of the rainfall lags scanned for the early warning.
    pub rain_lag_prefix: String,
    pub transmission: TransmissionOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            commodity: "Beras".to_string(),
            weights: WeightsSpec::default(),
            knn_grid: vec![3, 5, 8],
            alpha_grid: vec![0.3, 0.5, 0.7],
            combined_k: 5,
            lags: LagSpec::default(),
            significance: 0.05,
            permutations: DEFAULT_PERMUTATIONS,
            seed: 42,
            sdm: SdmOptions::default(),
            effects_method: EffectsMethod::Full,
            covariates: DEFAULT_COVARIATES.iter().map(|s| s.to_string()).collect(),
            focus_coefficient: "precipitation_mm".to_string(),
            rain_lag_prefix: "rain_lag".to_string(),
            transmission: TransmissionOptions::default(),
        }
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if !(self.significance > 0.0 && self.significance < 1.0) {
            return Err(OptionsError::InvalidSignificance(self.significance));
        }
        if self.knn_grid.iter().any(|&k| k == 0) || self.combined_k == 0 {
            return Err(OptionsError::InvalidNeighbours);
        }
        if let Some(&alpha) = self.alpha_grid.iter().find(|a| !(0.0..=1.0).contains(*a)) {
            return Err(OptionsError::InvalidAlpha(alpha));
        }
        match &self.weights {
            WeightsSpec::Knn { k } | WeightsSpec::Combined { k, .. } if *k == 0 => {
                return Err(OptionsError::InvalidNeighbours)
            }
            WeightsSpec::Combined { alpha, .. } if !(0.0..=1.0).contains(alpha) => {
                return Err(OptionsError::InvalidAlpha(*alpha))
            }
            _ => {}
        }
        if self.covariates.is_empty() {
            return Err(OptionsError::EmptyGrid("covariates"));
        }
        let t = &self.transmission;
        if !(t.gwr_bandwidth > 0.0 && t.gwr_bandwidth.is_finite()) {
            return Err(OptionsError::InvalidBandwidth(t.gwr_bandwidth));
        }
        if t.var_max_lags == 0 {
            return Err(OptionsError::InvalidLagOrder("var_max_lags"));
        }
        if t.granger_lag == 0 {
            return Err(OptionsError::InvalidLagOrder("granger_lag"));
        }
        if t.johansen_lags == 0 {
            return Err(OptionsError::InvalidLagOrder("johansen_lags"));
        }
        self.sdm.validate()
    }
}

/// Input files, options and optional location registry for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub inputs: InputPaths,
    #[serde(default)]
    pub options: PipelineOptions,
    /// Replaces the built-in West Java registry when non-empty.
    #[serde(default)]
    pub locations: Vec<LocationEntry>,
}

impl PipelineConfig {
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| PipelineError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn registry(&self) -> Result<LocationRegistry, PipelineError> {
        if self.locations.is_empty() {
            Ok(LocationRegistry::west_java())
        } else {
            Ok(LocationRegistry::from_entries(self.locations.clone())?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let opts = PipelineOptions::default();
        assert!(opts.validate().is_ok());
        assert_eq!(opts.knn_grid, vec![3, 5, 8]);
        assert_eq!(opts.permutations, 999);
    }

    #[test]
    fn test_invalid_alpha_grid() {
        let opts = PipelineOptions {
            alpha_grid: vec![0.3, 1.5],
            ..PipelineOptions::default()
        };
        assert!(matches!(opts.validate(), Err(OptionsError::InvalidAlpha(a)) if a == 1.5));
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "inputs": {
                "prices": "p.csv",
                "weather": "w.csv",
                "fuel": "f.csv",
                "production": "prod.csv",
                "facilities": "fac.csv"
            },
            "options": {
                "commodity": "Cabai Merah",
                "weights": { "type": "combined", "alpha": 0.5, "k": 4 },
                "seed": 7
            }
        }"#;
        let config = PipelineConfig::from_json(json).expect("valid json");
        assert_eq!(config.options.commodity, "Cabai Merah");
        assert_eq!(
            config.options.weights,
            WeightsSpec::Combined { alpha: 0.5, k: 4 }
        );
        assert_eq!(config.options.seed, 7);
        assert_eq!(config.options.knn_grid, vec![3, 5, 8]);
        assert!(config.registry().expect("built-in").contains("Bandung"));
    }
}
