//! Geographically weighted local regressions on a cross-section.

use faer::{Col, Mat};
use serde::Serialize;
use tracing::debug;

use super::TransmissionError;
use crate::core::{Coordinate, LocationRegistry};
use crate::data::CrossSection;
use crate::solvers::{FittedRegressor, Regressor, WlsRegressor};

/// Kernel bandwidth in degrees.
pub const DEFAULT_BANDWIDTH: f64 = 1.0;

#[derive(Debug, Clone, Serialize)]
pub struct LocalFit {
    pub location: String,
    pub lat: f64,
    pub lon: f64,
    pub r_squared: f64,
    /// Standardised slopes, ordered like [`GwrResult::names`].
    pub coefficients: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GwrResult {
    pub bandwidth: f64,
    pub names: Vec<String>,
    pub fits: Vec<LocalFit>,
}

impl GwrResult {
    /// Local slopes of one covariate.
    pub fn coefficient_surface(&self, name: &str) -> Option<Vec<(String, f64)>> {
        let j = self.names.iter().position(|n| n == name)?;
        Some(
            self.fits
                .iter()
                .map(|f| (f.location.clone(), f.coefficients[j]))
                .collect(),
        )
    }
}

/// Gaussian kernel `exp(−d² / (2h²))`.
pub fn gaussian_kernel(distance: f64, bandwidth: f64) -> f64 {
    (-(distance * distance) / (2.0 * bandwidth * bandwidth)).exp()
}

/// Z-score every column with the sample standard deviation.
fn standardize(values: &[f64], name: &str) -> Result<Vec<f64>, TransmissionError> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sd = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
    if !(sd > 1e-12) {
        return Err(TransmissionError::ConstantSeries(name.to_string()));
    }
    Ok(values.iter().map(|v| (v - mean) / sd).collect())
}

#[derive(Debug, Clone)]
pub struct LocalRegression<'a> {
    registry: &'a LocationRegistry,
    bandwidth: f64,
}

impl<'a> LocalRegression<'a> {
    pub fn new(registry: &'a LocationRegistry) -> Self {
        Self {
            registry,
            bandwidth: DEFAULT_BANDWIDTH,
        }
    }

    pub fn with_bandwidth(mut self, bandwidth: f64) -> Result<Self, TransmissionError> {
        if !(bandwidth > 0.0 && bandwidth.is_finite()) {
            return Err(TransmissionError::InvalidBandwidth(bandwidth));
        }
        self.bandwidth = bandwidth;
        Ok(self)
    }

    /// One WLS fit per location of standardised price on standardised
    /// covariates, weighting every location by its kernel distance.
    pub fn fit(&self, data: &CrossSection) -> Result<GwrResult, TransmissionError> {
        let n = data.locations.len();
        let p = data.x.ncols();
        if n < p + 2 {
            return Err(TransmissionError::InsufficientObservations {
                needed: p + 2,
                got: n,
            });
        }

        let coords: Vec<Coordinate> = data
            .locations
            .iter()
            .map(|loc| {
                self.registry
                    .coordinate(loc)
                    .ok_or_else(|| TransmissionError::UnknownLocation(loc.clone()))
            })
            .collect::<Result<_, _>>()?;

        let y_raw: Vec<f64> = data.y.iter().copied().collect();
        let y_std = standardize(&y_raw, "price")?;
        let mut columns = Vec::with_capacity(p);
        for (j, name) in data.names.iter().enumerate() {
            let raw: Vec<f64> = (0..n).map(|i| data.x[(i, j)]).collect();
            columns.push(standardize(&raw, name)?);
        }
        let y = Col::from_fn(n, |i| y_std[i]);
        let x = Mat::from_fn(n, p, |i, j| columns[j][i]);

        let mut fits = Vec::with_capacity(n);
        for (i, target) in coords.iter().enumerate() {
            let kernel = Col::from_fn(n, |k| {
                gaussian_kernel(target.degrees_to(&coords[k]), self.bandwidth)
            });
            let fitted = WlsRegressor::builder()
                .with_intercept(true)
                .compute_inference(false)
                .weights(kernel)
                .build()
                .fit(&x, &y)?;
            let result = fitted.result();
            let coefficients: Vec<f64> = (0..p)
                .map(|j| {
                    if result.aliased[j] {
                        f64::NAN
                    } else {
                        result.coefficients[j]
                    }
                })
                .collect();
            debug!(location = %data.locations[i], r2 = result.r_squared, "local regression");
            fits.push(LocalFit {
                location: data.locations[i].clone(),
                lat: target.lat,
                lon: target.lon,
                r_squared: result.r_squared,
                coefficients,
            });
        }

        Ok(GwrResult {
            bandwidth: self.bandwidth,
            names: data.names.clone(),
            fits,
        })
    }
}
