//! Construction of geographic, economic and blended weight matrices.

use super::matrix::{SpatialWeights, WeightsError, WeightsKind};
use crate::core::{Coordinate, LocationRegistry};
use faer::Mat;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Floor added to kilometre distances so co-located units do not divide by zero.
pub const DISTANCE_FLOOR_KM: f64 = 0.1;

/// Declarative description of a weight matrix, deserialisable from config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WeightsSpec {
    Knn { k: usize },
    Economic,
    Combined { alpha: f64, k: usize },
    InverseDistance,
    DistanceBand {
        #[serde(default)]
        threshold_km: Option<f64>,
    },
}

impl Default for WeightsSpec {
    fn default() -> Self {
        WeightsSpec::Knn { k: 5 }
    }
}

/// Builds weight matrices for a fixed, ordered set of locations.
///
/// Every location must resolve to a coordinate in the registry; the row and
/// column order of every matrix follows `locations`.
#[derive(Debug, Clone)]
pub struct WeightsBuilder {
    locations: Vec<String>,
    coordinates: Vec<Coordinate>,
}

impl WeightsBuilder {
    pub fn new(registry: &LocationRegistry, locations: &[String]) -> Result<Self, WeightsError> {
        if locations.len() < 2 {
            return Err(WeightsError::TooFewLocations(locations.len()));
        }
        let coordinates = locations
            .iter()
            .map(|name| {
                registry
                    .coordinate(name)
                    .ok_or_else(|| WeightsError::UnknownLocation(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            locations: locations.to_vec(),
            coordinates,
        })
    }

    /// Build directly from coordinates, in the given order.
    pub fn from_coordinates(
        locations: Vec<String>,
        coordinates: Vec<Coordinate>,
    ) -> Result<Self, WeightsError> {
        if locations.len() < 2 {
            return Err(WeightsError::TooFewLocations(locations.len()));
        }
        if locations.len() != coordinates.len() {
            return Err(WeightsError::LabelMismatch {
                matrix: coordinates.len(),
                labels: locations.len(),
            });
        }
        Ok(Self {
            locations,
            coordinates,
        })
    }

    pub fn n(&self) -> usize {
        self.locations.len()
    }

    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    /// Pairwise planar distances in kilometres.
    pub fn distance_matrix_km(&self) -> Mat<f64> {
        let n = self.n();
        Mat::from_fn(n, n, |i, j| self.coordinates[i].km_to(&self.coordinates[j]))
    }

    /// Build the matrix described by `spec`.
    ///
    /// `facility_counts` is required for the economic and combined variants.
    pub fn build(
        &self,
        spec: &WeightsSpec,
        facility_counts: Option<&[f64]>,
    ) -> Result<SpatialWeights, WeightsError> {
        let counts = || {
            facility_counts.ok_or(WeightsError::FacilityLength {
                expected: self.n(),
                got: 0,
            })
        };
        match spec {
            WeightsSpec::Knn { k } => self.knn(*k),
            WeightsSpec::Economic => self.economic(counts()?),
            WeightsSpec::Combined { alpha, k } => self.combined(*alpha, *k, counts()?),
            WeightsSpec::InverseDistance => self.inverse_distance(),
            WeightsSpec::DistanceBand { threshold_km } => self.distance_band(*threshold_km),
        }
    }

    /// K nearest neighbours by planar distance; each neighbour gets weight 1/k.
    ///
    /// Ties are broken by location order.
    pub fn knn(&self, k: usize) -> Result<SpatialWeights, WeightsError> {
        let n = self.n();
        if k == 0 || k >= n {
            return Err(WeightsError::InvalidNeighbours { k, n });
        }

        let dist = self.distance_matrix_km();
        let mut raw = Mat::zeros(n, n);
        for i in 0..n {
            let mut others: Vec<usize> = (0..n).filter(|&j| j != i).collect();
            others.sort_by(|&a, &b| dist[(i, a)].total_cmp(&dist[(i, b)]).then(a.cmp(&b)));
            for &j in others.iter().take(k) {
                raw[(i, j)] = 1.0;
            }
        }

        debug!(k, n, "built knn weights");
        SpatialWeights::from_raw(self.locations.clone(), raw, WeightsKind::Knn { k })
    }

    /// Facility-interaction weights `sqrt(f_i f_j) / (d_ij + 0.1)`.
    ///
    /// A location without facilities keeps an all-zero row.
    pub fn economic(&self, facility_counts: &[f64]) -> Result<SpatialWeights, WeightsError> {
        let raw = self.economic_raw(facility_counts)?;
        let weights =
            SpatialWeights::from_raw(self.locations.clone(), raw, WeightsKind::Economic)?;

        let islands = weights.islands();
        if !islands.is_empty() {
            let names: Vec<&str> = islands
                .iter()
                .map(|&i| self.locations[i].as_str())
                .collect();
            warn!(?names, "locations without facilities have no economic neighbours");
        }
        Ok(weights)
    }

    fn economic_raw(&self, facility_counts: &[f64]) -> Result<Mat<f64>, WeightsError> {
        let n = self.n();
        if facility_counts.len() != n {
            return Err(WeightsError::FacilityLength {
                expected: n,
                got: facility_counts.len(),
            });
        }
        for (name, &f) in self.locations.iter().zip(facility_counts) {
            if !f.is_finite() || f < 0.0 {
                return Err(WeightsError::InvalidFacilityCount(name.clone()));
            }
        }

        let dist = self.distance_matrix_km();
        Ok(Mat::from_fn(n, n, |i, j| {
            if i == j {
                0.0
            } else {
                (facility_counts[i] * facility_counts[j]).sqrt() / (dist[(i, j)] + DISTANCE_FLOOR_KM)
            }
        }))
    }

    /// Convex blend `α·W_geo + (1-α)·W_econ`, re-standardised by row.
    pub fn combined(
        &self,
        alpha: f64,
        k: usize,
        facility_counts: &[f64],
    ) -> Result<SpatialWeights, WeightsError> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(WeightsError::InvalidAlpha(alpha));
        }
        let geo = self.knn(k)?;
        let econ = SpatialWeights::from_raw(
            self.locations.clone(),
            self.economic_raw(facility_counts)?,
            WeightsKind::Economic,
        )?;

        let n = self.n();
        let blend = Mat::from_fn(n, n, |i, j| {
            alpha * geo.matrix()[(i, j)] + (1.0 - alpha) * econ.matrix()[(i, j)]
        });
        SpatialWeights::from_raw(
            self.locations.clone(),
            blend,
            WeightsKind::Combined { alpha, k },
        )
    }

    /// Inverse-distance weights `1 / (d_ij + 0.1)`.
    pub fn inverse_distance(&self) -> Result<SpatialWeights, WeightsError> {
        let n = self.n();
        let dist = self.distance_matrix_km();
        let raw = Mat::from_fn(n, n, |i, j| {
            if i == j {
                0.0
            } else {
                1.0 / (dist[(i, j)] + DISTANCE_FLOOR_KM)
            }
        });
        SpatialWeights::from_raw(self.locations.clone(), raw, WeightsKind::InverseDistance)
    }

    /// Binary neighbours within `threshold_km`.
    ///
    /// Without an explicit threshold the 75th percentile of each location's
    /// third-nearest-neighbour distance is used.
    pub fn distance_band(&self, threshold_km: Option<f64>) -> Result<SpatialWeights, WeightsError> {
        let threshold = match threshold_km {
            Some(t) if t > 0.0 && t.is_finite() => t,
            Some(t) => return Err(WeightsError::InvalidThreshold(t)),
            None => self.default_band_threshold(),
        };

        let n = self.n();
        let dist = self.distance_matrix_km();
        let raw = Mat::from_fn(n, n, |i, j| {
            if i != j && dist[(i, j)] <= threshold {
                1.0
            } else {
                0.0
            }
        });
        let weights = SpatialWeights::from_raw(
            self.locations.clone(),
            raw,
            WeightsKind::DistanceBand {
                threshold_km: threshold,
            },
        )?;
        if !weights.islands().is_empty() {
            warn!(threshold, islands = weights.islands().len(), "distance band leaves isolated locations");
        }
        Ok(weights)
    }

    fn default_band_threshold(&self) -> f64 {
        let n = self.n();
        let dist = self.distance_matrix_km();
        let rank = 3.min(n - 1);
        let mut kth: Vec<f64> = (0..n)
            .map(|i| {
                let mut d: Vec<f64> = (0..n).filter(|&j| j != i).map(|j| dist[(i, j)]).collect();
                d.sort_by(f64::total_cmp);
                d[rank - 1]
            })
            .collect();
        kth.sort_by(f64::total_cmp);
        percentile(&kth, 0.75)
    }
}

/// Linear-interpolated percentile of sorted data, `q` in [0, 1].
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
