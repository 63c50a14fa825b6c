//! Row-standardised spatial weight matrices and the spatial lag operator.

use faer::{Col, Mat};
use serde::Serialize;
use thiserror::Error;

/// Tolerance for the row-sum contract.
pub const ROW_SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum WeightsError {
    #[error("location '{0}' has no registered coordinate")]
    UnknownLocation(String),
    #[error("at least two locations are required, got {0}")]
    TooFewLocations(usize),
    #[error("k = {k} neighbours requested but only {n} locations exist")]
    InvalidNeighbours { k: usize, n: usize },
    #[error("expected {expected} facility counts, got {got}")]
    FacilityLength { expected: usize, got: usize },
    #[error("facility count for '{0}' is negative or not finite")]
    InvalidFacilityCount(String),
    #[error("alpha must be in [0, 1], got {0}")]
    InvalidAlpha(f64),
    #[error("distance threshold must be positive, got {0}")]
    InvalidThreshold(f64),
    #[error("weight matrix is {rows}x{cols}, expected square")]
    NotSquare { rows: usize, cols: usize },
    #[error("weight matrix has {matrix} rows but {labels} location labels")]
    LabelMismatch { matrix: usize, labels: usize },
    #[error("negative or non-finite weight at ({row}, {col})")]
    InvalidWeight { row: usize, col: usize },
    #[error("non-zero diagonal at row {0}")]
    NonZeroDiagonal(usize),
    #[error("row {row} sums to {sum}, expected 1")]
    NotRowStochastic { row: usize, sum: f64 },
    #[error("vector of length {got} cannot be lagged over {n} locations and {periods} periods")]
    LagLength { got: usize, n: usize, periods: usize },
}

/// Construction rule that produced a weight matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WeightsKind {
    Knn { k: usize },
    Economic,
    Combined { alpha: f64, k: usize },
    InverseDistance,
    DistanceBand { threshold_km: f64 },
    Custom,
}

impl WeightsKind {
    /// Short label used in reports, e.g. `knn5` or `combined_a0.5`.
    pub fn label(&self) -> String {
        match self {
            WeightsKind::Knn { k } => format!("knn{k}"),
            WeightsKind::Economic => "economic".to_string(),
            WeightsKind::Combined { alpha, k } => format!("combined_a{alpha}_knn{k}"),
            WeightsKind::InverseDistance => "inverse_distance".to_string(),
            WeightsKind::DistanceBand { threshold_km } => format!("band_{threshold_km:.1}km"),
            WeightsKind::Custom => "custom".to_string(),
        }
    }
}

/// Summary line for the weights comparison table.
#[derive(Debug, Clone, Serialize)]
pub struct WeightsSummary {
    pub label: String,
    pub n: usize,
    /// Sum of all weights.
    pub s0: f64,
    pub mean_neighbours: f64,
    pub min_neighbours: usize,
    pub max_neighbours: usize,
    /// Rows without any neighbour.
    pub islands: usize,
}

/// N×N spatial weight matrix aligned with an ordered list of locations.
///
/// Invariants: square, non-negative, zero diagonal, each row sums to one
/// (or is entirely zero for a location without neighbours).
#[derive(Debug, Clone)]
pub struct SpatialWeights {
    locations: Vec<String>,
    matrix: Mat<f64>,
    kind: WeightsKind,
}

impl SpatialWeights {
    /// Row-standardise a raw non-negative matrix. Zero rows stay zero.
    pub fn from_raw(
        locations: Vec<String>,
        raw: Mat<f64>,
        kind: WeightsKind,
    ) -> Result<Self, WeightsError> {
        if raw.nrows() != raw.ncols() {
            return Err(WeightsError::NotSquare {
                rows: raw.nrows(),
                cols: raw.ncols(),
            });
        }
        if raw.nrows() != locations.len() {
            return Err(WeightsError::LabelMismatch {
                matrix: raw.nrows(),
                labels: locations.len(),
            });
        }

        let n = raw.nrows();
        let mut matrix = raw;
        for i in 0..n {
            matrix[(i, i)] = 0.0;
            let sum: f64 = (0..n).map(|j| matrix[(i, j)]).sum();
            if sum > 0.0 {
                for j in 0..n {
                    matrix[(i, j)] /= sum;
                }
            }
        }

        let weights = Self {
            locations,
            matrix,
            kind,
        };
        weights.validate()?;
        Ok(weights)
    }

    /// Check the weight-matrix contract.
    pub fn validate(&self) -> Result<(), WeightsError> {
        let n = self.matrix.nrows();
        if self.matrix.ncols() != n {
            return Err(WeightsError::NotSquare {
                rows: n,
                cols: self.matrix.ncols(),
            });
        }
        for i in 0..n {
            if self.matrix[(i, i)] != 0.0 {
                return Err(WeightsError::NonZeroDiagonal(i));
            }
            let mut sum = 0.0;
            for j in 0..n {
                let w = self.matrix[(i, j)];
                if !w.is_finite() || w < 0.0 {
                    return Err(WeightsError::InvalidWeight { row: i, col: j });
                }
                sum += w;
            }
            if sum != 0.0 && (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(WeightsError::NotRowStochastic { row: i, sum });
            }
        }
        Ok(())
    }

    pub fn n(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn matrix(&self) -> &Mat<f64> {
        &self.matrix
    }

    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn kind(&self) -> &WeightsKind {
        &self.kind
    }

    pub fn row_sums(&self) -> Col<f64> {
        let n = self.n();
        Col::from_fn(n, |i| (0..n).map(|j| self.matrix[(i, j)]).sum())
    }

    /// Indices of rows without neighbours.
    pub fn islands(&self) -> Vec<usize> {
        let n = self.n();
        (0..n)
            .filter(|&i| (0..n).all(|j| self.matrix[(i, j)] == 0.0))
            .collect()
    }

    /// Number of neighbours (non-zero weights) per row.
    pub fn cardinalities(&self) -> Vec<usize> {
        let n = self.n();
        (0..n)
            .map(|i| (0..n).filter(|&j| self.matrix[(i, j)] > 0.0).count())
            .collect()
    }

    /// Cross-sectional spatial lag `W v`.
    pub fn lag(&self, v: &Col<f64>) -> Result<Col<f64>, WeightsError> {
        self.panel_lag(v, 1)
    }

    /// Spatial lag of a location-major panel vector: element `i*T + t` of the
    /// result is `Σ_j W[i,j] v[j*T + t]`, i.e. `I_T ⊗ W` applied in
    /// location-major order.
    pub fn panel_lag(&self, v: &Col<f64>, n_periods: usize) -> Result<Col<f64>, WeightsError> {
        let n = self.n();
        if n_periods == 0 || v.nrows() != n * n_periods {
            return Err(WeightsError::LagLength {
                got: v.nrows(),
                n,
                periods: n_periods,
            });
        }
        Ok(apply_panel(&self.matrix, v, n_periods))
    }

    /// Column-wise panel spatial lag of a location-major matrix.
    pub fn panel_lag_matrix(
        &self,
        x: &Mat<f64>,
        n_periods: usize,
    ) -> Result<Mat<f64>, WeightsError> {
        let mut out = Mat::zeros(x.nrows(), x.ncols());
        for j in 0..x.ncols() {
            let col = Col::from_fn(x.nrows(), |i| x[(i, j)]);
            let lagged = self.panel_lag(&col, n_periods)?;
            for i in 0..x.nrows() {
                out[(i, j)] = lagged[i];
            }
        }
        Ok(out)
    }

    pub fn summary(&self) -> WeightsSummary {
        let n = self.n();
        let card = self.cardinalities();
        let s0: f64 = (0..n)
            .map(|i| (0..n).map(|j| self.matrix[(i, j)]).sum::<f64>())
            .sum();
        WeightsSummary {
            label: self.kind.label(),
            n,
            s0,
            mean_neighbours: card.iter().sum::<usize>() as f64 / n.max(1) as f64,
            min_neighbours: card.iter().copied().min().unwrap_or(0),
            max_neighbours: card.iter().copied().max().unwrap_or(0),
            islands: card.iter().filter(|&&c| c == 0).count(),
        }
    }
}

/// Apply an N×N operator to every period of a location-major panel vector.
pub(crate) fn apply_panel(op: &Mat<f64>, v: &Col<f64>, n_periods: usize) -> Col<f64> {
    let n = op.nrows();
    let mut out = Col::zeros(v.nrows());
    for i in 0..n {
        for j in 0..n {
            let w = op[(i, j)];
            if w == 0.0 {
                continue;
            }
            for t in 0..n_periods {
                out[i * n_periods + t] += w * v[j * n_periods + t];
            }
        }
    }
    out
}
