//! Global and local Moran's I with permutation inference.

use faer::Col;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::debug;

use super::DiagnosticsError;
use crate::weights::SpatialWeights;

/// Default number of random permutations.
pub const DEFAULT_PERMUTATIONS: usize = 999;

/// Two-sided significance used for cluster labels.
pub const LISA_SIGNIFICANCE: f64 = 0.05;

#[derive(Debug, Clone, Serialize)]
pub struct MoranResult {
    pub variable: String,
    pub i: f64,
    pub expected: f64,
    /// Variance under the normality assumption.
    pub variance: f64,
    pub z_score: f64,
    pub p_value: f64,
    /// Pseudo p-value `(extreme + 1) / (permutations + 1)`.
    pub p_permutation: f64,
    pub permutations: usize,
}

impl MoranResult {
    pub fn is_clustered(&self, alpha: f64) -> bool {
        self.i > self.expected && self.p_value < alpha
    }
}

/// LISA cluster type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quadrant {
    #[serde(rename = "HH")]
    HighHigh,
    #[serde(rename = "LH")]
    LowHigh,
    #[serde(rename = "LL")]
    LowLow,
    #[serde(rename = "HL")]
    HighLow,
    #[serde(rename = "ns")]
    NotSignificant,
}

impl Quadrant {
    pub fn label(&self) -> &'static str {
        match self {
            Quadrant::HighHigh => "HH",
            Quadrant::LowHigh => "LH",
            Quadrant::LowLow => "LL",
            Quadrant::HighLow => "HL",
            Quadrant::NotSignificant => "ns",
        }
    }

    fn from_signs(z: f64, lag: f64) -> Self {
        match (z > 0.0, lag > 0.0) {
            (true, true) => Quadrant::HighHigh,
            (false, true) => Quadrant::LowHigh,
            (false, false) => Quadrant::LowLow,
            (true, false) => Quadrant::HighLow,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LisaRow {
    pub location: String,
    pub value: f64,
    pub local_i: f64,
    pub p_value: f64,
    pub quadrant: Quadrant,
}

fn check_input(weights: &SpatialWeights, values: &Col<f64>) -> Result<(), DiagnosticsError> {
    let n = weights.n();
    if values.nrows() != n {
        return Err(DiagnosticsError::DimensionMismatch {
            expected: n,
            got: values.nrows(),
        });
    }
    if n < 3 {
        return Err(DiagnosticsError::InsufficientObservations { needed: 3, got: n });
    }
    Ok(())
}

fn deviations(values: &Col<f64>, variable: &str) -> Result<Vec<f64>, DiagnosticsError> {
    let n = values.nrows();
    let mean = values.iter().sum::<f64>() / n as f64;
    let z: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let ss: f64 = z.iter().map(|v| v * v).sum();
    if ss <= 1e-12 * (1.0 + mean * mean) {
        return Err(DiagnosticsError::ConstantSeries(variable.to_string()));
    }
    Ok(z)
}

fn statistic(weights: &SpatialWeights, z: &[f64], s0: f64) -> f64 {
    let w = weights.matrix();
    let n = z.len();
    let mut num = 0.0;
    for i in 0..n {
        let lag: f64 = (0..n).map(|j| w[(i, j)] * z[j]).sum();
        num += z[i] * lag;
    }
    let den: f64 = z.iter().map(|v| v * v).sum();
    n as f64 / s0 * num / den
}

/// Global Moran's I of one cross-section.
pub fn moran_i(
    variable: &str,
    values: &Col<f64>,
    weights: &SpatialWeights,
    permutations: usize,
    seed: u64,
) -> Result<MoranResult, DiagnosticsError> {
    check_input(weights, values)?;
    let n = weights.n();
    let nf = n as f64;
    let w = weights.matrix();
    let z = deviations(values, variable)?;

    let mut s0 = 0.0;
    let mut s1 = 0.0;
    for i in 0..n {
        for j in 0..n {
            s0 += w[(i, j)];
            let sym = w[(i, j)] + w[(j, i)];
            s1 += sym * sym;
        }
    }
    s1 /= 2.0;
    let s2: f64 = (0..n)
        .map(|i| {
            let row: f64 = (0..n).map(|j| w[(i, j)]).sum();
            let col: f64 = (0..n).map(|j| w[(j, i)]).sum();
            (row + col).powi(2)
        })
        .sum();
    if s0 <= 0.0 {
        return Err(DiagnosticsError::EmptyWeights);
    }

    let i = statistic(weights, &z, s0);
    let expected = -1.0 / (nf - 1.0);
    let variance = (nf * nf * s1 - nf * s2 + 3.0 * s0 * s0) / ((nf * nf - 1.0) * s0 * s0)
        - expected * expected;
    let z_score = (i - expected) / variance.sqrt();
    let p_value = Normal::new(0.0, 1.0).map_or(f64::NAN, |d| 2.0 * (1.0 - d.cdf(z_score.abs())));

    let mut rng = StdRng::seed_from_u64(seed);
    let mut shuffled = z.clone();
    let mut above = 0usize;
    for _ in 0..permutations {
        shuffled.shuffle(&mut rng);
        if statistic(weights, &shuffled, s0) >= i {
            above += 1;
        }
    }
    let larger = above.min(permutations - above);
    let p_permutation = if permutations == 0 {
        f64::NAN
    } else {
        (larger + 1) as f64 / (permutations + 1) as f64
    };

    debug!(variable, i, z_score, p_value, p_permutation, "global Moran's I");

    Ok(MoranResult {
        variable: variable.to_string(),
        i,
        expected,
        variance,
        z_score,
        p_value,
        p_permutation,
        permutations,
    })
}

/// Local Moran's I with conditional permutation: for each unit the value is
/// held fixed and its neighbours are drawn from the other `n − 1` values.
pub fn local_moran(
    values: &Col<f64>,
    weights: &SpatialWeights,
    permutations: usize,
    seed: u64,
) -> Result<Vec<LisaRow>, DiagnosticsError> {
    check_input(weights, values)?;
    let n = weights.n();
    let w = weights.matrix();
    let z = deviations(values, "lisa")?;
    let m2: f64 = z.iter().map(|v| v * v).sum::<f64>() / (n as f64 - 1.0);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let lag: f64 = (0..n).map(|j| w[(i, j)] * z[j]).sum();
        let local_i = z[i] * lag / m2;

        let neighbours: Vec<(usize, f64)> = (0..n)
            .filter(|&j| j != i && w[(i, j)] != 0.0)
            .map(|j| (j, w[(i, j)]))
            .collect();
        let mut pool: Vec<f64> = (0..n).filter(|&j| j != i).map(|j| z[j]).collect();

        let p_value = if permutations == 0 || neighbours.is_empty() {
            1.0
        } else {
            let mut above = 0usize;
            for _ in 0..permutations {
                let (drawn, _) = pool.partial_shuffle(&mut rng, neighbours.len());
                let sim_lag: f64 = drawn
                    .iter()
                    .zip(&neighbours)
                    .map(|(v, (_, wij))| v * wij)
                    .sum();
                if z[i] * sim_lag / m2 >= local_i {
                    above += 1;
                }
            }
            let larger = above.min(permutations - above);
            (larger + 1) as f64 / (permutations + 1) as f64
        };

        let quadrant = if p_value < LISA_SIGNIFICANCE {
            Quadrant::from_signs(z[i], lag)
        } else {
            Quadrant::NotSignificant
        };
        rows.push(LisaRow {
            location: weights.locations()[i].clone(),
            value: values[i],
            local_i,
            p_value,
            quadrant,
        });
    }
    Ok(rows)
}
