//! Johansen trace test for cointegration among market prices.

use faer::Mat;
use serde::Serialize;
use tracing::{debug, info};

use super::{SeriesSet, TransmissionError};
use crate::utils::{invert, invert_symmetric, symmetric_eigen};

/// 5% trace critical values with an unrestricted constant, indexed by the
/// number of common stochastic trends under the null (1..=6).
const TRACE_CRITICAL_5PCT: [f64; 6] = [3.8415, 15.4943, 29.7961, 47.8545, 69.8189, 95.7542];

/// Largest system the critical value table covers.
pub const MAX_JOHANSEN_SERIES: usize = TRACE_CRITICAL_5PCT.len();

/// One row of the sequential test: H0 rank ≤ `rank`.
#[derive(Debug, Clone, Serialize)]
pub struct RankTest {
    pub rank: usize,
    pub eigenvalue: f64,
    pub trace_statistic: f64,
    pub critical_5pct: f64,
    pub reject: bool,
}

#[derive(Debug, Clone)]
pub struct JohansenResult {
    pub names: Vec<String>,
    pub n_obs: usize,
    pub k_ar_diff: usize,
    pub ranks: Vec<RankTest>,
}

impl JohansenResult {
    /// Cointegration rank: the first null not rejected.
    pub fn rank(&self) -> usize {
        self.ranks.iter().take_while(|r| r.reject).count()
    }

    pub fn is_cointegrated(&self) -> bool {
        self.rank() > 0
    }
}

/// Residuals of the columns of `a` regressed on `z`.
fn residualize(a: &Mat<f64>, z: &Mat<f64>, zz_inv: &Mat<f64>) -> Mat<f64> {
    let zta = z.transpose() * a;
    let coef = zz_inv * &zta;
    let fit = z * &coef;
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[(i, j)] - fit[(i, j)])
}

fn moment(a: &Mat<f64>, b: &Mat<f64>) -> Mat<f64> {
    let n = a.nrows() as f64;
    let mut m = a.transpose() * b;
    for j in 0..m.ncols() {
        for i in 0..m.nrows() {
            m[(i, j)] /= n;
        }
    }
    m
}

/// Trace test with a constant in the VECM and `k_ar_diff` lagged
/// differences.
///
/// Δy_t and y_{t−1} are both purged of `[1, Δy_{t−1}, …, Δy_{t−k}]`; the
/// squared canonical correlations λ of the two residual sets give
/// `trace(r) = −n Σ_{i>r} ln(1 − λ_i)`.
pub fn johansen_trace(
    series: &SeriesSet,
    k_ar_diff: usize,
) -> Result<JohansenResult, TransmissionError> {
    if k_ar_diff == 0 {
        return Err(TransmissionError::InvalidLag(0));
    }
    let n_vars = series.n_variables();
    if n_vars > MAX_JOHANSEN_SERIES {
        return Err(TransmissionError::TooManySeries {
            max: MAX_JOHANSEN_SERIES,
            got: n_vars,
        });
    }
    let t = series.n_periods();
    let start = k_ar_diff + 1;
    let n_z = 1 + k_ar_diff * n_vars;
    let needed = start + n_z + n_vars + 1;
    if t < needed {
        return Err(TransmissionError::InsufficientObservations { needed, got: t });
    }

    let y = series.data();
    let n = t - start;
    let diff = |row: usize, j: usize| y[(row, j)] - y[(row - 1, j)];
    let z = Mat::from_fn(n, n_z, |i, c| {
        if c == 0 {
            return 1.0;
        }
        let (lag, j) = ((c - 1) / n_vars + 1, (c - 1) % n_vars);
        diff(start + i - lag, j)
    });
    let dy = Mat::from_fn(n, n_vars, |i, j| diff(start + i, j));
    let lagged = Mat::from_fn(n, n_vars, |i, j| y[(start + i - 1, j)]);

    let zz_inv = invert_symmetric(&(z.transpose() * &z))
        .ok_or(TransmissionError::Singular("Johansen short-run design"))?;
    let r0 = residualize(&dy, &z, &zz_inv);
    let r1 = residualize(&lagged, &z, &zz_inv);

    let s00 = moment(&r0, &r0);
    let s01 = moment(&r0, &r1);
    let s11 = moment(&r1, &r1);
    let s00_inv = invert(&s00).ok_or(TransmissionError::Singular("Johansen S00"))?;

    // S11^{-1/2} turns the generalised problem into a symmetric one.
    let (d, v) = symmetric_eigen(&s11);
    if d.iter().any(|&x| !(x > 0.0)) {
        return Err(TransmissionError::Singular("Johansen S11"));
    }
    let inv_sqrt = Mat::from_fn(n_vars, n_vars, |i, j| {
        (0..n_vars).map(|k| v[(i, k)] * v[(j, k)] / d[k].sqrt()).sum::<f64>()
    });
    let s10_s00_inv = s01.transpose() * &s00_inv;
    let product = &s10_s00_inv * &s01;
    let half = &inv_sqrt * &product;
    let canonical = &half * &inv_sqrt;
    let (mut lambda, _) = symmetric_eigen(&canonical);
    lambda.reverse();
    for l in &mut lambda {
        *l = l.clamp(0.0, 1.0 - 1e-12);
    }
    debug!(eigenvalues = ?lambda, "Johansen canonical correlations");

    let ranks: Vec<RankTest> = (0..n_vars)
        .map(|r| {
            let trace_statistic =
                -(n as f64) * lambda[r..].iter().map(|l| (1.0 - l).ln()).sum::<f64>();
            let critical_5pct = TRACE_CRITICAL_5PCT[n_vars - r - 1];
            RankTest {
                rank: r,
                eigenvalue: lambda[r],
                trace_statistic,
                critical_5pct,
                reject: trace_statistic > critical_5pct,
            }
        })
        .collect();

    let result = JohansenResult {
        names: series.names().to_vec(),
        n_obs: n,
        k_ar_diff,
        ranks,
    };
    info!(
        series = n_vars,
        n_obs = n,
        rank = result.rank(),
        "Johansen trace test"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashed(t: usize, k: usize) -> f64 {
        let v = (12.9898 * t as f64 + 78.233 * k as f64).sin() * 43_758.545_3;
        v - v.floor() - 0.5
    }

    fn walk(n: usize, k: usize, step: f64) -> Vec<f64> {
        let mut w = vec![0.0; n];
        for t in 1..n {
            w[t] = w[t - 1] + step * hashed(t, k);
        }
        w
    }

    fn pair(a: Vec<f64>, b: Vec<f64>) -> SeriesSet {
        SeriesSet::new(vec!["a".to_string(), "b".to_string()], &[a, b]).expect("aligned")
    }

    #[test]
    fn test_shared_trend_is_cointegrated() {
        let n = 200;
        let w = walk(n, 0, 2.0);
        let a = (0..n).map(|t| w[t] + hashed(t, 1)).collect();
        let b = (0..n).map(|t| 0.5 * w[t] + 10.0 + hashed(t, 2)).collect();

        let result = johansen_trace(&pair(a, b), 1).expect("long series");
        assert_eq!(result.n_obs, 198);
        assert_eq!(result.ranks.len(), 2);
        assert_eq!(result.ranks[0].critical_5pct, 15.4943);
        assert_eq!(result.ranks[1].critical_5pct, 3.8415);
        assert!(result.ranks[0].trace_statistic > 50.0);
        assert!(result.ranks[1].trace_statistic < 3.8415);
        assert_eq!(result.rank(), 1);
    }

    #[test]
    fn test_independent_walks_are_not_cointegrated() {
        let n = 200;
        let result =
            johansen_trace(&pair(walk(n, 3, 1.0), walk(n, 4, 1.0)), 1).expect("long series");

        assert!(result.ranks[0].trace_statistic < result.ranks[0].critical_5pct);
        assert!(!result.is_cointegrated());
        assert!(result.ranks[0].eigenvalue >= result.ranks[1].eigenvalue);
    }

    #[test]
    fn test_rejects_oversized_and_short_systems() {
        let names: Vec<String> = (0..7).map(|i| format!("m{i}")).collect();
        let cols: Vec<Vec<f64>> = (0..7).map(|k| walk(100, k, 1.0)).collect();
        let big = SeriesSet::new(names, &cols).expect("aligned");
        assert!(matches!(
            johansen_trace(&big, 1),
            Err(TransmissionError::TooManySeries { max: 6, got: 7 })
        ));

        let short = pair(walk(6, 1, 1.0), walk(6, 2, 1.0));
        assert!(matches!(
            johansen_trace(&short, 1),
            Err(TransmissionError::InsufficientObservations { .. })
        ));
        assert!(matches!(
            johansen_trace(&short, 0),
            Err(TransmissionError::InvalidLag(0))
        ));
    }
}
