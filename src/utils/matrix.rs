//! Dense matrix helpers shared by the estimators and diagnostics.

use faer::{Col, Mat};

/// Detect columns that are constant (zero variance).
pub fn detect_constant_columns(x: &Mat<f64>, tolerance: f64) -> Vec<bool> {
    let n_rows = x.nrows();
    if n_rows == 0 {
        return vec![true; x.ncols()];
    }

    (0..x.ncols())
        .map(|j| {
            let first = x[(0, j)];
            (1..n_rows).all(|i| (x[(i, j)] - first).abs() < tolerance)
        })
        .collect()
}

/// Center a matrix by subtracting column means.
pub fn center_columns(x: &Mat<f64>) -> (Mat<f64>, Col<f64>) {
    let n_rows = x.nrows();
    let means = Col::from_fn(x.ncols(), |j| {
        (0..n_rows).map(|i| x[(i, j)]).sum::<f64>() / n_rows as f64
    });
    let centered = Mat::from_fn(n_rows, x.ncols(), |i, j| x[(i, j)] - means[j]);

    (centered, means)
}

/// Center a vector by subtracting the mean.
pub fn center_vector(y: &Col<f64>) -> (Col<f64>, f64) {
    let n = y.nrows();
    let mean: f64 = y.iter().sum::<f64>() / n as f64;

    (Col::from_fn(n, |i| y[i] - mean), mean)
}

/// Identity matrix of order `n`.
pub fn identity(n: usize) -> Mat<f64> {
    Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 })
}

/// Invert a square matrix through its QR factorisation.
///
/// Returns `None` when a diagonal entry of R is negligible relative to the
/// largest one, i.e. the matrix is singular to working precision.
pub fn invert(a: &Mat<f64>) -> Option<Mat<f64>> {
    let n = a.nrows();
    if n == 0 || a.ncols() != n {
        return None;
    }

    let qr = a.qr();
    let q = qr.compute_Q();
    let r = qr.R();

    let scale = (0..n).map(|i| r[(i, i)].abs()).fold(0.0_f64, f64::max);
    if !scale.is_finite() || scale == 0.0 {
        return None;
    }
    for i in 0..n {
        if r[(i, i)].abs() < 1e-12 * scale {
            return None;
        }
    }

    // Solve R * A⁻¹ = Q' column by column.
    let qt = q.transpose();
    let mut inv = Mat::zeros(n, n);
    for col in 0..n {
        for i in (0..n).rev() {
            let mut sum = qt[(i, col)];
            for j in (i + 1)..n {
                sum -= r[(i, j)] * inv[(j, col)];
            }
            inv[(i, col)] = sum / r[(i, i)];
        }
    }

    for j in 0..n {
        for i in 0..n {
            if !inv[(i, j)].is_finite() {
                return None;
            }
        }
    }
    Some(inv)
}

/// Invert a symmetric positive semi-definite cross-product matrix.
///
/// The matrix is equilibrated by its diagonal first so regressors on very
/// different scales (prices next to dummies) do not trip the singularity check.
pub fn invert_symmetric(a: &Mat<f64>) -> Option<Mat<f64>> {
    let n = a.nrows();
    if n == 0 || a.ncols() != n {
        return None;
    }
    let mut d = vec![0.0; n];
    for i in 0..n {
        let diag = a[(i, i)];
        if !(diag > 0.0) || !diag.is_finite() {
            return None;
        }
        d[i] = 1.0 / diag.sqrt();
    }

    let scaled = Mat::from_fn(n, n, |i, j| a[(i, j)] * d[i] * d[j]);
    let inv = invert(&scaled)?;
    Some(Mat::from_fn(n, n, |i, j| inv[(i, j)] * d[i] * d[j]))
}

/// `ln |det(A)|` for a square matrix, from the diagonal of its R factor.
pub fn log_abs_det(a: &Mat<f64>) -> f64 {
    let n = a.nrows();
    let qr = a.qr();
    let r = qr.R();
    (0..n).map(|i| r[(i, i)].abs().ln()).sum()
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns the eigenvalues in ascending order and the matching unit
/// eigenvectors as columns. Sized for the small systems of the
/// transmission analyses.
pub fn symmetric_eigen(a: &Mat<f64>) -> (Vec<f64>, Mat<f64>) {
    const MAX_SWEEPS: usize = 100;

    let n = a.nrows();
    let mut m = Mat::from_fn(n, n, |i, j| 0.5 * (a[(i, j)] + a[(j, i)]));
    let mut v = identity(n);
    let scale = frobenius_inner(&m, &m).sqrt();

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += m[(p, q)] * m[(p, q)];
            }
        }
        if off.sqrt() <= 1e-15 * scale || off == 0.0 {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = m[(p, q)];
                if apq == 0.0 {
                    continue;
                }
                let theta = (m[(q, q)] - m[(p, p)]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let (mkp, mkq) = (m[(k, p)], m[(k, q)]);
                    m[(k, p)] = c * mkp - s * mkq;
                    m[(k, q)] = s * mkp + c * mkq;
                }
                for k in 0..n {
                    let (mpk, mqk) = (m[(p, k)], m[(q, k)]);
                    m[(p, k)] = c * mpk - s * mqk;
                    m[(q, k)] = s * mpk + c * mqk;
                }
                for k in 0..n {
                    let (vkp, vkq) = (v[(k, p)], v[(k, q)]);
                    v[(k, p)] = c * vkp - s * vkq;
                    v[(k, q)] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| m[(i, i)].total_cmp(&m[(j, j)]));
    let values = order.iter().map(|&i| m[(i, i)]).collect();
    let vectors = Mat::from_fn(n, n, |r, c| v[(r, order[c])]);
    (values, vectors)
}

/// Trace of a square matrix.
pub fn trace(a: &Mat<f64>) -> f64 {
    (0..a.nrows().min(a.ncols())).map(|i| a[(i, i)]).sum()
}

/// Sum of element-wise products, `tr(A'B)`.
pub fn frobenius_inner(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    let mut sum = 0.0;
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            sum += a[(i, j)] * b[(i, j)];
        }
    }
    sum
}

/// Horizontally concatenate blocks that share a row count.
pub fn hstack(blocks: &[&Mat<f64>]) -> Mat<f64> {
    let n_rows = blocks.first().map_or(0, |b| b.nrows());
    let n_cols: usize = blocks.iter().map(|b| b.ncols()).sum();
    let mut out = Mat::zeros(n_rows, n_cols);

    let mut offset = 0;
    for block in blocks {
        for j in 0..block.ncols() {
            for i in 0..n_rows {
                out[(i, offset + j)] = block[(i, j)];
            }
        }
        offset += block.ncols();
    }
    out
}

/// Copy a single column into an owned vector.
pub fn column(x: &Mat<f64>, j: usize) -> Col<f64> {
    Col::from_fn(x.nrows(), |i| x[(i, j)])
}

/// Dot product of two vectors of equal length.
pub fn dot(a: &Col<f64>, b: &Col<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Arithmetic mean, `NaN` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn std_dev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
}

/// Pearson correlation of two equally long series.
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let ma = mean(a);
    let mb = mean(b);
    let mut sab = 0.0;
    let mut saa = 0.0;
    let mut sbb = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        sab += (x - ma) * (y - mb);
        saa += (x - ma).powi(2);
        sbb += (y - mb).powi(2);
    }
    if saa == 0.0 || sbb == 0.0 {
        return f64::NAN;
    }
    sab / (saa * sbb).sqrt()
}
