//! Dense linear algebra helpers
//!
//! Minimum-norm least squares and per-column z-scoring, the two numeric
//! primitives shared by the confound and denoising paths.

use nalgebra::DMatrix;

/// Minimum-norm least-squares solve of `A X = B`.
///
/// Uses an SVD with singular values below `eps * max(m, n) * sigma_max`
/// treated as zero, so rank-deficient designs are handled and the returned
/// solution is the minimum-norm one.
///
/// # Arguments
/// * `a` - Design matrix (m x n)
/// * `b` - Right-hand side (m x k)
///
/// # Returns
/// Coefficient matrix X (n x k)
pub fn lstsq(a: &DMatrix<f64>, b: &DMatrix<f64>) -> DMatrix<f64> {
    let n = a.ncols();
    if n == 0 || a.nrows() == 0 {
        return DMatrix::zeros(n, b.ncols());
    }

    let svd = a.clone().svd(true, true);
    let max_sv = svd.singular_values.iter().fold(0.0f64, |m, &s| m.max(s));
    let tol = f64::EPSILON * a.nrows().max(n) as f64 * max_sv;

    svd.solve(b, tol)
        .unwrap_or_else(|_| DMatrix::zeros(n, b.ncols()))
}

/// Z-score each column independently (zero mean, unit variance).
///
/// Uses the population standard deviation (divide by n, not n - 1). Columns
/// with zero variance are only demeaned, so an all-zero column stays zero
/// instead of turning into NaNs.
pub fn zscore_columns(m: &DMatrix<f64>) -> DMatrix<f64> {
    let n = m.nrows();
    let mut out = m.clone();
    if n == 0 {
        return out;
    }

    for mut col in out.column_iter_mut() {
        let mean = col.iter().sum::<f64>() / n as f64;
        let var = col.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
        let std = var.sqrt();

        for v in col.iter_mut() {
            *v -= mean;
        }
        if std > 0.0 {
            for v in col.iter_mut() {
                *v /= std;
            }
        }
    }
    out
}

/// Horizontally stack matrices with equal row counts.
pub fn hstack(parts: &[&DMatrix<f64>]) -> DMatrix<f64> {
    let nrows = parts.first().map_or(0, |m| m.nrows());
    let ncols: usize = parts.iter().map(|m| m.ncols()).sum();

    let mut out = DMatrix::zeros(nrows, ncols);
    let mut offset = 0;
    for part in parts {
        out.view_mut((0, offset), (nrows, part.ncols()))
            .copy_from(*part);
        offset += part.ncols();
    }
    out
}
