//! Small dense helpers for symmetric positive-definite matrices.

use ndarray::{Array1, Array2, ArrayView1};

/// Lower-triangular `L` with `a = L Lᵀ`, or `None` if `a` is not positive
/// definite.
pub fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let d = a.nrows();
    if a.ncols() != d {
        return None;
    }
    let mut l = Array2::<f64>::zeros((d, d));
    for i in 0..d {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Solves `L z = b` by forward substitution.
pub fn solve_lower(l: &Array2<f64>, b: &ArrayView1<f64>) -> Array1<f64> {
    let d = l.nrows();
    let mut z = Array1::<f64>::zeros(d);
    for i in 0..d {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * z[k];
        }
        z[i] = sum / l[[i, i]];
    }
    z
}

/// `log |a|` from the Cholesky factor of `a`.
pub fn log_det_from_cholesky(l: &Array2<f64>) -> f64 {
    2.0 * l.diag().iter().map(|v| v.ln()).sum::<f64>()
}

/// `log Σ exp(values)` without overflow.
pub fn logsumexp(values: &ArrayView1<f64>) -> f64 {
    let max = values.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}
