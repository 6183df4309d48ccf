//! Symmetric positive-definite helpers for covariance matrices.
//!
//! Experimental covariance matrices are positive definite in exact arithmetic
//! but can lose that property numerically when a few systematics dominate.
//! We therefore try a Cholesky factorization first as-is, then with a
//! progressively larger diagonal jitter (relative to the mean diagonal).

use nalgebra::{Cholesky, DMatrix, Dyn};

const JITTER: [f64; 4] = [0.0, 1e-12, 1e-10, 1e-8];

/// Cholesky factorization with diagonal jitter fallback.
///
/// Returns `None` for matrices that are not square, contain non-finite values,
/// or cannot be factorized even with the largest jitter.
pub fn cholesky(m: &DMatrix<f64>) -> Option<Cholesky<f64, Dyn>> {
    if !m.is_square() || m.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let n = m.nrows();
    let scale = if n == 0 { 0.0 } else { m.trace().abs() / n as f64 };

    for &eps in &JITTER {
        let mut work = m.clone();
        if eps > 0.0 {
            for i in 0..n {
                work[(i, i)] += eps * scale.max(f64::MIN_POSITIVE);
            }
        }
        if let Some(chol) = work.cholesky() {
            return Some(chol);
        }
    }
    None
}

/// Inverse of a symmetric positive-definite matrix (empty matrices invert to empty).
pub fn invert_spd(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if m.nrows() == 0 && m.ncols() == 0 {
        return Some(DMatrix::zeros(0, 0));
    }
    let inv = cholesky(m)?.inverse();
    if inv.iter().all(|v| v.is_finite()) { Some(inv) } else { None }
}

/// Lower-triangular Cholesky factor (empty matrices give an empty factor).
pub fn lower_factor(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if m.nrows() == 0 && m.ncols() == 0 {
        return Some(DMatrix::zeros(0, 0));
    }
    cholesky(m).map(|c| c.l())
}
