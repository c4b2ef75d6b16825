//! Moore-Penrose pseudo-inverse of filterbank matrices.
//!
//! Filterbanks are wide (`bins ≪ freq_bins`) and can be rank deficient
//! when filters fall between FFT bins, so the inverse is taken on the
//! singular values above `rcond · σ_max` only. The SVD itself is
//! nalgebra's; this module only converts at the `ndarray` boundary.

use hm_core::{HrMelError, HrMelResult};
use nalgebra::DMatrix;
use ndarray::Array2;

/// Upper bound on implicit QR iterations before the SVD gives up.
const MAX_ITERATIONS: usize = 10_000;

fn to_nalgebra(a: &Array2<f64>) -> DMatrix<f64> {
    let (m, n) = a.dim();
    DMatrix::from_row_iterator(m, n, a.iter().copied())
}

/// Pseudo-inverse of an `m × n` matrix, returned as `n × m`.
///
/// Singular values at or below `rcond · σ_max` are treated as zero, which
/// makes the result the minimum-norm least-squares solution operator.
///
/// # Errors
/// Returns an input error when `a` holds non-finite entries or the SVD
/// does not converge, and a configuration error for a negative `rcond`.
pub fn pseudo_inverse(a: &Array2<f64>, rcond: f64) -> HrMelResult<Array2<f64>> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Ok(Array2::zeros((n, m)));
    }
    if rcond.is_nan() || rcond < 0.0 {
        return Err(HrMelError::config(format!(
            "pseudo-inverse rcond must be non-negative, got {rcond}"
        )));
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(HrMelError::input("cannot invert a matrix with non-finite entries"));
    }

    let svd = to_nalgebra(a)
        .try_svd(true, true, f64::EPSILON, MAX_ITERATIONS)
        .ok_or_else(|| {
            HrMelError::input(format!("SVD of a {m}x{n} matrix did not converge"))
        })?;
    let sigma_max = svd.singular_values.max();
    let inv = svd
        .pseudo_inverse(rcond * sigma_max)
        .map_err(|e| HrMelError::config(format!("pseudo-inverse failed: {e}")))?;

    log::trace!("pseudo-inverse of {m}x{n}, sigma_max={sigma_max:.3e}");
    Ok(Array2::from_shape_fn((n, m), |(i, j)| inv[(i, j)]))
}
