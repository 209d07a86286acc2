//! Dense solves used by the estimators.
//!
//! Both routines delegate factorisations to LAPACK through `ndarray-linalg`.

use ndarray::{Array1, Array2, ArrayView1, Axis, s};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{SVD, Solve};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PseudoInverseError {
    #[error("Singular value decomposition failed: {0}")]
    Decomposition(#[from] LinalgError),
    #[error("Singular value decomposition did not return the requested singular vectors.")]
    MissingSingularVectors,
}

/// A Moore-Penrose pseudoinverse together with the number of singular values kept.
#[derive(Debug, Clone)]
pub struct PseudoInverse {
    pub matrix: Array2<f64>,
    pub rank: usize,
}

/// Computes `A⁺ = V Σ⁺ Uᵀ` for a rows×cols matrix.
///
/// Singular values at or below `ε · max(rows, cols) · max(Σ)` are treated as zero, the
/// same cutoff numpy and Octave use. Directions with truncated singular values therefore
/// contribute nothing to a solve against `A⁺`.
pub fn pseudo_inverse(a: &Array2<f64>) -> Result<PseudoInverse, PseudoInverseError> {
    let (rows, cols) = a.dim();
    if rows == 0 || cols == 0 {
        return Ok(PseudoInverse {
            matrix: Array2::zeros((cols, rows)),
            rank: 0,
        });
    }

    let (u, singular_values, vt) = a.svd(true, true)?;
    let u = u.ok_or(PseudoInverseError::MissingSingularVectors)?;
    let vt = vt.ok_or(PseudoInverseError::MissingSingularVectors)?;

    let max_singular = singular_values.iter().fold(0.0_f64, |acc, &v| acc.max(v));
    let tolerance = f64::EPSILON * rows.max(cols) as f64 * max_singular;

    let inv_singular: Array1<f64> =
        singular_values.mapv(|v| if v > tolerance { 1.0 / v } else { 0.0 });
    let rank = inv_singular.iter().filter(|&&v| v != 0.0).count();

    // Thin factors: U is rows×rows and Vᵀ is cols×cols, only the first k columns of U
    // and rows of Vᵀ pair with singular values.
    let k = singular_values.len();
    let u_thin = u.slice(s![.., ..k]);
    let v_thin = vt.slice(s![..k, ..]).t().to_owned();

    let v_scaled = &v_thin * &inv_singular.view().insert_axis(Axis(0));
    let matrix = v_scaled.dot(&u_thin.t());

    Ok(PseudoInverse { matrix, rank })
}

/// Solves a square system `A x = b`, falling back to the pseudoinverse when the LU
/// factorisation reports a singular matrix.
pub fn solve_or_pseudo_inverse(
    a: &Array2<f64>,
    b: ArrayView1<f64>,
) -> Result<Array1<f64>, PseudoInverseError> {
    match a.solve(&b) {
        Ok(x) if x.iter().all(|v| v.is_finite()) => Ok(x),
        Ok(_) => {
            log::warn!("LU solve produced non-finite coefficients; retrying with pseudoinverse");
            Ok(pseudo_inverse(a)?.matrix.dot(&b))
        }
        Err(e) => {
            log::warn!("LU solve failed ({e}); retrying with pseudoinverse");
            Ok(pseudo_inverse(a)?.matrix.dot(&b))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn assert_matrix_close(actual: &Array2<f64>, expected: &Array2<f64>, tol: f64) {
        assert_eq!(actual.dim(), expected.dim());
        for (x, y) in actual.iter().zip(expected.iter()) {
            assert_relative_eq!(*x, *y, epsilon = tol, max_relative = tol);
        }
    }

    #[test]
    fn pinv_of_full_rank_matrix_reconstructs_it() {
        let m = array![[4.0, 1.0, 0.5], [1.0, 3.0, -0.2], [0.5, -0.2, 2.0]];
        let pinv = pseudo_inverse(&m).unwrap();
        assert_eq!(pinv.rank, 3);

        let roundtrip = m.dot(&pinv.matrix).dot(&m);
        assert_matrix_close(&roundtrip, &m, 1e-8);
        assert_matrix_close(&m.dot(&pinv.matrix), &Array2::eye(3), 1e-10);
    }

    #[test]
    fn pinv_satisfies_penrose_conditions_for_rank_deficient_input() {
        // Rank one: every row is a multiple of [1, 2, 3].
        let m = array![[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [-1.0, -2.0, -3.0], [0.5, 1.0, 1.5]];
        let pinv = pseudo_inverse(&m).unwrap();
        assert_eq!(pinv.matrix.dim(), (3, 4));
        assert_eq!(pinv.rank, 1);

        let p = &pinv.matrix;
        assert_matrix_close(&m.dot(p).dot(&m), &m, 1e-10);
        assert_matrix_close(&p.dot(&m).dot(p), p, 1e-10);
        let mp = m.dot(p);
        assert_matrix_close(&mp, &mp.t().to_owned(), 1e-10);
        let pm = p.dot(&m);
        assert_matrix_close(&pm, &pm.t().to_owned(), 1e-10);
    }

    #[test]
    fn pinv_of_zero_matrix_is_zero() {
        let m = Array2::<f64>::zeros((3, 2));
        let pinv = pseudo_inverse(&m).unwrap();
        assert_eq!(pinv.rank, 0);
        assert!(pinv.matrix.iter().all(|&v| v == 0.0));
        assert_eq!(pinv.matrix.dim(), (2, 3));
    }

    #[test]
    fn square_solve_matches_direct_solution() {
        let a = array![[3.0, 1.0], [1.0, 2.0]];
        let b = array![9.0, 8.0];
        let x = solve_or_pseudo_inverse(&a, b.view()).unwrap();
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn singular_square_solve_falls_back_to_minimum_norm_solution() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let b = array![2.0, 2.0];
        let x = solve_or_pseudo_inverse(&a, b.view()).unwrap();
        assert!(x.iter().all(|v| v.is_finite()));
        assert_relative_eq!(a.dot(&x)[0], 2.0, epsilon = 1e-10);
    }
}
