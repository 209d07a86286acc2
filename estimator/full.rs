//! Dense score-matching system over all N·D basis functions.

use crate::kernel::GaussianKernel;
use crate::linalg::{self, PseudoInverseError};
use crate::statistics::ScoreStatistics;
use ndarray::{Array1, Array2, s};
use rayon::prelude::*;
use std::time::Instant;

/// A linear system `A x = b`. For the full estimator `A` is square and symmetric; for
/// the Nystrom estimator it is `(m + 1) × (N·D + 1)`.
#[derive(Debug, Clone)]
pub struct LinearSystem {
    pub a: Array2<f64>,
    pub b: Array1<f64>,
}

/// The (N·D)×(N·D) block matrix whose block `(a, b)` is `hessian_x(a, b)`.
///
/// Only blocks with `b ≥ a` are evaluated; each Hessian block is itself symmetric, so the
/// mirrored block is the same matrix.
pub fn all_hessians(kernel: &GaussianKernel) -> Array2<f64> {
    let n = kernel.num_samples();
    let d = kernel.dimension();
    let nd = n * d;

    let upper_blocks: Vec<Vec<(usize, Array2<f64>)>> = (0..n)
        .into_par_iter()
        .map(|a| (a..n).map(|b| (b, kernel.hessian_x(a, b))).collect())
        .collect();

    let mut result = Array2::zeros((nd, nd));
    for (a, row) in upper_blocks.into_iter().enumerate() {
        for (b, block) in row {
            result
                .slice_mut(s![a * d..(a + 1) * d, b * d..(b + 1) * d])
                .assign(&block);
            if a != b {
                result
                    .slice_mut(s![b * d..(b + 1) * d, a * d..(a + 1) * d])
                    .assign(&block);
            }
        }
    }
    result
}

/// Builds the (N·D + 1)×(N·D + 1) system of the full estimator.
pub struct FullSystemBuilder<'k> {
    kernel: GaussianKernel<'k>,
    lambda: f64,
}

impl<'k> FullSystemBuilder<'k> {
    pub fn new(kernel: GaussianKernel<'k>, lambda: f64) -> Self {
        Self { kernel, lambda }
    }

    /// Assembles
    ///
    /// ```text
    /// A[0, 0]   = ‖h‖²/N + λ ξ
    /// A[1:, 1:] = H·H/N + λ H
    /// A[0, 1:]  = A[1:, 0]ᵀ = H·h/N + λ h
    /// b         = [-ξ, -h]
    /// ```
    ///
    /// where `H` is [`all_hessians`] and `ξ` is `xi_norm_2`.
    pub fn build(&self) -> LinearSystem {
        let n = self.kernel.num_samples() as f64;
        let lambda = self.lambda;

        let start = Instant::now();
        let stats = ScoreStatistics::compute(&self.kernel);
        log::debug!("Computed h and xi_norm_2 in {:.2?}", start.elapsed());

        let start = Instant::now();
        let hessians = all_hessians(&self.kernel);
        log::debug!(
            "Assembled {}x{} Hessian block matrix in {:.2?}",
            hessians.nrows(),
            hessians.ncols(),
            start.elapsed()
        );

        let nd = hessians.nrows();
        let mut a = Array2::zeros((nd + 1, nd + 1));

        a[[0, 0]] = stats.offset_entry(self.kernel.num_samples(), lambda);

        let start = Instant::now();
        let mut lower_right = hessians.dot(&hessians) / n;
        lower_right.scaled_add(lambda, &hessians);
        a.slice_mut(s![1.., 1..]).assign(&lower_right);
        log::debug!("Formed lower-right block in {:.2?}", start.elapsed());

        let mut first_row = hessians.dot(&stats.h) / n;
        first_row.scaled_add(lambda, &stats.h);
        a.slice_mut(s![0, 1..]).assign(&first_row);
        a.slice_mut(s![1.., 0]).assign(&first_row);

        LinearSystem {
            a,
            b: stats.rhs(),
        }
    }

    /// Solves the full system for `alpha_beta`, length N·D + 1.
    pub fn solve(system: &LinearSystem) -> Result<Array1<f64>, PseudoInverseError> {
        linalg::solve_or_pseudo_inverse(&system.a, system.b.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::f64::consts::E;

    fn scattered_data() -> Array2<f64> {
        array![
            [0.1, -0.7, 1.3, 0.4, -1.1],
            [0.8, 0.2, -0.5, -1.4, 0.6]
        ]
    }

    #[test]
    fn hessian_block_matrix_is_symmetric_with_kernel_blocks() {
        let data = scattered_data();
        let kernel = GaussianKernel::new(data.view(), 1.5);
        let h = all_hessians(&kernel);
        assert_eq!(h.dim(), (10, 10));

        for r in 0..10 {
            for c in 0..10 {
                assert_abs_diff_eq!(h[[r, c]], h[[c, r]], epsilon = 1e-15);
            }
        }
        let block = kernel.hessian_x(3, 1);
        for i in 0..2 {
            for j in 0..2 {
                assert_eq!(h[[3 * 2 + i, 2 + j]], block[[i, j]]);
            }
        }
    }

    #[test]
    fn full_system_is_symmetric() {
        let data = scattered_data();
        let kernel = GaussianKernel::new(data.view(), 1.2);
        let system = FullSystemBuilder::new(kernel, 0.3).build();
        let size = system.a.nrows();
        assert_eq!(system.a.dim(), (11, 11));
        assert_eq!(system.b.len(), 11);

        for r in 0..size {
            for c in 0..size {
                let tol = 1e-12 * system.a[[r, c]].abs().max(1.0);
                assert_abs_diff_eq!(system.a[[r, c]], system.a[[c, r]], epsilon = tol);
            }
        }
    }

    #[test]
    fn two_point_line_system_matches_hand_computation() {
        // D = 1, N = 2, points {0, 1}, σ = 1, λ = 0.1.
        // H = [[2, -2/e], [-2/e, 2]], h = [-2/e, 2/e], ξ = 6 - 10/e.
        let data = array![[0.0, 1.0]];
        let kernel = GaussianKernel::new(data.view(), 1.0);
        let lambda = 0.1;
        let system = FullSystemBuilder::new(kernel, lambda).build();

        let hh = array![[2.0, -2.0 / E], [-2.0 / E, 2.0]];
        let h = array![-2.0 / E, 2.0 / E];
        let xi = 6.0 - 10.0 / E;

        assert_abs_diff_eq!(
            system.a[[0, 0]],
            h.dot(&h) / 2.0 + lambda * xi,
            epsilon = 1e-13
        );

        let lower = hh.dot(&hh) / 2.0 + &(&hh * lambda);
        let first = hh.dot(&h) / 2.0 + &(&h * lambda);
        for r in 0..2 {
            assert_abs_diff_eq!(system.a[[0, r + 1]], first[r], epsilon = 1e-13);
            assert_abs_diff_eq!(system.a[[r + 1, 0]], first[r], epsilon = 1e-13);
            for c in 0..2 {
                assert_abs_diff_eq!(system.a[[r + 1, c + 1]], lower[[r, c]], epsilon = 1e-13);
            }
        }

        assert_abs_diff_eq!(system.b[0], -xi, epsilon = 1e-13);
        assert_abs_diff_eq!(system.b[1], 2.0 / E, epsilon = 1e-14);
        assert_abs_diff_eq!(system.b[2], -2.0 / E, epsilon = 1e-14);
    }

    #[test]
    fn solve_satisfies_the_system() {
        let data = scattered_data();
        let kernel = GaussianKernel::new(data.view(), 2.0);
        let system = FullSystemBuilder::new(kernel, 1.0).build();
        let x = FullSystemBuilder::solve(&system).unwrap();
        let residual = system.a.dot(&x) - &system.b;
        let scale = system.b.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
        assert!(residual.iter().all(|r| r.abs() < 1e-8 * scale), "{residual:?}");
    }
}
