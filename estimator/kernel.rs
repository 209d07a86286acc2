//! # Gaussian Kernel Derivatives
//!
//! Closed-form derivatives of the isotropic Gaussian kernel
//! `k(x, y) = exp(-‖x - y‖² / σ)` evaluated on pairs of stored samples, or on a stored
//! sample against an external query point.
//!
//! The dataset is a D×N matrix whose column `a` is sample `a`. Nothing here allocates
//! more than a D-vector or a D×D matrix per call, so callers are free to evaluate these
//! from many threads at once.

use crate::index::ParamIndex;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Gaussian kernel over the columns of a borrowed D×N data matrix.
#[derive(Debug, Clone, Copy)]
pub struct GaussianKernel<'a> {
    data: ArrayView2<'a, f64>,
    sigma: f64,
}

impl<'a> GaussianKernel<'a> {
    /// `data` has shape `[D, N]`. `sigma` is assumed positive; validation happens where
    /// the estimator is constructed.
    pub fn new(data: ArrayView2<'a, f64>, sigma: f64) -> Self {
        Self { data, sigma }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    #[inline]
    fn sample(&self, a: usize) -> ArrayView1<'_, f64> {
        self.data.column(a)
    }

    #[inline]
    fn sq_distance(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
        x.iter().zip(y.iter()).map(|(&u, &v)| (u - v) * (u - v)).sum()
    }

    /// `x_a - x_b`.
    fn difference(&self, a: usize, b: usize) -> Array1<f64> {
        &self.sample(a) - &self.sample(b)
    }

    pub fn kernel(&self, a: usize, b: usize) -> f64 {
        (-Self::sq_distance(self.sample(a), self.sample(b)) / self.sigma).exp()
    }

    /// ∂k/∂x_i at `(x_a, x_b)`: `2k (y_i - x_i) / σ`.
    pub fn grad_x(&self, a: usize, b: usize, i: usize) -> f64 {
        let k = self.kernel(a, b);
        2.0 * k * (self.data[[i, b]] - self.data[[i, a]]) / self.sigma
    }

    /// D×D matrix `(2k/σ) I - (4k/σ²) (x - y)(x - y)ᵀ`.
    pub fn hessian_x(&self, a: usize, b: usize) -> Array2<f64> {
        let d = self.dimension();
        let diff = self.difference(a, b);
        let k = (-diff.dot(&diff) / self.sigma).exp();
        let sigma_sq = self.sigma * self.sigma;

        let mut result = Array2::from_shape_fn((d, d), |(i, j)| {
            -4.0 * k * diff[i] * diff[j] / sigma_sq
        });
        result.diag_mut().mapv_inplace(|v| v + 2.0 * k / self.sigma);
        result
    }

    /// Single entry `(i, j)` of [`hessian_x`](Self::hessian_x) without building the matrix.
    pub fn hessian_x_elem(&self, a: usize, b: usize, i: usize, j: usize) -> f64 {
        let x = self.sample(a);
        let y = self.sample(b);
        let k = (-Self::sq_distance(x, y) / self.sigma).exp();

        let diff_i = y[i] - x[i];
        let diff_j = y[j] - x[j];
        let ridge = if i == j { 2.0 / self.sigma } else { 0.0 };

        k * (ridge - 4.0 * diff_i * diff_j / (self.sigma * self.sigma))
    }

    /// Hessian entry addressed by two decoded parameter indices.
    #[inline]
    pub fn hessian_param(&self, row: ParamIndex, col: ParamIndex) -> f64 {
        self.hessian_x_elem(row.sample, col.sample, row.dim, col.dim)
    }

    /// Third-order mixed derivative tensor contracted to D×D. With `d = x - y`:
    ///
    /// `R[i][j] = (2/σ)³ k d_i² d_j - 2 (2/σ)² k d_i δ_ij - (2/σ)² k d_j`
    ///
    /// Column sums of this matrix, averaged over the first argument, give `h`.
    pub fn third_mixed(&self, a: usize, b: usize) -> Array2<f64> {
        let d = self.dimension();
        let diff = self.difference(a, b);
        let diff2 = diff.mapv(|v| v * v);
        let k = (-diff2.sum() / self.sigma).exp();

        let two_over_sigma = 2.0 / self.sigma;
        let c3 = two_over_sigma.powi(3) * k;
        let c2 = two_over_sigma.powi(2) * k;

        let mut result = Array2::from_shape_fn((d, d), |(i, j)| {
            c3 * diff2[i] * diff[j] - c2 * diff[j]
        });
        for i in 0..d {
            result[[i, i]] -= 2.0 * c2 * diff[i];
        }
        result
    }

    /// Fourth-order mixed derivative tensor contracted to D×D. With `s = (x - y)²`:
    ///
    /// `R[i][j] = (2/σ)⁴ k s_i s_j - (2/σ)³ k (s_i + s_j) + (2/σ)² k`
    /// plus `-4 (2/σ)³ k s_i + 2 (2/σ)² k` on the diagonal.
    pub fn fourth_mixed(&self, a: usize, b: usize) -> Array2<f64> {
        let d = self.dimension();
        let diff2 = self.difference(a, b).mapv(|v| v * v);
        let k = (-diff2.sum() / self.sigma).exp();

        let two_over_sigma = 2.0 / self.sigma;
        let c4 = two_over_sigma.powi(4) * k;
        let c3 = two_over_sigma.powi(3) * k;
        let c2 = two_over_sigma.powi(2) * k;

        let mut result = Array2::from_shape_fn((d, d), |(i, j)| {
            c4 * diff2[i] * diff2[j] - c3 * (diff2[i] + diff2[j]) + c2
        });
        for i in 0..d {
            // -6 s_i from the diagonal term, +2 s_i undoing the double-counted row/column
            result[[i, i]] += -4.0 * c3 * diff2[i] + 2.0 * c2;
        }
        result
    }

    /// `k(q, x_b)` for an external point `q`.
    pub fn kernel_single(&self, query: ArrayView1<f64>, b: usize) -> f64 {
        (-Self::sq_distance(query, self.sample(b)) / self.sigma).exp()
    }

    /// ∂k/∂q_i at `(q, x_b)`: `2k (x_b,i - q_i) / σ`.
    pub fn dx_single(&self, query: ArrayView1<f64>, b: usize, i: usize) -> f64 {
        let k = self.kernel_single(query, b);
        2.0 * k * (self.data[[i, b]] - query[i]) / self.sigma
    }

    /// ∂²k/∂q_i² at `(q, x_b)`: `k ((q_i - x_b,i)² (2/σ)² - 2/σ)`.
    pub fn dxdx_single(&self, query: ArrayView1<f64>, b: usize, i: usize) -> f64 {
        let k = self.kernel_single(query, b);
        let diff = query[i] - self.data[[i, b]];
        k * (diff * diff * (2.0 / self.sigma).powi(2) - 2.0 / self.sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn toy_data() -> Array2<f64> {
        // D = 3, N = 4
        array![
            [0.0, 0.5, -1.2, 0.3],
            [1.0, -0.4, 0.7, 0.0],
            [-0.3, 0.9, 0.2, 1.1]
        ]
    }

    #[test]
    fn identical_points_reduce_to_ridge_terms() {
        let data = toy_data();
        let sigma = 1.7;
        let kernel = GaussianKernel::new(data.view(), sigma);

        for a in 0..kernel.num_samples() {
            assert_abs_diff_eq!(kernel.kernel(a, a), 1.0, epsilon = 1e-15);
            for i in 0..kernel.dimension() {
                assert_eq!(kernel.grad_x(a, a, i), 0.0);
            }
            let h = kernel.hessian_x(a, a);
            for i in 0..3 {
                for j in 0..3 {
                    let expected = if i == j { 2.0 / sigma } else { 0.0 };
                    assert_abs_diff_eq!(h[[i, j]], expected, epsilon = 1e-14);
                }
            }
            assert!(kernel.third_mixed(a, a).iter().all(|&v| v == 0.0));

            let c2 = (2.0 / sigma).powi(2);
            let f = kernel.fourth_mixed(a, a);
            for i in 0..3 {
                for j in 0..3 {
                    let expected = if i == j { 3.0 * c2 } else { c2 };
                    assert_abs_diff_eq!(f[[i, j]], expected, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn hessian_is_symmetric_and_matches_elementwise_form() {
        let data = toy_data();
        let kernel = GaussianKernel::new(data.view(), 0.8);

        for a in 0..4 {
            for b in 0..4 {
                let h = kernel.hessian_x(a, b);
                let h_swapped = kernel.hessian_x(b, a);
                for i in 0..3 {
                    for j in 0..3 {
                        assert_abs_diff_eq!(h[[i, j]], h[[j, i]], epsilon = 1e-15);
                        assert_abs_diff_eq!(h[[i, j]], h_swapped[[i, j]], epsilon = 1e-15);
                        assert_abs_diff_eq!(
                            h[[i, j]],
                            kernel.hessian_x_elem(a, b, i, j),
                            epsilon = 1e-14
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn fourth_mixed_is_symmetric() {
        let data = toy_data();
        let kernel = GaussianKernel::new(data.view(), 2.5);
        let f = kernel.fourth_mixed(0, 2);
        for i in 0..3 {
            for j in 0..i {
                assert_abs_diff_eq!(f[[i, j]], f[[j, i]], epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn one_dimensional_derivatives_match_hermite_forms() {
        // For σ = 1 and d = x - y the x-derivatives of exp(-d²) are Hermite-like
        // polynomials in d; the mixed tensors pick up a sign for every y-derivative.
        let data = array![[0.0, 1.0, -0.6]];
        let kernel = GaussianKernel::new(data.view(), 1.0);

        for (a, b) in [(0, 1), (1, 0), (2, 1), (0, 2)] {
            let d = data[[0, a]] - data[[0, b]];
            let k = (-d * d).exp();
            assert_abs_diff_eq!(
                kernel.third_mixed(a, b)[[0, 0]],
                (8.0 * d.powi(3) - 12.0 * d) * k,
                epsilon = 1e-13
            );
            assert_abs_diff_eq!(
                kernel.fourth_mixed(a, b)[[0, 0]],
                (16.0 * d.powi(4) - 48.0 * d * d + 12.0) * k,
                epsilon = 1e-12
            );
            assert_abs_diff_eq!(
                kernel.hessian_x(a, b)[[0, 0]],
                (2.0 - 4.0 * d * d) * k,
                epsilon = 1e-14
            );
        }
    }

    #[test]
    fn query_derivatives_match_finite_differences() {
        let data = toy_data();
        let kernel = GaussianKernel::new(data.view(), 1.3);
        let query = array![0.2, 0.1, -0.5];
        let step = 1e-4;

        for b in 0..kernel.num_samples() {
            for i in 0..kernel.dimension() {
                let mut plus: Array1<f64> = query.clone();
                let mut minus: Array1<f64> = query.clone();
                plus[i] += step;
                minus[i] -= step;
                let k_plus = kernel.kernel_single(plus.view(), b);
                let k_minus = kernel.kernel_single(minus.view(), b);
                let k_mid = kernel.kernel_single(query.view(), b);

                let fd_grad = (k_plus - k_minus) / (2.0 * step);
                let fd_curv = (k_plus - 2.0 * k_mid + k_minus) / (step * step);

                assert_abs_diff_eq!(
                    kernel.dx_single(query.view(), b, i),
                    fd_grad,
                    epsilon = 1e-7
                );
                assert_abs_diff_eq!(
                    kernel.dxdx_single(query.view(), b, i),
                    fd_curv,
                    epsilon = 1e-5
                );
            }
        }
    }

    #[test]
    fn grad_x_matches_query_gradient_at_a_stored_sample() {
        let data = toy_data();
        let kernel = GaussianKernel::new(data.view(), 0.9);
        let x0 = data.column(0);
        for i in 0..3 {
            assert_abs_diff_eq!(
                kernel.grad_x(0, 2, i),
                kernel.dx_single(x0, 2, i),
                epsilon = 1e-15
            );
        }
    }
}
