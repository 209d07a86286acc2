use crate::index::ParameterLayout;
use crate::kernel::GaussianKernel;
use ndarray::parallel::prelude::*;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

/// Evaluates a fitted model at query points.
///
/// `alpha_beta[0]` weighs the averaged curvature term and `alpha_beta[1 + k]` the kernel
/// gradient at the k-th basis index. The result is unnormalised: no partition function is
/// computed, so values are only comparable between points under the same fit.
pub struct DensityEvaluator<'a> {
    kernel: GaussianKernel<'a>,
    basis: &'a [usize],
    alpha_beta: ArrayView1<'a, f64>,
    layout: ParameterLayout,
}

impl<'a> DensityEvaluator<'a> {
    pub fn new(
        kernel: GaussianKernel<'a>,
        basis: &'a [usize],
        alpha_beta: ArrayView1<'a, f64>,
    ) -> Self {
        debug_assert_eq!(alpha_beta.len(), basis.len() + 1);
        let layout = ParameterLayout::new(kernel.num_samples(), kernel.dimension());
        Self {
            kernel,
            basis,
            alpha_beta,
            layout,
        }
    }

    /// `x` must have length D; the caller checks this.
    pub fn log_pdf(&self, x: ArrayView1<f64>) -> f64 {
        let n = self.kernel.num_samples() as f64;
        let mut xi = 0.0;
        let mut beta_sum = 0.0;

        for (k, &flat) in self.basis.iter().enumerate() {
            let ai = self.layout.decode(flat);
            let grad = self.kernel.dx_single(x, ai.sample, ai.dim);
            let curvature = self.kernel.dxdx_single(x, ai.sample, ai.dim);

            xi += curvature / n;
            beta_sum += grad * self.alpha_beta[1 + k];
        }

        self.alpha_beta[0] * xi + beta_sum
    }

    /// Evaluates every column of a D×M query matrix.
    pub fn log_pdf_multiple(&self, queries: ArrayView2<f64>) -> Array1<f64> {
        let values: Vec<f64> = queries
            .axis_iter(Axis(1))
            .into_par_iter()
            .map(|x| self.log_pdf(x))
            .collect();
        Array1::from_vec(values)
    }
}
