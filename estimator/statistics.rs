//! Data statistics shared by the full and Nystrom system builders.
//!
//! Each all-pairs reduction is a parallel map over the outer sample followed by a
//! sequential reduction in sample order, so the floating-point result does not depend on
//! how rayon schedules the work.

use crate::kernel::GaussianKernel;
use ndarray::{Array1, Axis, s};
use rayon::prelude::*;

/// The data-dependent pieces of the score-matching objective that do not depend on the
/// basis.
#[derive(Debug, Clone)]
pub struct ScoreStatistics {
    /// Length N·D; block `b` is the average over `a` of the column sums of
    /// `third_mixed(a, b)`.
    pub h: Array1<f64>,
    /// Average over all sample pairs of the entry sum of `fourth_mixed(a, b)`.
    pub xi_norm_2: f64,
}

impl ScoreStatistics {
    pub fn compute(kernel: &GaussianKernel) -> Self {
        Self {
            h: compute_h(kernel),
            xi_norm_2: compute_xi_norm_2(kernel),
        }
    }

    /// `A[0, 0] = ‖h‖² / N + λ · xi_norm_2`.
    pub fn offset_entry(&self, num_samples: usize, lambda: f64) -> f64 {
        self.h.dot(&self.h) / num_samples as f64 + lambda * self.xi_norm_2
    }

    /// `b = [-xi_norm_2, -h]`, length N·D + 1.
    pub fn rhs(&self) -> Array1<f64> {
        let mut b = Array1::zeros(self.h.len() + 1);
        b[0] = -self.xi_norm_2;
        b.slice_mut(s![1..]).assign(&self.h.mapv(|v| -v));
        b
    }
}

/// First-order statistic `h`, length N·D.
pub fn compute_h(kernel: &GaussianKernel) -> Array1<f64> {
    let n = kernel.num_samples();
    let d = kernel.dimension();

    let blocks: Vec<Array1<f64>> = (0..n)
        .into_par_iter()
        .map(|b| {
            let mut block = Array1::<f64>::zeros(d);
            for a in 0..n {
                block += &kernel.third_mixed(a, b).sum_axis(Axis(0));
            }
            block
        })
        .collect();

    let mut h = Array1::zeros(n * d);
    for (b, block) in blocks.iter().enumerate() {
        h.slice_mut(s![b * d..(b + 1) * d]).assign(block);
    }
    h /= n as f64;
    h
}

/// Scalar normaliser `xi_norm_2 = Σ_{a,b} sum(fourth_mixed(a, b)) / N²`.
pub fn compute_xi_norm_2(kernel: &GaussianKernel) -> f64 {
    let n = kernel.num_samples();

    let partial_sums: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|a| (0..n).map(|b| kernel.fourth_mixed(a, b).sum()).sum::<f64>())
        .collect();

    partial_sums.iter().sum::<f64>() / (n * n) as f64
}
