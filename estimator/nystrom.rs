//! # Nystrom System Assembly
//!
//! Approximates the full score-matching system using only the m basis functions in a
//! [`BasisSet`]. The dominant block shrinks from (N·D)² to m·N·D entries; each entry is
//! an inner product of one row of the Hessian block matrix with one of its columns,
//! evaluated element by element so the block matrix is never stored.
//!
//! The resulting rectangular `(m + 1) × (N·D + 1)` system is solved through its normal
//! equations `A_mn A_mnᵀ x = A_mn b` with a rank-truncated pseudoinverse, because the
//! normal-equation matrix is frequently rank deficient for small bandwidths.

use crate::basis::BasisSet;
use crate::full::LinearSystem;
use crate::index::ParameterLayout;
use crate::kernel::GaussianKernel;
use crate::linalg::{self, PseudoInverseError};
use crate::statistics::ScoreStatistics;
use ndarray::{Array1, Array2, s};
use rayon::prelude::*;
use std::time::Instant;

pub struct NystromSystemBuilder<'k> {
    kernel: GaussianKernel<'k>,
    lambda: f64,
    basis: &'k BasisSet,
    layout: ParameterLayout,
}

impl<'k> NystromSystemBuilder<'k> {
    pub fn new(kernel: GaussianKernel<'k>, lambda: f64, basis: &'k BasisSet) -> Self {
        let layout = ParameterLayout::new(kernel.num_samples(), kernel.dimension());
        debug_assert_eq!(basis.num_params(), layout.len());
        Self {
            kernel,
            lambda,
            basis,
            layout,
        }
    }

    /// Entry `(row, col)` of `H·H/N + λ H` for flat parameter indices `row` and `col`.
    pub fn lower_right_element(&self, row: usize, col: usize) -> f64 {
        let n = self.kernel.num_samples();
        let d = self.kernel.dimension();
        let ai = self.layout.decode(row);
        let bj = self.layout.decode(col);

        let mut g_sum = 0.0;
        for idx_n in 0..n {
            for idx_d in 0..d {
                let g1 = self.kernel.hessian_x_elem(ai.sample, idx_n, ai.dim, idx_d);
                let g2 = self.kernel.hessian_x_elem(idx_n, bj.sample, idx_d, bj.dim);
                g_sum += g1 * g2;
            }
        }

        g_sum / n as f64 + self.lambda * self.kernel.hessian_param(ai, bj)
    }

    /// `H·h/N + λ h`, length N·D, without materialising `H`.
    pub fn first_row(&self, h: &Array1<f64>) -> Array1<f64> {
        let n = self.kernel.num_samples() as f64;
        let nd = self.layout.len();

        let entries: Vec<f64> = (0..nd)
            .into_par_iter()
            .map(|col| {
                let bj = self.layout.decode(col);
                let weighted: f64 = (0..nd)
                    .map(|row| h[row] * self.kernel.hessian_param(bj, self.layout.decode(row)))
                    .sum();
                weighted / n + self.lambda * h[col]
            })
            .collect();

        Array1::from_vec(entries)
    }

    /// Assembles `A_mn` and `b`.
    ///
    /// Row 0 is the first row of the full system, column 0 below it is that row read at
    /// the basis indices, and the remaining block holds [`lower_right_element`] for every
    /// basis row against all N·D columns.
    ///
    /// [`lower_right_element`]: Self::lower_right_element
    pub fn build(&self) -> LinearSystem {
        let nd = self.layout.len();
        let m = self.basis.len();

        let start = Instant::now();
        let stats = ScoreStatistics::compute(&self.kernel);
        log::debug!("Computed h and xi_norm_2 in {:.2?}", start.elapsed());

        let mut a_mn = Array2::zeros((m + 1, nd + 1));
        a_mn[[0, 0]] = stats.offset_entry(self.kernel.num_samples(), self.lambda);

        let start = Instant::now();
        let rows: Vec<Array1<f64>> = self
            .basis
            .indices()
            .par_iter()
            .map(|&row| Array1::from_shape_fn(nd, |col| self.lower_right_element(row, col)))
            .collect();
        for (r, row) in rows.iter().enumerate() {
            a_mn.slice_mut(s![r + 1, 1..]).assign(row);
        }
        log::debug!(
            "Assembled {}x{} lower-right block in {:.2?}",
            m,
            nd,
            start.elapsed()
        );

        let start = Instant::now();
        let first_row = self.first_row(&stats.h);
        a_mn.slice_mut(s![0, 1..]).assign(&first_row);
        for (r, &idx) in self.basis.indices().iter().enumerate() {
            a_mn[[r + 1, 0]] = first_row[idx];
        }
        log::debug!("Computed first row in {:.2?}", start.elapsed());

        LinearSystem {
            a: a_mn,
            b: stats.rhs(),
        }
    }

    /// Solves `(A_mn A_mnᵀ) x = A_mn b` with the pseudoinverse. Returns `alpha_beta`,
    /// length m + 1.
    pub fn solve(system: &LinearSystem) -> Result<Array1<f64>, PseudoInverseError> {
        let a_mn = &system.a;
        let normal = a_mn.dot(&a_mn.t());
        let b_m = a_mn.dot(&system.b);

        let pinv = linalg::pseudo_inverse(&normal)?;
        if pinv.rank < normal.nrows() {
            log::debug!(
                "Normal equations are rank deficient: kept {}/{} singular values",
                pinv.rank,
                normal.nrows()
            );
        }
        Ok(pinv.matrix.dot(&b_m))
    }
}
