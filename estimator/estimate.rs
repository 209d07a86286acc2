// estimator/estimate.rs

//! # Score-Matching Estimation
//!
//! This module ties the pieces together. A [`ScoreMatchingProblem`] owns the validated
//! dataset and hyperparameters; the two estimators turn it into a coefficient vector:
//!
//! 1.  **[`KernelExpFamily`]:** builds the dense (N·D + 1)² system over every parameter
//!     index and solves it directly.
//!
//! 2.  **[`KernelExpFamilyNystrom`]:** restricts the system to m basis indices and solves
//!     the normal equations with a rank-truncated pseudoinverse.
//!
//! Both implement [`DensityEstimator`], so evaluation is written once against the shared
//! basis/coefficient contract.

use crate::basis::{BasisError, BasisSet};
use crate::density::DensityEvaluator;
use crate::full::FullSystemBuilder;
use crate::index::ParameterLayout;
use crate::kernel::GaussianKernel;
use crate::linalg::PseudoInverseError;
use crate::model::{BasisConfig, EstimatorConfig, TrainedModel};
use crate::nystrom::NystromSystemBuilder;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use std::time::Instant;
use thiserror::Error;

/// A comprehensive error type for the estimation process.
#[derive(Error, Debug)]
pub enum EstimationError {
    #[error("The dataset is empty ({dimension} dimensions x {num_samples} samples).")]
    EmptyDataset {
        dimension: usize,
        num_samples: usize,
    },

    #[error("The dataset contains a non-finite value at dimension {dim}, sample {sample}.")]
    NonFiniteData { dim: usize, sample: usize },

    #[error("Kernel bandwidth sigma must be positive and finite, but was {0}.")]
    InvalidSigma(f64),

    #[error("Regularization weight lambda must be non-negative and finite, but was {0}.")]
    InvalidLambda(f64),

    #[error("Invalid Nystrom basis: {0}")]
    Basis(#[from] BasisError),

    #[error("Query point has {found} dimensions, but the model was fitted on {expected}.")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("The estimator has not been fitted. Call fit() before evaluating it.")]
    NotFitted,

    #[error("Solving the score-matching system failed: {0}")]
    LinearSystemSolveFailed(#[from] PseudoInverseError),
}

/// Validated dataset and hyperparameters.
#[derive(Debug, Clone)]
pub struct ScoreMatchingProblem {
    /// Shape `[D, N]`, one sample per column.
    data: Array2<f64>,
    sigma: f64,
    lambda: f64,
}

impl ScoreMatchingProblem {
    pub fn new(data: Array2<f64>, sigma: f64, lambda: f64) -> Result<Self, EstimationError> {
        let (dimension, num_samples) = data.dim();
        if dimension == 0 || num_samples == 0 {
            return Err(EstimationError::EmptyDataset {
                dimension,
                num_samples,
            });
        }
        if let Some(((dim, sample), _)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(EstimationError::NonFiniteData { dim, sample });
        }
        validate_hyperparameters(sigma, lambda)?;
        Ok(Self {
            data,
            sigma,
            lambda,
        })
    }

    pub fn kernel(&self) -> GaussianKernel<'_> {
        GaussianKernel::new(self.data.view(), self.sigma)
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn dimension(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn layout(&self) -> ParameterLayout {
        ParameterLayout::new(self.num_samples(), self.dimension())
    }
}

pub(crate) fn validate_hyperparameters(sigma: f64, lambda: f64) -> Result<(), EstimationError> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(EstimationError::InvalidSigma(sigma));
    }
    if !(lambda.is_finite() && lambda >= 0.0) {
        return Err(EstimationError::InvalidLambda(lambda));
    }
    Ok(())
}

/// The shared capability of the full and Nystrom estimators.
pub trait DensityEstimator {
    fn problem(&self) -> &ScoreMatchingProblem;

    /// Parameter indices whose kernel gradients carry coefficients `alpha_beta[1..]`.
    fn basis(&self) -> &BasisSet;

    /// `alpha_beta`, present once [`fit`](Self::fit) has succeeded.
    fn coefficients(&self) -> Option<&Array1<f64>>;

    /// Builds and solves the score-matching system. Calling it again recomputes from
    /// scratch.
    fn fit(&mut self) -> Result<(), EstimationError>;

    fn into_parts(self) -> (ScoreMatchingProblem, BasisSet, Option<Array1<f64>>)
    where
        Self: Sized;

    fn dimension(&self) -> usize {
        self.problem().dimension()
    }

    fn num_data(&self) -> usize {
        self.problem().num_samples()
    }

    fn num_basis(&self) -> usize {
        self.basis().len()
    }

    fn evaluator(&self) -> Result<DensityEvaluator<'_>, EstimationError> {
        let alpha_beta = self.coefficients().ok_or(EstimationError::NotFitted)?;
        Ok(DensityEvaluator::new(
            self.problem().kernel(),
            self.basis().indices(),
            alpha_beta.view(),
        ))
    }

    fn log_pdf(&self, x: ArrayView1<f64>) -> Result<f64, EstimationError> {
        check_query_dimension(self.dimension(), x.len())?;
        Ok(self.evaluator()?.log_pdf(x))
    }

    /// Evaluates every column of a D×M query matrix.
    fn log_pdf_multiple(
        &self,
        queries: ArrayView2<f64>,
    ) -> Result<Array1<f64>, EstimationError> {
        check_query_dimension(self.dimension(), queries.nrows())?;
        Ok(self.evaluator()?.log_pdf_multiple(queries))
    }
}

pub(crate) fn check_query_dimension(expected: usize, found: usize) -> Result<(), EstimationError> {
    if expected != found {
        return Err(EstimationError::DimensionMismatch { expected, found });
    }
    Ok(())
}

/// The full estimator: one basis function per parameter index.
#[derive(Debug, Clone)]
pub struct KernelExpFamily {
    problem: ScoreMatchingProblem,
    basis: BasisSet,
    alpha_beta: Option<Array1<f64>>,
}

impl KernelExpFamily {
    pub fn new(problem: ScoreMatchingProblem) -> Result<Self, EstimationError> {
        let basis = BasisSet::full(problem.layout().len())?;
        Ok(Self {
            problem,
            basis,
            alpha_beta: None,
        })
    }
}

impl DensityEstimator for KernelExpFamily {
    fn problem(&self) -> &ScoreMatchingProblem {
        &self.problem
    }

    fn basis(&self) -> &BasisSet {
        &self.basis
    }

    fn coefficients(&self) -> Option<&Array1<f64>> {
        self.alpha_beta.as_ref()
    }

    fn fit(&mut self) -> Result<(), EstimationError> {
        log::info!(
            "Fitting full kernel exponential family: {} samples, {} dimensions, {} basis functions.",
            self.num_data(),
            self.dimension(),
            self.num_basis()
        );
        let start = Instant::now();
        self.alpha_beta = None;

        let builder = FullSystemBuilder::new(self.problem.kernel(), self.problem.lambda());
        let system = builder.build();
        let alpha_beta = FullSystemBuilder::solve(&system)?;

        log::info!("Full fit completed in {:.2?}", start.elapsed());
        self.alpha_beta = Some(alpha_beta);
        Ok(())
    }

    fn into_parts(self) -> (ScoreMatchingProblem, BasisSet, Option<Array1<f64>>) {
        (self.problem, self.basis, self.alpha_beta)
    }
}

/// The low-rank estimator over a subset of m parameter indices.
#[derive(Debug, Clone)]
pub struct KernelExpFamilyNystrom {
    problem: ScoreMatchingProblem,
    basis: BasisSet,
    alpha_beta: Option<Array1<f64>>,
}

impl KernelExpFamilyNystrom {
    /// Uses a caller-supplied, strictly increasing index sequence.
    pub fn with_basis(
        problem: ScoreMatchingProblem,
        indices: Vec<usize>,
    ) -> Result<Self, EstimationError> {
        let basis = BasisSet::explicit(indices, problem.layout().len())?;
        Ok(Self::from_parts(problem, basis))
    }

    /// Draws `size` indices uniformly at random; `seed` makes the draw reproducible.
    pub fn with_random_basis(
        problem: ScoreMatchingProblem,
        size: usize,
        seed: u64,
    ) -> Result<Self, EstimationError> {
        let basis = BasisSet::random_seeded(size, problem.layout().len(), seed)?;
        Ok(Self::from_parts(problem, basis))
    }

    /// Uses the indices of an existing [`BasisSet`], rechecked against this problem's
    /// parameter space.
    pub fn with_basis_set(
        problem: ScoreMatchingProblem,
        basis: BasisSet,
    ) -> Result<Self, EstimationError> {
        Self::with_basis(problem, basis.indices().to_vec())
    }

    fn from_parts(problem: ScoreMatchingProblem, basis: BasisSet) -> Self {
        Self {
            problem,
            basis,
            alpha_beta: None,
        }
    }
}

impl DensityEstimator for KernelExpFamilyNystrom {
    fn problem(&self) -> &ScoreMatchingProblem {
        &self.problem
    }

    fn basis(&self) -> &BasisSet {
        &self.basis
    }

    fn coefficients(&self) -> Option<&Array1<f64>> {
        self.alpha_beta.as_ref()
    }

    fn fit(&mut self) -> Result<(), EstimationError> {
        log::info!(
            "Fitting Nystrom kernel exponential family: {} samples, {} dimensions, {}/{} basis functions.",
            self.num_data(),
            self.dimension(),
            self.num_basis(),
            self.basis.num_params()
        );
        let start = Instant::now();
        self.alpha_beta = None;

        let builder =
            NystromSystemBuilder::new(self.problem.kernel(), self.problem.lambda(), &self.basis);
        let system = builder.build();
        let alpha_beta = NystromSystemBuilder::solve(&system)?;

        log::info!("Nystrom fit completed in {:.2?}", start.elapsed());
        self.alpha_beta = Some(alpha_beta);
        Ok(())
    }

    fn into_parts(self) -> (ScoreMatchingProblem, BasisSet, Option<Array1<f64>>) {
        (self.problem, self.basis, self.alpha_beta)
    }
}

/// The main entry point for model training.
///
/// `data` has shape `[D, N]`. The estimator is chosen from `config.basis`; the returned
/// [`TrainedModel`] carries everything needed to evaluate the fit later.
pub fn train_model(
    data: Array2<f64>,
    config: &EstimatorConfig,
) -> Result<TrainedModel, EstimationError> {
    let problem = ScoreMatchingProblem::new(data, config.sigma, config.lambda)?;
    let num_params = problem.layout().len();

    let (problem, basis, alpha_beta) = match &config.basis {
        BasisConfig::Full => fit_into_parts(KernelExpFamily::new(problem)?)?,
        BasisConfig::Random { size, seed } => {
            fit_into_parts(KernelExpFamilyNystrom::with_random_basis(problem, *size, *seed)?)?
        }
        BasisConfig::Explicit { indices } => {
            fit_into_parts(KernelExpFamilyNystrom::with_basis(problem, indices.clone())?)?
        }
    };
    debug_assert_eq!(basis.num_params(), num_params);

    Ok(TrainedModel {
        config: config.clone(),
        data: problem.data,
        basis,
        alpha_beta,
    })
}

fn fit_into_parts<E: DensityEstimator>(
    mut estimator: E,
) -> Result<(ScoreMatchingProblem, BasisSet, Array1<f64>), EstimationError> {
    estimator.fit()?;
    let (problem, basis, alpha_beta) = estimator.into_parts();
    let alpha_beta = alpha_beta.ok_or(EstimationError::NotFitted)?;
    Ok((problem, basis, alpha_beta))
}
