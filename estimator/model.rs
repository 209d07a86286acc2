use crate::basis::BasisSet;
use crate::density::DensityEvaluator;
use crate::estimate::{self, EstimationError, ScoreMatchingProblem};
use crate::kernel::GaussianKernel;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

// --- Public Data Structures ---
// These structs define the human-readable format of the estimator configuration and of
// the trained model when serialized to a TOML file.

/// How the basis functions of the fit are chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BasisConfig {
    /// Every parameter index; fits the full estimator.
    #[default]
    Full,
    /// `size` indices drawn uniformly at random with a seeded generator.
    Random { size: usize, seed: u64 },
    /// A caller-supplied, strictly increasing list of parameter indices.
    Explicit { indices: Vec<usize> },
}

/// The complete set of hyperparameters for one fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Gaussian kernel bandwidth, `k(x, y) = exp(-‖x - y‖² / sigma)`.
    pub sigma: f64,
    /// Regularization weight.
    pub lambda: f64,
    #[serde(default)]
    pub basis: BasisConfig,
}

impl EstimatorConfig {
    /// Checks the hyperparameters without looking at any data.
    pub fn validate(&self) -> Result<(), EstimationError> {
        estimate::validate_hyperparameters(self.sigma, self.lambda)
    }

    /// Loads and validates a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }
}

/// The top-level, self-contained, trained model artifact.
///
/// The training data is stored alongside the coefficients because every basis function
/// is a kernel gradient anchored at a training sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub config: EstimatorConfig,
    /// Shape `[D, N]`.
    pub data: Array2<f64>,
    pub basis: BasisSet,
    /// Length `basis.len() + 1`.
    pub alpha_beta: Array1<f64>,
}

/// Custom error type for model loading, saving, and evaluation.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("{0}")]
    Estimation(#[from] EstimationError),
    #[error(
        "Model file is inconsistent: {basis_len} basis functions but {coefficients} coefficients."
    )]
    CoefficientCountMismatch { basis_len: usize, coefficients: usize },
}

impl TrainedModel {
    pub fn dimension(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_data(&self) -> usize {
        self.data.ncols()
    }

    pub fn num_basis(&self) -> usize {
        self.basis.len()
    }

    /// The public fields can be edited after loading, so every evaluation rechecks that
    /// the basis fits the stored data and that there is one coefficient per basis function
    /// plus the curvature weight.
    fn evaluator(&self) -> Result<DensityEvaluator<'_>, ModelError> {
        self.check_coefficients()?;
        BasisSet::explicit(self.basis.indices().to_vec(), self.data.len())
            .map_err(EstimationError::from)?;
        Ok(DensityEvaluator::new(
            GaussianKernel::new(self.data.view(), self.config.sigma),
            self.basis.indices(),
            self.alpha_beta.view(),
        ))
    }

    /// Evaluates the fitted statistic at a single point of length D.
    pub fn log_pdf(&self, x: ArrayView1<f64>) -> Result<f64, ModelError> {
        estimate::check_query_dimension(self.dimension(), x.len())?;
        Ok(self.evaluator()?.log_pdf(x))
    }

    /// Evaluates every column of a D×M query matrix.
    pub fn log_pdf_multiple(&self, queries: ArrayView2<f64>) -> Result<Array1<f64>, ModelError> {
        estimate::check_query_dimension(self.dimension(), queries.nrows())?;
        Ok(self.evaluator()?.log_pdf_multiple(queries))
    }

    /// Saves the trained model to a file in a human-readable TOML format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads a trained model from a TOML file and re-checks its internal consistency.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let model: Self = toml::from_str(&toml_string)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), ModelError> {
        // Revalidates data and hyperparameters; the problem itself is discarded.
        let problem =
            ScoreMatchingProblem::new(self.data.clone(), self.config.sigma, self.config.lambda)?;
        BasisSet::explicit(self.basis.indices().to_vec(), problem.layout().len())
            .map_err(EstimationError::from)?;
        self.check_coefficients()
    }

    fn check_coefficients(&self) -> Result<(), ModelError> {
        if self.alpha_beta.len() != self.basis.len() + 1 {
            return Err(ModelError::CoefficientCountMismatch {
                basis_len: self.basis.len(),
                coefficients: self.alpha_beta.len(),
            });
        }
        Ok(())
    }
}
