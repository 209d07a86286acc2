#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

pub mod basis;
pub mod data;
pub mod density;
pub mod estimate;
pub mod full;
pub mod index;
pub mod kernel;
pub mod linalg;
pub mod model;
pub mod nystrom;
pub mod statistics;

pub use basis::{BasisError, BasisSet};
pub use data::{DataError, load_samples};
pub use estimate::{
    DensityEstimator, EstimationError, KernelExpFamily, KernelExpFamilyNystrom,
    ScoreMatchingProblem, train_model,
};
pub use model::{BasisConfig, EstimatorConfig, ModelError, TrainedModel};
