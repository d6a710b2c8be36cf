//! Training, evaluation and inference for a seven-class dermatoscopic
//! lesion classifier.
//!
//! The pipeline loads a one-hot ground-truth manifest, splits it with a
//! seeded stratified shuffle, augments training images on every access, and
//! trains a small CNN with mixed-precision loss scaling. On top of that sit
//! a deterministic evaluation loop with misclassification analysis, a
//! hyperparameter search with median pruning, and a single-image predictor
//! for serving.

pub mod backend;
pub mod dataset;
pub mod eval;
pub mod hpo;
pub mod inference;
pub mod labels;
pub mod model;
pub mod training;
pub mod utils;

pub use backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
pub use labels::{LesionClass, NUM_CLASSES};
pub use utils::error::{Error, Result};

/// Side length of the square model input, in pixels.
pub const IMAGE_SIZE: u32 = 224;
