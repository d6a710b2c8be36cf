//! Training loop and mixed-precision support.

pub mod scaler;
pub mod trainer;

pub use scaler::GradScaler;
pub use trainer::{load_classifier, EpochStats, Trainer, TrainingConfig};
