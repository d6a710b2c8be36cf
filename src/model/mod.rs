//! Model definitions.

pub mod cnn;

pub use cnn::{default_config, ConvBlock, LesionClassifier, LesionClassifierConfig};
