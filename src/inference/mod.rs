//! Model loading and single-image prediction.

pub mod predictor;

pub use predictor::{softmax_probs, Prediction, PredictionResponse, Predictor};
