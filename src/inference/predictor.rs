//! Single-image inference.

use std::collections::BTreeMap;
use std::path::Path;

use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::TensorData;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::dataset::Transform;
use crate::labels::LesionClass;
use crate::model::LesionClassifier;
use crate::training::load_classifier;
use crate::utils::error::{Error, Result};
use crate::IMAGE_SIZE;

/// Softmax probabilities from a `[1, num_classes]` logits tensor.
pub fn softmax_probs<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<f32>> {
    softmax(logits, 1)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| Error::Model(format!("failed to read probabilities: {:?}", e)))
}

/// Classification result for one image.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Highest-probability class.
    pub class: LesionClass,

    /// Probability of that class.
    pub confidence: f32,

    /// Full distribution, indexed by class index.
    pub probabilities: Vec<f32>,
}

impl Prediction {
    pub fn to_response(&self) -> PredictionResponse {
        let probabilities = LesionClass::ALL
            .iter()
            .map(|class| {
                (
                    class.code().to_string(),
                    format!("{:.2}%", self.probabilities[class.index()] * 100.0),
                )
            })
            .collect();

        PredictionResponse {
            predicted_class: self.class.code().to_string(),
            predicted_name: self.class.display_name().to_string(),
            description: self.class.description().to_string(),
            probabilities,
            confidence: format!("{:.2}%", self.confidence * 100.0),
        }
    }
}

/// Serializable prediction with human-readable percentages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predicted_class: String,
    pub predicted_name: String,
    pub description: String,
    pub probabilities: BTreeMap<String, String>,
    pub confidence: String,
}

/// Loads a trained model once and classifies images with the deterministic
/// preprocessing pipeline.
pub struct Predictor<B: Backend> {
    model: LesionClassifier<B>,
    transform: Transform,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    pub fn new(model: LesionClassifier<B>, device: B::Device) -> Self {
        Self {
            model,
            transform: Transform::eval(),
            device,
        }
    }

    /// Load model weights from a checkpoint. A missing or corrupt checkpoint
    /// is fatal, there is nothing useful to serve without weights.
    pub fn from_file(path: &Path, device: B::Device) -> Result<Self> {
        let model = load_classifier::<B>(path, &device)?;
        Ok(Self::new(model, device))
    }

    /// Classify a raw image payload (e.g. an uploaded file).
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        if bytes.is_empty() {
            return Err(Error::MissingImage);
        }
        let image =
            image::load_from_memory(bytes).map_err(|e| Error::ImageDecode(e.to_string()))?;
        self.predict_image(&image)
    }

    /// Classify a decoded image.
    pub fn predict_image(&self, image: &DynamicImage) -> Result<Prediction> {
        let side = IMAGE_SIZE as usize;
        let data = self.transform.apply(image);
        let input = Tensor::<B, 4>::from_floats(
            TensorData::new(data, [1, 3, side, side]),
            &self.device,
        );

        let logits = self.model.forward(input);
        let probabilities = softmax_probs(logits)?;

        let (best_idx, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .ok_or_else(|| Error::Model("empty probability vector".into()))?;
        let class = LesionClass::from_index(best_idx)
            .ok_or_else(|| Error::Model(format!("invalid class index {}", best_idx)))?;

        Ok(Prediction {
            class,
            confidence,
            probabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;

    #[test]
    fn test_softmax_probs_sum_to_one() {
        let device = NdArrayDevice::default();
        let logits = Tensor::<NdArray, 2>::from_floats(
            TensorData::new(vec![1.0f32, 2.0, 0.5, -1.0, 0.0, 3.0, 1.5], [1, 7]),
            &device,
        );
        let probs = softmax_probs(logits).unwrap();
        assert_eq!(probs.len(), 7);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_response_formats_percentages() {
        let prediction = Prediction {
            class: LesionClass::Nv,
            confidence: 0.875,
            probabilities: vec![0.0125, 0.875, 0.0125, 0.025, 0.025, 0.025, 0.025],
        };
        let response = prediction.to_response();
        assert_eq!(response.predicted_class, "NV");
        assert_eq!(response.confidence, "87.50%");
        assert_eq!(response.probabilities.len(), 7);
        assert_eq!(response.probabilities["NV"], "87.50%");
    }

    #[test]
    fn test_empty_payload_rejected() {
        let device = NdArrayDevice::default();
        let model = crate::model::default_config().init::<NdArray>(&device);
        let predictor = Predictor::new(model, device);
        assert!(matches!(
            predictor.predict_bytes(&[]),
            Err(Error::MissingImage)
        ));
    }

    #[test]
    fn test_garbage_payload_rejected() {
        let device = NdArrayDevice::default();
        let model = crate::model::default_config().init::<NdArray>(&device);
        let predictor = Predictor::new(model, device);
        assert!(matches!(
            predictor.predict_bytes(b"definitely not an image"),
            Err(Error::ImageDecode(_))
        ));
    }
}
