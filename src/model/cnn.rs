//! Convolutional classifier for dermatoscopic lesion images.
//!
//! Three conv/pool stages feed a two-layer classification head. The model
//! outputs raw logits; softmax is applied by callers that need
//! probabilities, the loss works on logits directly.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

use crate::labels::NUM_CLASSES;
use crate::IMAGE_SIZE;

/// One conv stage: 3x3 valid convolution, ReLU, 2x2 max-pool.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
    pool: MaxPool2d,
    activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    fn new(channels: [usize; 2], device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new(channels, [3, 3]).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.activation.forward(x);
        self.pool.forward(x)
    }
}

/// Configuration for [`LesionClassifier`].
#[derive(Config, Debug)]
pub struct LesionClassifierConfig {
    /// Number of output classes.
    #[config(default = "crate::labels::NUM_CLASSES")]
    pub num_classes: usize,

    /// Side length of the square input images.
    #[config(default = "crate::IMAGE_SIZE as usize")]
    pub input_size: usize,

    /// Width of the hidden classification layer.
    #[config(default = 64)]
    pub hidden_size: usize,
}

impl LesionClassifierConfig {
    /// Initialize the model with random weights on the given device.
    pub fn init<B: Backend>(&self, device: &B::Device) -> LesionClassifier<B> {
        let side = feature_side(self.input_size);
        let feature_dim = 64 * side * side;

        LesionClassifier {
            block1: ConvBlock::new([3, 32], device),
            block2: ConvBlock::new([32, 64], device),
            block3: ConvBlock::new([64, 64], device),
            fc1: LinearConfig::new(feature_dim, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
            num_classes: self.num_classes,
        }
    }
}

/// Spatial side length after the three conv/pool stages.
///
/// Each stage loses 2 pixels to the valid 3x3 convolution and halves the
/// remainder in the pool (flooring).
fn feature_side(mut side: usize) -> usize {
    for _ in 0..3 {
        side = (side - 2) / 2;
    }
    side
}

/// The lesion classification network.
#[derive(Module, Debug)]
pub struct LesionClassifier<B: Backend> {
    block1: ConvBlock<B>,
    block2: ConvBlock<B>,
    block3: ConvBlock<B>,
    fc1: Linear<B>,
    fc2: Linear<B>,
    activation: Relu,
    num_classes: usize,
}

impl<B: Backend> LesionClassifier<B> {
    /// Forward pass producing raw logits of shape `[batch, num_classes]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.block1.forward(images);
        let x = self.block2.forward(x);
        let x = self.block3.forward(x);

        let [batch, channels, height, width] = x.dims();
        let x = x.reshape([batch, channels * height * width]);

        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);
        self.fc2.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Default model configuration: 224x224 inputs, seven output classes.
pub fn default_config() -> LesionClassifierConfig {
    LesionClassifierConfig::new()
        .with_num_classes(NUM_CLASSES)
        .with_input_size(IMAGE_SIZE as usize)
}
