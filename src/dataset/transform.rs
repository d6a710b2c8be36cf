//! Image preprocessing and augmentation.
//!
//! Two pipelines share the same tail (CHW float conversion + ImageNet
//! normalization): the training pipeline applies random crops, flips,
//! rotations and color jitter on every access, while the evaluation pipeline
//! is byte-deterministic, a plain resize followed by normalization.

use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use rand::Rng;

use crate::IMAGE_SIZE;

/// Per-channel mean used for input normalization (ImageNet statistics).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation used for input normalization.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Side length images are over-resized to before the random training crop.
const TRAIN_RESIZE: u32 = 256;

/// Preprocessing pipeline applied to images before tensor conversion.
#[derive(Debug, Clone)]
pub enum Transform {
    /// Stochastic augmentation chain for training.
    Train(TrainTransform),

    /// Deterministic resize + normalize for evaluation and inference.
    Eval(EvalTransform),
}

impl Transform {
    pub fn train() -> Self {
        Transform::Train(TrainTransform::default())
    }

    pub fn eval() -> Self {
        Transform::Eval(EvalTransform)
    }

    /// Convert an image to a normalized CHW float buffer of length
    /// `3 * IMAGE_SIZE * IMAGE_SIZE`.
    pub fn apply(&self, image: &DynamicImage) -> Vec<f32> {
        match self {
            Transform::Train(t) => t.apply(image),
            Transform::Eval(t) => t.apply(image),
        }
    }
}

/// Random augmentation chain for training samples.
///
/// Draws fresh randomness per access, so repeated passes over the same
/// sample see different crops, flips, rotations and color jitter.
#[derive(Debug, Clone)]
pub struct TrainTransform {
    /// Color jitter factor range for brightness, contrast and saturation.
    pub jitter_range: (f32, f32),

    /// Maximum hue rotation in degrees, drawn from `[-max, max]`.
    pub hue_max_degrees: i32,

    /// Maximum geometric rotation in degrees, drawn from `[-max, max]`.
    pub rotation_max_degrees: f32,
}

impl Default for TrainTransform {
    fn default() -> Self {
        Self {
            jitter_range: (0.9, 1.1),
            hue_max_degrees: 36,
            rotation_max_degrees: 20.0,
        }
    }
}

impl TrainTransform {
    pub fn apply(&self, image: &DynamicImage) -> Vec<f32> {
        let mut rng = rand::thread_rng();

        // Over-resize, then take a random 224x224 window.
        let resized = image.resize_to_fill(TRAIN_RESIZE, TRAIN_RESIZE, FilterType::Triangle);
        let max_offset = TRAIN_RESIZE - IMAGE_SIZE;
        let x = rng.gen_range(0..=max_offset);
        let y = rng.gen_range(0..=max_offset);
        let mut img = resized.crop_imm(x, y, IMAGE_SIZE, IMAGE_SIZE);

        if rng.gen_bool(0.5) {
            img = img.fliph();
        }
        if rng.gen_bool(0.5) {
            img = img.flipv();
        }

        let hue = rng.gen_range(-self.hue_max_degrees..=self.hue_max_degrees);
        if hue != 0 {
            img = img.huerotate(hue);
        }

        let mut rgb = img.to_rgb8();

        let theta = rng.gen_range(-self.rotation_max_degrees..=self.rotation_max_degrees);
        if theta.abs() > f32::EPSILON {
            rgb = rotate_about_center(
                &rgb,
                theta.to_radians(),
                Interpolation::Bilinear,
                Rgb([0u8, 0, 0]),
            );
        }

        let brightness = rng.gen_range(self.jitter_range.0..=self.jitter_range.1);
        let contrast = rng.gen_range(self.jitter_range.0..=self.jitter_range.1);
        let saturation = rng.gen_range(self.jitter_range.0..=self.jitter_range.1);
        color_jitter(&mut rgb, brightness, contrast, saturation);

        normalize_chw(&rgb)
    }
}

/// Deterministic resize + normalize. The same bytes in always produce the
/// same floats out.
#[derive(Debug, Clone, Default)]
pub struct EvalTransform;

impl EvalTransform {
    pub fn apply(&self, image: &DynamicImage) -> Vec<f32> {
        let rgb = image
            .resize_exact(IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle)
            .to_rgb8();
        normalize_chw(&rgb)
    }
}

/// Apply brightness, contrast and saturation jitter in place.
///
/// Contrast pivots around the image's mean luminance, saturation blends each
/// pixel with its own gray value.
fn color_jitter(img: &mut RgbImage, brightness: f32, contrast: f32, saturation: f32) {
    let mean_luma = {
        let mut sum = 0.0f64;
        for pixel in img.pixels() {
            sum += luminance(pixel) as f64;
        }
        let count = (img.width() as u64 * img.height() as u64).max(1);
        (sum / count as f64) as f32
    };

    for pixel in img.pixels_mut() {
        let gray = luminance(pixel);
        for c in 0..3 {
            let mut v = pixel[c] as f32;
            v *= brightness;
            v = (v - mean_luma) * contrast + mean_luma;
            v = gray + (v - gray) * saturation;
            pixel[c] = v.clamp(0.0, 255.0) as u8;
        }
    }
}

fn luminance(pixel: &Rgb<u8>) -> f32 {
    0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
}

/// Convert an RGB image to a planar CHW float buffer, scaling into `[0, 1]`
/// and normalizing per channel.
fn normalize_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = (y * width + x) as usize;
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            data[c * plane + offset] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    data
}
