//! Burn dataset and batcher adapters.
//!
//! [`LesionDataset`] decodes and transforms images lazily on access, so a
//! training epoch re-draws augmentations every pass. [`LesionBatcher`] stacks
//! transformed items into batched tensors on the target device.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use burn::tensor::TensorData;
use tracing::warn;

use crate::IMAGE_SIZE;

use super::manifest::Sample;
use super::transform::Transform;

/// One transformed sample ready for batching.
#[derive(Debug, Clone)]
pub struct LesionItem {
    /// Normalized CHW pixel buffer, length `3 * IMAGE_SIZE * IMAGE_SIZE`.
    pub image: Vec<f32>,

    /// Class index of the ground-truth label.
    pub label: usize,

    /// Source path, kept for error analysis.
    pub path: String,
}

/// Lazily-decoding dataset over manifest samples.
#[derive(Clone)]
pub struct LesionDataset {
    samples: Vec<Sample>,
    transform: Transform,
}

impl LesionDataset {
    pub fn new(samples: Vec<Sample>, transform: Transform) -> Self {
        Self { samples, transform }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl Dataset<LesionItem> for LesionDataset {
    fn get(&self, index: usize) -> Option<LesionItem> {
        // The dataloader iterator probes one past the end to terminate.
        if index >= self.samples.len() {
            return None;
        }

        // Returning None mid-range would end the iteration early and silently
        // truncate the epoch, so a corrupt file falls back to the next sample
        // instead.
        for attempt in 0..self.samples.len() {
            let sample = &self.samples[(index + attempt) % self.samples.len()];
            match decode_image(&sample.path) {
                Ok(image) => {
                    if attempt > 0 {
                        warn!(
                            index,
                            substitute = %sample.path.display(),
                            "substituted neighboring sample for undecodable image"
                        );
                    }
                    return Some(LesionItem {
                        image: self.transform.apply(&image),
                        label: sample.label.index(),
                        path: sample.path.display().to_string(),
                    });
                }
                Err(e) => {
                    warn!(path = %sample.path.display(), error = %e, "failed to decode image");
                }
            }
        }

        panic!("no decodable image in dataset ({} samples)", self.samples.len());
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

fn decode_image(path: &std::path::Path) -> std::io::Result<image::DynamicImage> {
    image::ImageReader::open(path)?
        .decode()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// A batch of images with their target class indices.
#[derive(Debug, Clone)]
pub struct LesionBatch<B: Backend> {
    /// Images, shape `[batch, 3, IMAGE_SIZE, IMAGE_SIZE]`.
    pub images: Tensor<B, 4>,

    /// Target class indices, shape `[batch]`.
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks [`LesionItem`]s into a [`LesionBatch`] on a fixed device.
#[derive(Clone)]
pub struct LesionBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> LesionBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<LesionItem, LesionBatch<B>> for LesionBatcher<B> {
    fn batch(&self, items: Vec<LesionItem>) -> LesionBatch<B> {
        let batch_size = items.len();
        let side = IMAGE_SIZE as usize;

        let mut flat = Vec::with_capacity(batch_size * 3 * side * side);
        let mut labels = Vec::with_capacity(batch_size);
        for item in items {
            flat.extend_from_slice(&item.image);
            labels.push(item.label as i64);
        }

        let images = Tensor::from_floats(
            TensorData::new(flat, [batch_size, 3, side, side]),
            &self.device,
        );
        let targets = Tensor::from_data(TensorData::new(labels, [batch_size]), &self.device);

        LesionBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LesionClass;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};

    fn write_jpeg(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(32, 32, Rgb([120, 80, 40]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_dataset_decodes_and_transforms() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_jpeg(tmp.path(), "a.jpg");
        let dataset = LesionDataset::new(
            vec![Sample {
                path,
                label: LesionClass::Bcc,
            }],
            Transform::eval(),
        );

        assert_eq!(dataset.len(), 1);
        let item = dataset.get(0).unwrap();
        assert_eq!(item.label, LesionClass::Bcc.index());
        assert_eq!(item.image.len(), (3 * IMAGE_SIZE * IMAGE_SIZE) as usize);
    }

    #[test]
    fn test_dataset_returns_none_past_end() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_jpeg(tmp.path(), "a.jpg");
        let dataset = LesionDataset::new(
            vec![Sample {
                path,
                label: LesionClass::Mel,
            }],
            Transform::eval(),
        );

        // The loader iterator probes get(len) and expects None.
        assert!(dataset.get(1).is_none());
        assert!(LesionDataset::new(Vec::new(), Transform::eval()).get(0).is_none());
    }

    #[test]
    fn test_dataset_substitutes_undecodable_image() {
        let tmp = tempfile::tempdir().unwrap();
        let bad = tmp.path().join("bad.jpg");
        std::fs::write(&bad, b"not an image").unwrap();
        let good = write_jpeg(tmp.path(), "good.jpg");

        let dataset = LesionDataset::new(
            vec![
                Sample {
                    path: bad,
                    label: LesionClass::Mel,
                },
                Sample {
                    path: good,
                    label: LesionClass::Vasc,
                },
            ],
            Transform::eval(),
        );

        // The corrupt first sample yields its decodable neighbor instead of
        // ending the iteration.
        let item = dataset.get(0).unwrap();
        assert_eq!(item.label, LesionClass::Vasc.index());
        assert!(item.path.ends_with("good.jpg"));
    }

    #[test]
    fn test_batcher_shapes() {
        let device = NdArrayDevice::default();
        let batcher = LesionBatcher::<NdArray>::new(device);
        let side = IMAGE_SIZE as usize;

        let items = vec![
            LesionItem {
                image: vec![0.1; 3 * side * side],
                label: 2,
                path: "a.jpg".into(),
            },
            LesionItem {
                image: vec![0.2; 3 * side * side],
                label: 5,
                path: "b.jpg".into(),
            },
        ];

        let batch = batcher.batch(items);
        assert_eq!(batch.images.dims(), [2, 3, side, side]);
        assert_eq!(batch.targets.dims(), [2]);

        let targets = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![2, 5]);
    }
}
