//! Dataset handling: manifest loading, splitting, preprocessing and the
//! burn dataset/batcher adapters.

pub mod adapter;
pub mod manifest;
pub mod split;
pub mod transform;

pub use adapter::{LesionBatch, LesionBatcher, LesionDataset, LesionItem};
pub use manifest::{class_distribution, load_manifest, Sample};
pub use split::{split_samples, DatasetSplit, SplitConfig};
pub use transform::{EvalTransform, TrainTransform, Transform, IMAGENET_MEAN, IMAGENET_STD};
