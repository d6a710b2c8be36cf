//! Supervised training loop.

use std::path::Path;
use std::sync::Arc;

use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use tracing::{debug, info, warn};

use crate::dataset::{LesionBatch, LesionBatcher, LesionDataset};
use crate::model::{default_config, LesionClassifier};
// The crate Result alias stays out of scope here: the Config derive expands
// serde impls against the two-parameter std Result.
use crate::utils::error::Error;

use super::scaler::GradScaler;

/// Training hyperparameters.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Number of passes over the training set.
    #[config(default = 10)]
    pub epochs: usize,

    /// Mini-batch size.
    #[config(default = 32)]
    pub batch_size: usize,

    /// Optimizer learning rate.
    #[config(default = 1e-3)]
    pub learning_rate: f64,

    /// Data loader worker threads.
    #[config(default = 4)]
    pub num_workers: usize,

    /// Seed for the per-epoch shuffle.
    #[config(default = 42)]
    pub seed: u64,
}

/// Summary of one training epoch.
#[derive(Debug, Clone)]
pub struct EpochStats {
    pub epoch: usize,

    /// Mean of the per-batch losses.
    pub avg_loss: f64,

    /// Training accuracy over the epoch.
    pub accuracy: f64,

    /// Samples that contributed to this epoch.
    pub samples_seen: usize,

    /// Optimizer steps skipped because of gradient overflow.
    pub skipped_steps: usize,
}

/// Drives training of a [`LesionClassifier`].
pub struct Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<LesionClassifier<B>, B>,
{
    model: LesionClassifier<B>,
    optimizer: O,
    scaler: GradScaler,
    config: TrainingConfig,
    device: B::Device,
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<LesionClassifier<B>, B>,
{
    pub fn new(
        model: LesionClassifier<B>,
        optimizer: O,
        config: TrainingConfig,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            optimizer,
            scaler: GradScaler::default(),
            config,
            device,
        }
    }

    pub fn model(&self) -> &LesionClassifier<B> {
        &self.model
    }

    pub fn into_model(self) -> LesionClassifier<B> {
        self.model
    }

    /// Train for the configured number of epochs over `dataset`.
    ///
    /// The loader reshuffles every epoch, so augmentations and batch order
    /// both vary across passes.
    pub fn fit(&mut self, dataset: LesionDataset) -> crate::utils::error::Result<Vec<EpochStats>> {
        if dataset.samples().is_empty() {
            return Err(Error::Training("training dataset is empty".into()));
        }

        let batcher = LesionBatcher::<B>::new(self.device.clone());
        let loader = DataLoaderBuilder::new(batcher)
            .batch_size(self.config.batch_size)
            .shuffle(self.config.seed)
            .num_workers(self.config.num_workers)
            .build(dataset);

        let mut history = Vec::with_capacity(self.config.epochs);
        for epoch in 1..=self.config.epochs {
            let stats = self.train_epoch(&loader, epoch);
            info!(
                epoch,
                avg_loss = stats.avg_loss,
                accuracy = stats.accuracy,
                skipped = stats.skipped_steps,
                "epoch complete"
            );
            history.push(stats);
        }

        Ok(history)
    }

    /// One full pass over the loader.
    pub fn train_epoch(
        &mut self,
        loader: &Arc<dyn DataLoader<LesionBatch<B>>>,
        epoch: usize,
    ) -> EpochStats {
        let mut total_loss = 0.0f64;
        let mut correct = 0usize;
        let mut samples_seen = 0usize;
        let mut batches = 0usize;
        let mut skipped_steps = 0usize;

        for batch in loader.iter() {
            let (loss, batch_correct, batch_size, stepped) = self.train_step(batch);

            total_loss += loss;
            correct += batch_correct;
            samples_seen += batch_size;
            batches += 1;
            if !stepped {
                skipped_steps += 1;
            }

            if batches % 10 == 0 {
                debug!(
                    epoch,
                    batch = batches,
                    loss,
                    scale = self.scaler.scale(),
                    "training progress"
                );
            }
        }

        if skipped_steps > 0 {
            warn!(epoch, skipped_steps, "optimizer steps skipped after gradient overflow");
        }

        EpochStats {
            epoch,
            avg_loss: if batches > 0 {
                total_loss / batches as f64
            } else {
                0.0
            },
            accuracy: if samples_seen > 0 {
                correct as f64 / samples_seen as f64
            } else {
                0.0
            },
            samples_seen,
            skipped_steps,
        }
    }

    /// One optimizer step: forward, scaled backward, unscale, step.
    ///
    /// Returns `(loss, correct, batch_size, stepped)`; `stepped` is false
    /// when the step was skipped because of non-finite gradients.
    fn train_step(&mut self, batch: LesionBatch<B>) -> (f64, usize, usize, bool) {
        let batch_size = batch.images.dims()[0];

        let logits = self.model.forward(batch.images);
        let loss = CrossEntropyLossConfig::new()
            .init(&self.device)
            .forward(logits.clone(), batch.targets.clone());

        let scaled = self.scaler.scale_loss(loss.clone());
        let mut grads = GradientsParams::from_grads(scaled.backward(), &self.model);

        let finite = self.scaler.unscale(&self.model, &mut grads);
        if finite {
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);
        }
        self.scaler.update(!finite);

        let predictions = logits.argmax(1).squeeze::<1>(1);
        let batch_correct = predictions
            .equal(batch.targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>() as usize;

        let loss_value = loss.into_scalar().elem::<f64>();
        (loss_value, batch_correct, batch_size, finite)
    }

    /// Persist the current model weights.
    pub fn save(&self, path: &Path) -> crate::utils::error::Result<()> {
        self.model
            .clone()
            .save_file(path, &CompactRecorder::new())
            .map_err(|e| Error::Model(format!("failed to save checkpoint: {}", e)))
    }
}

/// Load classifier weights saved by [`Trainer::save`].
pub fn load_classifier<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> crate::utils::error::Result<LesionClassifier<B>> {
    default_config()
        .init::<B>(device)
        .load_file(path, &CompactRecorder::new(), device)
        .map_err(|e| {
            Error::Model(format!(
                "failed to load checkpoint from {}: {}",
                path.display(),
                e
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::SgdConfig;
    use burn::tensor::TensorData;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_training_config_defaults() {
        let config = TrainingConfig::new();
        assert_eq!(config.epochs, 10);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.learning_rate, 1e-3);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_training_config_serde_round_trip() {
        let config = TrainingConfig::new().with_epochs(3).with_batch_size(16);
        let json = serde_json::to_string(&config).unwrap();
        let restored: TrainingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.epochs, 3);
        assert_eq!(restored.batch_size, 16);
    }

    #[test]
    fn test_train_step_produces_finite_loss() {
        let device = NdArrayDevice::default();
        let model = default_config().init::<TestBackend>(&device);
        let mut trainer = Trainer::new(model, SgdConfig::new().init(), TrainingConfig::new(), device);

        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 224, 224], &NdArrayDevice::default());
        let targets = Tensor::from_data(
            TensorData::new(vec![0i64, 3], [2]),
            &NdArrayDevice::default(),
        );

        let (loss, correct, batch_size, stepped) =
            trainer.train_step(LesionBatch { images, targets });

        assert!(loss.is_finite());
        assert!(correct <= 2);
        assert_eq!(batch_size, 2);
        assert!(stepped);
    }
}
