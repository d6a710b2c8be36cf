//! Hyperparameter search with median pruning.
//!
//! Trials sample a learning rate (log-uniform), a batch size and an
//! optimizer family, train a fresh model for a few epochs each, and report
//! validation accuracy after every epoch. A median pruner stops trials that
//! fall below the median of earlier trials at the same epoch, so obviously
//! bad configurations do not burn the full trial budget.

use std::time::{Duration, Instant};

use burn::data::dataloader::DataLoaderBuilder;
use burn::module::AutodiffModule;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{AdamConfig, Optimizer, RmsPropConfig, SgdConfig};
use burn::tensor::backend::AutodiffBackend;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::{LesionBatcher, LesionDataset};
use crate::eval::evaluate;
use crate::model::{default_config, LesionClassifier};
use crate::training::{Trainer, TrainingConfig};
use crate::utils::error::{Error, Result};

/// Optimizer families the search chooses between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerFamily {
    Adam,
    RmsProp,
    Sgd,
}

impl OptimizerFamily {
    pub const ALL: [OptimizerFamily; 3] = [
        OptimizerFamily::Adam,
        OptimizerFamily::RmsProp,
        OptimizerFamily::Sgd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizerFamily::Adam => "adam",
            OptimizerFamily::RmsProp => "rmsprop",
            OptimizerFamily::Sgd => "sgd",
        }
    }
}

/// One sampled configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialParams {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub optimizer: OptimizerFamily,
}

/// The space trials are sampled from.
#[derive(Debug, Clone)]
pub struct SearchSpace {
    /// Learning rate bounds, sampled log-uniformly.
    pub learning_rate: (f64, f64),

    /// Candidate batch sizes, sampled uniformly.
    pub batch_sizes: Vec<usize>,

    /// Candidate optimizer families.
    pub optimizers: Vec<OptimizerFamily>,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            learning_rate: (1e-5, 1e-1),
            batch_sizes: vec![16, 32, 64, 128],
            optimizers: OptimizerFamily::ALL.to_vec(),
        }
    }
}

impl SearchSpace {
    pub fn sample(&self, rng: &mut impl Rng) -> TrialParams {
        let (lo, hi) = self.learning_rate;
        let exponent = rng.gen_range(lo.log10()..=hi.log10());

        TrialParams {
            learning_rate: 10f64.powf(exponent),
            batch_size: self.batch_sizes[rng.gen_range(0..self.batch_sizes.len())],
            optimizer: self.optimizers[rng.gen_range(0..self.optimizers.len())],
        }
    }
}

/// How a trial ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrialStatus {
    /// Ran all its epochs.
    Completed,

    /// Stopped early by the pruner after this many epochs.
    Pruned { epoch: usize },

    /// Aborted by an error; only the trial is lost, not the study.
    Failed,
}

/// Record of one finished trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub id: usize,
    pub params: TrialParams,
    pub status: TrialStatus,

    /// Final validation accuracy, if any epoch finished.
    pub value: Option<f64>,

    /// Validation accuracy after each completed epoch.
    pub intermediate: Vec<f64>,
}

/// Prunes trials whose reported value falls below the median of earlier
/// trials at the same epoch.
#[derive(Debug, Clone)]
pub struct MedianPruner {
    /// Number of trials that must have reported at an epoch before pruning
    /// starts there.
    pub warmup_trials: usize,
}

impl Default for MedianPruner {
    fn default() -> Self {
        Self { warmup_trials: 5 }
    }
}

impl MedianPruner {
    pub fn should_prune(&self, history: &[TrialRecord], epoch_idx: usize, value: f64) -> bool {
        let mut prior: Vec<f64> = history
            .iter()
            .filter_map(|t| t.intermediate.get(epoch_idx).copied())
            .collect();
        if prior.len() < self.warmup_trials {
            return false;
        }

        prior.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = if prior.len() % 2 == 1 {
            prior[prior.len() / 2]
        } else {
            (prior[prior.len() / 2 - 1] + prior[prior.len() / 2]) / 2.0
        };

        value < median
    }
}

/// Study-level settings.
#[derive(Debug, Clone)]
pub struct StudyConfig {
    /// Maximum number of trials.
    pub trials: usize,

    /// Wall-clock budget, checked between trials.
    pub timeout: Option<Duration>,

    /// Training epochs per trial.
    pub epochs_per_trial: usize,

    /// Seed for parameter sampling.
    pub seed: u64,

    pub space: SearchSpace,
    pub pruner: MedianPruner,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            trials: 50,
            timeout: Some(Duration::from_secs(3600)),
            epochs_per_trial: 5,
            seed: 42,
            space: SearchSpace::default(),
            pruner: MedianPruner::default(),
        }
    }
}

/// All trial records plus the best configuration found.
#[derive(Debug, Clone)]
pub struct StudyReport {
    pub trials: Vec<TrialRecord>,
}

impl StudyReport {
    /// The completed trial with the highest validation accuracy.
    pub fn best_trial(&self) -> Option<&TrialRecord> {
        self.trials
            .iter()
            .filter(|t| t.status == TrialStatus::Completed)
            .filter(|t| t.value.is_some())
            .max_by(|a, b| {
                a.value
                    .partial_cmp(&b.value)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

/// Run a sequential hyperparameter study.
///
/// Both datasets should use the deterministic transform so every trial sees
/// identical data and validation scores are comparable across trials.
pub fn run_study<B: AutodiffBackend>(
    train: LesionDataset,
    valid: LesionDataset,
    config: &StudyConfig,
    device: &B::Device,
) -> Result<StudyReport> {
    if config.trials == 0 {
        return Err(Error::Search("study needs at least one trial".into()));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let started = Instant::now();
    let mut trials: Vec<TrialRecord> = Vec::new();

    for id in 0..config.trials {
        if let Some(timeout) = config.timeout {
            if started.elapsed() >= timeout {
                info!(completed = trials.len(), "study timeout reached");
                break;
            }
        }

        let params = config.space.sample(&mut rng);
        info!(
            trial = id,
            lr = params.learning_rate,
            batch_size = params.batch_size,
            optimizer = params.optimizer.as_str(),
            "starting trial"
        );

        let outcome = run_trial::<B>(
            train.clone(),
            valid.clone(),
            &params,
            config,
            &trials,
            device,
        );

        let record = match outcome {
            Ok((status, intermediate)) => TrialRecord {
                id,
                params,
                status,
                value: intermediate.last().copied(),
                intermediate,
            },
            Err(e) => {
                warn!(trial = id, error = %e, "trial failed");
                TrialRecord {
                    id,
                    params,
                    status: TrialStatus::Failed,
                    value: None,
                    intermediate: Vec::new(),
                }
            }
        };

        info!(trial = id, status = ?record.status, value = ?record.value, "trial finished");
        trials.push(record);
    }

    let report = StudyReport { trials };
    if let Some(best) = report.best_trial() {
        info!(
            trial = best.id,
            accuracy = ?best.value,
            lr = best.params.learning_rate,
            batch_size = best.params.batch_size,
            optimizer = best.params.optimizer.as_str(),
            "best configuration"
        );
    }
    Ok(report)
}

fn run_trial<B: AutodiffBackend>(
    train: LesionDataset,
    valid: LesionDataset,
    params: &TrialParams,
    config: &StudyConfig,
    history: &[TrialRecord],
    device: &B::Device,
) -> Result<(TrialStatus, Vec<f64>)> {
    let model = default_config().init::<B>(device);
    match params.optimizer {
        OptimizerFamily::Adam => run_trial_with(
            model,
            AdamConfig::new().init(),
            train,
            valid,
            params,
            config,
            history,
            device,
        ),
        OptimizerFamily::RmsProp => run_trial_with(
            model,
            RmsPropConfig::new().init(),
            train,
            valid,
            params,
            config,
            history,
            device,
        ),
        OptimizerFamily::Sgd => run_trial_with(
            model,
            SgdConfig::new()
                .with_momentum(Some(MomentumConfig::new().with_momentum(0.9)))
                .init(),
            train,
            valid,
            params,
            config,
            history,
            device,
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_trial_with<B, O>(
    model: LesionClassifier<B>,
    optimizer: O,
    train: LesionDataset,
    valid: LesionDataset,
    params: &TrialParams,
    config: &StudyConfig,
    history: &[TrialRecord],
    device: &B::Device,
) -> Result<(TrialStatus, Vec<f64>)>
where
    B: AutodiffBackend,
    O: Optimizer<LesionClassifier<B>, B>,
{
    if train.samples().is_empty() {
        return Err(Error::Search("trial training set is empty".into()));
    }

    let training_config = TrainingConfig::new()
        .with_epochs(config.epochs_per_trial)
        .with_batch_size(params.batch_size)
        .with_learning_rate(params.learning_rate);

    let batcher = LesionBatcher::<B>::new(device.clone());
    let loader = DataLoaderBuilder::new(batcher)
        .batch_size(params.batch_size)
        .shuffle(training_config.seed)
        .num_workers(training_config.num_workers)
        .build(train);

    let mut trainer = Trainer::new(model, optimizer, training_config, device.clone());
    let mut intermediate = Vec::with_capacity(config.epochs_per_trial);

    for epoch in 1..=config.epochs_per_trial {
        trainer.train_epoch(&loader, epoch);

        let report = evaluate(
            &trainer.model().valid(),
            valid.clone(),
            params.batch_size,
            device,
        )?;
        let accuracy = report.accuracy();
        intermediate.push(accuracy);

        if config.pruner.should_prune(history, epoch - 1, accuracy) {
            return Ok((TrialStatus::Pruned { epoch }, intermediate));
        }
    }

    Ok((TrialStatus::Completed, intermediate))
}
