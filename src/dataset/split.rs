//! Train/test splitting.
//!
//! The split is stratified per class so that minority lesion types keep the
//! same proportion in both partitions, and seeded so a given manifest always
//! produces the same split.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::labels::NUM_CLASSES;
use crate::utils::error::{Error, Result};

use super::manifest::Sample;

/// Configuration for the train/test split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of samples held out for the test partition.
    pub test_fraction: f64,

    /// RNG seed for the shuffle inside each class.
    pub seed: u64,

    /// Stratify the split per class.
    pub stratified: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            stratified: true,
        }
    }
}

/// Result of splitting a manifest.
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub train: Vec<Sample>,
    pub test: Vec<Sample>,
}

/// Split samples into train/test partitions.
pub fn split_samples(samples: &[Sample], config: &SplitConfig) -> Result<DatasetSplit> {
    if !(0.0..1.0).contains(&config.test_fraction) {
        return Err(Error::Config(format!(
            "test_fraction must be in [0, 1), got {}",
            config.test_fraction
        )));
    }
    if samples.is_empty() {
        return Err(Error::Config("cannot split an empty sample set".into()));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    if config.stratified {
        let mut by_class: Vec<Vec<Sample>> = vec![Vec::new(); NUM_CLASSES];
        for sample in samples {
            by_class[sample.label.index()].push(sample.clone());
        }

        for mut group in by_class {
            if group.is_empty() {
                continue;
            }
            group.shuffle(&mut rng);
            let n_test = ((group.len() as f64) * config.test_fraction).round() as usize;
            let n_test = n_test.min(group.len().saturating_sub(1));
            test.extend(group.drain(..n_test));
            train.extend(group);
        }
    } else {
        let mut shuffled = samples.to_vec();
        shuffled.shuffle(&mut rng);
        let n_test = ((shuffled.len() as f64) * config.test_fraction).round() as usize;
        test.extend(shuffled.drain(..n_test));
        train.extend(shuffled);
    }

    // Shuffle so classes are interleaved rather than grouped.
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    info!(
        train = train.len(),
        test = test.len(),
        seed = config.seed,
        "split manifest"
    );

    Ok(DatasetSplit { train, test })
}
