//! Evaluation loop and misclassification analysis.

use std::collections::HashMap;

use burn::data::dataloader::DataLoaderBuilder;
use burn::prelude::*;
use tracing::info;

use crate::dataset::{LesionBatcher, LesionDataset};
use crate::labels::{LesionClass, NUM_CLASSES};
use crate::model::LesionClassifier;
use crate::utils::error::{Error, Result};
use crate::utils::metrics::Metrics;

/// Result of one evaluation pass.
#[derive(Debug, Clone)]
pub struct EvalReport {
    /// Accuracy and per-class metrics.
    pub metrics: Metrics,

    /// All wrong predictions as `(actual, predicted)` pairs.
    pub misclassifications: Vec<(LesionClass, LesionClass)>,
}

impl EvalReport {
    pub fn accuracy(&self) -> f64 {
        self.metrics.accuracy
    }

    /// The `k` most frequent `(actual, predicted)` confusion pairs.
    pub fn top_confusions(&self, k: usize) -> Vec<((LesionClass, LesionClass), usize)> {
        let mut counts: HashMap<(LesionClass, LesionClass), usize> = HashMap::new();
        for &pair in &self.misclassifications {
            *counts.entry(pair).or_insert(0) += 1;
        }

        let mut pairs: Vec<_> = counts.into_iter().collect();
        pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        pairs.truncate(k);
        pairs
    }
}

impl std::fmt::Display for EvalReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.metrics.classification_report())?;
        let confusions = self.top_confusions(5);
        if !confusions.is_empty() {
            writeln!(f, "\nMost common confusions:")?;
            for ((actual, predicted), count) in confusions {
                writeln!(
                    f,
                    "  {} predicted as {}: {} times",
                    actual.code(),
                    predicted.code(),
                    count
                )?;
            }
        }
        Ok(())
    }
}

/// Evaluate a model over a dataset without gradient tracking.
///
/// The loader is not shuffled, so two runs over the same dataset with the
/// deterministic transform score identically.
pub fn evaluate<B: Backend>(
    model: &LesionClassifier<B>,
    dataset: LesionDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<EvalReport> {
    if dataset.samples().is_empty() {
        return Err(Error::Training("evaluation dataset is empty".into()));
    }

    let batcher = LesionBatcher::<B>::new(device.clone());
    let loader = DataLoaderBuilder::new(batcher)
        .batch_size(batch_size)
        .build(dataset);

    let mut predictions = Vec::new();
    let mut ground_truth = Vec::new();

    for batch in loader.iter() {
        let logits = model.forward(batch.images);
        let predicted = logits
            .argmax(1)
            .squeeze::<1>(1)
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| Error::Model(format!("failed to read predictions: {:?}", e)))?;
        let targets = batch
            .targets
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| Error::Model(format!("failed to read targets: {:?}", e)))?;

        predictions.extend(predicted.into_iter().map(|v| v as usize));
        ground_truth.extend(targets.into_iter().map(|v| v as usize));
    }

    let metrics = Metrics::from_predictions(&predictions, &ground_truth, NUM_CLASSES);

    let misclassifications = predictions
        .iter()
        .zip(ground_truth.iter())
        .filter(|(p, t)| p != t)
        .filter_map(|(&p, &t)| {
            Some((LesionClass::from_index(t)?, LesionClass::from_index(p)?))
        })
        .collect();

    info!(
        samples = ground_truth.len(),
        accuracy = metrics.accuracy,
        "evaluation complete"
    );

    Ok(EvalReport {
        metrics,
        misclassifications,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_with(misclassifications: Vec<(LesionClass, LesionClass)>) -> EvalReport {
        EvalReport {
            metrics: Metrics::from_predictions(&[0], &[0], NUM_CLASSES),
            misclassifications,
        }
    }

    #[test]
    fn test_top_confusions_orders_by_count() {
        let report = report_with(vec![
            (LesionClass::Mel, LesionClass::Nv),
            (LesionClass::Mel, LesionClass::Nv),
            (LesionClass::Mel, LesionClass::Nv),
            (LesionClass::Bkl, LesionClass::Nv),
            (LesionClass::Df, LesionClass::Vasc),
            (LesionClass::Df, LesionClass::Vasc),
        ]);

        let top = report.top_confusions(2);
        assert_eq!(top[0], ((LesionClass::Mel, LesionClass::Nv), 3));
        assert_eq!(top[1], ((LesionClass::Df, LesionClass::Vasc), 2));
    }

    #[test]
    fn test_top_confusions_empty_when_perfect() {
        let report = report_with(Vec::new());
        assert!(report.top_confusions(5).is_empty());
    }

    #[test]
    fn test_display_includes_confusions() {
        let report = report_with(vec![(LesionClass::Mel, LesionClass::Nv)]);
        let text = format!("{}", report);
        assert!(text.contains("MEL predicted as NV"));
    }
}
