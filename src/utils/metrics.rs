//! Evaluation metrics for the lesion classifier.
//!
//! Provides overall accuracy, per-class precision/recall/F1 with support,
//! and the confusion matrix the misclassification analysis is derived from.

use serde::{Deserialize, Serialize};

use crate::labels::LesionClass;

/// Aggregate metrics for one evaluation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// Total number of samples evaluated.
    pub total_samples: usize,

    /// Number of correct predictions.
    pub correct_predictions: usize,

    /// Overall top-1 accuracy, exactly correct / total.
    pub accuracy: f64,

    /// Macro-averaged precision over classes with support.
    pub macro_precision: f64,

    /// Macro-averaged recall.
    pub macro_recall: f64,

    /// Macro-averaged F1-score.
    pub macro_f1: f64,

    /// Per-class metrics, indexed by class.
    pub per_class: Vec<ClassMetrics>,

    /// Confusion matrix (row = actual, column = predicted).
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Compute metrics from predicted and true class indices.
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        assert_eq!(
            predictions.len(),
            ground_truth.len(),
            "Predictions and ground truth must have same length"
        );

        let total_samples = predictions.len();
        if total_samples == 0 {
            return Self::empty(num_classes);
        }

        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);

        let correct_predictions = confusion_matrix.correct();
        let accuracy = correct_predictions as f64 / total_samples as f64;

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|class_idx| ClassMetrics::from_confusion_matrix(&confusion_matrix, class_idx))
            .collect();

        // Macro averages over classes that actually occur in the ground truth.
        let with_support: Vec<&ClassMetrics> =
            per_class.iter().filter(|m| m.support > 0).collect();
        let n = with_support.len().max(1) as f64;

        let macro_precision = with_support.iter().map(|m| m.precision).sum::<f64>() / n;
        let macro_recall = with_support.iter().map(|m| m.recall).sum::<f64>() / n;
        let macro_f1 = with_support.iter().map(|m| m.f1).sum::<f64>() / n;

        Self {
            total_samples,
            correct_predictions,
            accuracy,
            macro_precision,
            macro_recall,
            macro_f1,
            per_class,
            confusion_matrix,
        }
    }

    fn empty(num_classes: usize) -> Self {
        Self {
            total_samples: 0,
            correct_predictions: 0,
            accuracy: 0.0,
            macro_precision: 0.0,
            macro_recall: 0.0,
            macro_f1: 0.0,
            per_class: (0..num_classes)
                .map(|class_idx| ClassMetrics {
                    class_idx,
                    ..ClassMetrics::default()
                })
                .collect(),
            confusion_matrix: ConfusionMatrix::new(num_classes),
        }
    }

    /// Per-class precision/recall/F1 table in the familiar report layout.
    pub fn classification_report(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:>12} {:>10} {:>10} {:>10} {:>10}\n",
            "", "precision", "recall", "f1-score", "support"
        ));
        out.push('\n');

        for m in &self.per_class {
            let code = LesionClass::from_index(m.class_idx)
                .map(|c| c.code())
                .unwrap_or("?");
            out.push_str(&format!(
                "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}\n",
                code, m.precision, m.recall, m.f1, m.support
            ));
        }

        out.push('\n');
        out.push_str(&format!(
            "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}\n",
            "macro avg", self.macro_precision, self.macro_recall, self.macro_f1, self.total_samples
        ));
        out.push_str(&format!(
            "{:>12} {:>43.4}\n",
            "accuracy", self.accuracy
        ));

        out
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.classification_report())
    }
}

/// Per-class metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class index.
    pub class_idx: usize,

    /// True positives.
    pub true_positives: usize,

    /// False positives.
    pub false_positives: usize,

    /// False negatives.
    pub false_negatives: usize,

    /// Precision = TP / (TP + FP).
    pub precision: f64,

    /// Recall = TP / (TP + FN).
    pub recall: f64,

    /// F1 = 2 * (precision * recall) / (precision + recall).
    pub f1: f64,

    /// Number of ground-truth samples of this class.
    pub support: usize,
}

impl ClassMetrics {
    /// Derive metrics for one class from a confusion matrix.
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let support = true_positives + false_negatives;

        let precision = if true_positives + false_positives > 0 {
            true_positives as f64 / (true_positives + false_positives) as f64
        } else {
            0.0
        };

        let recall = if support > 0 {
            true_positives as f64 / support as f64
        } else {
            0.0
        };

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support,
        }
    }
}

/// Confusion matrix for multi-class classification.
///
/// Row = actual class, column = predicted class, stored row-major.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes.
    pub num_classes: usize,

    /// Flat matrix data in row-major order.
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create an empty confusion matrix.
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Build a confusion matrix from predictions and ground truth.
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut cm = Self::new(num_classes);
        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }
        cm
    }

    /// Record one prediction.
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    /// Count at (actual, predicted).
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    /// Total number of recorded predictions.
    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Number of correct predictions (diagonal sum).
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    /// Overall accuracy.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Per-row totals (ground-truth class counts).
    pub fn row_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|row| (0..self.num_classes).map(|col| self.get(row, col)).sum())
            .collect()
    }
}
