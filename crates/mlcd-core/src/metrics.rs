//! Classification metrics for model evaluation
//!
//! Provides multi-class classification metrics:
//! - Confusion matrix over integer class labels
//! - Per-class precision, recall, F1
//! - Accuracy and macro-averaged precision/recall/F1
//!
//! Classes are the sorted union of labels seen in the ground truth and in the
//! predictions. A ratio with a zero denominator counts as 0, so a class that
//! never gets predicted contributes precision 0 to the macro average.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Class label
pub type Label = i64;

/// Metric computation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    /// Truth and prediction vectors differ in length
    #[error("length mismatch: {truth} true labels, {predicted} predictions")]
    LengthMismatch { truth: usize, predicted: usize },

    /// Nothing to evaluate
    #[error("cannot evaluate an empty prediction set")]
    Empty,
}

/// Confusion matrix: `counts[t][p]` is the number of samples with true class
/// `labels[t]` predicted as `labels[p]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    labels: Vec<Label>,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Build from ground truth and predictions
    ///
    /// # Errors
    /// - `MetricsError::LengthMismatch` if the slices differ in length
    /// - `MetricsError::Empty` if there are no samples
    pub fn from_predictions(y_true: &[Label], y_pred: &[Label]) -> Result<Self, MetricsError> {
        if y_true.len() != y_pred.len() {
            return Err(MetricsError::LengthMismatch {
                truth: y_true.len(),
                predicted: y_pred.len(),
            });
        }
        if y_true.is_empty() {
            return Err(MetricsError::Empty);
        }

        let labels: Vec<Label> = y_true
            .iter()
            .chain(y_pred)
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index = |label: Label| labels.binary_search(&label).unwrap_or_default();

        let mut counts = vec![vec![0; labels.len()]; labels.len()];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            counts[index(t)][index(p)] += 1;
        }

        Ok(Self { labels, counts })
    }

    /// Class labels, ascending
    #[inline]
    #[must_use]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Number of samples
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Count for (true class index, predicted class index)
    #[inline]
    #[must_use]
    pub fn get(&self, true_idx: usize, pred_idx: usize) -> usize {
        self.counts[true_idx][pred_idx]
    }

    /// Correctly classified samples of class `idx`
    #[inline]
    #[must_use]
    pub fn true_positives(&self, idx: usize) -> usize {
        self.counts[idx][idx]
    }

    /// Samples predicted as class `idx`
    #[must_use]
    pub fn predicted_count(&self, idx: usize) -> usize {
        self.counts.iter().map(|row| row[idx]).sum()
    }

    /// Samples whose true class is `idx`
    #[must_use]
    pub fn support(&self, idx: usize) -> usize {
        self.counts[idx].iter().sum()
    }

    /// Fraction of correctly classified samples
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.labels.len()).map(|i| self.true_positives(i)).sum();
        ratio(correct, self.total())
    }

    /// Per-class precision, recall, F1 and support
    #[must_use]
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        (0..self.labels.len())
            .map(|i| {
                let tp = self.true_positives(i);
                let precision = ratio(tp, self.predicted_count(i));
                let recall = ratio(tp, self.support(i));
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label: self.labels[i],
                    precision,
                    recall,
                    f1,
                    support: self.support(i),
                }
            })
            .collect()
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Metrics for a single class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub label: Label,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Accuracy plus macro-averaged precision, recall and F1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl PerformanceReport {
    /// Compute from a confusion matrix
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_matrix(matrix: &ConfusionMatrix) -> Self {
        let per_class = matrix.class_metrics();
        let n = per_class.len().max(1) as f64;
        let mean = |f: fn(&ClassMetrics) -> f64| per_class.iter().map(f).sum::<f64>() / n;

        Self {
            accuracy: matrix.accuracy(),
            precision: mean(|c| c.precision),
            recall: mean(|c| c.recall),
            f1: mean(|c| c.f1),
        }
    }

    /// Evaluate predictions against ground truth and log the result
    ///
    /// # Errors
    /// See [`ConfusionMatrix::from_predictions`]
    pub fn evaluate(model: &str, y_true: &[Label], y_pred: &[Label]) -> Result<Self, MetricsError> {
        let report = Self::from_matrix(&ConfusionMatrix::from_predictions(y_true, y_pred)?);
        tracing::info!(
            model,
            accuracy = round3(report.accuracy),
            precision = round3(report.precision),
            recall = round3(report.recall),
            f1 = round3(report.f1),
            "performance"
        );
        Ok(report)
    }
}

/// Round to 3 decimals for log output
#[must_use]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn perfect_prediction_scores_one() {
        let y = [0, 1, 2, 2, 1, 0];
        let report = PerformanceReport::evaluate("perfect", &y, &y).unwrap();
        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.precision, 1.0);
        assert_eq!(report.recall, 1.0);
        assert_eq!(report.f1, 1.0);
    }

    #[test]
    fn no_overlap_scores_zero_f1() {
        let report = PerformanceReport::evaluate("disjoint", &[0, 0, 0], &[1, 1, 1]).unwrap();
        assert_eq!(report.accuracy, 0.0);
        assert_eq!(report.f1, 0.0);
    }

    #[test]
    fn class_missing_from_predictions_counts_as_zero() {
        // class 2 is never predicted
        let y_true = [0, 1, 2, 2];
        let y_pred = [0, 1, 1, 1];
        let matrix = ConfusionMatrix::from_predictions(&y_true, &y_pred).unwrap();
        let per_class = matrix.class_metrics();

        assert_eq!(matrix.labels(), &[0, 1, 2]);
        assert_eq!(per_class[2].precision, 0.0);
        assert_eq!(per_class[2].recall, 0.0);
        assert_eq!(per_class[2].f1, 0.0);

        let report = PerformanceReport::from_matrix(&matrix);
        // precision: (1 + 1/3 + 0) / 3, recall: (1 + 1 + 0) / 3
        assert!(approx(report.precision, (1.0 + 1.0 / 3.0) / 3.0));
        assert!(approx(report.recall, 2.0 / 3.0));
        assert!(approx(report.f1, (1.0 + 0.5) / 3.0));
        assert!(approx(report.accuracy, 0.5));
    }

    #[test]
    fn macro_average_matches_reference_values() {
        // reference values from a standard macro-averaged implementation
        let y_true = [0, 1, 2, 0, 1, 2];
        let y_pred = [0, 2, 1, 0, 0, 1];
        let report = PerformanceReport::evaluate("reference", &y_true, &y_pred).unwrap();

        assert!(approx(report.accuracy, 1.0 / 3.0));
        assert!(approx(report.precision, 2.0 / 9.0));
        assert!(approx(report.recall, 1.0 / 3.0));
        assert!(approx(report.f1, 4.0 / 15.0));
    }

    #[test]
    fn length_mismatch_rejected() {
        let err = ConfusionMatrix::from_predictions(&[0, 1], &[0]).unwrap_err();
        assert_eq!(err, MetricsError::LengthMismatch { truth: 2, predicted: 1 });
    }

    #[test]
    fn empty_rejected() {
        assert_eq!(
            ConfusionMatrix::from_predictions(&[], &[]).unwrap_err(),
            MetricsError::Empty
        );
    }

    #[test]
    fn round3_rounds_half_away() {
        assert_eq!(round3(0.12345), 0.123);
        assert_eq!(round3(0.6666), 0.667);
    }

    proptest! {
        #[test]
        fn metrics_stay_in_unit_interval(
            pairs in prop::collection::vec((0i64..5, 0i64..5), 1..200)
        ) {
            let (y_true, y_pred): (Vec<Label>, Vec<Label>) = pairs.into_iter().unzip();
            let report = PerformanceReport::evaluate("prop", &y_true, &y_pred).unwrap();
            for value in [report.accuracy, report.precision, report.recall, report.f1] {
                prop_assert!((0.0..=1.0).contains(&value));
            }
        }

        #[test]
        fn identical_vectors_score_one(y in prop::collection::vec(-3i64..3, 1..100)) {
            let report = PerformanceReport::evaluate("prop", &y, &y).unwrap();
            prop_assert!(approx(report.f1, 1.0));
            prop_assert!(approx(report.accuracy, 1.0));
        }
    }
}
