//! Evaluation metrics for the fracture classifier
//!
//! - Confusion matrix over the class labels
//! - Per-class precision, recall and F1
//! - Running averages for epoch loss

use serde::{Deserialize, Serialize};

/// Per-class metrics derived from a confusion matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class_idx: usize,
    pub class_name: Option<String>,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    /// Precision = TP / (TP + FP)
    pub precision: f64,
    /// Recall = TP / (TP + FN)
    pub recall: f64,
    pub f1: f64,
    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
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

        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            class_name: None,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support: true_positives + false_negatives,
        }
    }

    /// Set the class name
    pub fn with_name(mut self, name: &str) -> Self {
        self.class_name = Some(name.to_string());
        self
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Confusion matrix (row = actual, column = predicted), row-major
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub num_classes: usize,
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
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

    /// Add a single prediction; out-of-range labels are ignored
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    /// Accuracy in [0, 1]
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Per-class metrics, named when `class_names` is given
    pub fn class_metrics(&self, class_names: &[String]) -> Vec<ClassMetrics> {
        (0..self.num_classes)
            .map(|idx| {
                let metrics = ClassMetrics::from_confusion_matrix(self, idx);
                match class_names.get(idx) {
                    Some(name) => metrics.with_name(name),
                    None => metrics,
                }
            })
            .collect()
    }

    /// Render the matrix as a small text table
    pub fn display(&self, class_names: &[String]) -> String {
        let label = |idx: usize| -> String {
            class_names
                .get(idx)
                .cloned()
                .unwrap_or_else(|| idx.to_string())
        };

        let mut output = String::from("Confusion Matrix (rows=actual, cols=predicted):\n");
        output.push_str(&format!("{:>16}", ""));
        for col in 0..self.num_classes {
            output.push_str(&format!("{:>16}", label(col)));
        }
        output.push('\n');

        for row in 0..self.num_classes {
            output.push_str(&format!("{:>16}", label(row)));
            for col in 0..self.num_classes {
                output.push_str(&format!("{:>16}", self.get(row, col)));
            }
            output.push('\n');
        }

        output
    }
}

/// Running average for tracking loss during an epoch
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// Mean of the added values, 0 when empty
    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix_accuracy() {
        let predictions = vec![0, 1, 1, 0, 1];
        let ground_truth = vec![0, 1, 0, 0, 1];
        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 2);

        assert_eq!(cm.total(), 5);
        assert_eq!(cm.correct(), 4);
        assert!((cm.accuracy() - 0.8).abs() < 1e-9);
        assert_eq!(cm.get(0, 1), 1);
    }

    #[test]
    fn test_class_metrics() {
        let predictions = vec![0, 1, 1, 0, 1];
        let ground_truth = vec![0, 1, 0, 0, 1];
        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 2);
        let names = vec!["fractured".to_string(), "not fractured".to_string()];
        let per_class = cm.class_metrics(&names);

        // class 1: TP=2, FP=1, FN=0
        assert!((per_class[1].precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((per_class[1].recall - 1.0).abs() < 1e-9);
        assert_eq!(per_class[0].support, 3);
        assert_eq!(per_class[0].class_name.as_deref(), Some("fractured"));
    }

    #[test]
    fn test_empty_matrix_is_zero_accuracy() {
        let cm = ConfusionMatrix::new(2);
        assert_eq!(cm.accuracy(), 0.0);
    }

    #[test]
    fn test_running_average() {
        let mut avg = RunningAverage::new();
        assert_eq!(avg.average(), 0.0);
        avg.add(1.0);
        avg.add(3.0);
        assert_eq!(avg.count(), 2);
        assert!((avg.average() - 2.0).abs() < 1e-9);
    }
}
