//! Regression and classification metrics.
//!
//! Classification precision, recall and F1 are support-weighted averages over
//! the classes, derived from the [`ConfusionMatrix`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metric values by name (`r2`, `rmse`, `mae`, `mse` or `accuracy`,
/// `precision`, `recall`, `f1`).
pub type MetricMap = BTreeMap<String, f64>;

pub fn mse(actual: &[f64], predicted: &[f64]) -> f64 {
    mean(actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)))
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    mse(actual, predicted).sqrt()
}

pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    mean(actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()))
}

/// Coefficient of determination. A constant target scores 1.0 when predicted
/// exactly and 0.0 otherwise.
pub fn r2(actual: &[f64], predicted: &[f64]) -> f64 {
    let mean_actual = mean(actual.iter().copied());
    let ss_tot: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

pub fn regression_metrics(actual: &[f64], predicted: &[f64]) -> MetricMap {
    let mse = mse(actual, predicted);
    MetricMap::from([
        ("r2".to_string(), r2(actual, predicted)),
        ("rmse".to_string(), mse.sqrt()),
        ("mae".to_string(), mae(actual, predicted)),
        ("mse".to_string(), mse),
    ])
}

pub fn accuracy(actual: &[f64], predicted: &[f64]) -> f64 {
    mean(
        actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| if a == p { 1.0 } else { 0.0 }),
    )
}

/// Counts of (actual, predicted) class pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    /// `counts[actual][predicted]`.
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Build from class indices. Indices outside `labels` are ignored.
    pub fn from_codes(labels: &[String], actual: &[f64], predicted: &[f64]) -> Self {
        let k = labels.len();
        let mut counts = vec![vec![0usize; k]; k];
        for (&a, &p) in actual.iter().zip(predicted) {
            let (a, p) = (a as usize, p as usize);
            if a < k && p < k {
                counts[a][p] += 1;
            }
        }
        Self {
            labels: labels.to_vec(),
            counts,
        }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    fn support(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }

    fn predicted(&self, class: usize) -> usize {
        self.counts.iter().map(|row| row[class]).sum()
    }

    /// Per-class (precision, recall, f1). Undefined ratios count as 0.
    pub fn per_class(&self) -> Vec<(f64, f64, f64)> {
        (0..self.labels.len())
            .map(|class| {
                let tp = self.counts[class][class] as f64;
                let predicted = self.predicted(class) as f64;
                let support = self.support(class) as f64;
                let precision = if predicted > 0.0 { tp / predicted } else { 0.0 };
                let recall = if support > 0.0 { tp / support } else { 0.0 };
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                (precision, recall, f1)
            })
            .collect()
    }

    pub fn metrics(&self) -> MetricMap {
        let total = self.total() as f64;
        let correct: usize = (0..self.labels.len()).map(|c| self.counts[c][c]).sum();
        let mut weighted = (0.0, 0.0, 0.0);
        if total > 0.0 {
            for (class, (p, r, f)) in self.per_class().into_iter().enumerate() {
                let weight = self.support(class) as f64 / total;
                weighted.0 += weight * p;
                weighted.1 += weight * r;
                weighted.2 += weight * f;
            }
        }
        MetricMap::from([
            (
                "accuracy".to_string(),
                if total > 0.0 { correct as f64 / total } else { 0.0 },
            ),
            ("precision".to_string(), weighted.0),
            ("recall".to_string(), weighted.1),
            ("f1".to_string(), weighted.2),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_regression_metrics() {
        let actual = [3.0, -0.5, 2.0, 7.0];
        let predicted = [2.5, 0.0, 2.0, 8.0];
        let metrics = regression_metrics(&actual, &predicted);
        assert!(close(metrics["mse"], 0.375));
        assert!(close(metrics["mae"], 0.5));
        assert!(close(metrics["rmse"], 0.375f64.sqrt()));
        assert!((metrics["r2"] - 0.948_608_137).abs() < 1e-6);
    }

    #[test]
    fn test_r2_constant_target() {
        assert_eq!(r2(&[2.0, 2.0], &[2.0, 2.0]), 1.0);
        assert_eq!(r2(&[2.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_confusion_matrix_weighted_scores() {
        let labels = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let actual = [0.0, 0.0, 1.0, 1.0, 1.0, 2.0];
        let predicted = [0.0, 1.0, 1.0, 1.0, 0.0, 2.0];
        let matrix = ConfusionMatrix::from_codes(&labels, &actual, &predicted);
        assert_eq!(matrix.counts, vec![vec![1, 1, 0], vec![1, 2, 0], vec![0, 0, 1]]);
        assert_eq!(matrix.total(), 6);

        let metrics = matrix.metrics();
        assert!(close(metrics["accuracy"], 4.0 / 6.0));
        // a: p 1/2 r 1/2, b: p 2/3 r 2/3, c: p 1 r 1; supports 2, 3, 1
        let expected = (2.0 * 0.5 + 3.0 * (2.0 / 3.0) + 1.0) / 6.0;
        assert!(close(metrics["precision"], expected));
        assert!(close(metrics["recall"], expected));
        assert!(close(metrics["f1"], expected));
        assert!(close(accuracy(&actual, &predicted), 4.0 / 6.0));
    }

    #[test]
    fn test_unpredicted_class_scores_zero() {
        let labels = vec!["a".to_string(), "b".to_string()];
        let matrix = ConfusionMatrix::from_codes(&labels, &[0.0, 1.0], &[0.0, 0.0]);
        let per_class = matrix.per_class();
        assert_eq!(per_class[1], (0.0, 0.0, 0.0));
        assert!(close(per_class[0].0, 0.5));
    }
}
