//! Results returned by the [`ModelOrchestrator`](crate::ModelOrchestrator).
//!
//! # Overview
//!
//! - [`TrainingResult`]: fitted model plus everything measured while fitting
//! - [`CvSummary`]: cross-validation scores of a grid search
//! - [`TrainingReport`]: the serialisable part of a result
//!
//! # Example
//!
//! ```ignore
//! let result = orchestrator.train(&dataset, &spec)?;
//!
//! println!("test r2: {:?}", result.metric("r2"));
//! for (feature, importance) in &result.feature_importance {
//!     println!("{feature}: {importance:.3}");
//! }
//! std::fs::write("report.json", result.report().to_json()?)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::ProblemType;
use crate::error::TrainError;
use crate::metrics::{ConfusionMatrix, MetricMap};
use crate::model::{Predictions, TrainedModel};
use crate::params::Hyperparameters;
use crate::spec::ModelFamily;

/// Cross-validation scores of one grid combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvCandidate {
    pub hyperparameters: Hyperparameters,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    /// Population standard deviation of `fold_scores`.
    pub std_score: f64,
}

/// Outcome of a grid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvSummary {
    /// `"mse"` (lower is better) or `"accuracy"` (higher is better).
    pub metric: String,

    /// Number of folds actually used (capped at the training rows).
    pub folds: usize,

    /// Winning combination; ties keep the first in grid order.
    pub best_hyperparameters: Hyperparameters,

    pub mean_score: f64,
    pub std_score: f64,

    /// Every combination in grid order.
    pub candidates: Vec<CvCandidate>,
}

/// Result of [`ModelOrchestrator::train()`](crate::ModelOrchestrator::train).
///
/// Holds the fitted model for further predictions together with the split,
/// predictions and metrics of the run. Use [`report()`](Self::report) for a
/// serialisable summary.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct TrainingResult {
    /// The fitted model, shared so results can be cloned cheaply.
    pub model: Arc<TrainedModel>,

    pub family: ModelFamily,
    pub problem_type: ProblemType,
    pub target: String,
    pub features: Vec<String>,

    /// Dataset row indices of the training partition, in shuffled order.
    pub train_indices: Vec<usize>,

    /// Dataset row indices of the test partition, in shuffled order.
    pub test_indices: Vec<usize>,

    pub train_predictions: Predictions,
    pub test_predictions: Predictions,

    /// Target values of the test partition, aligned with `test_predictions`.
    pub test_actual: Predictions,

    /// `r2`, `rmse`, `mae`, `mse` for regression; `accuracy`, `precision`,
    /// `recall`, `f1` for classification.
    pub test_metrics: MetricMap,
    pub train_metrics: MetricMap,

    /// Test-partition confusion matrix (classification only).
    pub confusion_matrix: Option<ConfusionMatrix>,

    /// Present when a grid search ran.
    pub cv: Option<CvSummary>,

    /// Hyperparameters of the final fit, defaults included.
    pub hyperparameters: Hyperparameters,

    /// `(feature, importance)` sorted descending; empty when the family
    /// cannot tell.
    pub feature_importance: Vec<(String, f64)>,

    /// Sorted class labels (classification only).
    pub class_labels: Option<Vec<String>>,

    /// Wall-clock time of the whole call.
    pub training_time_seconds: f64,

    /// Non-fatal issues, e.g. rows dropped for missing values.
    pub warnings: Vec<String>,

    /// Rows removed under [`MissingValuePolicy::DropRows`](crate::MissingValuePolicy::DropRows).
    pub dropped_rows: usize,
}

impl TrainingResult {
    /// A test metric by name.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.test_metrics.get(name).copied()
    }

    pub fn report(&self) -> TrainingReport {
        TrainingReport {
            family: self.family.to_string(),
            problem_type: self.problem_type,
            target: self.target.clone(),
            features: self.features.clone(),
            hyperparameters: self.hyperparameters.clone(),
            test_metrics: self.test_metrics.clone(),
            train_metrics: self.train_metrics.clone(),
            confusion_matrix: self.confusion_matrix.clone(),
            cv: self.cv.clone(),
            feature_importance: self.feature_importance.clone(),
            class_labels: self.class_labels.clone(),
            n_train: self.train_indices.len(),
            n_test: self.test_indices.len(),
            dropped_rows: self.dropped_rows,
            test_actual: self.test_actual.clone(),
            test_predictions: self.test_predictions.clone(),
            training_time_seconds: self.training_time_seconds,
            warnings: self.warnings.clone(),
        }
    }
}

/// Serialisable summary of a [`TrainingResult`] (everything but the model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub family: String,
    pub problem_type: ProblemType,
    pub target: String,
    pub features: Vec<String>,
    pub hyperparameters: Hyperparameters,
    pub test_metrics: MetricMap,
    pub train_metrics: MetricMap,
    pub confusion_matrix: Option<ConfusionMatrix>,
    pub cv: Option<CvSummary>,
    pub feature_importance: Vec<(String, f64)>,
    pub class_labels: Option<Vec<String>>,
    pub n_train: usize,
    pub n_test: usize,
    pub dropped_rows: usize,
    pub test_actual: Predictions,
    pub test_predictions: Predictions,
    pub training_time_seconds: f64,
    pub warnings: Vec<String>,
}

impl TrainingReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// JSON object of [`train_many`](crate::ModelOrchestrator::train_many)
/// results: reports for successes, `{"error": {code, message}}` for failures.
pub fn results_to_json(
    results: &BTreeMap<String, Result<TrainingResult, TrainError>>,
) -> serde_json::Result<String> {
    let mut object = serde_json::Map::new();
    for (name, result) in results {
        let value = match result {
            Ok(result) => serde_json::to_value(result.report())?,
            Err(error) => json!({ "error": error }),
        };
        object.insert(name.clone(), value);
    }
    serde_json::to_string_pretty(&Value::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_roundtrip() {
        let report = TrainingReport {
            family: "ridge".to_string(),
            problem_type: ProblemType::Regression,
            target: "logp".to_string(),
            features: vec!["mw".to_string()],
            hyperparameters: Hyperparameters::from([("alpha".to_string(), json!(1.0))]),
            test_metrics: MetricMap::from([("r2".to_string(), 0.9)]),
            train_metrics: MetricMap::new(),
            confusion_matrix: None,
            cv: None,
            feature_importance: vec![("mw".to_string(), 1.0)],
            class_labels: None,
            n_train: 8,
            n_test: 2,
            dropped_rows: 0,
            test_actual: Predictions::Numeric(vec![1.0, 2.0]),
            test_predictions: Predictions::Numeric(vec![1.1, 1.9]),
            training_time_seconds: 0.01,
            warnings: Vec::new(),
        };
        let json = report.to_json().unwrap();
        assert!(json.contains("\"problem_type\": \"regression\""));
        let back: TrainingReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_results_to_json_includes_errors() {
        let mut results = BTreeMap::new();
        results.insert(
            "svr".to_string(),
            Err(TrainError::UnknownModelFamily("svr".to_string())),
        );
        let json = results_to_json(&results).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["svr"]["error"]["code"], json!("UNKNOWN_MODEL_FAMILY"));
    }
}
