//! Progress reporting types for model training.
//!
//! A [`ModelOrchestrator`](crate::ModelOrchestrator) built with
//! [`on_progress`](crate::ModelOrchestratorBuilder::on_progress) sends a
//! [`ProgressUpdate`] at every stage boundary, after every cross-validation
//! candidate and after every model of a multi-model run.
//!
//! # Example
//!
//! ```
//! use chemml_learning::{ModelOrchestrator, ProgressUpdate};
//!
//! let orchestrator = ModelOrchestrator::builder()
//!     .on_progress(|update: ProgressUpdate| {
//!         println!("[{}] {:.0}% - {}", update.stage, update.progress * 100.0, update.message);
//!     })
//!     .build()
//!     .expect("default config is valid");
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The current stage of a training run.
///
/// Runs progress through these stages in order (unless cancelled or failed):
///
/// 1. [`Initializing`](Self::Initializing) - resolving the model family and
///    validating hyperparameters
/// 2. [`Preprocessing`](Self::Preprocessing) - projecting, splitting and
///    standardising
/// 3. [`HyperparameterSearch`](Self::HyperparameterSearch) - grid-search cross
///    validation (skipped without a grid)
/// 4. [`Training`](Self::Training) - fitting the final model
/// 5. [`Evaluation`](Self::Evaluation) - predictions and metrics
/// 6. [`Complete`](Self::Complete)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TrainingStage {
    #[default]
    Initializing,
    Preprocessing,
    HyperparameterSearch,
    Training,
    Evaluation,
    /// Terminal: the result is available.
    Complete,
    /// Terminal: training returned an error.
    Failed,
    /// Terminal: training stopped at a cancellation checkpoint.
    Cancelled,
}

impl TrainingStage {
    /// # Examples
    ///
    /// ```
    /// use chemml_learning::TrainingStage;
    ///
    /// assert_eq!(TrainingStage::HyperparameterSearch.as_str(), "hyperparameter_search");
    /// ```
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStage::Initializing => "initializing",
            TrainingStage::Preprocessing => "preprocessing",
            TrainingStage::HyperparameterSearch => "hyperparameter_search",
            TrainingStage::Training => "training",
            TrainingStage::Evaluation => "evaluation",
            TrainingStage::Complete => "complete",
            TrainingStage::Failed => "failed",
            TrainingStage::Cancelled => "cancelled",
        }
    }

    /// Returns `true` for [`Complete`](Self::Complete),
    /// [`Failed`](Self::Failed) and [`Cancelled`](Self::Cancelled).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrainingStage::Complete | TrainingStage::Failed | TrainingStage::Cancelled
        )
    }
}

impl fmt::Display for TrainingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for parsing a [`TrainingStage`] from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTrainingStageError {
    invalid_value: String,
}

impl ParseTrainingStageError {
    #[must_use]
    pub fn invalid_value(&self) -> &str {
        &self.invalid_value
    }
}

impl fmt::Display for ParseTrainingStageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid training stage: '{}'. Valid values are: initializing, preprocessing, \
             hyperparameter_search, training, evaluation, complete, failed, cancelled",
            self.invalid_value
        )
    }
}

impl std::error::Error for ParseTrainingStageError {}

impl FromStr for TrainingStage {
    type Err = ParseTrainingStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initializing" => Ok(TrainingStage::Initializing),
            "preprocessing" => Ok(TrainingStage::Preprocessing),
            "hyperparameter_search" => Ok(TrainingStage::HyperparameterSearch),
            "training" => Ok(TrainingStage::Training),
            "evaluation" => Ok(TrainingStage::Evaluation),
            "complete" => Ok(TrainingStage::Complete),
            "failed" => Ok(TrainingStage::Failed),
            "cancelled" => Ok(TrainingStage::Cancelled),
            _ => Err(ParseTrainingStageError {
                invalid_value: s.to_string(),
            }),
        }
    }
}

/// A progress update from a training run.
///
/// `progress` covers the whole call: for
/// [`train_many`](crate::ModelOrchestrator::train_many) it spans every model,
/// and `models_completed` counts finished models.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressUpdate {
    pub stage: TrainingStage,

    /// Overall progress from 0.0 to 1.0, non-decreasing within one call.
    pub progress: f64,

    /// Human-readable status message, e.g. "Cross-validating candidate 3/12".
    pub message: String,

    /// Family name of the model being trained.
    pub current_model: Option<String>,

    /// `(completed, total)` models of a multi-model run.
    pub models_completed: Option<(u32, u32)>,
}

/// Type alias for a progress callback function.
///
/// Callbacks run on the training thread and should return quickly; forward
/// updates to a channel for anything expensive.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Maps one model's local progress into the caller-visible range.
#[derive(Clone)]
pub(crate) struct ProgressReporter<'a> {
    callback: Option<&'a ProgressCallback>,
    model: String,
    offset: f64,
    span: f64,
    models_completed: Option<(u32, u32)>,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(callback: Option<&'a ProgressCallback>, model: impl Into<String>) -> Self {
        Self {
            callback,
            model: model.into(),
            offset: 0.0,
            span: 1.0,
            models_completed: None,
        }
    }

    /// Restrict this reporter to model `index` of `total`.
    pub(crate) fn for_model(mut self, index: u32, total: u32) -> Self {
        let total_f = f64::from(total.max(1));
        self.offset = f64::from(index) / total_f;
        self.span = 1.0 / total_f;
        self.models_completed = Some((index, total));
        self
    }

    pub(crate) fn report(&self, stage: TrainingStage, local: f64, message: impl Into<String>) {
        let Some(callback) = self.callback else {
            return;
        };
        let local = local.clamp(0.0, 1.0);
        callback(ProgressUpdate {
            stage,
            progress: self.offset + self.span * local,
            message: message.into(),
            current_model: Some(self.model.clone()),
            models_completed: self.models_completed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressUpdate>>);

    impl Recorder {
        fn callback(self: &Arc<Self>) -> ProgressCallback {
            let recorder = Arc::clone(self);
            Arc::new(move |update| recorder.0.lock().unwrap().push(update))
        }
    }

    #[test]
    fn test_training_stage_roundtrip() {
        let stages = [
            TrainingStage::Initializing,
            TrainingStage::Preprocessing,
            TrainingStage::HyperparameterSearch,
            TrainingStage::Training,
            TrainingStage::Evaluation,
            TrainingStage::Complete,
            TrainingStage::Failed,
            TrainingStage::Cancelled,
        ];
        for stage in stages {
            assert_eq!(stage.as_str().parse::<TrainingStage>(), Ok(stage));
        }

        let err = "explaining".parse::<TrainingStage>().unwrap_err();
        assert_eq!(err.invalid_value(), "explaining");
        assert!(err.to_string().contains("Valid values"));
    }

    #[test]
    fn test_training_stage_is_terminal() {
        assert!(!TrainingStage::Training.is_terminal());
        assert!(!TrainingStage::HyperparameterSearch.is_terminal());
        assert!(TrainingStage::Complete.is_terminal());
        assert!(TrainingStage::Failed.is_terminal());
        assert!(TrainingStage::Cancelled.is_terminal());
    }

    #[test]
    fn test_progress_update_default() {
        let update = ProgressUpdate::default();
        assert_eq!(update.stage, TrainingStage::Initializing);
        assert_eq!(update.progress, 0.0);
        assert!(update.current_model.is_none());
    }

    #[test]
    fn test_reporter_scales_into_model_slot() {
        let recorder = Arc::new(Recorder::default());
        let callback = recorder.callback();
        let reporter = ProgressReporter::new(Some(&callback), "ridge").for_model(1, 4);

        reporter.report(TrainingStage::Training, 0.0, "start");
        reporter.report(TrainingStage::Complete, 1.0, "done");

        let updates = recorder.0.lock().unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].progress, 0.25);
        assert_eq!(updates[1].progress, 0.5);
        assert_eq!(updates[1].current_model.as_deref(), Some("ridge"));
        assert_eq!(updates[1].models_completed, Some((1, 4)));
    }

    #[test]
    fn test_reporter_without_callback_is_silent() {
        let reporter = ProgressReporter::new(None, "lasso");
        reporter.report(TrainingStage::Training, 0.5, "nothing happens");
    }
}
