//! chemml-learning: model training and evaluation over chemml datasets.
//!
//! This crate trains regression and classification models on
//! [`Dataset`](chemml_processing::Dataset) snapshots produced by
//! `chemml-processing`, and fits the trend lines shown next to scatter
//! plots.
//!
//! # Features
//!
//! - **Model families**: linear, ridge, lasso and elastic-net regression,
//!   logistic regression, decision trees, random forests, gradient boosting,
//!   AdaBoost, k-nearest neighbours, a one-hidden-layer neural network and
//!   Gaussian process regression
//! - **Validated hyperparameters**: every family publishes a
//!   [`ParamSchema`]; unknown names and out-of-range values are rejected
//!   before any data is touched
//! - **Grid search**: k-fold cross validation over explicit or default grids
//! - **Reproducibility**: one seed drives the split, bootstrap samples and
//!   weight initialisation
//! - **Progress and cancellation**: stage callbacks and a shared
//!   [`CancellationToken`](chemml_processing::CancellationToken)
//! - **Trend lines**: least-squares polynomial fits with R²
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use chemml_learning::{ModelFamily, ModelOrchestrator, ModelSpec};
//!
//! let orchestrator = ModelOrchestrator::builder()
//!     .on_progress(|u| println!("{:.0}% - {}", u.progress * 100.0, u.message))
//!     .build()?;
//!
//! let specs = [
//!     ModelSpec::builder(ModelFamily::Ridge)
//!         .target("logp")
//!         .features(["mol_weight", "tpsa", "h_bond_donors"])
//!         .use_default_grid(true)
//!         .build()?,
//!     ModelSpec::builder(ModelFamily::RandomForest)
//!         .target("logp")
//!         .features(["mol_weight", "tpsa", "h_bond_donors"])
//!         .hyperparameter("n_estimators", 200)
//!         .build()?,
//! ];
//!
//! let results = orchestrator.train_many(&dataset, &specs)?;
//! println!("{}", chemml_learning::results_to_json(&results)?);
//! ```
//!
//! # Custom Families
//!
//! Implement [`ModelFactory`] and [`Estimator`], then register the factory:
//!
//! ```rust,ignore
//! let mut registry = ModelRegistry::with_builtins();
//! registry.register(Arc::new(MyFactory));
//! let orchestrator = ModelOrchestrator::builder().registry(registry).build()?;
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, TrainError>`](TrainError).
//! Errors carry a stable [`error_code()`](TrainError::error_code) and
//! serialise as `{code, message}`.

mod config;
mod error;
mod matrix;
pub mod metrics;
mod model;
mod models;
mod params;
mod pipeline;
mod progress;
mod spec;
pub mod split;
pub mod trend;
mod types;

// Re-export public API
//
// Configuration types
pub use config::{MissingValuePolicy, ProblemType, TrainingConfig, TrainingConfigBuilder};
// Error types
pub use error::{Result, TrainError};
// Estimators, registry and fitted models
pub use matrix::Standardizer;
pub use model::{
    Estimator, FitContext, ModelFactory, ModelRegistry, Predictions, Task, TrainedModel,
};
// Hyperparameters
pub use params::{
    HyperparameterGrid, Hyperparameters, ParamKind, ParamSchema, ParamSpec, Params,
    grid_combinations,
};
// Orchestration
pub use pipeline::{ModelOrchestrator, ModelOrchestratorBuilder};
// Progress reporting types
pub use progress::{ParseTrainingStageError, ProgressCallback, ProgressUpdate, TrainingStage};
// Model specifications
pub use spec::{ModelFamily, ModelSpec, ModelSpecBuilder};
// Metrics, splits and trend lines
pub use metrics::{ConfusionMatrix, MetricMap};
pub use split::{TrainTestSplit, k_folds, train_test_split};
pub use trend::{TrendLine, fit_trend_line, trend_line_for_columns};
// Results
pub use types::{CvCandidate, CvSummary, TrainingReport, TrainingResult, results_to_json};
