//! Model orchestration.
//!
//! [`ModelOrchestrator`] runs one [`ModelSpec`] (or several) against a
//! dataset snapshot:
//!
//! 1. **Initializing** - validate the model spec and every hyperparameter
//! 2. **Preprocessing** - project, split and standardise the data
//! 3. **HyperparameterSearch** - k-fold cross validation over the grid
//! 4. **Training** - fit the chosen configuration on the train partition
//! 5. **Evaluation** - predict both partitions and compute metrics
//!
//! Successful results are memoized per orchestrator. A repeated request for
//! the same spec, configuration and column contents returns the stored
//! result without training.
//!
//! # Example
//!
//! ```rust,ignore
//! use chemml_learning::{ModelFamily, ModelOrchestrator, ModelSpec, TrainingConfig};
//!
//! let orchestrator = ModelOrchestrator::builder()
//!     .config(TrainingConfig::builder().train_ratio(0.75).build()?)
//!     .on_progress(|update| println!("[{}] {:.0}%", update.stage, update.progress * 100.0))
//!     .build()?;
//!
//! let spec = ModelSpec::builder(ModelFamily::RandomForest)
//!     .target("logp")
//!     .features(["mol_weight", "tpsa"])
//!     .build()?;
//! let result = orchestrator.train(&dataset, &spec)?;
//! println!("r2 = {:?}", result.metric("r2"));
//! ```

use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use chemml_processing::{CancellationToken, Dataset};
use nalgebra::DMatrix;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{ProblemType, TrainingConfig};
use crate::error::{Result, TrainError};
use crate::matrix::{self, Standardizer};
use crate::metrics::{self, ConfusionMatrix, MetricMap};
use crate::model::{FitContext, ModelFactory, ModelRegistry, Predictions, Task, TrainedModel};
use crate::models::select_rows;
use crate::params::{HyperparameterGrid, Params, grid_combinations};
use crate::progress::{ProgressCallback, ProgressReporter, ProgressUpdate, TrainingStage};
use crate::spec::ModelSpec;
use crate::split::{k_folds, train_test_split};
use crate::types::{CvCandidate, CvSummary, TrainingResult};

/// Trains models from [`ModelSpec`]s.
///
/// Use [`ModelOrchestrator::builder()`] to attach a registry, configuration,
/// progress callback or cancellation token. One instance can serve many
/// calls; the only state it keeps between them is the results cache.
pub struct ModelOrchestrator {
    registry: ModelRegistry,
    config: TrainingConfig,
    progress_callback: Option<ProgressCallback>,
    cancellation_token: Option<CancellationToken>,
    results_cache: Mutex<HashMap<String, TrainingResult>>,
}

static_assertions::assert_impl_all!(ModelOrchestrator: Send, Sync);

impl std::fmt::Debug for ModelOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelOrchestrator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .field(
                "cancellation_token",
                &self.cancellation_token.as_ref().map(|_| "<token>"),
            )
            .field("cached_results", &self.results_cache.lock().len())
            .finish()
    }
}

impl Default for ModelOrchestrator {
    fn default() -> Self {
        Self {
            registry: ModelRegistry::with_builtins(),
            config: TrainingConfig::default(),
            progress_callback: None,
            cancellation_token: None,
            results_cache: Mutex::new(HashMap::new()),
        }
    }
}

/// Data after projection, split and scaling.
struct Prepared {
    task: Task,
    problem_type: ProblemType,
    labels: Option<Vec<String>>,
    rows: Vec<usize>,
    dropped_rows: usize,
    train: Vec<usize>,
    test: Vec<usize>,
    x_train: DMatrix<f64>,
    x_test: DMatrix<f64>,
    y_train: Vec<f64>,
    y_test: Vec<f64>,
    scaler: Option<Standardizer>,
}

impl ModelOrchestrator {
    #[must_use]
    pub fn builder() -> ModelOrchestratorBuilder {
        ModelOrchestratorBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Register further families after construction. Clears the results
    /// cache, since a family name may now map to another factory.
    pub fn registry_mut(&mut self) -> &mut ModelRegistry {
        self.results_cache.get_mut().clear();
        &mut self.registry
    }

    /// The stored result for this request, if it was trained before.
    pub fn cached_result(&self, dataset: &Dataset, spec: &ModelSpec) -> Option<TrainingResult> {
        let key = self.cache_key(dataset, spec)?;
        self.results_cache.lock().get(&key).cloned()
    }

    pub fn cached_results(&self) -> usize {
        self.results_cache.lock().len()
    }

    pub fn clear_results_cache(&self) {
        let mut cache = self.results_cache.lock();
        info!(entries = cache.len(), "Results cache cleared");
        cache.clear();
    }

    /// Identity of a request: the spec, the configuration and a digest of the
    /// columns the spec reads. `None` when a column is missing, in which case
    /// training fails anyway.
    fn cache_key(&self, dataset: &Dataset, spec: &ModelSpec) -> Option<String> {
        let mut hasher = DefaultHasher::new();
        for name in spec.features.iter().chain(std::iter::once(&spec.target)) {
            let column = dataset.frame().column(name).ok()?;
            name.hash(&mut hasher);
            column.dtype().to_string().hash(&mut hasher);
            for row in 0..column.len() {
                column.get(row).ok()?.to_string().hash(&mut hasher);
            }
        }
        let spec = serde_json::to_string(spec).ok()?;
        let config = serde_json::to_string(&self.config).ok()?;
        Some(format!("{spec}|{config}|{:016x}", hasher.finish()))
    }

    /// Train one model.
    ///
    /// # Errors
    ///
    /// - [`InvalidSpec`](TrainError::InvalidSpec),
    ///   [`UnknownModelFamily`](TrainError::UnknownModelFamily) or
    ///   [`InvalidHyperparameter`](TrainError::InvalidHyperparameter) before
    ///   any data is read
    /// - [`ColumnNotFound`](TrainError::ColumnNotFound),
    ///   [`InvalidFeature`](TrainError::InvalidFeature),
    ///   [`MissingValues`](TrainError::MissingValues),
    ///   [`UnsupportedProblemType`](TrainError::UnsupportedProblemType) or
    ///   [`InsufficientData`](TrainError::InsufficientData) for unusable data
    /// - [`Cancelled`](TrainError::Cancelled) once the token is cancelled
    pub fn train(&self, dataset: &Dataset, spec: &ModelSpec) -> Result<TrainingResult> {
        let reporter = ProgressReporter::new(self.progress_callback.as_ref(), spec.family.name());
        self.train_reported(dataset, spec, &reporter)
    }

    /// Train several specs on the same data and split.
    ///
    /// Results are keyed by family name; a repeated family gets a `_2`, `_3`
    /// suffix. A failing model does not stop the others, but cancellation
    /// aborts the whole call.
    pub fn train_many(
        &self,
        dataset: &Dataset,
        specs: &[ModelSpec],
    ) -> Result<BTreeMap<String, Result<TrainingResult>>> {
        let total = u32::try_from(specs.len()).unwrap_or(u32::MAX);
        info!(models = specs.len(), rows = dataset.height(), "Training model batch");
        let mut results = BTreeMap::new();
        for (index, spec) in specs.iter().enumerate() {
            self.checkpoint()?;
            let name = unique_key(&results, spec.family.name());
            let reporter = ProgressReporter::new(self.progress_callback.as_ref(), name.clone())
                .for_model(u32::try_from(index).unwrap_or(u32::MAX), total);
            match self.train_reported(dataset, spec, &reporter) {
                Err(TrainError::Cancelled) => return Err(TrainError::Cancelled),
                outcome => {
                    results.insert(name, outcome);
                }
            }
        }
        if let Some(callback) = &self.progress_callback {
            callback(ProgressUpdate {
                stage: TrainingStage::Complete,
                progress: 1.0,
                message: format!("Trained {} models", specs.len()),
                current_model: None,
                models_completed: Some((total, total)),
            });
        }
        Ok(results)
    }

    fn checkpoint(&self) -> Result<()> {
        FitContext::new(self.config.random_seed, self.cancellation_token.as_ref()).checkpoint()
    }

    /// Run one spec, or return its cached result, and report a terminal
    /// stage on failure.
    fn train_reported(
        &self,
        dataset: &Dataset,
        spec: &ModelSpec,
        reporter: &ProgressReporter<'_>,
    ) -> Result<TrainingResult> {
        let key = self.cache_key(dataset, spec);
        if let Some(cached) = key
            .as_ref()
            .and_then(|key| self.results_cache.lock().get(key).cloned())
        {
            debug!(family = %spec.family, "Using cached training result");
            reporter.report(
                TrainingStage::Complete,
                1.0,
                format!("Trained {} (cached)", spec.family),
            );
            return Ok(cached);
        }

        let outcome = self.run(dataset, spec, reporter);
        match &outcome {
            Ok(result) => {
                if let Some(key) = key {
                    self.results_cache.lock().insert(key, result.clone());
                }
            }
            Err(TrainError::Cancelled) => {
                info!(family = %spec.family, "Training cancelled");
                reporter.report(TrainingStage::Cancelled, 1.0, "Training cancelled");
            }
            Err(err) => {
                warn!(family = %spec.family, error = %err, "Training failed");
                reporter.report(TrainingStage::Failed, 1.0, err.to_string());
            }
        }
        outcome
    }

    fn run(
        &self,
        dataset: &Dataset,
        spec: &ModelSpec,
        reporter: &ProgressReporter<'_>,
    ) -> Result<TrainingResult> {
        let started = Instant::now();
        let ctx = FitContext::new(self.config.random_seed, self.cancellation_token.as_ref());
        let mut warnings = Vec::new();

        // Initializing
        reporter.report(TrainingStage::Initializing, 0.0, format!("Validating {}", spec.family));
        spec.validate()?;
        let factory = self.registry.get(&spec.family)?;
        let schema = factory.schema();
        schema.validate(&spec.family, &spec.hyperparameters)?;
        let grid = search_grid(factory.as_ref(), spec);
        schema.validate_grid(&spec.family, &grid)?;
        ctx.checkpoint()?;

        // Preprocessing
        reporter.report(TrainingStage::Preprocessing, 0.05, "Preparing data");
        let prepared = self.prepare(dataset, spec, factory.as_ref(), &mut warnings)?;
        info!(
            family = %spec.family,
            problem_type = %prepared.problem_type,
            train_rows = prepared.train.len(),
            test_rows = prepared.test.len(),
            features = spec.features.len(),
            "Training model"
        );
        ctx.checkpoint()?;

        // HyperparameterSearch
        let (chosen, cv) = if grid.is_empty() {
            (spec.hyperparameters.clone(), None)
        } else {
            let summary = self.cross_validate(
                factory.as_ref(),
                spec,
                &grid,
                &prepared,
                &ctx,
                reporter,
                &mut warnings,
            )?;
            (summary.best_hyperparameters.clone(), Some(summary))
        };

        // Training
        reporter.report(TrainingStage::Training, 0.6, format!("Fitting {}", spec.family));
        let resolved = schema.resolve(&chosen);
        let mut estimator =
            factory.create(&Params::new(spec.family.to_string(), &resolved), prepared.task)?;
        estimator.fit(&prepared.x_train, &prepared.y_train, &ctx)?;
        ctx.checkpoint()?;

        // Evaluation
        reporter.report(TrainingStage::Evaluation, 0.85, "Evaluating");
        let test_codes = estimator.predict(&prepared.x_test)?;
        let train_codes = estimator.predict(&prepared.x_train)?;
        let labels = prepared.labels.as_deref();
        let (test_metrics, confusion_matrix) = evaluate(labels, &prepared.y_test, &test_codes);
        let (train_metrics, _) = evaluate(labels, &prepared.y_train, &train_codes);
        debug!(family = %spec.family, ?test_metrics, "Evaluated model");

        let model = TrainedModel::new(
            spec.family.clone(),
            prepared.problem_type,
            spec.target.clone(),
            spec.features.clone(),
            prepared.labels.clone(),
            resolved.clone(),
            prepared.scaler,
            estimator,
        );
        let feature_importance = model.feature_importance().unwrap_or_default();
        let dataset_rows = |positions: &[usize]| -> Vec<usize> {
            positions.iter().map(|&p| prepared.rows[p]).collect()
        };

        let result = TrainingResult {
            family: spec.family.clone(),
            problem_type: prepared.problem_type,
            target: spec.target.clone(),
            features: spec.features.clone(),
            train_indices: dataset_rows(&prepared.train),
            test_indices: dataset_rows(&prepared.test),
            train_predictions: Predictions::decode(train_codes, labels),
            test_predictions: Predictions::decode(test_codes, labels),
            test_actual: Predictions::decode(prepared.y_test.clone(), labels),
            test_metrics,
            train_metrics,
            confusion_matrix,
            cv,
            hyperparameters: resolved,
            feature_importance,
            class_labels: prepared.labels.clone(),
            training_time_seconds: started.elapsed().as_secs_f64(),
            warnings,
            dropped_rows: prepared.dropped_rows,
            model: Arc::new(model),
        };
        info!(
            family = %spec.family,
            seconds = result.training_time_seconds,
            "Training complete"
        );
        reporter.report(TrainingStage::Complete, 1.0, format!("Trained {}", spec.family));
        Ok(result)
    }

    fn prepare(
        &self,
        dataset: &Dataset,
        spec: &ModelSpec,
        factory: &dyn ModelFactory,
        warnings: &mut Vec<String>,
    ) -> Result<Prepared> {
        let projection = matrix::project(
            dataset,
            &spec.features,
            &spec.target,
            spec.problem_type,
            self.config.missing_values,
        )?;
        if projection.dropped_rows > 0 {
            warnings.push(format!(
                "Dropped {} rows with missing values",
                projection.dropped_rows
            ));
        }

        let problem_type = projection.problem_type;
        if !factory.supports(problem_type) {
            return Err(TrainError::UnsupportedProblemType {
                family: spec.family.to_string(),
                problem_type,
            });
        }
        let labels = projection.target.labels().map(<[String]>::to_vec);
        let task = match &labels {
            None => Task::Regression,
            Some(labels) if labels.len() < 2 => {
                return Err(TrainError::InsufficientData(format!(
                    "target '{}' has a single class",
                    spec.target
                )));
            }
            Some(labels) => Task::Classification {
                n_classes: labels.len(),
            },
        };

        let y = projection.target.values();
        let split = train_test_split(
            projection.rows.len(),
            self.config.train_ratio,
            self.config.random_seed,
        )?;
        let mut x_train = select_rows(&projection.features, &split.train);
        let mut x_test = select_rows(&projection.features, &split.test);
        let scaler = self.config.standardize.then(|| Standardizer::fit(&x_train));
        if let Some(scaler) = &scaler {
            x_train = scaler.transform(&x_train);
            x_test = scaler.transform(&x_test);
        }
        let pick = |positions: &[usize]| positions.iter().map(|&p| y[p]).collect::<Vec<f64>>();

        Ok(Prepared {
            task,
            problem_type,
            y_train: pick(&split.train),
            y_test: pick(&split.test),
            labels,
            dropped_rows: projection.dropped_rows,
            x_train,
            x_test,
            scaler,
            train: split.train,
            test: split.test,
            rows: projection.rows,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn cross_validate(
        &self,
        factory: &dyn ModelFactory,
        spec: &ModelSpec,
        grid: &HyperparameterGrid,
        prepared: &Prepared,
        ctx: &FitContext<'_>,
        reporter: &ProgressReporter<'_>,
        warnings: &mut Vec<String>,
    ) -> Result<CvSummary> {
        let n = prepared.x_train.nrows();
        let folds = k_folds(n, self.config.cv_folds);
        if folds.len() < self.config.cv_folds {
            warnings.push(format!(
                "Only {} training rows: cross validation used {} folds instead of {}",
                n,
                folds.len(),
                self.config.cv_folds
            ));
        }
        let classification = matches!(prepared.task, Task::Classification { .. });
        let metric = if classification { "accuracy" } else { "mse" };
        let schema = factory.schema();
        let combinations = grid_combinations(&spec.hyperparameters, grid);
        let n_candidates = combinations.len();
        let total_units = (combinations.len() * folds.len()).max(1) as f64;
        info!(
            family = %spec.family,
            candidates = combinations.len(),
            folds = folds.len(),
            "Starting grid search"
        );

        let mut candidates = Vec::with_capacity(combinations.len());
        for (c, combination) in combinations.into_iter().enumerate() {
            let resolved = schema.resolve(&combination);
            let params = Params::new(spec.family.to_string(), &resolved);
            let mut fold_scores = Vec::with_capacity(folds.len());
            for (f, held_out) in folds.iter().enumerate() {
                ctx.checkpoint()?;
                let done = (c * folds.len() + f) as f64 / total_units;
                reporter.report(
                    TrainingStage::HyperparameterSearch,
                    0.1 + 0.5 * done,
                    format!("Cross-validating candidate {}/{n_candidates}", c + 1),
                );
                let fit_rows: Vec<usize> = (0..n).filter(|i| !held_out.contains(i)).collect();
                if fit_rows.is_empty() {
                    continue;
                }
                let x_fit = select_rows(&prepared.x_train, &fit_rows);
                let y_fit: Vec<f64> = fit_rows.iter().map(|&i| prepared.y_train[i]).collect();
                let x_val = select_rows(&prepared.x_train, held_out);
                let y_val: Vec<f64> = held_out.iter().map(|&i| prepared.y_train[i]).collect();

                let mut estimator = factory.create(&params, prepared.task)?;
                estimator.fit(&x_fit, &y_fit, ctx)?;
                let predicted = estimator.predict(&x_val)?;
                fold_scores.push(if classification {
                    metrics::accuracy(&y_val, &predicted)
                } else {
                    metrics::mse(&y_val, &predicted)
                });
            }
            let (mean_score, std_score) = mean_std(&fold_scores);
            debug!(candidate = c + 1, mean_score, std_score, "Scored grid candidate");
            candidates.push(CvCandidate {
                hyperparameters: combination,
                fold_scores,
                mean_score,
                std_score,
            });
        }

        let best = candidates
            .iter()
            .enumerate()
            .fold(None::<usize>, |best, (i, candidate)| match best {
                Some(b)
                    if !is_better(candidate.mean_score, candidates[b].mean_score, classification) =>
                {
                    Some(b)
                }
                _ => Some(i),
            })
            .ok_or_else(|| TrainError::InvalidSpec("hyperparameter grid is empty".to_string()))?;
        let winner = &candidates[best];
        info!(
            family = %spec.family,
            metric,
            score = winner.mean_score,
            "Grid search finished"
        );
        Ok(CvSummary {
            metric: metric.to_string(),
            folds: folds.len(),
            best_hyperparameters: winner.hyperparameters.clone(),
            mean_score: winner.mean_score,
            std_score: winner.std_score,
            candidates,
        })
    }
}

/// The model spec's grid, over the family's default grid when requested.
fn search_grid(factory: &dyn ModelFactory, spec: &ModelSpec) -> HyperparameterGrid {
    let mut grid = if spec.use_default_grid {
        factory.default_grid()
    } else {
        HyperparameterGrid::new()
    };
    grid.extend(spec.grid.iter().map(|(k, v)| (k.clone(), v.clone())));
    grid
}

/// NaN scores never win.
fn is_better(score: f64, best: f64, higher_is_better: bool) -> bool {
    if best.is_nan() {
        return !score.is_nan();
    }
    if higher_is_better { score > best } else { score < best }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn evaluate(
    labels: Option<&[String]>,
    actual: &[f64],
    predicted: &[f64],
) -> (MetricMap, Option<ConfusionMatrix>) {
    match labels {
        None => (metrics::regression_metrics(actual, predicted), None),
        Some(labels) => {
            let matrix = ConfusionMatrix::from_codes(labels, actual, predicted);
            (matrix.metrics(), Some(matrix))
        }
    }
}

fn unique_key<V>(results: &BTreeMap<String, V>, base: &str) -> String {
    if !results.contains_key(base) {
        return base.to_string();
    }
    (2..)
        .map(|i| format!("{base}_{i}"))
        .find(|key| !results.contains_key(key))
        .unwrap_or_else(|| base.to_string())
}

/// Builder for [`ModelOrchestrator`].
///
/// Every setting is optional: the default registry holds the built-in
/// families and the default [`TrainingConfig`] applies.
#[derive(Default)]
pub struct ModelOrchestratorBuilder {
    registry: Option<ModelRegistry>,
    config: Option<TrainingConfig>,
    progress_callback: Option<ProgressCallback>,
    cancellation_token: Option<CancellationToken>,
}

impl std::fmt::Debug for ModelOrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelOrchestratorBuilder")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .field(
                "cancellation_token",
                &self.cancellation_token.as_ref().map(|_| "<token>"),
            )
            .finish()
    }
}

impl ModelOrchestratorBuilder {
    #[must_use]
    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn config(mut self, config: TrainingConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the progress callback.
    ///
    /// The callback runs on the training thread; keep it quick.
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Checked between stages, folds, trees, boosting rounds and epochs.
    #[must_use]
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// # Errors
    ///
    /// Returns [`TrainError::InvalidConfig`] when the configuration fails
    /// [`TrainingConfig::validate`].
    pub fn build(self) -> Result<ModelOrchestrator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        Ok(ModelOrchestrator {
            registry: self.registry.unwrap_or_default(),
            config,
            progress_callback: self.progress_callback,
            cancellation_token: self.cancellation_token,
            results_cache: Mutex::new(HashMap::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ModelFamily;
    use polars::prelude::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn dataset() -> Dataset {
        let x: Vec<f64> = (0..30).map(f64::from).collect();
        let noise: Vec<f64> = (0..30).map(|i| f64::from(i % 4)).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        let class: Vec<&str> = (0..30).map(|i| if i < 15 { "low" } else { "high" }).collect();
        Dataset::new(
            df! {
                "x" => x,
                "noise" => noise,
                "y" => y,
                "class" => class,
            }
            .unwrap(),
        )
    }

    fn spec(family: ModelFamily, target: &str) -> ModelSpec {
        ModelSpec::builder(family)
            .target(target)
            .features(["x", "noise"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = TrainingConfig {
            cv_folds: 1,
            ..TrainingConfig::default()
        };
        let err = ModelOrchestrator::builder().config(config).build().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_builder_debug_hides_callback() {
        let builder = ModelOrchestrator::builder().on_progress(|_| {});
        let debug = format!("{builder:?}");
        assert!(debug.contains("<callback>"));
    }

    #[test]
    fn test_linear_regression_end_to_end() {
        let orchestrator = ModelOrchestrator::default();
        let result = orchestrator
            .train(&dataset(), &spec(ModelFamily::LinearRegression, "y"))
            .unwrap();
        assert_eq!(result.problem_type, ProblemType::Regression);
        assert_eq!(result.train_indices.len(), 24);
        assert_eq!(result.test_indices.len(), 6);
        assert!((result.metric("r2").unwrap() - 1.0).abs() < 1e-9);
        assert!(result.metric("rmse").unwrap() < 1e-6);
        assert!(result.confusion_matrix.is_none());
        assert_eq!(result.feature_importance[0].0, "x");
    }

    #[test]
    fn test_classification_on_text_target() {
        let orchestrator = ModelOrchestrator::default();
        let result = orchestrator
            .train(&dataset(), &spec(ModelFamily::DecisionTree, "class"))
            .unwrap();
        assert_eq!(result.problem_type, ProblemType::Classification);
        assert_eq!(
            result.class_labels,
            Some(vec!["high".to_string(), "low".to_string()])
        );
        assert_eq!(result.metric("accuracy"), Some(1.0));
        let matrix = result.confusion_matrix.unwrap();
        assert_eq!(matrix.total(), 6);
        assert!(result.test_predictions.as_labels().is_some());
    }

    #[test]
    fn test_unsupported_problem_type() {
        let err = ModelOrchestrator::default()
            .train(&dataset(), &spec(ModelFamily::Ridge, "class"))
            .unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_PROBLEM_TYPE");
    }

    // ============================================================================
    // Results Cache
    // ============================================================================

    #[test]
    fn test_repeated_request_served_from_cache() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&stages);
        let orchestrator = ModelOrchestrator::builder()
            .on_progress(move |update| sink.lock().push(update.stage))
            .build()
            .unwrap();
        let spec = spec(ModelFamily::LinearRegression, "y");
        assert!(orchestrator.cached_result(&dataset(), &spec).is_none());

        let first = orchestrator.train(&dataset(), &spec).unwrap();
        assert_eq!(orchestrator.cached_results(), 1);
        stages.lock().clear();

        let second = orchestrator.train(&dataset(), &spec).unwrap();
        assert_eq!(*stages.lock(), vec![TrainingStage::Complete]);
        assert_eq!(second.test_metrics, first.test_metrics);
        assert_eq!(second.test_indices, first.test_indices);
        assert_eq!(second.training_time_seconds, first.training_time_seconds);
        assert!(orchestrator.cached_result(&dataset(), &spec).is_some());
    }

    #[test]
    fn test_cache_key_tracks_data_and_spec() {
        let orchestrator = ModelOrchestrator::default();
        let spec = spec(ModelFamily::LinearRegression, "y");
        orchestrator.train(&dataset(), &spec).unwrap();

        let mut frame = dataset().frame().clone();
        frame
            .replace(
                "noise",
                Series::new("noise".into(), (0..30).map(|i| f64::from(i % 5)).collect::<Vec<_>>()),
            )
            .unwrap();
        let changed = Dataset::new(frame);
        assert!(orchestrator.cached_result(&changed, &spec).is_none());

        let reordered = ModelSpec::builder(ModelFamily::LinearRegression)
            .target("y")
            .features(["noise", "x"])
            .build()
            .unwrap();
        assert!(orchestrator.cached_result(&dataset(), &reordered).is_none());

        orchestrator.train(&changed, &spec).unwrap();
        assert_eq!(orchestrator.cached_results(), 2);
        orchestrator.clear_results_cache();
        assert_eq!(orchestrator.cached_results(), 0);
    }

    #[test]
    fn test_failures_not_cached() {
        let orchestrator = ModelOrchestrator::default();
        orchestrator
            .train(&dataset(), &spec(ModelFamily::Ridge, "class"))
            .unwrap_err();
        assert_eq!(orchestrator.cached_results(), 0);
    }

    #[test]
    fn test_grid_search_picks_lowest_mse() {
        let spec = ModelSpec::builder(ModelFamily::Ridge)
            .target("y")
            .features(["x", "noise"])
            .grid("alpha", vec![json!(100.0), json!(0.001), json!(10.0)])
            .build()
            .unwrap();
        let result = ModelOrchestrator::default().train(&dataset(), &spec).unwrap();
        let cv = result.cv.unwrap();
        assert_eq!(cv.metric, "mse");
        assert_eq!(cv.folds, 5);
        assert_eq!(cv.candidates.len(), 3);
        assert_eq!(cv.best_hyperparameters["alpha"], json!(0.001));
        assert_eq!(result.hyperparameters["alpha"], json!(0.001));
    }

    #[test]
    fn test_default_grid_merges_explicit_entries() {
        let spec = ModelSpec::builder(ModelFamily::KNearestNeighbors)
            .target("y")
            .features(["x"])
            .use_default_grid(true)
            .grid("weights", vec![json!("distance")])
            .build()
            .unwrap();
        let grid = search_grid(&crate::models::KNearestNeighborsFactory, &spec);
        assert_eq!(grid["weights"], vec![json!("distance")]);
        assert_eq!(grid["n_neighbors"].len(), 4);
    }

    #[test]
    fn test_unique_key() {
        let mut results = BTreeMap::new();
        assert_eq!(unique_key(&results, "ridge"), "ridge");
        results.insert("ridge".to_string(), ());
        assert_eq!(unique_key(&results, "ridge"), "ridge_2");
        results.insert("ridge_2".to_string(), ());
        assert_eq!(unique_key(&results, "ridge"), "ridge_3");
    }

    #[test]
    fn test_is_better() {
        assert!(is_better(0.5, 1.0, false));
        assert!(is_better(0.9, 0.8, true));
        assert!(!is_better(0.8, 0.8, true));
        assert!(is_better(1.0, f64::NAN, true));
        assert!(!is_better(f64::NAN, 1.0, false));
    }
}
