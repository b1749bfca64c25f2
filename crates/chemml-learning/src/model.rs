//! Estimator traits, the family registry and fitted models.
//!
//! Every family implements [`ModelFactory`], which describes its
//! hyperparameters and builds fresh [`Estimator`]s. The
//! [`ModelOrchestrator`](crate::ModelOrchestrator) only talks to these traits,
//! so adding a family is a matter of registering a factory:
//!
//! ```rust,ignore
//! let mut registry = ModelRegistry::with_builtins();
//! registry.register(Arc::new(MeanFactory));
//! let orchestrator = ModelOrchestrator::builder().registry(registry).build()?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chemml_processing::{CancellationToken, Dataset};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::config::ProblemType;
use crate::error::{Result, TrainError};
use crate::matrix::{self, Standardizer};
use crate::models;
use crate::params::{HyperparameterGrid, Hyperparameters, ParamSchema, Params};
use crate::spec::ModelFamily;

/// What an estimator is asked to learn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Regression,
    /// Targets are class indices `0..n_classes` stored as `f64`.
    Classification { n_classes: usize },
}

impl Task {
    pub fn problem_type(&self) -> ProblemType {
        match self {
            Task::Regression => ProblemType::Regression,
            Task::Classification { .. } => ProblemType::Classification,
        }
    }

    pub fn n_classes(&self) -> usize {
        match self {
            Task::Regression => 0,
            Task::Classification { n_classes } => *n_classes,
        }
    }
}

/// Per-fit settings: the seed for stochastic families and the cancellation
/// token checked between trees, boosting rounds and epochs.
#[derive(Debug, Clone, Copy)]
pub struct FitContext<'a> {
    pub seed: u64,
    pub token: Option<&'a CancellationToken>,
}

impl<'a> FitContext<'a> {
    pub fn new(seed: u64, token: Option<&'a CancellationToken>) -> Self {
        Self { seed, token }
    }

    /// Fail with [`TrainError::Cancelled`] once cancellation was requested.
    pub fn checkpoint(&self) -> Result<()> {
        match self.token {
            Some(token) => token.check().map_err(TrainError::from),
            None => Ok(()),
        }
    }
}

/// A model that can be fitted and queried.
///
/// Rows of `x` are samples. For classification `y` and the predictions hold
/// class indices.
pub trait Estimator: Send + Sync + fmt::Debug {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64], ctx: &FitContext<'_>) -> Result<()>;

    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>>;

    /// Relative importance of every feature, summing to 1, when the family
    /// can tell.
    fn feature_importance(&self) -> Option<Vec<f64>> {
        None
    }
}

/// Describes and builds one model family.
pub trait ModelFactory: Send + Sync {
    fn family(&self) -> ModelFamily;

    fn schema(&self) -> ParamSchema;

    fn supports(&self, problem_type: ProblemType) -> bool;

    /// Grid searched when a spec asks for the family's default grid.
    fn default_grid(&self) -> HyperparameterGrid {
        HyperparameterGrid::new()
    }

    /// A fresh, unfitted estimator. `params` are validated and complete.
    fn create(&self, params: &Params<'_>, task: Task) -> Result<Box<dyn Estimator>>;
}

/// Families by key.
#[derive(Clone)]
pub struct ModelRegistry {
    factories: HashMap<ModelFamily, Arc<dyn ModelFactory>>,
}

static_assertions::assert_impl_all!(ModelRegistry: Send, Sync);

impl ModelRegistry {
    /// A registry with no families.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with all built-in families.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for factory in models::builtin_factories() {
            registry.register(factory);
        }
        registry
    }

    /// Add or replace a family. Returns the replaced factory, if any.
    pub fn register(&mut self, factory: Arc<dyn ModelFactory>) -> Option<Arc<dyn ModelFactory>> {
        self.factories.insert(factory.family(), factory)
    }

    pub fn get(&self, family: &ModelFamily) -> Result<Arc<dyn ModelFactory>> {
        self.factories
            .get(family)
            .cloned()
            .ok_or_else(|| TrainError::UnknownModelFamily(family.to_string()))
    }

    pub fn contains(&self, family: &ModelFamily) -> bool {
        self.factories.contains_key(family)
    }

    /// Registered families, sorted.
    pub fn families(&self) -> Vec<ModelFamily> {
        let mut families: Vec<ModelFamily> = self.factories.keys().cloned().collect();
        families.sort();
        families
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("families", &self.families())
            .finish()
    }
}

/// Predictions in the target's own terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predictions {
    Numeric(Vec<f64>),
    Labels(Vec<String>),
}

impl Predictions {
    pub fn len(&self) -> usize {
        match self {
            Predictions::Numeric(values) => values.len(),
            Predictions::Labels(labels) => labels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            Predictions::Numeric(values) => Some(values),
            Predictions::Labels(_) => None,
        }
    }

    pub fn as_labels(&self) -> Option<&[String]> {
        match self {
            Predictions::Numeric(_) => None,
            Predictions::Labels(labels) => Some(labels),
        }
    }

    /// Numeric values or class indices back into the target's terms.
    pub(crate) fn decode(values: Vec<f64>, labels: Option<&[String]>) -> Self {
        match labels {
            None => Predictions::Numeric(values),
            Some(labels) => Predictions::Labels(
                values
                    .into_iter()
                    .map(|code| {
                        labels
                            .get(code.max(0.0) as usize)
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect(),
            ),
        }
    }
}

/// A fitted model together with everything needed to predict on new data.
#[derive(Debug)]
pub struct TrainedModel {
    family: ModelFamily,
    problem_type: ProblemType,
    target: String,
    features: Vec<String>,
    class_labels: Option<Vec<String>>,
    hyperparameters: Hyperparameters,
    scaler: Option<Standardizer>,
    estimator: Box<dyn Estimator>,
}

static_assertions::assert_impl_all!(TrainedModel: Send, Sync);

impl TrainedModel {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        family: ModelFamily,
        problem_type: ProblemType,
        target: String,
        features: Vec<String>,
        class_labels: Option<Vec<String>>,
        hyperparameters: Hyperparameters,
        scaler: Option<Standardizer>,
        estimator: Box<dyn Estimator>,
    ) -> Self {
        Self {
            family,
            problem_type,
            target,
            features,
            class_labels,
            hyperparameters,
            scaler,
            estimator,
        }
    }

    pub fn family(&self) -> &ModelFamily {
        &self.family
    }

    pub fn problem_type(&self) -> ProblemType {
        self.problem_type
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Feature columns in the order the model expects them.
    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn class_labels(&self) -> Option<&[String]> {
        self.class_labels.as_deref()
    }

    /// Hyperparameters the model was fitted with, defaults included.
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    /// Predict every row of `dataset`. Feature columns must be complete.
    pub fn predict(&self, dataset: &Dataset) -> Result<Predictions> {
        let x = matrix::feature_matrix(dataset, &self.features)?;
        self.predict_matrix(&x)
    }

    /// Predict raw (unscaled) feature rows.
    pub fn predict_matrix(&self, x: &DMatrix<f64>) -> Result<Predictions> {
        if x.ncols() != self.features.len() {
            return Err(TrainError::InvalidData(format!(
                "expected {} feature columns, got {}",
                self.features.len(),
                x.ncols()
            )));
        }
        let values = self.predict_codes(x)?;
        Ok(Predictions::decode(values, self.class_labels.as_deref()))
    }

    /// Raw estimator output for raw feature rows.
    pub(crate) fn predict_codes(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        match &self.scaler {
            Some(scaler) => self.estimator.predict(&scaler.transform(x)),
            None => self.estimator.predict(x),
        }
    }

    /// `(feature, importance)` sorted by descending importance.
    pub fn feature_importance(&self) -> Option<Vec<(String, f64)>> {
        let importance = self.estimator.feature_importance()?;
        let mut ranked: Vec<(String, f64)> = self
            .features
            .iter()
            .cloned()
            .zip(importance)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        Some(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_registry() {
        let registry = ModelRegistry::with_builtins();
        assert_eq!(registry.families(), {
            let mut all = ModelFamily::BUILTIN.to_vec();
            all.sort();
            all
        });
        let err = registry
            .get(&ModelFamily::Custom("svr".to_string()))
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "UNKNOWN_MODEL_FAMILY");
    }

    #[test]
    fn test_builtin_support_matrix() {
        let registry = ModelRegistry::with_builtins();
        let supports = |family: ModelFamily, problem: ProblemType| {
            registry.get(&family).unwrap().supports(problem)
        };
        assert!(supports(ModelFamily::Ridge, ProblemType::Regression));
        assert!(!supports(ModelFamily::Ridge, ProblemType::Classification));
        assert!(!supports(ModelFamily::LogisticRegression, ProblemType::Regression));
        assert!(supports(ModelFamily::RandomForest, ProblemType::Classification));
        assert!(supports(ModelFamily::NeuralNetwork, ProblemType::Classification));
        assert!(!supports(ModelFamily::GaussianProcess, ProblemType::Classification));
    }

    #[test]
    fn test_default_grids_validate_against_schema() {
        let registry = ModelRegistry::with_builtins();
        for family in registry.families() {
            let factory = registry.get(&family).unwrap();
            factory
                .schema()
                .validate_grid(&family, &factory.default_grid())
                .unwrap_or_else(|e| panic!("{family}: {e}"));
        }
    }

    #[test]
    fn test_predictions_decode() {
        let labels = vec!["active".to_string(), "inactive".to_string()];
        let decoded = Predictions::decode(vec![1.0, 0.0], Some(&labels));
        assert_eq!(
            decoded.as_labels().unwrap(),
            &["inactive".to_string(), "active".to_string()]
        );
        assert_eq!(Predictions::decode(vec![2.5], None).as_numeric(), Some(&[2.5][..]));
    }

    #[test]
    fn test_fit_context_checkpoint() {
        let token = CancellationToken::new();
        let ctx = FitContext::new(42, Some(&token));
        assert!(ctx.checkpoint().is_ok());
        token.cancel();
        assert!(ctx.checkpoint().unwrap_err().is_cancelled());
        assert!(FitContext::new(42, None).checkpoint().is_ok());
    }
}
