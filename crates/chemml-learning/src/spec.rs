//! What to train: model family, columns and hyperparameters.
//!
//! # Example
//!
//! ```
//! use chemml_learning::{ModelFamily, ModelSpec};
//! use serde_json::json;
//!
//! let spec = ModelSpec::builder(ModelFamily::RandomForest)
//!     .target("logs")
//!     .features(["smiles_MW", "smiles_LogP", "smiles_TPSA"])
//!     .hyperparameter("n_estimators", json!(200))
//!     .grid("max_depth", vec![json!(null), json!(10)])
//!     .build()
//!     .expect("valid spec");
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ProblemType;
use crate::error::TrainError;
use crate::params::{HyperparameterGrid, Hyperparameters};

/// Model family, the key into a [`ModelRegistry`](crate::ModelRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    LinearRegression,
    Ridge,
    Lasso,
    ElasticNet,
    LogisticRegression,
    DecisionTree,
    RandomForest,
    GradientBoosting,
    AdaBoost,
    KNearestNeighbors,
    NeuralNetwork,
    GaussianProcess,
    /// A family added through [`ModelRegistry::register`](crate::ModelRegistry::register).
    Custom(String),
}

impl ModelFamily {
    /// Families registered by [`ModelRegistry::with_builtins`](crate::ModelRegistry::with_builtins).
    pub const BUILTIN: [ModelFamily; 12] = [
        ModelFamily::LinearRegression,
        ModelFamily::Ridge,
        ModelFamily::Lasso,
        ModelFamily::ElasticNet,
        ModelFamily::LogisticRegression,
        ModelFamily::DecisionTree,
        ModelFamily::RandomForest,
        ModelFamily::GradientBoosting,
        ModelFamily::AdaBoost,
        ModelFamily::KNearestNeighbors,
        ModelFamily::NeuralNetwork,
        ModelFamily::GaussianProcess,
    ];

    pub fn name(&self) -> &str {
        match self {
            ModelFamily::LinearRegression => "linear_regression",
            ModelFamily::Ridge => "ridge",
            ModelFamily::Lasso => "lasso",
            ModelFamily::ElasticNet => "elastic_net",
            ModelFamily::LogisticRegression => "logistic_regression",
            ModelFamily::DecisionTree => "decision_tree",
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::GradientBoosting => "gradient_boosting",
            ModelFamily::AdaBoost => "ada_boost",
            ModelFamily::KNearestNeighbors => "k_nearest_neighbors",
            ModelFamily::NeuralNetwork => "neural_network",
            ModelFamily::GaussianProcess => "gaussian_process",
            ModelFamily::Custom(name) => name,
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelFamily {
    type Err = std::convert::Infallible;

    /// Built-in names map to their variant; anything else is a custom family.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ModelFamily::BUILTIN
            .iter()
            .find(|family| family.name() == s)
            .cloned()
            .unwrap_or_else(|| ModelFamily::Custom(s.to_string())))
    }
}

/// One model to train.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub family: ModelFamily,
    pub target: String,
    pub features: Vec<String>,

    /// Fixed hyperparameters; unset ones take the family's defaults.
    #[serde(default)]
    pub hyperparameters: Hyperparameters,

    /// Candidates searched with k-fold cross validation. Entries override
    /// `hyperparameters` of the same name.
    #[serde(default)]
    pub grid: HyperparameterGrid,

    /// Search the family's default grid (explicit `grid` entries win).
    #[serde(default)]
    pub use_default_grid: bool,

    /// Overrides the problem type inferred from the target column.
    #[serde(default)]
    pub problem_type: Option<ProblemType>,
}

impl ModelSpec {
    #[must_use]
    pub fn builder(family: ModelFamily) -> ModelSpecBuilder {
        ModelSpecBuilder::new(family)
    }

    /// Structural checks that need no dataset.
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.target.is_empty() {
            return Err(TrainError::InvalidSpec("target column is not set".to_string()));
        }
        if self.features.is_empty() {
            return Err(TrainError::InvalidSpec("no feature columns selected".to_string()));
        }
        let mut seen = HashSet::new();
        for feature in &self.features {
            if !seen.insert(feature.as_str()) {
                return Err(TrainError::InvalidSpec(format!(
                    "feature '{feature}' is selected twice"
                )));
            }
        }
        if seen.contains(self.target.as_str()) {
            return Err(TrainError::InvalidSpec(format!(
                "target '{}' is also a feature",
                self.target
            )));
        }
        Ok(())
    }

    /// Whether a grid search will run.
    pub fn has_search(&self) -> bool {
        self.use_default_grid || !self.grid.is_empty()
    }
}

/// Builder for [`ModelSpec`].
#[derive(Debug, Clone)]
pub struct ModelSpecBuilder {
    spec: ModelSpec,
}

impl ModelSpecBuilder {
    fn new(family: ModelFamily) -> Self {
        Self {
            spec: ModelSpec {
                family,
                target: String::new(),
                features: Vec::new(),
                hyperparameters: Hyperparameters::new(),
                grid: HyperparameterGrid::new(),
                use_default_grid: false,
                problem_type: None,
            },
        }
    }

    #[must_use]
    pub fn target(mut self, column: impl Into<String>) -> Self {
        self.spec.target = column.into();
        self
    }

    #[must_use]
    pub fn feature(mut self, column: impl Into<String>) -> Self {
        self.spec.features.push(column.into());
        self
    }

    #[must_use]
    pub fn features<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.features.extend(columns.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn hyperparameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.spec.hyperparameters.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn grid(mut self, name: impl Into<String>, candidates: Vec<Value>) -> Self {
        self.spec.grid.insert(name.into(), candidates);
        self
    }

    #[must_use]
    pub fn use_default_grid(mut self, enabled: bool) -> Self {
        self.spec.use_default_grid = enabled;
        self
    }

    #[must_use]
    pub fn problem_type(mut self, problem_type: ProblemType) -> Self {
        self.spec.problem_type = Some(problem_type);
        self
    }

    /// Build the model spec, failing with [`TrainError::InvalidSpec`].
    pub fn build(self) -> Result<ModelSpec, TrainError> {
        self.spec.validate()?;
        Ok(self.spec)
    }
}
