//! Configuration types for model training.
//!
//! This module provides [`TrainingConfig`] and its builder, plus the
//! [`ProblemType`] and [`MissingValuePolicy`] enums.
//!
//! # Example
//!
//! ```
//! use chemml_learning::{MissingValuePolicy, TrainingConfig};
//!
//! let config = TrainingConfig::builder()
//!     .train_ratio(0.75)
//!     .random_seed(7)
//!     .cv_folds(3)
//!     .missing_values(MissingValuePolicy::DropRows)
//!     .build()
//!     .expect("valid config");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TrainError;

/// Default fraction of rows used for training.
pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;
/// Default seed for splits, bootstrap samples and weight initialisation.
pub const DEFAULT_RANDOM_SEED: u64 = 42;
/// Default number of cross-validation folds.
pub const DEFAULT_CV_FOLDS: usize = 5;

/// The type of machine learning problem to solve.
///
/// Inferred from the target column unless a [`ModelSpec`](crate::ModelSpec)
/// overrides it:
/// - float targets: [`Regression`](Self::Regression)
/// - integer targets: [`Regression`](Self::Regression)
/// - text, categorical and boolean targets: [`Classification`](Self::Classification)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    /// Predicting continuous values. Scored with R², RMSE, MAE and MSE.
    Regression,
    /// Predicting discrete classes. Scored with accuracy and weighted
    /// precision, recall and F1.
    Classification,
}

impl ProblemType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemType::Regression => "regression",
            ProblemType::Classification => "classification",
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProblemType {
    type Err = TrainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regression" => Ok(ProblemType::Regression),
            "classification" => Ok(ProblemType::Classification),
            other => Err(TrainError::InvalidSpec(format!(
                "unknown problem type '{other}', expected regression or classification"
            ))),
        }
    }
}

/// What to do with rows that have missing feature or target values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Fail with [`TrainError::MissingValues`]. Impute first.
    #[default]
    Reject,
    /// Train on the complete rows only. The number of dropped rows is
    /// reported in the result's warnings.
    DropRows,
}

/// Settings shared by every model trained through one
/// [`ModelOrchestrator`](crate::ModelOrchestrator).
///
/// # Validation
///
/// [`build()`](TrainingConfigBuilder::build) checks:
/// - `train_ratio` is in `(0.0, 1.0)` (exclusive)
/// - `cv_folds` is at least 2
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Fraction of rows in the training partition (default: 0.8).
    pub train_ratio: f64,

    /// Seed for the split shuffle and every stochastic model (default: 42).
    ///
    /// The same seed on the same data gives the same split, predictions and
    /// metrics.
    pub random_seed: u64,

    /// Folds used by grid-search cross validation (default: 5).
    ///
    /// Capped at the number of training rows.
    pub cv_folds: usize,

    /// Standardise features with the training partition's mean and standard
    /// deviation before fitting (default: true).
    pub standardize: bool,

    /// Missing-value handling (default: [`MissingValuePolicy::Reject`]).
    pub missing_values: MissingValuePolicy,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            train_ratio: DEFAULT_TRAIN_RATIO,
            random_seed: DEFAULT_RANDOM_SEED,
            cv_folds: DEFAULT_CV_FOLDS,
            standardize: true,
            missing_values: MissingValuePolicy::default(),
        }
    }
}

impl TrainingConfig {
    /// Create a new builder for `TrainingConfig`.
    #[must_use]
    pub fn builder() -> TrainingConfigBuilder {
        TrainingConfigBuilder::default()
    }

    /// Check every setting, returning [`TrainError::InvalidConfig`] for the
    /// first invalid one.
    pub fn validate(&self) -> Result<(), TrainError> {
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(TrainError::InvalidConfig(
                "train_ratio must be between 0.0 and 1.0 (exclusive)".to_string(),
            ));
        }
        if self.cv_folds < 2 {
            return Err(TrainError::InvalidConfig(
                "cv_folds must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`TrainingConfig`].
#[derive(Debug, Clone, Default)]
pub struct TrainingConfigBuilder {
    config: TrainingConfig,
}

impl TrainingConfigBuilder {
    /// Set the training fraction (default: 0.8).
    ///
    /// [`build()`](Self::build) fails unless `0.0 < ratio < 1.0`.
    #[must_use]
    pub fn train_ratio(mut self, ratio: f64) -> Self {
        self.config.train_ratio = ratio;
        self
    }

    /// Set the random seed for reproducibility (default: 42).
    #[must_use]
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;
        self
    }

    /// Set the number of cross-validation folds (default: 5).
    ///
    /// [`build()`](Self::build) fails if `folds < 2`.
    #[must_use]
    pub fn cv_folds(mut self, folds: usize) -> Self {
        self.config.cv_folds = folds;
        self
    }

    /// Enable or disable feature standardisation (default: true).
    #[must_use]
    pub fn standardize(mut self, standardize: bool) -> Self {
        self.config.standardize = standardize;
        self
    }

    #[must_use]
    pub fn missing_values(mut self, policy: MissingValuePolicy) -> Self {
        self.config.missing_values = policy;
        self
    }

    /// Build the configuration, validating all settings.
    pub fn build(self) -> Result<TrainingConfig, TrainError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
