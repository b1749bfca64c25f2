//! Error types for the chemml-learning crate.
//!
//! [`TrainError`] is returned by every fallible call in this crate. Like the
//! dataset engine's errors it carries a stable [`error_code`](TrainError::error_code)
//! and serializes as `{ "code": ..., "message": ... }`.
//!
//! No training error leaves shared state behind: a failed run simply produces
//! no [`TrainingResult`](crate::TrainingResult).

use chemml_processing::Cancelled;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

use crate::config::ProblemType;

/// The main error type for model training and trend fitting.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TrainError {
    /// No factory is registered for the requested family.
    #[error("Unknown model family '{0}'")]
    UnknownModelFamily(String),

    /// A hyperparameter name is not in the family's schema, or its value has
    /// the wrong type or lies outside the allowed range.
    #[error("Invalid hyperparameter '{name}' for {family}: {reason}")]
    InvalidHyperparameter {
        family: String,
        name: String,
        reason: String,
    },

    /// Feature or target columns hold missing values and the configuration
    /// does not allow dropping rows.
    #[error("Missing values in columns: {}", columns.join(", "))]
    MissingValues { columns: Vec<String> },

    /// Too few rows (or points) for the requested computation.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// The family cannot solve this kind of problem.
    #[error("Model family {family} does not support {problem_type} problems")]
    UnsupportedProblemType {
        family: String,
        problem_type: ProblemType,
    },

    /// A feature column is not numeric or boolean.
    #[error("Feature column '{column}' has kind {kind}, expected numeric or boolean")]
    InvalidFeature { column: String, kind: String },

    /// The model spec is malformed (empty features, target used as feature, ...).
    #[error("Invalid model spec: {0}")]
    InvalidSpec(String),

    /// Invalid training configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The data cannot be used as given (mismatched lengths, singular system, ...).
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Training was cancelled through a [`CancellationToken`](chemml_processing::CancellationToken).
    #[error("Training cancelled")]
    Cancelled,

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

impl TrainError {
    pub(crate) fn hyperparameter(
        family: impl ToString,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        TrainError::InvalidHyperparameter {
            family: family.to_string(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Get error code for frontend handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownModelFamily(_) => "UNKNOWN_MODEL_FAMILY",
            Self::InvalidHyperparameter { .. } => "INVALID_HYPERPARAMETER",
            Self::MissingValues { .. } => "MISSING_VALUES",
            Self::InsufficientData(_) => "INSUFFICIENT_DATA",
            Self::UnsupportedProblemType { .. } => "UNSUPPORTED_PROBLEM_TYPE",
            Self::InvalidFeature { .. } => "INVALID_FEATURE",
            Self::InvalidSpec(_) => "INVALID_SPEC",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::Cancelled => "CANCELLED",
            Self::Polars(_) => "POLARS_ERROR",
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<Cancelled> for TrainError {
    fn from(_: Cancelled) -> Self {
        TrainError::Cancelled
    }
}

impl Serialize for TrainError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("TrainError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(TrainError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(
            TrainError::MissingValues {
                columns: vec!["logs".to_string()]
            }
            .error_code(),
            "MISSING_VALUES"
        );
        assert_eq!(
            TrainError::hyperparameter("ridge", "alpha", "must be >= 0").error_code(),
            "INVALID_HYPERPARAMETER"
        );
    }

    #[test]
    fn test_missing_values_message_lists_columns() {
        let error = TrainError::MissingValues {
            columns: vec!["logs".to_string(), "smiles_MW".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Missing values in columns: logs, smiles_MW"
        );
    }

    #[test]
    fn test_cancelled_conversion() {
        assert!(TrainError::from(Cancelled).is_cancelled());
        assert!(!TrainError::InvalidData("x".to_string()).is_cancelled());
    }

    #[test]
    fn test_error_serialization() {
        let error = TrainError::UnsupportedProblemType {
            family: "gaussian_process".to_string(),
            problem_type: ProblemType::Classification,
        };
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("UNSUPPORTED_PROBLEM_TYPE"));
        assert!(json.contains("classification"));
    }
}
