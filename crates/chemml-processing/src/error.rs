//! Error types for dataset operations, history navigation and SMILES parsing.
//!
//! Every error exposes a stable [`error_code`](OpError::error_code) and
//! serializes as `{ "code": ..., "message": ... }` so a UI layer can branch on
//! the code without parsing messages.
//!
//! None of these errors leave a dataset half-modified: operations build a new
//! snapshot and only publish it after every step has succeeded.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// Marker returned by [`CancellationToken::check`](crate::CancellationToken::check)
/// when cancellation has been requested.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Failure to read a SMILES string.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    /// The text is not a valid molecule.
    #[error("cannot parse SMILES '{smiles}': {reason}")]
    Unparseable { smiles: String, reason: String },

    /// A batch computation was cancelled between molecules.
    #[error("feature extraction cancelled")]
    Cancelled,
}

impl ParseError {
    pub(crate) fn unparseable(smiles: &str, reason: impl Into<String>) -> Self {
        ParseError::Unparseable {
            smiles: smiles.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable code for programmatic handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unparseable { .. } => "UNPARSEABLE_SMILES",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<Cancelled> for ParseError {
    fn from(_: Cancelled) -> Self {
        ParseError::Cancelled
    }
}

/// The main error type for applying an [`Operation`](crate::Operation).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum OpError {
    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// The operation would create a column that already exists.
    #[error("Column '{0}' already exists in dataset")]
    DuplicateColumn(String),

    /// The column has the wrong type for the requested operation.
    #[error("Column '{column}' has type {found}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    /// An operation parameter is out of range or malformed.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A filter matched no rows; the dataset is left unchanged.
    #[error("Filter on column '{column}' matched no rows")]
    NoRowsMatched { column: String },

    /// A row holds text that is not a valid molecule.
    #[error("Invalid SMILES in column '{column}' at row {row}: {source}")]
    InvalidSmiles {
        column: String,
        row: usize,
        #[source]
        source: ParseError,
    },

    /// The operation was cancelled before it finished.
    #[error("Operation cancelled")]
    Cancelled,

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

impl OpError {
    pub(crate) fn type_mismatch(
        column: &str,
        expected: impl Into<String>,
        found: impl ToString,
    ) -> Self {
        OpError::TypeMismatch {
            column: column.to_string(),
            expected: expected.into(),
            found: found.to_string(),
        }
    }

    /// Get error code for frontend handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::DuplicateColumn(_) => "DUPLICATE_COLUMN",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::InvalidParameter(_) => "INVALID_PARAMETER",
            Self::NoRowsMatched { .. } => "NO_ROWS_MATCHED",
            Self::InvalidSmiles { .. } => "INVALID_SMILES",
            Self::Cancelled => "CANCELLED",
            Self::Polars(_) => "POLARS_ERROR",
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Errors caused by the request rather than the data; the caller can
    /// retry with different parameters.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Polars(_))
    }
}

impl From<Cancelled> for OpError {
    fn from(_: Cancelled) -> Self {
        OpError::Cancelled
    }
}

/// Undo/redo requested past either end of the history.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,
}

impl HistoryError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NothingToUndo => "NOTHING_TO_UNDO",
            Self::NothingToRedo => "NOTHING_TO_REDO",
        }
    }
}

macro_rules! serialize_as_code_and_message {
    ($($ty:ident),+) => {
        $(
            impl Serialize for $ty {
                fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
                where
                    S: serde::Serializer,
                {
                    let mut state = serializer.serialize_struct(stringify!($ty), 2)?;
                    state.serialize_field("code", &self.error_code())?;
                    state.serialize_field("message", &self.to_string())?;
                    state.end()
                }
            }
        )+
    };
}

serialize_as_code_and_message!(OpError, HistoryError, ParseError);

/// Result type alias for dataset operations.
pub type Result<T> = std::result::Result<T, OpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(OpError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(
            OpError::ColumnNotFound("mw".to_string()).error_code(),
            "COLUMN_NOT_FOUND"
        );
        assert_eq!(HistoryError::NothingToUndo.error_code(), "NOTHING_TO_UNDO");
    }

    #[test]
    fn test_cancelled_conversions() {
        assert!(OpError::from(Cancelled).is_cancelled());
        assert!(ParseError::from(Cancelled).is_cancelled());
    }

    #[test]
    fn test_invalid_smiles_keeps_source() {
        let error = OpError::InvalidSmiles {
            column: "smiles".to_string(),
            row: 1,
            source: ParseError::unparseable("C1CC", "unclosed ring 1"),
        };
        let message = error.to_string();
        assert!(message.contains("row 1"));
        assert!(message.contains("unclosed ring"));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_error_serialization() {
        let error = OpError::ColumnNotFound("LogP".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("LogP"));

        let json = serde_json::to_string(&HistoryError::NothingToRedo).unwrap();
        assert!(json.contains("NOTHING_TO_REDO"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(OpError::InvalidParameter("x".to_string()).is_recoverable());
        assert!(OpError::Cancelled.is_recoverable());
    }
}
