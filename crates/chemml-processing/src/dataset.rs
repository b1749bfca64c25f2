//! The immutable tabular snapshot every operation reads and produces.
//!
//! A [`Dataset`] pairs a polars [`DataFrame`] with the set of columns known to
//! hold SMILES strings. Column buffers are reference counted inside polars, so
//! cloning a dataset or deriving a new one that shares most columns is cheap.

use std::collections::BTreeSet;
use std::fmt;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{OpError, Result};
use crate::utils::{is_float_dtype, is_integer_dtype, is_text_dtype};

/// How a column is treated by operations and model training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Integer or floating point values.
    Numeric,
    Boolean,
    /// Polars categorical or enum storage.
    Categorical,
    /// Free text.
    Text,
    /// Text tagged as SMILES.
    Smiles,
    /// Dates, lists and other types the engine passes through untouched.
    Other,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Text => "text",
            ColumnKind::Smiles => "smiles",
            ColumnKind::Other => "other",
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable version of the table.
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
    smiles_columns: BTreeSet<String>,
}

static_assertions::assert_impl_all!(Dataset: Send, Sync);

impl Dataset {
    /// Wrap a frame with no SMILES tags.
    pub fn new(frame: DataFrame) -> Self {
        Self {
            frame,
            smiles_columns: BTreeSet::new(),
        }
    }

    /// Wrap a frame and tag the given columns as SMILES.
    ///
    /// Every tagged column must exist and hold strings.
    pub fn with_smiles_columns<I, S>(frame: DataFrame, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dataset = Self::new(frame);
        for column in columns {
            dataset = dataset.tagged(&column.into())?;
        }
        Ok(dataset)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.frame.width()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    /// Look up a column, mapping absence to [`OpError::ColumnNotFound`].
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.frame
            .column(name)
            .map_err(|_| OpError::ColumnNotFound(name.to_string()))
    }

    /// Materialized series for a column.
    pub fn series(&self, name: &str) -> Result<&Series> {
        Ok(self.column(name)?.as_materialized_series())
    }

    /// Position of a column in the frame.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.frame
            .get_column_index(name)
            .ok_or_else(|| OpError::ColumnNotFound(name.to_string()))
    }

    pub fn smiles_columns(&self) -> &BTreeSet<String> {
        &self.smiles_columns
    }

    pub fn is_smiles_column(&self, name: &str) -> bool {
        self.smiles_columns.contains(name)
    }

    /// Classify a column.
    pub fn column_kind(&self, name: &str) -> Result<ColumnKind> {
        let dtype = self.column(name)?.dtype();
        Ok(if self.is_smiles_column(name) {
            ColumnKind::Smiles
        } else if is_integer_dtype(dtype) || is_float_dtype(dtype) {
            ColumnKind::Numeric
        } else if matches!(dtype, DataType::Boolean) {
            ColumnKind::Boolean
        } else if matches!(dtype, DataType::String) {
            ColumnKind::Text
        } else if is_text_dtype(dtype) {
            ColumnKind::Categorical
        } else {
            ColumnKind::Other
        })
    }

    /// Same frame with one more SMILES tag.
    pub(crate) fn tagged(mut self, name: &str) -> Result<Self> {
        let dtype = self.column(name)?.dtype();
        if !matches!(dtype, DataType::String) {
            return Err(OpError::type_mismatch(name, "string", dtype));
        }
        self.smiles_columns.insert(name.to_string());
        Ok(self)
    }

    /// Derive a dataset from a new frame, keeping tags whose columns still
    /// exist as strings.
    pub(crate) fn derive(&self, frame: DataFrame) -> Self {
        let smiles_columns = self
            .smiles_columns
            .iter()
            .filter(|name| {
                frame
                    .column(name.as_str())
                    .is_ok_and(|column| matches!(column.dtype(), DataType::String))
            })
            .cloned()
            .collect();
        Self {
            frame,
            smiles_columns,
        }
    }

    /// Like [`derive`](Self::derive) but also tags `name`.
    pub(crate) fn derive_tagged(&self, frame: DataFrame, name: &str) -> Result<Self> {
        self.derive(frame).tagged(name)
    }

    /// Fail with [`OpError::DuplicateColumn`] if `name` is taken.
    pub(crate) fn ensure_absent(&self, name: &str) -> Result<()> {
        if self.has_column(name) {
            Err(OpError::DuplicateColumn(name.to_string()))
        } else {
            Ok(())
        }
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.smiles_columns == other.smiles_columns && self.frame.equals_missing(&other.frame)
    }
}

impl From<DataFrame> for Dataset {
    fn from(frame: DataFrame) -> Self {
        Self::new(frame)
    }
}
