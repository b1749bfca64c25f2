//! Projection of dataset snapshots into numeric matrices.
//!
//! Feature columns must be numeric or boolean; booleans become 0/1. The target
//! decides the problem type when the model spec does not: numeric targets regress,
//! everything else classifies. Class labels are the target's distinct values
//! (numerically sorted for numeric targets) and models see their indices.

use std::collections::BTreeSet;

use chemml_processing::utils::{is_float_dtype, numeric_values, text_values};
use chemml_processing::{ColumnKind, Dataset};
use nalgebra::DMatrix;
use polars::prelude::Series;

use crate::config::{MissingValuePolicy, ProblemType};
use crate::error::{Result, TrainError};

/// Target values ready for an estimator.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TargetData {
    Regression(Vec<f64>),
    /// `codes[i]` indexes `labels`.
    Classification { codes: Vec<f64>, labels: Vec<String> },
}

impl TargetData {
    pub(crate) fn values(&self) -> &[f64] {
        match self {
            TargetData::Regression(values) => values,
            TargetData::Classification { codes, .. } => codes,
        }
    }

    pub(crate) fn labels(&self) -> Option<&[String]> {
        match self {
            TargetData::Regression(_) => None,
            TargetData::Classification { labels, .. } => Some(labels),
        }
    }
}

/// Complete rows of the selected columns.
#[derive(Debug, Clone)]
pub(crate) struct Projection {
    pub features: DMatrix<f64>,
    pub target: TargetData,
    pub problem_type: ProblemType,
    /// Dataset row of every matrix row.
    pub rows: Vec<usize>,
    pub dropped_rows: usize,
}

fn series<'a>(dataset: &'a Dataset, column: &str) -> Result<&'a Series> {
    dataset
        .series(column)
        .map_err(|_| TrainError::ColumnNotFound(column.to_string()))
}

fn kind(dataset: &Dataset, column: &str) -> Result<ColumnKind> {
    dataset
        .column_kind(column)
        .map_err(|_| TrainError::ColumnNotFound(column.to_string()))
}

/// Read one feature column; NaN counts as missing.
fn feature_values(dataset: &Dataset, column: &str) -> Result<Vec<Option<f64>>> {
    let kind = kind(dataset, column)?;
    if !matches!(kind, ColumnKind::Numeric | ColumnKind::Boolean) {
        return Err(TrainError::InvalidFeature {
            column: column.to_string(),
            kind: kind.to_string(),
        });
    }
    let values = numeric_values(series(dataset, column)?)?;
    Ok(values
        .into_iter()
        .map(|v| v.filter(|v| !v.is_nan()))
        .collect())
}

fn infer_problem_type(dataset: &Dataset, target: &str) -> Result<ProblemType> {
    match kind(dataset, target)? {
        // float and integer targets both regress unless overridden
        ColumnKind::Numeric => Ok(ProblemType::Regression),
        ColumnKind::Boolean | ColumnKind::Categorical | ColumnKind::Text | ColumnKind::Smiles => {
            Ok(ProblemType::Classification)
        }
        ColumnKind::Other => Err(TrainError::InvalidData(format!(
            "target column '{target}' has an unsupported type"
        ))),
    }
}

enum RawTarget {
    Numeric(Vec<Option<f64>>),
    Text { values: Vec<Option<String>>, numeric: bool },
}

impl RawTarget {
    fn is_present(&self, row: usize) -> bool {
        match self {
            RawTarget::Numeric(values) => values[row].is_some(),
            RawTarget::Text { values, .. } => values[row].is_some(),
        }
    }
}

fn read_target(dataset: &Dataset, target: &str, problem_type: ProblemType) -> Result<RawTarget> {
    let kind = kind(dataset, target)?;
    let series = series(dataset, target)?;
    match problem_type {
        ProblemType::Regression => {
            if kind != ColumnKind::Numeric {
                return Err(TrainError::InvalidData(format!(
                    "regression target '{target}' must be numeric, found {kind}"
                )));
            }
            let values = numeric_values(series)?
                .into_iter()
                .map(|v| v.filter(|v| !v.is_nan()))
                .collect();
            Ok(RawTarget::Numeric(values))
        }
        ProblemType::Classification => {
            let numeric = kind == ColumnKind::Numeric;
            let mut values = text_values(series)?;
            if numeric && is_float_dtype(series.dtype()) {
                for value in values.iter_mut() {
                    if value.as_deref() == Some("NaN") {
                        *value = None;
                    }
                }
            }
            Ok(RawTarget::Text { values, numeric })
        }
    }
}

/// Class labels in index order.
fn class_labels(values: &[String], numeric: bool) -> Vec<String> {
    let distinct: BTreeSet<&String> = values.iter().collect();
    let mut labels: Vec<String> = distinct.into_iter().cloned().collect();
    if numeric {
        labels.sort_by(|a, b| {
            let a = a.parse::<f64>().unwrap_or(f64::NAN);
            let b = b.parse::<f64>().unwrap_or(f64::NAN);
            a.total_cmp(&b)
        });
    }
    labels
}

/// Project `features` and `target` of `dataset` to complete numeric rows.
pub(crate) fn project(
    dataset: &Dataset,
    features: &[String],
    target: &str,
    problem_override: Option<ProblemType>,
    policy: MissingValuePolicy,
) -> Result<Projection> {
    let columns = features
        .iter()
        .map(|name| feature_values(dataset, name))
        .collect::<Result<Vec<_>>>()?;
    let problem_type = match problem_override {
        Some(problem_type) => problem_type,
        None => infer_problem_type(dataset, target)?,
    };
    let raw_target = read_target(dataset, target, problem_type)?;

    let height = dataset.height();
    let mut missing: Vec<String> = features
        .iter()
        .zip(&columns)
        .filter(|(_, values)| values.iter().any(Option::is_none))
        .map(|(name, _)| name.clone())
        .collect();
    if (0..height).any(|row| !raw_target.is_present(row)) {
        missing.push(target.to_string());
    }

    let rows: Vec<usize> = if missing.is_empty() {
        (0..height).collect()
    } else {
        match policy {
            MissingValuePolicy::Reject => return Err(TrainError::MissingValues { columns: missing }),
            MissingValuePolicy::DropRows => (0..height)
                .filter(|&row| {
                    raw_target.is_present(row) && columns.iter().all(|c| c[row].is_some())
                })
                .collect(),
        }
    };
    if rows.is_empty() {
        return Err(TrainError::InsufficientData(
            "no complete rows to train on".to_string(),
        ));
    }

    let matrix = DMatrix::from_fn(rows.len(), columns.len(), |i, j| {
        columns[j][rows[i]].unwrap_or(f64::NAN)
    });

    let target = match raw_target {
        RawTarget::Numeric(values) => {
            TargetData::Regression(rows.iter().map(|&r| values[r].unwrap_or(f64::NAN)).collect())
        }
        RawTarget::Text { values, numeric } => {
            let kept: Vec<String> = rows
                .iter()
                .map(|&r| values[r].clone().unwrap_or_default())
                .collect();
            let labels = class_labels(&kept, numeric);
            let codes = kept
                .iter()
                .map(|value| labels.iter().position(|l| l == value).unwrap_or(0) as f64)
                .collect();
            TargetData::Classification { codes, labels }
        }
    };

    Ok(Projection {
        features: matrix,
        target,
        problem_type,
        dropped_rows: height - rows.len(),
        rows,
    })
}

/// Feature matrix for prediction. Every value must be present.
pub(crate) fn feature_matrix(dataset: &Dataset, features: &[String]) -> Result<DMatrix<f64>> {
    let columns = features
        .iter()
        .map(|name| feature_values(dataset, name))
        .collect::<Result<Vec<_>>>()?;
    let missing: Vec<String> = features
        .iter()
        .zip(&columns)
        .filter(|(_, values)| values.iter().any(Option::is_none))
        .map(|(name, _)| name.clone())
        .collect();
    if !missing.is_empty() {
        return Err(TrainError::MissingValues { columns: missing });
    }
    Ok(DMatrix::from_fn(dataset.height(), columns.len(), |i, j| {
        columns[j][i].unwrap_or(f64::NAN)
    }))
}

/// Per-feature centring and scaling fitted on the training partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardizer {
    /// Population mean and standard deviation of every column. Constant
    /// columns keep a scale of 1.
    pub fn fit(x: &DMatrix<f64>) -> Self {
        let n = x.nrows().max(1) as f64;
        let (means, scales): (Vec<f64>, Vec<f64>) = x
            .column_iter()
            .map(|column| {
                let mean = column.sum() / n;
                let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                (mean, if std > f64::EPSILON { std } else { 1.0 })
            })
            .unzip();
        Self { means, scales }
    }

    pub fn transform(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| {
            (x[(i, j)] - self.means[j]) / self.scales[j]
        })
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use pretty_assertions::assert_eq;

    fn dataset() -> Dataset {
        Dataset::new(
            df! {
                "mw" => [46.07, 78.11, 60.05, 58.08],
                "aromatic" => [false, true, false, false],
                "logs" => [Some(1.1), Some(-1.6), None, Some(0.2)],
                "activity" => ["active", "inactive", "active", "inactive"],
                "class" => [3i64, 1, 10, 1],
                "smiles" => ["CCO", "c1ccccc1", "CC(=O)O", "CC(C)=O"],
            }
            .unwrap(),
        )
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_regression_projection() {
        let projection = project(
            &dataset(),
            &names(&["mw", "aromatic"]),
            "class",
            None,
            MissingValuePolicy::Reject,
        )
        .unwrap();
        assert_eq!(projection.problem_type, ProblemType::Regression);
        assert_eq!(projection.features.shape(), (4, 2));
        assert_eq!(projection.features[(1, 1)], 1.0);
        assert_eq!(projection.target.values(), &[3.0, 1.0, 10.0, 1.0]);
    }

    #[test]
    fn test_classification_labels_are_sorted() {
        let projection = project(
            &dataset(),
            &names(&["mw"]),
            "activity",
            None,
            MissingValuePolicy::Reject,
        )
        .unwrap();
        assert_eq!(projection.problem_type, ProblemType::Classification);
        assert_eq!(
            projection.target.labels().unwrap(),
            &["active".to_string(), "inactive".to_string()]
        );
        assert_eq!(projection.target.values(), &[0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_integer_target_override_sorts_numerically() {
        let projection = project(
            &dataset(),
            &names(&["mw"]),
            "class",
            Some(ProblemType::Classification),
            MissingValuePolicy::Reject,
        )
        .unwrap();
        assert_eq!(
            projection.target.labels().unwrap(),
            &["1".to_string(), "3".to_string(), "10".to_string()]
        );
        assert_eq!(projection.target.values(), &[1.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn test_missing_values_rejected_or_dropped() {
        let err = project(
            &dataset(),
            &names(&["logs"]),
            "mw",
            None,
            MissingValuePolicy::Reject,
        )
        .unwrap_err();
        match err {
            TrainError::MissingValues { columns } => assert_eq!(columns, names(&["logs"])),
            other => panic!("unexpected error: {other:?}"),
        }

        let projection = project(
            &dataset(),
            &names(&["logs"]),
            "mw",
            None,
            MissingValuePolicy::DropRows,
        )
        .unwrap();
        assert_eq!(projection.rows, vec![0, 1, 3]);
        assert_eq!(projection.dropped_rows, 1);
    }

    #[test]
    fn test_text_feature_rejected() {
        let err = project(
            &dataset(),
            &names(&["smiles"]),
            "mw",
            None,
            MissingValuePolicy::Reject,
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_FEATURE");

        let err = project(
            &dataset(),
            &names(&["nope"]),
            "mw",
            None,
            MissingValuePolicy::Reject,
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_regression_on_text_target_rejected() {
        let err = project(
            &dataset(),
            &names(&["mw"]),
            "activity",
            Some(ProblemType::Regression),
            MissingValuePolicy::Reject,
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");
    }

    #[test]
    fn test_standardizer() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 5.0, 2.0, 5.0, 3.0, 5.0]);
        let scaler = Standardizer::fit(&x);
        assert_eq!(scaler.means(), &[2.0, 5.0]);
        // constant column keeps unit scale
        assert_eq!(scaler.scales()[1], 1.0);

        let z = scaler.transform(&x);
        assert!((z[(0, 0)] + 1.224_744_871).abs() < 1e-6);
        assert_eq!(z[(2, 1)], 0.0);
    }
}
