//! Row filtering.

use std::fmt;

use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{OpError, Result};
use crate::utils::{is_numeric_dtype, numeric_values, parse_number, text_values};

/// Predicate applied to every value of the filtered column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCondition {
    Contains,
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    /// Regular expression search.
    Matches,
    IsMissing,
    IsPresent,
}

impl FilterCondition {
    fn symbol(&self) -> &'static str {
        match self {
            FilterCondition::Contains => "contains",
            FilterCondition::Equals => "==",
            FilterCondition::NotEquals => "!=",
            FilterCondition::StartsWith => "starts with",
            FilterCondition::EndsWith => "ends with",
            FilterCondition::GreaterThan => ">",
            FilterCondition::GreaterOrEqual => ">=",
            FilterCondition::LessThan => "<",
            FilterCondition::LessOrEqual => "<=",
            FilterCondition::Matches => "matches",
            FilterCondition::IsMissing => "is missing",
            FilterCondition::IsPresent => "is present",
        }
    }

    fn takes_value(&self) -> bool {
        !matches!(self, FilterCondition::IsMissing | FilterCondition::IsPresent)
    }
}

/// Keep the rows whose `column` value satisfies `condition` against `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub column: String,
    pub condition: FilterCondition,
    /// Ignored by `IsMissing` and `IsPresent`.
    #[serde(default)]
    pub value: String,
}

impl FilterSpec {
    pub fn new(
        column: impl Into<String>,
        condition: FilterCondition,
        value: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            condition,
            value: value.into(),
        }
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.condition.takes_value() {
            write!(f, "'{}' {} '{}'", self.column, self.condition.symbol(), self.value)
        } else {
            write!(f, "'{}' {}", self.column, self.condition.symbol())
        }
    }
}

pub(crate) fn apply(dataset: &Dataset, spec: &FilterSpec) -> Result<Dataset> {
    let series = dataset.series(&spec.column)?;
    let mask = row_mask(series, spec)?;

    if !mask.iter().any(|keep| *keep) {
        return Err(OpError::NoRowsMatched {
            column: spec.column.clone(),
        });
    }

    let mask = BooleanChunked::from_slice("mask".into(), &mask);
    let frame = dataset.frame().filter(&mask)?;
    Ok(dataset.derive(frame))
}

fn row_mask(series: &Series, spec: &FilterSpec) -> Result<Vec<bool>> {
    use FilterCondition::*;

    let numeric = is_numeric_dtype(series.dtype());
    let column = spec.column.as_str();

    let mask = match spec.condition {
        IsMissing => series.is_null().into_iter().map(|v| v == Some(true)).collect(),
        IsPresent => series.is_not_null().into_iter().map(|v| v == Some(true)).collect(),

        GreaterThan | GreaterOrEqual | LessThan | LessOrEqual => {
            if !numeric {
                return Err(OpError::type_mismatch(column, "numeric", series.dtype()));
            }
            let threshold = parse_number(&spec.value).ok_or_else(|| {
                OpError::InvalidParameter(format!(
                    "'{}' is not a number (filter on '{column}')",
                    spec.value
                ))
            })?;
            let compare: fn(f64, f64) -> bool = match spec.condition {
                GreaterThan => |a, b| a > b,
                GreaterOrEqual => |a, b| a >= b,
                LessThan => |a, b| a < b,
                _ => |a, b| a <= b,
            };
            numeric_values(series)?
                .into_iter()
                .map(|v| v.is_some_and(|v| compare(v, threshold)))
                .collect()
        }

        Equals | NotEquals => {
            let wanted = spec.condition == Equals;
            match parse_number(&spec.value).filter(|_| numeric) {
                Some(target) => numeric_values(series)?
                    .into_iter()
                    .map(|v| v.is_some_and(|v| (v == target) == wanted))
                    .collect(),
                None => text_values(series)?
                    .into_iter()
                    .map(|v| v.is_some_and(|v| (v == spec.value) == wanted))
                    .collect(),
            }
        }

        Contains | StartsWith | EndsWith | Matches => {
            if numeric {
                return Err(OpError::type_mismatch(column, "text", series.dtype()));
            }
            let regex = if spec.condition == Matches {
                Some(Regex::new(&spec.value).map_err(|err| {
                    OpError::InvalidParameter(format!("invalid pattern '{}': {err}", spec.value))
                })?)
            } else {
                None
            };
            text_values(series)?
                .into_iter()
                .map(|v| {
                    v.is_some_and(|v| match spec.condition {
                        Contains => v.contains(&spec.value),
                        StartsWith => v.starts_with(&spec.value),
                        EndsWith => v.ends_with(&spec.value),
                        _ => regex.as_ref().is_some_and(|re| re.is_match(&v)),
                    })
                })
                .collect()
        }
    };
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dataset() -> Dataset {
        Dataset::new(
            df! {
                "name" => [Some("ethanol"), Some("benzene"), None, Some("ethane")],
                "mw" => [Some(46.07), Some(78.11), Some(30.07), None],
                "count" => [1i64, 2, 3, 4],
            }
            .unwrap(),
        )
    }

    fn kept(spec: FilterSpec) -> Vec<i64> {
        let out = apply(&dataset(), &spec).unwrap();
        out.series("count")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }

    #[test]
    fn test_numeric_conditions() {
        assert_eq!(kept(FilterSpec::new("mw", FilterCondition::GreaterThan, "40")), vec![1, 2]);
        assert_eq!(kept(FilterSpec::new("mw", FilterCondition::LessOrEqual, "46.07")), vec![1, 3]);
        assert_eq!(kept(FilterSpec::new("count", FilterCondition::Equals, "3")), vec![3]);
        assert_eq!(kept(FilterSpec::new("count", FilterCondition::NotEquals, "3")), vec![1, 2, 4]);
    }

    #[test]
    fn test_text_conditions_skip_missing() {
        assert_eq!(kept(FilterSpec::new("name", FilterCondition::StartsWith, "eth")), vec![1, 4]);
        assert_eq!(kept(FilterSpec::new("name", FilterCondition::Contains, "zen")), vec![2]);
        assert_eq!(kept(FilterSpec::new("name", FilterCondition::Matches, "^eth.n")), vec![1, 4]);
        assert_eq!(kept(FilterSpec::new("name", FilterCondition::NotEquals, "benzene")), vec![1, 4]);
    }

    #[test]
    fn test_missing_conditions() {
        assert_eq!(kept(FilterSpec::new("name", FilterCondition::IsMissing, "")), vec![3]);
        assert_eq!(kept(FilterSpec::new("mw", FilterCondition::IsPresent, "")), vec![1, 2, 3]);
    }

    #[test]
    fn test_keeps_columns_aligned() {
        let out = apply(&dataset(), &FilterSpec::new("mw", FilterCondition::GreaterThan, "40")).unwrap();
        assert_eq!(out.height(), 2);
        assert_eq!(out.width(), 3);
    }

    #[test]
    fn test_no_rows_matched() {
        let err = apply(&dataset(), &FilterSpec::new("mw", FilterCondition::GreaterThan, "1000"))
            .unwrap_err();
        assert_eq!(err.error_code(), "NO_ROWS_MATCHED");
    }

    #[test]
    fn test_rejections() {
        let ds = dataset();
        let cases = [
            (FilterSpec::new("name", FilterCondition::GreaterThan, "1"), "TYPE_MISMATCH"),
            (FilterSpec::new("mw", FilterCondition::LessThan, "heavy"), "INVALID_PARAMETER"),
            (FilterSpec::new("mw", FilterCondition::Contains, "4"), "TYPE_MISMATCH"),
            (FilterSpec::new("name", FilterCondition::Matches, "("), "INVALID_PARAMETER"),
            (FilterSpec::new("nope", FilterCondition::IsPresent, ""), "COLUMN_NOT_FOUND"),
        ];
        for (spec, code) in cases {
            assert_eq!(apply(&ds, &spec).unwrap_err().error_code(), code, "{spec}");
        }
    }
}
