//! Missing-value imputation.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{OpError, Result};
use crate::utils::{is_numeric_dtype, is_text_dtype, median, numeric_values, text_values};

/// How to fill missing values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    Mean,
    Median,
    Zero,
    Constant(f64),
    /// Most frequent value; works for any column type.
    Mode,
}

impl ImputeStrategy {
    /// Strategies that only apply to numeric columns.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, ImputeStrategy::Mode)
    }
}

impl fmt::Display for ImputeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImputeStrategy::Mean => f.write_str("mean"),
            ImputeStrategy::Median => f.write_str("median"),
            ImputeStrategy::Zero => f.write_str("zero"),
            ImputeStrategy::Constant(value) => write!(f, "constant {value}"),
            ImputeStrategy::Mode => f.write_str("mode"),
        }
    }
}

pub(crate) fn impute_column(
    dataset: &Dataset,
    column: &str,
    strategy: ImputeStrategy,
) -> Result<Dataset> {
    let series = dataset.series(column)?;
    check_supported(series, strategy)?;
    if series.null_count() == 0 {
        return Ok(dataset.clone());
    }

    let filled = fill(series, strategy)?;
    let mut frame = dataset.frame().clone();
    frame.replace(column, filled)?;
    Ok(dataset.derive(frame))
}

/// Fill every column that has missing values. Nothing is changed unless all
/// of them support `strategy`.
pub(crate) fn impute_all(dataset: &Dataset, strategy: ImputeStrategy) -> Result<Dataset> {
    let targets: Vec<String> = dataset
        .frame()
        .get_columns()
        .iter()
        .filter(|column| column.null_count() > 0)
        .map(|column| column.name().to_string())
        .collect();

    for name in &targets {
        check_supported(dataset.series(name)?, strategy)?;
    }

    let mut frame = dataset.frame().clone();
    for name in &targets {
        let filled = fill(dataset.series(name)?, strategy)?;
        frame.replace(name, filled)?;
    }
    Ok(dataset.derive(frame))
}

fn check_supported(series: &Series, strategy: ImputeStrategy) -> Result<()> {
    let dtype = series.dtype();
    if strategy.is_numeric() && !is_numeric_dtype(dtype) {
        return Err(OpError::type_mismatch(series.name(), "numeric", dtype));
    }
    if !strategy.is_numeric()
        && !(is_numeric_dtype(dtype) || is_text_dtype(dtype) || dtype == &DataType::Boolean)
    {
        return Err(OpError::type_mismatch(
            series.name(),
            "numeric, boolean or text",
            dtype,
        ));
    }
    if let ImputeStrategy::Constant(value) = strategy
        && !value.is_finite()
    {
        return Err(OpError::InvalidParameter(format!(
            "constant fill value must be finite, got {value}"
        )));
    }
    Ok(())
}

fn fill(series: &Series, strategy: ImputeStrategy) -> Result<Series> {
    match strategy {
        ImputeStrategy::Mode => fill_mode(series),
        _ => fill_numeric(series, strategy),
    }
}

fn no_observed_values(series: &Series) -> OpError {
    OpError::InvalidParameter(format!(
        "column '{}' has no observed values to impute from",
        series.name()
    ))
}

fn fill_numeric(series: &Series, strategy: ImputeStrategy) -> Result<Series> {
    let values = numeric_values(series)?;
    let observed: Vec<f64> = values.iter().flatten().copied().collect();

    let fill_value = match strategy {
        ImputeStrategy::Zero => 0.0,
        ImputeStrategy::Constant(value) => value,
        ImputeStrategy::Mean if !observed.is_empty() => {
            observed.iter().sum::<f64>() / observed.len() as f64
        }
        ImputeStrategy::Median => median(&observed).ok_or_else(|| no_observed_values(series))?,
        _ => return Err(no_observed_values(series)),
    };

    let filled: Vec<f64> = values.into_iter().map(|v| v.unwrap_or(fill_value)).collect();
    Ok(Series::new(series.name().clone(), filled))
}

fn fill_mode(series: &Series) -> Result<Series> {
    let dtype = series.dtype();
    if is_text_dtype(dtype) {
        let values = text_values(series)?;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for value in values.iter().flatten() {
            *counts.entry(value.as_str()).or_default() += 1;
        }
        // BTreeMap iterates ascending, so the first maximum is the smallest value.
        let mode = counts
            .iter()
            .fold(None, |best: Option<(&str, usize)>, (&value, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((value, count)),
            })
            .map(|(value, _)| value.to_string())
            .ok_or_else(|| no_observed_values(series))?;

        let filled: Vec<String> = values
            .into_iter()
            .map(|v| v.unwrap_or_else(|| mode.clone()))
            .collect();
        return Ok(Series::new(series.name().clone(), filled).cast(dtype)?);
    }

    let values = numeric_values(series)?;
    let mut counts: HashMap<u64, (f64, usize)> = HashMap::new();
    for &value in values.iter().flatten() {
        counts.entry(value.to_bits()).or_insert((value, 0)).1 += 1;
    }
    let mode = counts
        .values()
        .copied()
        .max_by(|(a, a_count), (b, b_count)| a_count.cmp(b_count).then(b.total_cmp(a)))
        .map(|(value, _)| value)
        .ok_or_else(|| no_observed_values(series))?;

    let filled: Vec<f64> = values.into_iter().map(|v| v.unwrap_or(mode)).collect();
    Ok(Series::new(series.name().clone(), filled).cast(dtype)?)
}
