//! One-hot encoding of categorical columns.

use std::collections::BTreeSet;

use polars::prelude::*;

use crate::dataset::Dataset;
use crate::error::{OpError, Result};
use crate::utils::{is_float_dtype, is_integer_dtype, is_text_dtype, text_values};

fn check_encodable(dataset: &Dataset, column: &str) -> Result<()> {
    let dtype = dataset.column(column)?.dtype();
    if is_text_dtype(dtype) || is_integer_dtype(dtype) || dtype == &DataType::Boolean {
        Ok(())
    } else if is_float_dtype(dtype) {
        Err(OpError::type_mismatch(
            column,
            "categorical, string, boolean or integer",
            dtype,
        ))
    } else {
        Err(OpError::type_mismatch(column, "categorical", dtype))
    }
}

/// Sorted distinct values of `column`. Integer columns sort numerically.
pub(crate) fn observed_categories(dataset: &Dataset, column: &str) -> Result<Vec<String>> {
    check_encodable(dataset, column)?;
    let series = dataset.series(column)?;

    if is_integer_dtype(series.dtype()) {
        let distinct: BTreeSet<i64> = series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .flatten()
            .collect();
        return Ok(distinct.into_iter().map(|v| v.to_string()).collect());
    }

    let distinct: BTreeSet<String> = text_values(series)?.into_iter().flatten().collect();
    Ok(distinct.into_iter().collect())
}

/// Replace `column` with one boolean column per category, in place.
pub(crate) fn one_hot(
    dataset: &Dataset,
    column: &str,
    categories: &[String],
    drop_first: bool,
) -> Result<Dataset> {
    check_encodable(dataset, column)?;
    if categories.is_empty() {
        return Err(OpError::InvalidParameter(format!(
            "column '{column}' has no categories to encode"
        )));
    }

    let encoded = if drop_first {
        &categories[1..]
    } else {
        categories
    };

    let mut names = BTreeSet::new();
    for category in encoded {
        let name = format!("{column}_{category}");
        dataset.ensure_absent(&name)?;
        if !names.insert(name.clone()) {
            return Err(OpError::DuplicateColumn(name));
        }
    }

    let values = text_values(dataset.series(column)?)?;
    let position = dataset.column_index(column)?;
    let mut frame = dataset.frame().drop(column)?;

    for (offset, category) in encoded.iter().enumerate() {
        let flags: Vec<bool> = values
            .iter()
            .map(|v| v.as_deref() == Some(category.as_str()))
            .collect();
        let series = Series::new(format!("{column}_{category}").into(), flags);
        frame.insert_column(position + offset, series)?;
    }

    Ok(dataset.derive(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dataset() -> Dataset {
        Dataset::new(
            df! {
                "id" => [1i64, 2, 3, 4],
                "solvent" => [Some("water"), Some("dmso"), None, Some("water")],
                "y" => [0.5, 1.5, 2.5, 3.5],
            }
            .unwrap(),
        )
    }

    #[test]
    fn test_categories_sorted() {
        assert_eq!(
            observed_categories(&dataset(), "solvent").unwrap(),
            vec!["dmso".to_string(), "water".to_string()]
        );
        let ints = Dataset::new(df! { "k" => [10i64, 2, 10, 1] }.unwrap());
        assert_eq!(observed_categories(&ints, "k").unwrap(), vec!["1", "2", "10"]);
    }

    #[test]
    fn test_one_hot_in_place() {
        let ds = dataset();
        let categories = observed_categories(&ds, "solvent").unwrap();
        let out = one_hot(&ds, "solvent", &categories, false).unwrap();

        assert_eq!(
            out.column_names(),
            vec!["id", "solvent_dmso", "solvent_water", "y"]
        );
        let water: Vec<Option<bool>> = out
            .series("solvent_water")
            .unwrap()
            .bool()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(water, vec![Some(true), Some(false), Some(false), Some(true)]);
    }

    #[test]
    fn test_drop_first() {
        let ds = dataset();
        let categories = observed_categories(&ds, "solvent").unwrap();
        let out = one_hot(&ds, "solvent", &categories, true).unwrap();
        assert_eq!(out.column_names(), vec!["id", "solvent_water", "y"]);
    }

    #[test]
    fn test_rejects_float_column() {
        let err = observed_categories(&dataset(), "y").unwrap_err();
        assert_eq!(err.error_code(), "TYPE_MISMATCH");
    }

    #[test]
    fn test_name_collision() {
        let ds = Dataset::new(
            df! {
                "c" => ["a", "b"],
                "c_a" => [1, 2],
            }
            .unwrap(),
        );
        let err = one_hot(&ds, "c", &["a".to_string(), "b".to_string()], false).unwrap_err();
        assert!(matches!(err, OpError::DuplicateColumn(name) if name == "c_a"));
    }
}
