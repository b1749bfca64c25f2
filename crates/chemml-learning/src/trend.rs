//! Polynomial trend lines for two-variable plots.
//!
//! Independent of model training: a trend line is an ordinary least-squares
//! polynomial fit of `y` on `x`.

use chemml_processing::Dataset;
use chemml_processing::utils::numeric_values;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TrainError};
use crate::metrics;

/// A fitted polynomial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendLine {
    /// Ascending powers: `coefficients[0]` is the intercept.
    pub coefficients: Vec<f64>,
    pub r_squared: f64,
    /// Pairs used in the fit.
    pub n_points: usize,
}

impl TrendLine {
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn intercept(&self) -> f64 {
        self.coefficients.first().copied().unwrap_or(0.0)
    }

    /// Linear coefficient (0 for a degree-0 fit).
    pub fn slope(&self) -> f64 {
        self.coefficients.get(1).copied().unwrap_or(0.0)
    }

    /// Horner evaluation at `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, c| acc * x + c)
    }
}

/// Least-squares polynomial of `degree` through the finite `(x, y)` pairs.
///
/// Fails with [`TrainError::InvalidData`] when the slices differ in length
/// and with [`TrainError::InsufficientData`] when fewer than `degree + 2`
/// finite pairs remain.
pub fn fit_trend_line(xs: &[f64], ys: &[f64], degree: usize) -> Result<TrendLine> {
    if xs.len() != ys.len() {
        return Err(TrainError::InvalidData(format!(
            "x has {} values but y has {}",
            xs.len(),
            ys.len()
        )));
    }
    let (xs, ys): (Vec<f64>, Vec<f64>) = xs
        .iter()
        .zip(ys)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .unzip();
    fit_points(&xs, &ys, degree)
}

fn fit_points(xs: &[f64], ys: &[f64], degree: usize) -> Result<TrendLine> {
    let needed = degree + 2;
    if xs.len() < needed {
        return Err(TrainError::InsufficientData(format!(
            "a degree {degree} trend line needs at least {needed} points, got {}",
            xs.len()
        )));
    }

    let vandermonde = DMatrix::from_fn(xs.len(), degree + 1, |i, j| xs[i].powi(j as i32));
    let target = DVector::from_column_slice(ys);
    let coefficients = vandermonde
        .clone()
        .svd(true, true)
        .solve(&target, 1e-12)
        .map_err(|e| TrainError::InvalidData(format!("least squares failed: {e}")))?;

    let fitted: Vec<f64> = (&vandermonde * &coefficients).iter().copied().collect();
    let line = TrendLine {
        coefficients: coefficients.iter().copied().collect(),
        r_squared: metrics::r2(ys, &fitted),
        n_points: xs.len(),
    };
    debug!(degree, points = line.n_points, r2 = line.r_squared, "Fitted trend line");
    Ok(line)
}

/// Trend line of column `y` on column `x`; rows missing either value are
/// skipped.
pub fn trend_line_for_columns(
    dataset: &Dataset,
    x: &str,
    y: &str,
    degree: usize,
) -> Result<TrendLine> {
    let read = |column: &str| -> Result<Vec<Option<f64>>> {
        let kind = dataset
            .column_kind(column)
            .map_err(|_| TrainError::ColumnNotFound(column.to_string()))?;
        if kind != chemml_processing::ColumnKind::Numeric {
            return Err(TrainError::InvalidFeature {
                column: column.to_string(),
                kind: kind.to_string(),
            });
        }
        let series = dataset
            .series(column)
            .map_err(|_| TrainError::ColumnNotFound(column.to_string()))?;
        Ok(numeric_values(series)?)
    };
    let xs = read(x)?;
    let ys = read(y)?;
    let (xs, ys): (Vec<f64>, Vec<f64>) = xs
        .into_iter()
        .zip(ys)
        .filter_map(|pair| match pair {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        })
        .unzip();
    fit_trend_line(&xs, &ys, degree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exact_line() {
        let line = fit_trend_line(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0], 1).unwrap();
        assert_eq!(line.degree(), 1);
        assert!((line.slope() - 2.0).abs() < 1e-9);
        assert!(line.intercept().abs() < 1e-9);
        assert!((line.r_squared - 1.0).abs() < 1e-9);
        assert!((line.evaluate(10.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_quadratic() {
        let xs: Vec<f64> = (0..6).map(f64::from).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 1.0 - 2.0 * x + 0.5 * x * x).collect();
        let line = fit_trend_line(&xs, &ys, 2).unwrap();
        let expected = [1.0, -2.0, 0.5];
        for (c, e) in line.coefficients.iter().zip(expected) {
            assert!((c - e).abs() < 1e-8, "{c} vs {e}");
        }
    }

    #[test]
    fn test_noisy_line_r_squared_below_one() {
        let line = fit_trend_line(&[1.0, 2.0, 3.0, 4.0], &[1.0, 3.0, 2.0, 4.0], 1).unwrap();
        assert!(line.r_squared < 1.0 && line.r_squared > 0.0);
    }

    #[test]
    fn test_non_finite_pairs_ignored() {
        let err = fit_trend_line(&[1.0, 2.0, f64::NAN], &[2.0, 4.0, 6.0], 1).unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_DATA");

        let line = fit_trend_line(
            &[1.0, 2.0, f64::INFINITY, 3.0],
            &[2.0, 4.0, 5.0, 6.0],
            1,
        )
        .unwrap();
        assert_eq!(line.n_points, 3);
    }

    #[test]
    fn test_length_mismatch() {
        let err = fit_trend_line(&[1.0, 2.0], &[1.0], 0).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATA");
    }

    #[test]
    fn test_trend_line_for_columns_skips_missing() {
        let dataset = Dataset::new(
            df! {
                "mw" => [Some(10.0), Some(20.0), None, Some(30.0)],
                "bp" => [Some(1.0), Some(2.0), Some(9.0), Some(3.0)],
                "name" => ["a", "b", "c", "d"],
            }
            .unwrap(),
        );
        let line = trend_line_for_columns(&dataset, "mw", "bp", 1).unwrap();
        assert_eq!(line.n_points, 3);
        assert!((line.slope() - 0.1).abs() < 1e-9);

        let err = trend_line_for_columns(&dataset, "name", "bp", 1).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_FEATURE");
        let err = trend_line_for_columns(&dataset, "x", "bp", 1).unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }
}
