//! Built-in model families.

use std::sync::Arc;

use nalgebra::DMatrix;

use crate::error::{Result, TrainError};
use crate::model::ModelFactory;

mod boosting;
mod forest;
mod gaussian;
mod knn;
mod linear;
mod logistic;
mod neural;
mod tree;

pub(crate) use boosting::{AdaBoostFactory, GradientBoostingFactory};
pub(crate) use forest::RandomForestFactory;
pub(crate) use gaussian::GaussianProcessFactory;
pub(crate) use knn::KNearestNeighborsFactory;
pub(crate) use linear::LinearFactory;
pub(crate) use logistic::LogisticRegressionFactory;
pub(crate) use neural::NeuralNetworkFactory;
pub(crate) use tree::DecisionTreeFactory;

/// One factory per built-in family.
pub(crate) fn builtin_factories() -> Vec<Arc<dyn ModelFactory>> {
    vec![
        Arc::new(LinearFactory::ordinary()),
        Arc::new(LinearFactory::ridge()),
        Arc::new(LinearFactory::lasso()),
        Arc::new(LinearFactory::elastic_net()),
        Arc::new(LogisticRegressionFactory),
        Arc::new(DecisionTreeFactory),
        Arc::new(RandomForestFactory),
        Arc::new(GradientBoostingFactory),
        Arc::new(AdaBoostFactory),
        Arc::new(KNearestNeighborsFactory),
        Arc::new(NeuralNetworkFactory),
        Arc::new(GaussianProcessFactory),
    ]
}

pub(crate) fn check_fit_input(x: &DMatrix<f64>, y: &[f64]) -> Result<()> {
    if x.nrows() == 0 {
        return Err(TrainError::InsufficientData(
            "cannot fit on zero rows".to_string(),
        ));
    }
    if x.nrows() != y.len() {
        return Err(TrainError::InvalidData(format!(
            "{} feature rows but {} targets",
            x.nrows(),
            y.len()
        )));
    }
    Ok(())
}

pub(crate) fn check_predict_input(x: &DMatrix<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(TrainError::InvalidData(format!(
            "model was fitted on {n_features} features, got {}",
            x.ncols()
        )));
    }
    Ok(())
}

/// Scale non-negative scores to sum to 1; `None` when they are all zero.
pub(crate) fn normalized_importance(scores: Vec<f64>) -> Option<Vec<f64>> {
    let total: f64 = scores.iter().sum();
    if total.is_nan() || total <= 0.0 {
        return None;
    }
    Some(scores.into_iter().map(|s| s / total).collect())
}

/// Index of the first maximum.
pub(crate) fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_value), (i, &v)| {
            if v > best_value { (i, v) } else { (best, best_value) }
        })
        .0
}

pub(crate) fn softmax_in_place(scores: &mut [f64]) {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut total = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        total += *s;
    }
    for s in scores.iter_mut() {
        *s /= total;
    }
}

/// Rows of `x` at `indices`, in order.
pub(crate) fn select_rows(x: &DMatrix<f64>, indices: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(indices.len(), x.ncols(), |i, j| x[(indices[i], j)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_argmax_prefers_first() {
        assert_eq!(argmax(&[0.2, 0.5, 0.5]), 1);
        assert_eq!(argmax(&[1.0]), 0);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let mut scores = vec![1.0, 2.0, 3.0];
        softmax_in_place(&mut scores);
        assert!((scores.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(scores[2] > scores[1] && scores[1] > scores[0]);
    }

    #[test]
    fn test_normalized_importance() {
        assert_eq!(normalized_importance(vec![1.0, 3.0]), Some(vec![0.25, 0.75]));
        assert_eq!(normalized_importance(vec![0.0, 0.0]), None);
    }

    #[test]
    fn test_select_rows() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let picked = select_rows(&x, &[2, 0, 2]);
        assert_eq!(picked, DMatrix::from_row_slice(3, 2, &[5.0, 6.0, 1.0, 2.0, 5.0, 6.0]));
    }
}
