//! Multinomial logistic regression trained by full-batch gradient descent.
//!
//! Minimises the mean cross-entropy plus `‖W‖² / (2·C·n)`, so larger `c`
//! means weaker regularisation.

use nalgebra::{DMatrix, DVector};
use serde_json::json;

use crate::config::ProblemType;
use crate::error::Result;
use crate::model::{Estimator, FitContext, ModelFactory, Task};
use crate::params::{HyperparameterGrid, ParamSchema, ParamSpec, Params};
use crate::spec::ModelFamily;

use super::{argmax, check_fit_input, check_predict_input, normalized_importance, softmax_in_place};

#[derive(Debug, Clone)]
pub(crate) struct LogisticRegression {
    c: f64,
    max_iter: usize,
    learning_rate: f64,
    tol: f64,
    n_classes: usize,
    /// `n_features × n_classes`.
    weights: DMatrix<f64>,
    bias: DVector<f64>,
}

impl LogisticRegression {
    fn new(c: f64, max_iter: usize, learning_rate: f64, tol: f64, n_classes: usize) -> Self {
        Self {
            c,
            max_iter,
            learning_rate,
            tol,
            n_classes,
            weights: DMatrix::zeros(0, n_classes),
            bias: DVector::zeros(n_classes),
        }
    }

    /// Class probabilities, one row per sample.
    fn probabilities(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let mut scores = x * &self.weights;
        for mut row in scores.row_iter_mut() {
            let mut values: Vec<f64> = row.iter().zip(self.bias.iter()).map(|(s, b)| s + b).collect();
            softmax_in_place(&mut values);
            for (cell, p) in row.iter_mut().zip(values) {
                *cell = p;
            }
        }
        scores
    }
}

impl Estimator for LogisticRegression {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64], ctx: &FitContext<'_>) -> Result<()> {
        check_fit_input(x, y)?;
        let (n, d) = x.shape();
        let k = self.n_classes;
        let n_f = n as f64;
        let one_hot = DMatrix::from_fn(n, k, |i, j| f64::from(y[i] as usize == j));
        self.weights = DMatrix::zeros(d, k);
        self.bias = DVector::zeros(k);

        for _ in 0..self.max_iter {
            ctx.checkpoint()?;
            let residual = self.probabilities(x) - &one_hot;
            let grad_w = (x.transpose() * &residual) / n_f + &self.weights / (self.c * n_f);
            let grad_b = DVector::from_iterator(k, residual.column_iter().map(|c| c.sum() / n_f));

            self.weights -= &grad_w * self.learning_rate;
            self.bias -= &grad_b * self.learning_rate;

            let largest = grad_w.amax().max(grad_b.amax());
            if largest < self.tol {
                break;
            }
        }
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        check_predict_input(x, self.weights.nrows())?;
        let probabilities = self.probabilities(x);
        Ok(probabilities
            .row_iter()
            .map(|row| argmax(&row.iter().copied().collect::<Vec<_>>()) as f64)
            .collect())
    }

    /// Mean absolute weight per feature across classes.
    fn feature_importance(&self) -> Option<Vec<f64>> {
        normalized_importance(
            self.weights
                .row_iter()
                .map(|row| row.iter().map(|w| w.abs()).sum::<f64>() / self.n_classes as f64)
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LogisticRegressionFactory;

impl ModelFactory for LogisticRegressionFactory {
    fn family(&self) -> ModelFamily {
        ModelFamily::LogisticRegression
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::positive("c", 1.0),
            ParamSpec::int("max_iter", 1000, 1, None),
            ParamSpec::positive("learning_rate", 0.5),
            ParamSpec::positive("tol", 1e-6),
        ])
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type == ProblemType::Classification
    }

    fn default_grid(&self) -> HyperparameterGrid {
        HyperparameterGrid::from([("c".to_string(), vec![json!(0.1), json!(1.0), json!(10.0)])])
    }

    fn create(&self, params: &Params<'_>, task: Task) -> Result<Box<dyn Estimator>> {
        Ok(Box::new(LogisticRegression::new(
            params.float("c")?,
            params.usize("max_iter")?,
            params.float("learning_rate")?,
            params.float("tol")?,
            task.n_classes().max(2),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn three_clusters() -> (DMatrix<f64>, Vec<f64>) {
        let centres = [(-2.0, -2.0), (2.0, -2.0), (0.0, 2.0)];
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for (class, (cx, cy)) in centres.iter().enumerate() {
            for i in 0..10 {
                let jitter = (i as f64 - 4.5) / 10.0;
                rows.push(cx + jitter);
                rows.push(cy - jitter);
                y.push(class as f64);
            }
        }
        (DMatrix::from_row_slice(30, 2, &rows), y)
    }

    #[test]
    fn test_separates_three_classes() {
        let (x, y) = three_clusters();
        let mut model = LogisticRegression::new(1.0, 500, 0.5, 1e-6, 3);
        model.fit(&x, &y, &FitContext::new(0, None)).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);

        let probabilities = model.probabilities(&x);
        for row in probabilities.row_iter() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_stronger_regularisation_shrinks_weights() {
        let (x, y) = three_clusters();
        let mut loose = LogisticRegression::new(100.0, 300, 0.5, 1e-9, 3);
        let mut tight = LogisticRegression::new(0.01, 300, 0.5, 1e-9, 3);
        loose.fit(&x, &y, &FitContext::new(0, None)).unwrap();
        tight.fit(&x, &y, &FitContext::new(0, None)).unwrap();
        assert!(tight.weights.norm() < loose.weights.norm());
    }

    #[test]
    fn test_importance_favours_informative_feature() {
        // only feature 0 matters
        let x = DMatrix::from_row_slice(4, 2, &[-1.0, 0.5, -2.0, -0.5, 1.0, 0.5, 2.0, -0.5]);
        let y = [0.0, 0.0, 1.0, 1.0];
        let mut model = LogisticRegression::new(1.0, 200, 0.5, 1e-9, 2);
        model.fit(&x, &y, &FitContext::new(0, None)).unwrap();
        let importance = model.feature_importance().unwrap();
        assert!(importance[0] > 0.9, "{importance:?}");
    }
}
