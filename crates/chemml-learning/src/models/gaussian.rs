//! Gaussian process regression with a fixed-length-scale RBF kernel.

use nalgebra::{DMatrix, DVector};
use serde_json::json;

use crate::config::ProblemType;
use crate::error::{Result, TrainError};
use crate::model::{Estimator, FitContext, ModelFactory, Task};
use crate::params::{HyperparameterGrid, ParamSchema, ParamSpec, Params};
use crate::spec::ModelFamily;

use super::{check_fit_input, check_predict_input};

#[derive(Debug, Clone)]
pub(crate) struct GaussianProcess {
    length_scale: f64,
    alpha: f64,
    normalize_y: bool,
    x_train: DMatrix<f64>,
    /// `(K + αI)⁻¹ y` on the (possibly normalised) targets.
    weights: DVector<f64>,
    y_mean: f64,
    y_scale: f64,
}

impl GaussianProcess {
    fn new(length_scale: f64, alpha: f64, normalize_y: bool) -> Self {
        Self {
            length_scale,
            alpha,
            normalize_y,
            x_train: DMatrix::zeros(0, 0),
            weights: DVector::zeros(0),
            y_mean: 0.0,
            y_scale: 1.0,
        }
    }

    fn kernel(&self, a: &DMatrix<f64>, i: usize, b: &DMatrix<f64>, j: usize) -> f64 {
        let squared: f64 = a
            .row(i)
            .iter()
            .zip(b.row(j).iter())
            .map(|(u, v)| (u - v).powi(2))
            .sum();
        (-squared / (2.0 * self.length_scale * self.length_scale)).exp()
    }
}

impl Estimator for GaussianProcess {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64], ctx: &FitContext<'_>) -> Result<()> {
        check_fit_input(x, y)?;
        ctx.checkpoint()?;
        let n = x.nrows();
        if self.normalize_y {
            let mean = y.iter().sum::<f64>() / n as f64;
            let var = y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
            self.y_mean = mean;
            self.y_scale = if var > 0.0 { var.sqrt() } else { 1.0 };
        } else {
            self.y_mean = 0.0;
            self.y_scale = 1.0;
        }

        let gram = DMatrix::from_fn(n, n, |i, j| {
            self.kernel(x, i, x, j) + if i == j { self.alpha } else { 0.0 }
        });
        let cholesky = gram.cholesky().ok_or_else(|| {
            TrainError::InvalidData(
                "kernel matrix is not positive definite; increase alpha".to_string(),
            )
        })?;
        let target = DVector::from_iterator(n, y.iter().map(|v| (v - self.y_mean) / self.y_scale));
        self.weights = cholesky.solve(&target);
        self.x_train = x.clone();
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        check_predict_input(x, self.x_train.ncols())?;
        Ok((0..x.nrows())
            .map(|row| {
                let mean: f64 = (0..self.x_train.nrows())
                    .map(|i| self.kernel(x, row, &self.x_train, i) * self.weights[i])
                    .sum();
                mean * self.y_scale + self.y_mean
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GaussianProcessFactory;

impl ModelFactory for GaussianProcessFactory {
    fn family(&self) -> ModelFamily {
        ModelFamily::GaussianProcess
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::positive("length_scale", 1.0),
            ParamSpec::float("alpha", 1e-10, 0.0, None),
            ParamSpec::boolean("normalize_y", false),
        ])
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type == ProblemType::Regression
    }

    fn default_grid(&self) -> HyperparameterGrid {
        HyperparameterGrid::from([
            (
                "alpha".to_string(),
                vec![json!(1e-10), json!(1e-5), json!(1e-1)],
            ),
            ("normalize_y".to_string(), vec![json!(true), json!(false)]),
        ])
    }

    fn create(&self, params: &Params<'_>, _task: Task) -> Result<Box<dyn Estimator>> {
        Ok(Box::new(GaussianProcess::new(
            params.float("length_scale")?,
            params.float("alpha")?,
            params.bool("normalize_y")?,
        )))
    }
}
