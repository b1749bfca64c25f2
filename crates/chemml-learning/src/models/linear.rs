//! Linear regression families: ordinary least squares, ridge, lasso and
//! elastic net.
//!
//! All four centre the data and fit the intercept separately. Ridge solves
//! the normal equations; lasso and elastic net use cyclic coordinate descent
//! on `1/(2n)·‖y − Xw‖² + α·ρ·‖w‖₁ + α·(1 − ρ)/2·‖w‖²`.

use nalgebra::{DMatrix, DVector};
use serde_json::json;

use crate::config::ProblemType;
use crate::error::{Result, TrainError};
use crate::model::{Estimator, FitContext, ModelFactory, Task};
use crate::params::{HyperparameterGrid, ParamSchema, ParamSpec, Params};
use crate::spec::ModelFamily;

use super::{check_fit_input, check_predict_input, normalized_importance};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Penalty {
    None,
    L2 {
        alpha: f64,
    },
    ElasticNet {
        alpha: f64,
        l1_ratio: f64,
        max_iter: usize,
        tol: f64,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct LinearModel {
    penalty: Penalty,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearModel {
    fn new(penalty: Penalty) -> Self {
        Self {
            penalty,
            coefficients: Vec::new(),
            intercept: 0.0,
        }
    }

    pub(crate) fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub(crate) fn intercept(&self) -> f64 {
        self.intercept
    }
}

fn column_means(x: &DMatrix<f64>) -> Vec<f64> {
    let n = x.nrows() as f64;
    x.column_iter().map(|c| c.sum() / n).collect()
}

fn least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<DVector<f64>> {
    x.clone()
        .svd(true, true)
        .solve(y, 1e-12)
        .map_err(|e| TrainError::InvalidData(format!("least squares failed: {e}")))
}

fn ridge(x: &DMatrix<f64>, y: &DVector<f64>, alpha: f64) -> Result<DVector<f64>> {
    let d = x.ncols();
    let gram = x.transpose() * x + DMatrix::<f64>::identity(d, d) * alpha;
    let rhs = x.transpose() * y;
    match gram.clone().cholesky() {
        Some(cholesky) => Ok(cholesky.solve(&rhs)),
        None => least_squares(&gram, &rhs),
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

fn coordinate_descent(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    alpha: f64,
    l1_ratio: f64,
    max_iter: usize,
    tol: f64,
    ctx: &FitContext<'_>,
) -> Result<DVector<f64>> {
    let (n, d) = x.shape();
    let n_f = n as f64;
    let l1 = n_f * alpha * l1_ratio;
    let l2 = n_f * alpha * (1.0 - l1_ratio);
    let norms: Vec<f64> = x.column_iter().map(|c| c.norm_squared()).collect();

    let mut w = DVector::<f64>::zeros(d);
    let mut residual = y.clone();
    for _ in 0..max_iter {
        ctx.checkpoint()?;
        let mut max_delta: f64 = 0.0;
        let mut max_weight: f64 = 0.0;
        for j in 0..d {
            if norms[j] == 0.0 {
                continue;
            }
            let column = x.column(j);
            let old = w[j];
            let rho = column.dot(&residual) + norms[j] * old;
            let new = soft_threshold(rho, l1) / (norms[j] + l2);
            if new != old {
                residual.axpy(old - new, &column, 1.0);
                w[j] = new;
            }
            max_delta = max_delta.max((new - old).abs());
            max_weight = max_weight.max(new.abs());
        }
        if max_delta <= tol * max_weight.max(1.0) {
            break;
        }
    }
    Ok(w)
}

impl Estimator for LinearModel {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64], ctx: &FitContext<'_>) -> Result<()> {
        check_fit_input(x, y)?;
        let means = column_means(x);
        let y_mean = y.iter().sum::<f64>() / y.len() as f64;
        let centred = DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| x[(i, j)] - means[j]);
        let target = DVector::from_iterator(y.len(), y.iter().map(|v| v - y_mean));

        let w = match self.penalty {
            Penalty::None => least_squares(&centred, &target)?,
            Penalty::L2 { alpha } => ridge(&centred, &target, alpha)?,
            Penalty::ElasticNet {
                alpha,
                l1_ratio,
                max_iter,
                tol,
            } => coordinate_descent(&centred, &target, alpha, l1_ratio, max_iter, tol, ctx)?,
        };

        self.intercept = y_mean - w.iter().zip(&means).map(|(w, m)| w * m).sum::<f64>();
        self.coefficients = w.iter().copied().collect();
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        check_predict_input(x, self.coefficients.len())?;
        Ok(x.row_iter()
            .map(|row| {
                self.intercept
                    + row
                        .iter()
                        .zip(&self.coefficients)
                        .map(|(v, w)| v * w)
                        .sum::<f64>()
            })
            .collect())
    }

    fn feature_importance(&self) -> Option<Vec<f64>> {
        normalized_importance(self.coefficients.iter().map(|w| w.abs()).collect())
    }
}

/// Factory for the four linear regression families.
#[derive(Debug, Clone)]
pub(crate) struct LinearFactory {
    family: ModelFamily,
}

impl LinearFactory {
    pub(crate) fn ordinary() -> Self {
        Self {
            family: ModelFamily::LinearRegression,
        }
    }

    pub(crate) fn ridge() -> Self {
        Self {
            family: ModelFamily::Ridge,
        }
    }

    pub(crate) fn lasso() -> Self {
        Self {
            family: ModelFamily::Lasso,
        }
    }

    pub(crate) fn elastic_net() -> Self {
        Self {
            family: ModelFamily::ElasticNet,
        }
    }

    fn penalty(&self, params: &Params<'_>) -> Result<Penalty> {
        Ok(match self.family {
            ModelFamily::Ridge => Penalty::L2 {
                alpha: params.float("alpha")?,
            },
            ModelFamily::Lasso => Penalty::ElasticNet {
                alpha: params.float("alpha")?,
                l1_ratio: 1.0,
                max_iter: params.usize("max_iter")?,
                tol: params.float("tol")?,
            },
            ModelFamily::ElasticNet => Penalty::ElasticNet {
                alpha: params.float("alpha")?,
                l1_ratio: params.float("l1_ratio")?,
                max_iter: params.usize("max_iter")?,
                tol: params.float("tol")?,
            },
            _ => Penalty::None,
        })
    }
}

fn alpha_grid() -> Vec<serde_json::Value> {
    vec![json!(0.01), json!(0.1), json!(1.0), json!(10.0)]
}

impl ModelFactory for LinearFactory {
    fn family(&self) -> ModelFamily {
        self.family.clone()
    }

    fn schema(&self) -> ParamSchema {
        let descent = || {
            vec![
                ParamSpec::positive("alpha", 1.0),
                ParamSpec::int("max_iter", 1000, 1, None),
                ParamSpec::positive("tol", 1e-4),
            ]
        };
        match self.family {
            ModelFamily::Ridge => ParamSchema::new(vec![ParamSpec::float("alpha", 1.0, 0.0, None)]),
            ModelFamily::Lasso => ParamSchema::new(descent()),
            ModelFamily::ElasticNet => {
                let mut params = descent();
                params.insert(1, ParamSpec::float("l1_ratio", 0.5, 0.0, Some(1.0)));
                ParamSchema::new(params)
            }
            _ => ParamSchema::empty(),
        }
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type == ProblemType::Regression
    }

    fn default_grid(&self) -> HyperparameterGrid {
        match self.family {
            ModelFamily::Ridge | ModelFamily::Lasso => {
                HyperparameterGrid::from([("alpha".to_string(), alpha_grid())])
            }
            ModelFamily::ElasticNet => HyperparameterGrid::from([
                ("alpha".to_string(), alpha_grid()),
                (
                    "l1_ratio".to_string(),
                    vec![json!(0.1), json!(0.5), json!(0.9)],
                ),
            ]),
            _ => HyperparameterGrid::new(),
        }
    }

    fn create(&self, params: &Params<'_>, _task: Task) -> Result<Box<dyn Estimator>> {
        Ok(Box::new(LinearModel::new(self.penalty(params)?)))
    }
}
