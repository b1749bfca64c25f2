//! Single-hidden-layer perceptron trained with mini-batch Adam.
//!
//! Regression uses a linear output and squared loss; classification a
//! softmax output and cross-entropy. `alpha` is an L2 penalty scaled by the
//! batch size.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::config::ProblemType;
use crate::error::Result;
use crate::model::{Estimator, FitContext, ModelFactory, Task};
use crate::params::{HyperparameterGrid, ParamSchema, ParamSpec, Params};
use crate::spec::ModelFamily;

use super::{argmax, check_fit_input, check_predict_input, select_rows, softmax_in_place};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Relu,
    Tanh,
}

impl Activation {
    fn apply(self, z: f64) -> f64 {
        match self {
            Activation::Relu => z.max(0.0),
            Activation::Tanh => z.tanh(),
        }
    }

    /// Derivative expressed through the activated value.
    fn derivative(self, activated: f64) -> f64 {
        match self {
            Activation::Relu => {
                if activated > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - activated * activated,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct NetworkParams {
    hidden_units: usize,
    activation: Activation,
    alpha: f64,
    learning_rate: f64,
    max_iter: usize,
    batch_size: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct NeuralNetwork {
    params: NetworkParams,
    task: Task,
    /// `[w1, b1, w2, b2]`; biases are single-row matrices.
    weights: [DMatrix<f64>; 4],
}

/// First and second moment estimates for every weight tensor.
struct Adam {
    m: Vec<DMatrix<f64>>,
    v: Vec<DMatrix<f64>>,
    step: i32,
}

impl Adam {
    fn new(weights: &[DMatrix<f64>; 4]) -> Self {
        let zeros: Vec<DMatrix<f64>> = weights
            .iter()
            .map(|w| DMatrix::zeros(w.nrows(), w.ncols()))
            .collect();
        Self {
            m: zeros.clone(),
            v: zeros,
            step: 0,
        }
    }

    fn update(&mut self, weights: &mut [DMatrix<f64>; 4], grads: &[DMatrix<f64>; 4], learning_rate: f64) {
        self.step += 1;
        let correction1 = 1.0 - BETA1.powi(self.step);
        let correction2 = 1.0 - BETA2.powi(self.step);
        for (i, grad) in grads.iter().enumerate() {
            let m = self.m[i].as_mut_slice();
            let v = self.v[i].as_mut_slice();
            let w = weights[i].as_mut_slice();
            for (j, g) in grad.as_slice().iter().enumerate() {
                m[j] = BETA1 * m[j] + (1.0 - BETA1) * g;
                v[j] = BETA2 * v[j] + (1.0 - BETA2) * g * g;
                let m_hat = m[j] / correction1;
                let v_hat = v[j] / correction2;
                w[j] -= learning_rate * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
            }
        }
    }
}

fn add_bias(z: &mut DMatrix<f64>, bias: &DMatrix<f64>) {
    for (j, mut column) in z.column_iter_mut().enumerate() {
        column.add_scalar_mut(bias[(0, j)]);
    }
}

fn column_sums(m: &DMatrix<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(1, m.ncols(), |_, j| m.column(j).sum())
}

fn glorot(rows: usize, cols: usize, rng: &mut StdRng) -> DMatrix<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    DMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-limit..limit))
}

impl NeuralNetwork {
    fn new(params: NetworkParams, task: Task) -> Self {
        let empty = || DMatrix::zeros(0, 0);
        Self {
            params,
            task,
            weights: [empty(), empty(), empty(), empty()],
        }
    }

    fn n_outputs(&self) -> usize {
        match self.task {
            Task::Regression => 1,
            Task::Classification { n_classes } => n_classes,
        }
    }

    /// Hidden activations and outputs (probabilities for classification).
    fn forward(&self, x: &DMatrix<f64>) -> (DMatrix<f64>, DMatrix<f64>) {
        let [w1, b1, w2, b2] = &self.weights;
        let mut hidden = x * w1;
        add_bias(&mut hidden, b1);
        hidden.apply(|z| *z = self.params.activation.apply(*z));

        let mut output = &hidden * w2;
        add_bias(&mut output, b2);
        if let Task::Classification { .. } = self.task {
            for mut row in output.row_iter_mut() {
                let mut values: Vec<f64> = row.iter().copied().collect();
                softmax_in_place(&mut values);
                for (cell, p) in row.iter_mut().zip(values) {
                    *cell = p;
                }
            }
        }
        (hidden, output)
    }

    fn gradients(&self, x: &DMatrix<f64>, target: &DMatrix<f64>) -> [DMatrix<f64>; 4] {
        let batch = x.nrows() as f64;
        let [w1, _, w2, _] = &self.weights;
        let (hidden, output) = self.forward(x);

        let delta_out = (output - target) / batch;
        let grad_w2 = hidden.transpose() * &delta_out + w2 * (self.params.alpha / batch);
        let grad_b2 = column_sums(&delta_out);

        let mut delta_hidden = &delta_out * w2.transpose();
        delta_hidden.zip_apply(&hidden, |d, a| *d *= self.params.activation.derivative(a));
        let grad_w1 = x.transpose() * &delta_hidden + w1 * (self.params.alpha / batch);
        let grad_b1 = column_sums(&delta_hidden);

        [grad_w1, grad_b1, grad_w2, grad_b2]
    }
}

impl Estimator for NeuralNetwork {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64], ctx: &FitContext<'_>) -> Result<()> {
        check_fit_input(x, y)?;
        let (n, d) = x.shape();
        let outputs = self.n_outputs();
        let hidden = self.params.hidden_units;
        let mut rng = StdRng::seed_from_u64(ctx.seed);
        self.weights = [
            glorot(d, hidden, &mut rng),
            glorot(1, hidden, &mut rng),
            glorot(hidden, outputs, &mut rng),
            glorot(1, outputs, &mut rng),
        ];

        let target = match self.task {
            Task::Regression => DMatrix::from_column_slice(n, 1, y),
            Task::Classification { n_classes } => {
                DMatrix::from_fn(n, n_classes, |i, j| f64::from(y[i] as usize == j))
            }
        };

        let batch_size = self.params.batch_size.min(n);
        let mut adam = Adam::new(&self.weights);
        let mut order: Vec<usize> = (0..n).collect();
        for _ in 0..self.params.max_iter {
            ctx.checkpoint()?;
            order.shuffle(&mut rng);
            for batch in order.chunks(batch_size) {
                let xb = select_rows(x, batch);
                let yb = select_rows(&target, batch);
                let grads = self.gradients(&xb, &yb);
                adam.update(&mut self.weights, &grads, self.params.learning_rate);
            }
        }
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        check_predict_input(x, self.weights[0].nrows())?;
        let (_, output) = self.forward(x);
        Ok(output
            .row_iter()
            .map(|row| match self.task {
                Task::Regression => row[0],
                Task::Classification { .. } => {
                    argmax(&row.iter().copied().collect::<Vec<_>>()) as f64
                }
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct NeuralNetworkFactory;

impl ModelFactory for NeuralNetworkFactory {
    fn family(&self) -> ModelFamily {
        ModelFamily::NeuralNetwork
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::int("hidden_units", 100, 1, None),
            ParamSpec::choice("activation", "relu", &["relu", "tanh"]),
            ParamSpec::float("alpha", 1e-4, 0.0, None),
            ParamSpec::positive("learning_rate", 1e-3),
            ParamSpec::int("max_iter", 200, 1, None),
            ParamSpec::int("batch_size", 200, 1, None),
        ])
    }

    fn supports(&self, _problem_type: ProblemType) -> bool {
        true
    }

    fn default_grid(&self) -> HyperparameterGrid {
        HyperparameterGrid::from([
            ("hidden_units".to_string(), vec![json!(50), json!(100)]),
            (
                "alpha".to_string(),
                vec![json!(0.0001), json!(0.001), json!(0.01)],
            ),
        ])
    }

    fn create(&self, params: &Params<'_>, task: Task) -> Result<Box<dyn Estimator>> {
        let activation = match params.choice("activation")? {
            "tanh" => Activation::Tanh,
            _ => Activation::Relu,
        };
        Ok(Box::new(NeuralNetwork::new(
            NetworkParams {
                hidden_units: params.usize("hidden_units")?,
                activation,
                alpha: params.float("alpha")?,
                learning_rate: params.float("learning_rate")?,
                max_iter: params.usize("max_iter")?,
                batch_size: params.usize("batch_size")?,
            },
            task,
        )))
    }
}
