//! Boosted tree ensembles.
//!
//! Gradient boosting fits squared-error trees to the negative gradient of
//! the loss (residuals for regression, `onehot − softmax` per class for
//! classification, with Newton leaf values). AdaBoost uses R2 for regression
//! and SAMME for classification; both draw weighted bootstrap samples instead
//! of passing weights to the trees.

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::json;

use crate::config::ProblemType;
use crate::error::{Result, TrainError};
use crate::model::{Estimator, FitContext, ModelFactory, Task};
use crate::params::{HyperparameterGrid, ParamKind, ParamSchema, ParamSpec, Params};
use crate::spec::ModelFamily;

use super::tree::{Criterion, DecisionTree, TreeParams};
use super::{argmax, check_fit_input, check_predict_input, normalized_importance, softmax_in_place};

/// Lower bound on class priors and Newton denominators.
const EPSILON: f64 = 1e-12;

fn sum_importance<'a>(trees: impl Iterator<Item = (&'a DecisionTree, f64)>, n_features: usize) -> Option<Vec<f64>> {
    let mut total = vec![0.0; n_features];
    for (tree, weight) in trees {
        if let Some(importance) = normalized_importance(tree.raw_importance().to_vec()) {
            for (t, v) in total.iter_mut().zip(importance) {
                *t += weight * v;
            }
        }
    }
    normalized_importance(total)
}

// ============================================================================
// Gradient boosting
// ============================================================================

#[derive(Debug, Clone)]
pub(crate) struct GradientBoosting {
    n_estimators: usize,
    learning_rate: f64,
    subsample: f64,
    tree_params: TreeParams,
    task: Task,
    /// One entry per class (a single entry for regression).
    init: Vec<f64>,
    /// `rounds[m][k]`: the tree for class `k` in round `m`.
    rounds: Vec<Vec<DecisionTree>>,
    n_features: usize,
}

impl GradientBoosting {
    fn new(
        n_estimators: usize,
        learning_rate: f64,
        subsample: f64,
        tree_params: TreeParams,
        task: Task,
    ) -> Self {
        Self {
            n_estimators,
            learning_rate,
            subsample,
            tree_params,
            task,
            init: Vec::new(),
            rounds: Vec::new(),
            n_features: 0,
        }
    }

    fn sample_rows(&self, n: usize, rng: &mut StdRng) -> Vec<usize> {
        let mut rows: Vec<usize> = (0..n).collect();
        if self.subsample < 1.0 {
            let keep = ((n as f64) * self.subsample).ceil().max(1.0) as usize;
            rows.shuffle(rng);
            rows.truncate(keep);
            rows.sort_unstable();
        }
        rows
    }

    /// Raw scores for every row: one column per class.
    fn decision(&self, x: &DMatrix<f64>) -> Vec<Vec<f64>> {
        (0..x.nrows())
            .map(|row| {
                let mut scores = self.init.clone();
                for round in &self.rounds {
                    for (score, tree) in scores.iter_mut().zip(round) {
                        *score += self.learning_rate * tree.leaf_values(x, row)[0];
                    }
                }
                scores
            })
            .collect()
    }
}

impl Estimator for GradientBoosting {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64], ctx: &FitContext<'_>) -> Result<()> {
        check_fit_input(x, y)?;
        let n = x.nrows();
        self.n_features = x.ncols();
        self.rounds.clear();
        let mut rng = StdRng::seed_from_u64(ctx.seed);

        let n_outputs = match self.task {
            Task::Regression => 1,
            Task::Classification { n_classes } => n_classes,
        };
        self.init = match self.task {
            Task::Regression => vec![y.iter().sum::<f64>() / n as f64],
            Task::Classification { n_classes } => {
                let mut counts = vec![0.0; n_classes];
                for &label in y {
                    counts[label as usize] += 1.0;
                }
                counts
                    .iter()
                    .map(|c| (c / n as f64).max(EPSILON).ln())
                    .collect()
            }
        };
        let mut scores: Vec<Vec<f64>> = vec![self.init.clone(); n];

        for _ in 0..self.n_estimators {
            ctx.checkpoint()?;
            let rows = self.sample_rows(n, &mut rng);
            let probabilities: Option<Vec<Vec<f64>>> = match self.task {
                Task::Regression => None,
                Task::Classification { .. } => Some(
                    scores
                        .iter()
                        .map(|s| {
                            let mut p = s.clone();
                            softmax_in_place(&mut p);
                            p
                        })
                        .collect(),
                ),
            };

            let mut round = Vec::with_capacity(n_outputs);
            for k in 0..n_outputs {
                let residual: Vec<f64> = match &probabilities {
                    None => (0..n).map(|i| y[i] - scores[i][0]).collect(),
                    Some(p) => (0..n)
                        .map(|i| f64::from(y[i] as usize == k) - p[i][k])
                        .collect(),
                };
                let mut tree = DecisionTree::new(self.tree_params, Criterion::SquaredError);
                tree.grow(x, &residual, rows.clone(), &mut rng);
                if probabilities.is_some() {
                    newton_leaf_values(&mut tree, x, &residual, &rows, n_outputs);
                }
                for (i, row_scores) in scores.iter_mut().enumerate() {
                    row_scores[k] += self.learning_rate * tree.leaf_values(x, i)[0];
                }
                round.push(tree);
            }
            self.rounds.push(round);
        }
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        check_predict_input(x, self.n_features)?;
        Ok(self
            .decision(x)
            .into_iter()
            .map(|scores| match self.task {
                Task::Regression => scores[0],
                Task::Classification { .. } => argmax(&scores) as f64,
            })
            .collect())
    }

    fn feature_importance(&self) -> Option<Vec<f64>> {
        sum_importance(self.rounds.iter().flatten().map(|t| (t, 1.0)), self.n_features)
    }
}

/// One multinomial Newton step per leaf: `(K−1)/K · Σr / Σ|r|(1−|r|)`.
fn newton_leaf_values(
    tree: &mut DecisionTree,
    x: &DMatrix<f64>,
    residual: &[f64],
    rows: &[usize],
    n_classes: usize,
) {
    let factor = (n_classes as f64 - 1.0) / n_classes as f64;
    for leaf in tree.leaves() {
        let (numerator, denominator) = rows
            .iter()
            .filter(|&&r| tree.leaf_index(x, r) == leaf)
            .fold((0.0, 0.0), |(num, den), &r| {
                let g = residual[r];
                (num + g, den + g.abs() * (1.0 - g.abs()))
            });
        let value = if denominator < EPSILON {
            0.0
        } else {
            factor * numerator / denominator
        };
        tree.set_leaf_value(leaf, value);
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GradientBoostingFactory;

impl ModelFactory for GradientBoostingFactory {
    fn family(&self) -> ModelFamily {
        ModelFamily::GradientBoosting
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::int("n_estimators", 100, 1, None),
            ParamSpec::positive("learning_rate", 0.1),
            ParamSpec::int("max_depth", 3, 1, None),
            ParamSpec::int("min_samples_split", 2, 2, None),
            ParamSpec::int("min_samples_leaf", 1, 1, None),
            ParamSpec {
                name: "subsample",
                kind: ParamKind::Float {
                    min: 0.0,
                    max: Some(1.0),
                    exclusive_min: true,
                },
                default: json!(1.0),
            },
        ])
    }

    fn supports(&self, _problem_type: ProblemType) -> bool {
        true
    }

    fn default_grid(&self) -> HyperparameterGrid {
        HyperparameterGrid::from([
            (
                "n_estimators".to_string(),
                vec![json!(50), json!(100), json!(200)],
            ),
            (
                "learning_rate".to_string(),
                vec![json!(0.01), json!(0.1), json!(0.2)],
            ),
            ("max_depth".to_string(), vec![json!(3), json!(5), json!(7)]),
        ])
    }

    fn create(&self, params: &Params<'_>, task: Task) -> Result<Box<dyn Estimator>> {
        let tree_params = TreeParams {
            min_samples_split: params.usize("min_samples_split")?,
            min_samples_leaf: params.usize("min_samples_leaf")?,
            ..TreeParams::with_depth(Some(params.usize("max_depth")?))
        };
        Ok(Box::new(GradientBoosting::new(
            params.usize("n_estimators")?,
            params.float("learning_rate")?,
            params.float("subsample")?,
            tree_params,
            task,
        )))
    }
}

// ============================================================================
// AdaBoost
// ============================================================================

/// Depth of the weak learners.
const ADABOOST_REGRESSION_DEPTH: usize = 3;
const ADABOOST_CLASSIFICATION_DEPTH: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdaLoss {
    Linear,
    Square,
    Exponential,
}

impl AdaLoss {
    fn parse(value: &str) -> Self {
        match value {
            "square" => AdaLoss::Square,
            "exponential" => AdaLoss::Exponential,
            _ => AdaLoss::Linear,
        }
    }

    fn apply(self, relative: f64) -> f64 {
        match self {
            AdaLoss::Linear => relative,
            AdaLoss::Square => relative * relative,
            AdaLoss::Exponential => 1.0 - (-relative).exp(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AdaBoost {
    n_estimators: usize,
    learning_rate: f64,
    loss: AdaLoss,
    task: Task,
    estimators: Vec<(DecisionTree, f64)>,
    n_features: usize,
}

impl AdaBoost {
    fn new(n_estimators: usize, learning_rate: f64, loss: AdaLoss, task: Task) -> Self {
        Self {
            n_estimators,
            learning_rate,
            loss,
            task,
            estimators: Vec::new(),
            n_features: 0,
        }
    }

    fn weak_learner(&self) -> DecisionTree {
        let depth = match self.task {
            Task::Regression => ADABOOST_REGRESSION_DEPTH,
            Task::Classification { .. } => ADABOOST_CLASSIFICATION_DEPTH,
        };
        DecisionTree::new(TreeParams::with_depth(Some(depth)), Criterion::for_task(self.task))
    }

    /// Fit a weak learner on a weighted bootstrap sample; returns it with its
    /// predictions on every row.
    fn boost_step(
        &self,
        x: &DMatrix<f64>,
        y: &[f64],
        weights: &[f64],
        rng: &mut StdRng,
    ) -> Result<(DecisionTree, Vec<f64>)> {
        let sampler = WeightedIndex::new(weights)
            .map_err(|e| TrainError::InvalidData(format!("invalid sample weights: {e}")))?;
        let rows: Vec<usize> = (0..x.nrows()).map(|_| sampler.sample(rng)).collect();
        let mut tree = self.weak_learner();
        tree.grow(x, y, rows, rng);
        let predictions = tree.predict(x)?;
        Ok((tree, predictions))
    }

    fn fit_r2(&mut self, x: &DMatrix<f64>, y: &[f64], ctx: &FitContext<'_>) -> Result<()> {
        let n = x.nrows();
        let mut weights = vec![1.0 / n as f64; n];
        let mut rng = StdRng::seed_from_u64(ctx.seed);
        for _ in 0..self.n_estimators {
            ctx.checkpoint()?;
            let (tree, predictions) = self.boost_step(x, y, &weights, &mut rng)?;
            let errors: Vec<f64> = predictions.iter().zip(y).map(|(p, a)| (p - a).abs()).collect();
            let max_error = errors.iter().copied().fold(0.0, f64::max);
            if max_error <= 0.0 {
                self.estimators.push((tree, 1.0));
                break;
            }
            let losses: Vec<f64> = errors.iter().map(|e| self.loss.apply(e / max_error)).collect();
            let average: f64 = losses.iter().zip(&weights).map(|(l, w)| l * w).sum();
            if average >= 0.5 {
                if self.estimators.is_empty() {
                    self.estimators.push((tree, 1.0));
                }
                break;
            }
            let beta = average / (1.0 - average);
            self.estimators.push((tree, self.learning_rate * (1.0 / beta).ln()));
            for (w, l) in weights.iter_mut().zip(&losses) {
                *w *= beta.powf((1.0 - l) * self.learning_rate);
            }
            normalize(&mut weights);
        }
        Ok(())
    }

    fn fit_samme(
        &mut self,
        x: &DMatrix<f64>,
        y: &[f64],
        n_classes: usize,
        ctx: &FitContext<'_>,
    ) -> Result<()> {
        let n = x.nrows();
        let mut weights = vec![1.0 / n as f64; n];
        let mut rng = StdRng::seed_from_u64(ctx.seed);
        let k = n_classes as f64;
        for _ in 0..self.n_estimators {
            ctx.checkpoint()?;
            let (tree, predictions) = self.boost_step(x, y, &weights, &mut rng)?;
            let wrong: Vec<bool> = predictions.iter().zip(y).map(|(p, a)| p != a).collect();
            let error: f64 = wrong
                .iter()
                .zip(&weights)
                .filter(|(w, _)| **w)
                .map(|(_, weight)| weight)
                .sum();
            if error <= 0.0 {
                self.estimators.push((tree, 1.0));
                break;
            }
            if error >= 1.0 - 1.0 / k {
                if self.estimators.is_empty() {
                    self.estimators.push((tree, 1.0));
                }
                break;
            }
            let alpha = self.learning_rate * (((1.0 - error) / error).ln() + (k - 1.0).ln());
            self.estimators.push((tree, alpha));
            for (w, wrong) in weights.iter_mut().zip(&wrong) {
                if *wrong {
                    *w *= alpha.exp();
                }
            }
            normalize(&mut weights);
        }
        Ok(())
    }
}

fn normalize(weights: &mut [f64]) {
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        for w in weights.iter_mut() {
            *w /= total;
        }
    }
}

/// Smallest prediction whose cumulative weight reaches half the total.
fn weighted_median(mut pairs: Vec<(f64, f64)>) -> f64 {
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let half = pairs.iter().map(|(_, w)| w).sum::<f64>() / 2.0;
    let mut cumulative = 0.0;
    for &(value, weight) in &pairs {
        cumulative += weight;
        if cumulative >= half {
            return value;
        }
    }
    pairs.last().map_or(0.0, |(value, _)| *value)
}

impl Estimator for AdaBoost {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64], ctx: &FitContext<'_>) -> Result<()> {
        check_fit_input(x, y)?;
        self.n_features = x.ncols();
        self.estimators.clear();
        match self.task {
            Task::Regression => self.fit_r2(x, y, ctx),
            Task::Classification { n_classes } => self.fit_samme(x, y, n_classes, ctx),
        }
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        check_predict_input(x, self.n_features)?;
        let per_estimator = self
            .estimators
            .iter()
            .map(|(tree, _)| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;
        Ok((0..x.nrows())
            .map(|row| match self.task {
                Task::Regression => weighted_median(
                    per_estimator
                        .iter()
                        .zip(&self.estimators)
                        .map(|(p, (_, w))| (p[row], *w))
                        .collect(),
                ),
                Task::Classification { n_classes } => {
                    let mut votes = vec![0.0; n_classes];
                    for (p, (_, w)) in per_estimator.iter().zip(&self.estimators) {
                        if let Some(v) = votes.get_mut(p[row] as usize) {
                            *v += w;
                        }
                    }
                    argmax(&votes) as f64
                }
            })
            .collect())
    }

    fn feature_importance(&self) -> Option<Vec<f64>> {
        sum_importance(self.estimators.iter().map(|(t, w)| (t, *w)), self.n_features)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AdaBoostFactory;

impl ModelFactory for AdaBoostFactory {
    fn family(&self) -> ModelFamily {
        ModelFamily::AdaBoost
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::int("n_estimators", 50, 1, None),
            ParamSpec::positive("learning_rate", 1.0),
            ParamSpec::choice("loss", "linear", &["linear", "square", "exponential"]),
        ])
    }

    fn supports(&self, _problem_type: ProblemType) -> bool {
        true
    }

    fn default_grid(&self) -> HyperparameterGrid {
        HyperparameterGrid::from([
            (
                "n_estimators".to_string(),
                vec![json!(50), json!(100), json!(200)],
            ),
            (
                "learning_rate".to_string(),
                vec![json!(0.01), json!(0.1), json!(1.0)],
            ),
        ])
    }

    fn create(&self, params: &Params<'_>, task: Task) -> Result<Box<dyn Estimator>> {
        Ok(Box::new(AdaBoost::new(
            params.usize("n_estimators")?,
            params.float("learning_rate")?,
            AdaLoss::parse(params.choice("loss")?),
            task,
        )))
    }
}
