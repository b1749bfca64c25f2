//! Random forests: bootstrap-aggregated CART trees.

use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use crate::config::ProblemType;
use crate::error::Result;
use crate::model::{Estimator, FitContext, ModelFactory, Task};
use crate::params::{HyperparameterGrid, ParamSchema, ParamSpec, Params};
use crate::spec::ModelFamily;

use super::tree::{Criterion, DecisionTree, TreeParams, tree_param_specs};
use super::{argmax, check_fit_input, check_predict_input, normalized_importance};

#[derive(Debug, Clone)]
pub(crate) struct RandomForest {
    n_estimators: usize,
    bootstrap: bool,
    tree_params: TreeParams,
    task: Task,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    fn new(n_estimators: usize, bootstrap: bool, tree_params: TreeParams, task: Task) -> Self {
        Self {
            n_estimators,
            bootstrap,
            tree_params,
            task,
            trees: Vec::new(),
            n_features: 0,
        }
    }
}

impl Estimator for RandomForest {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64], ctx: &FitContext<'_>) -> Result<()> {
        check_fit_input(x, y)?;
        let n = x.nrows();
        self.n_features = x.ncols();
        self.trees.clear();
        for i in 0..self.n_estimators {
            ctx.checkpoint()?;
            // one stream per tree so a tree does not depend on its predecessors
            let mut rng = StdRng::seed_from_u64(ctx.seed.wrapping_add(i as u64));
            let rows: Vec<usize> = if self.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            let mut tree = DecisionTree::new(self.tree_params, Criterion::for_task(self.task));
            tree.grow(x, y, rows, &mut rng);
            self.trees.push(tree);
        }
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        check_predict_input(x, self.n_features)?;
        let n_trees = self.trees.len().max(1) as f64;
        let predictions = (0..x.nrows())
            .map(|row| match self.task {
                Task::Regression => {
                    self.trees
                        .iter()
                        .map(|t| t.leaf_values(x, row).first().copied().unwrap_or(0.0))
                        .sum::<f64>()
                        / n_trees
                }
                Task::Classification { n_classes } => {
                    let mut proba = vec![0.0; n_classes];
                    for tree in &self.trees {
                        for (p, v) in proba.iter_mut().zip(tree.leaf_values(x, row)) {
                            *p += v;
                        }
                    }
                    argmax(&proba) as f64
                }
            })
            .collect();
        Ok(predictions)
    }

    /// Mean of the per-tree normalised impurity decreases.
    fn feature_importance(&self) -> Option<Vec<f64>> {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            if let Some(importance) = normalized_importance(tree.raw_importance().to_vec()) {
                for (t, v) in total.iter_mut().zip(importance) {
                    *t += v;
                }
            }
        }
        normalized_importance(total)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RandomForestFactory;

impl ModelFactory for RandomForestFactory {
    fn family(&self) -> ModelFamily {
        ModelFamily::RandomForest
    }

    fn schema(&self) -> ParamSchema {
        let mut params = vec![
            ParamSpec::int("n_estimators", 100, 1, None),
            ParamSpec::boolean("bootstrap", true),
        ];
        params.extend(tree_param_specs());
        ParamSchema::new(params)
    }

    fn supports(&self, _problem_type: ProblemType) -> bool {
        true
    }

    fn default_grid(&self) -> HyperparameterGrid {
        HyperparameterGrid::from([
            (
                "n_estimators".to_string(),
                vec![json!(10), json!(50), json!(100)],
            ),
            (
                "max_depth".to_string(),
                vec![json!(3), json!(5), json!(10), json!(null)],
            ),
            (
                "min_samples_split".to_string(),
                vec![json!(2), json!(5), json!(10)],
            ),
        ])
    }

    fn create(&self, params: &Params<'_>, task: Task) -> Result<Box<dyn Estimator>> {
        Ok(Box::new(RandomForest::new(
            params.usize("n_estimators")?,
            params.bool("bootstrap")?,
            TreeParams::from_params(params)?,
            task,
        )))
    }
}
