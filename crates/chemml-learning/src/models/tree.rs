//! CART decision trees.
//!
//! Trees are stored as a node arena. Splits are axis-aligned thresholds at
//! the midpoint between consecutive distinct values, chosen to minimise the
//! summed child impurity (squared error or Gini). The same tree backs the
//! forest and boosting families.

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::json;

use crate::config::ProblemType;
use crate::error::Result;
use crate::model::{Estimator, FitContext, ModelFactory, Task};
use crate::params::{HyperparameterGrid, ParamSchema, ParamSpec, Params};
use crate::spec::ModelFamily;

use super::{argmax, check_fit_input, check_predict_input, normalized_importance};

const MIN_GAIN: f64 = 1e-12;

/// How many features each split may look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MaxFeatures {
    All,
    Sqrt,
    Log2,
}

impl MaxFeatures {
    pub(crate) const CHOICES: [&'static str; 3] = ["all", "sqrt", "log2"];

    pub(crate) fn parse(value: &str) -> Self {
        match value {
            "sqrt" => MaxFeatures::Sqrt,
            "log2" => MaxFeatures::Log2,
            _ => MaxFeatures::All,
        }
    }

    fn count(self, n_features: usize) -> usize {
        let n = n_features as f64;
        let count = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
        };
        count.clamp(1, n_features.max(1))
    }
}

/// Growth limits shared by every tree family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

impl TreeParams {
    pub(crate) fn with_depth(max_depth: Option<usize>) -> Self {
        Self {
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
        }
    }

    /// Read the parameters declared by [`tree_param_specs`].
    pub(crate) fn from_params(params: &Params<'_>) -> Result<Self> {
        Ok(Self {
            max_depth: params.optional_usize("max_depth")?,
            min_samples_split: params.usize("min_samples_split")?,
            min_samples_leaf: params.usize("min_samples_leaf")?,
            max_features: MaxFeatures::parse(params.choice("max_features")?),
        })
    }
}

pub(crate) fn tree_param_specs() -> Vec<ParamSpec> {
    vec![
        ParamSpec::optional_int("max_depth", None, 1),
        ParamSpec::int("min_samples_split", 2, 2, None),
        ParamSpec::int("min_samples_leaf", 1, 1, None),
        ParamSpec::choice("max_features", "all", &MaxFeatures::CHOICES),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Criterion {
    SquaredError,
    Gini { n_classes: usize },
}

impl Criterion {
    pub(crate) fn for_task(task: Task) -> Self {
        match task {
            Task::Regression => Criterion::SquaredError,
            Task::Classification { n_classes } => Criterion::Gini { n_classes },
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    /// Mean target, or class frequencies under Gini.
    Leaf { value: Vec<f64> },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct DecisionTree {
    params: TreeParams,
    criterion: Criterion,
    nodes: Vec<Node>,
    n_features: usize,
    importance: Vec<f64>,
}

impl DecisionTree {
    pub(crate) fn new(params: TreeParams, criterion: Criterion) -> Self {
        Self {
            params,
            criterion,
            nodes: Vec::new(),
            n_features: 0,
            importance: Vec::new(),
        }
    }

    /// Grow the tree on `rows` of `x`; rows may repeat (bootstrap samples).
    pub(crate) fn grow(&mut self, x: &DMatrix<f64>, y: &[f64], rows: Vec<usize>, rng: &mut StdRng) {
        self.nodes.clear();
        self.n_features = x.ncols();
        self.importance = vec![0.0; x.ncols()];
        self.build(x, y, rows, 0, rng);
    }

    fn build(
        &mut self,
        x: &DMatrix<f64>,
        y: &[f64],
        rows: Vec<usize>,
        depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let splittable = rows.len() >= self.params.min_samples_split
            && rows.len() >= 2 * self.params.min_samples_leaf
            && self.params.max_depth.is_none_or(|max| depth < max);
        let split = if splittable {
            self.best_split(x, y, &rows, rng)
        } else {
            None
        };

        let Some(split) = split else {
            let value = self.leaf_value(y, &rows);
            self.nodes.push(Node::Leaf { value });
            return self.nodes.len() - 1;
        };

        self.importance[split.feature] += split.gain;
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| x[(r, split.feature)] <= split.threshold);

        let index = self.nodes.len();
        self.nodes.push(Node::Leaf { value: Vec::new() });
        let left = self.build(x, y, left_rows, depth + 1, rng);
        let right = self.build(x, y, right_rows, depth + 1, rng);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn leaf_value(&self, y: &[f64], rows: &[usize]) -> Vec<f64> {
        let n = rows.len().max(1) as f64;
        match self.criterion {
            Criterion::SquaredError => vec![rows.iter().map(|&r| y[r]).sum::<f64>() / n],
            Criterion::Gini { n_classes } => {
                let mut counts = vec![0.0; n_classes];
                for &r in rows {
                    if let Some(c) = counts.get_mut(y[r] as usize) {
                        *c += 1.0;
                    }
                }
                counts.iter().map(|c| c / n).collect()
            }
        }
    }

    /// Summed impurity of a node: `n·variance` or `n·gini`.
    fn impurity(&self, y: &[f64], rows: &[usize]) -> f64 {
        match self.criterion {
            Criterion::SquaredError => {
                let (sum, sq) = rows
                    .iter()
                    .fold((0.0, 0.0), |(s, q), &r| (s + y[r], q + y[r] * y[r]));
                sq - sum * sum / rows.len() as f64
            }
            Criterion::Gini { n_classes } => {
                let mut counts = vec![0.0; n_classes];
                for &r in rows {
                    counts[y[r] as usize] += 1.0;
                }
                gini_total(&counts, rows.len() as f64)
            }
        }
    }

    fn candidate_features(&self, n_features: usize, rng: &mut StdRng) -> Vec<usize> {
        let mut features: Vec<usize> = (0..n_features).collect();
        let count = self.params.max_features.count(n_features);
        if count < n_features {
            features.shuffle(rng);
            features.truncate(count);
            features.sort_unstable();
        }
        features
    }

    fn best_split(
        &self,
        x: &DMatrix<f64>,
        y: &[f64],
        rows: &[usize],
        rng: &mut StdRng,
    ) -> Option<Split> {
        let parent = self.impurity(y, rows);
        if parent <= MIN_GAIN {
            return None;
        }
        let n = rows.len();
        let min_leaf = self.params.min_samples_leaf;
        let mut best: Option<(f64, usize, f64)> = None;

        for feature in self.candidate_features(x.ncols(), rng) {
            let mut sorted: Vec<(f64, usize)> = rows.iter().map(|&r| (x[(r, feature)], r)).collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut scan = SplitScan::new(self.criterion, y, &sorted);
            for i in 0..n - 1 {
                scan.push(y[sorted[i].1]);
                let n_left = i + 1;
                if n_left < min_leaf || n - n_left < min_leaf || sorted[i].0 == sorted[i + 1].0 {
                    continue;
                }
                let score = scan.score(n_left, n - n_left);
                if best.is_none_or(|(best_score, _, _)| score < best_score) {
                    let (lo, hi) = (sorted[i].0, sorted[i + 1].0);
                    let mid = lo + (hi - lo) / 2.0;
                    let threshold = if mid < hi { mid } else { lo };
                    best = Some((score, feature, threshold));
                }
            }
        }

        let (score, feature, threshold) = best?;
        let gain = parent - score;
        (gain > MIN_GAIN).then_some(Split {
            feature,
            threshold,
            gain,
        })
    }

    /// Arena index of the leaf reached by `row`.
    pub(crate) fn leaf_index(&self, x: &DMatrix<f64>, row: usize) -> usize {
        let mut index = 0;
        while let Some(Node::Split {
            feature,
            threshold,
            left,
            right,
        }) = self.nodes.get(index)
        {
            index = if x[(row, *feature)] <= *threshold {
                *left
            } else {
                *right
            };
        }
        index
    }

    pub(crate) fn leaf_values(&self, x: &DMatrix<f64>, row: usize) -> &[f64] {
        match self.nodes.get(self.leaf_index(x, row)) {
            Some(Node::Leaf { value }) => value,
            _ => &[],
        }
    }

    /// Replace a leaf's value with a single number (boosting line search).
    pub(crate) fn set_leaf_value(&mut self, leaf: usize, new_value: f64) {
        if let Some(Node::Leaf { value }) = self.nodes.get_mut(leaf) {
            *value = vec![new_value];
        }
    }

    /// Arena indices of every leaf.
    pub(crate) fn leaves(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| matches!(node, Node::Leaf { .. }).then_some(i))
            .collect()
    }

    /// Total impurity decrease per feature, unnormalised.
    pub(crate) fn raw_importance(&self) -> &[f64] {
        &self.importance
    }

    pub(crate) fn n_features(&self) -> usize {
        self.n_features
    }

    /// Regression value, or the most frequent class.
    fn predict_row(&self, x: &DMatrix<f64>, row: usize) -> f64 {
        let values = self.leaf_values(x, row);
        match self.criterion {
            Criterion::SquaredError => values.first().copied().unwrap_or(0.0),
            Criterion::Gini { .. } => argmax(values) as f64,
        }
    }
}

fn gini_total(counts: &[f64], n: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    n - counts.iter().map(|c| c * c).sum::<f64>() / n
}

/// Running left/right statistics while sweeping sorted rows.
enum SplitScan {
    SquaredError {
        left: (f64, f64),
        total: (f64, f64),
    },
    Gini {
        left: Vec<f64>,
        total: Vec<f64>,
    },
}

impl SplitScan {
    fn new(criterion: Criterion, y: &[f64], sorted: &[(f64, usize)]) -> Self {
        match criterion {
            Criterion::SquaredError => SplitScan::SquaredError {
                left: (0.0, 0.0),
                total: sorted
                    .iter()
                    .fold((0.0, 0.0), |(s, q), &(_, r)| (s + y[r], q + y[r] * y[r])),
            },
            Criterion::Gini { n_classes } => {
                let mut total = vec![0.0; n_classes];
                for &(_, r) in sorted {
                    total[y[r] as usize] += 1.0;
                }
                SplitScan::Gini {
                    left: vec![0.0; n_classes],
                    total,
                }
            }
        }
    }

    fn push(&mut self, target: f64) {
        match self {
            SplitScan::SquaredError { left, .. } => {
                left.0 += target;
                left.1 += target * target;
            }
            SplitScan::Gini { left, .. } => left[target as usize] += 1.0,
        }
    }

    fn score(&self, n_left: usize, n_right: usize) -> f64 {
        let (nl, nr) = (n_left as f64, n_right as f64);
        match self {
            SplitScan::SquaredError { left, total } => {
                let right = (total.0 - left.0, total.1 - left.1);
                (left.1 - left.0 * left.0 / nl) + (right.1 - right.0 * right.0 / nr)
            }
            SplitScan::Gini { left, total } => {
                let right: Vec<f64> = total.iter().zip(left).map(|(t, l)| t - l).collect();
                gini_total(left, nl) + gini_total(&right, nr)
            }
        }
    }
}

impl Estimator for DecisionTree {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64], ctx: &FitContext<'_>) -> Result<()> {
        check_fit_input(x, y)?;
        ctx.checkpoint()?;
        let mut rng = StdRng::seed_from_u64(ctx.seed);
        self.grow(x, y, (0..x.nrows()).collect(), &mut rng);
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        check_predict_input(x, self.n_features)?;
        Ok((0..x.nrows()).map(|row| self.predict_row(x, row)).collect())
    }

    fn feature_importance(&self) -> Option<Vec<f64>> {
        normalized_importance(self.importance.clone())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct DecisionTreeFactory;

impl ModelFactory for DecisionTreeFactory {
    fn family(&self) -> ModelFamily {
        ModelFamily::DecisionTree
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new(tree_param_specs())
    }

    fn supports(&self, _problem_type: ProblemType) -> bool {
        true
    }

    fn default_grid(&self) -> HyperparameterGrid {
        HyperparameterGrid::from([
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
        Ok(Box::new(DecisionTree::new(
            TreeParams::from_params(params)?,
            Criterion::for_task(task),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fit(tree: &mut DecisionTree, x: &DMatrix<f64>, y: &[f64]) {
        tree.fit(x, y, &FitContext::new(0, None)).unwrap();
    }

    #[test]
    fn test_step_function_regression() {
        let x = DMatrix::from_column_slice(6, 1, &[1.0, 2.0, 3.0, 10.0, 11.0, 12.0]);
        let y = [5.0, 5.0, 5.0, 20.0, 20.0, 20.0];
        let mut tree = DecisionTree::new(TreeParams::with_depth(None), Criterion::SquaredError);
        fit(&mut tree, &x, &y);

        let query = DMatrix::from_column_slice(2, 1, &[0.0, 100.0]);
        assert_eq!(tree.predict(&query).unwrap(), vec![5.0, 20.0]);
        // single split at the midpoint
        assert_eq!(tree.leaves().len(), 2);
        assert_eq!(tree.feature_importance(), Some(vec![1.0]));
    }

    #[test]
    fn test_classification_picks_informative_feature() {
        // feature 0 is noise, feature 1 separates the classes
        let x = DMatrix::from_row_slice(
            6,
            2,
            &[
                3.0, 0.1, //
                1.0, 0.2, //
                2.0, 0.3, //
                3.0, 0.9, //
                1.0, 0.8, //
                2.0, 0.7,
            ],
        );
        let y = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut tree = DecisionTree::new(
            TreeParams::with_depth(Some(3)),
            Criterion::Gini { n_classes: 2 },
        );
        fit(&mut tree, &x, &y);

        assert_eq!(tree.predict(&x).unwrap(), y.to_vec());
        let importance = tree.feature_importance().unwrap();
        assert_eq!(importance, vec![0.0, 1.0]);
        assert_eq!(tree.leaf_values(&x, 0), &[1.0, 0.0]);
    }

    #[test]
    fn test_depth_limit() {
        let x = DMatrix::from_column_slice(8, 1, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        let y: Vec<f64> = (0..8).map(f64::from).collect();
        let mut stump = DecisionTree::new(TreeParams::with_depth(Some(1)), Criterion::SquaredError);
        fit(&mut stump, &x, &y);
        assert_eq!(stump.leaves().len(), 2);

        let mut full = DecisionTree::new(TreeParams::with_depth(None), Criterion::SquaredError);
        fit(&mut full, &x, &y);
        assert_eq!(full.leaves().len(), 8);
        assert_eq!(full.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_min_samples_leaf() {
        let x = DMatrix::from_column_slice(4, 1, &[0.0, 1.0, 2.0, 3.0]);
        let y = [0.0, 0.0, 0.0, 10.0];
        let params = TreeParams {
            min_samples_leaf: 2,
            ..TreeParams::with_depth(None)
        };
        let mut tree = DecisionTree::new(params, Criterion::SquaredError);
        fit(&mut tree, &x, &y);
        // the 3|1 split is not allowed, so the split is 2|2
        let query = DMatrix::from_column_slice(1, 1, &[3.0]);
        assert_eq!(tree.predict(&query).unwrap(), vec![5.0]);
    }

    #[test]
    fn test_constant_target_is_single_leaf() {
        let x = DMatrix::from_column_slice(3, 1, &[0.0, 1.0, 2.0]);
        let mut tree = DecisionTree::new(TreeParams::with_depth(None), Criterion::SquaredError);
        fit(&mut tree, &x, &[4.0, 4.0, 4.0]);
        assert_eq!(tree.leaves(), vec![0]);
        assert!(tree.feature_importance().is_none());
    }

    #[test]
    fn test_set_leaf_value() {
        let x = DMatrix::from_column_slice(4, 1, &[0.0, 1.0, 5.0, 6.0]);
        let mut tree = DecisionTree::new(TreeParams::with_depth(Some(1)), Criterion::SquaredError);
        fit(&mut tree, &x, &[0.0, 0.0, 1.0, 1.0]);
        let leaf = tree.leaf_index(&x, 3);
        tree.set_leaf_value(leaf, 7.5);
        assert_eq!(tree.predict(&x).unwrap(), vec![0.0, 0.0, 7.5, 7.5]);
    }

    #[test]
    fn test_max_features_count() {
        assert_eq!(MaxFeatures::All.count(10), 10);
        assert_eq!(MaxFeatures::Sqrt.count(10), 3);
        assert_eq!(MaxFeatures::Log2.count(10), 3);
        assert_eq!(MaxFeatures::Log2.count(1), 1);
    }

    #[test]
    fn test_factory_reads_params() {
        let factory = DecisionTreeFactory;
        let resolved = factory
            .schema()
            .resolve(&[("max_depth".to_string(), json!(2))].into_iter().collect());
        let params = Params::new("decision_tree", &resolved);
        assert_eq!(
            TreeParams::from_params(&params).unwrap(),
            TreeParams::with_depth(Some(2))
        );
    }
}
