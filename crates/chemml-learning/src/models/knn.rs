//! k-nearest neighbours with Euclidean distance.

use nalgebra::DMatrix;
use serde_json::json;

use crate::config::ProblemType;
use crate::error::{Result, TrainError};
use crate::model::{Estimator, FitContext, ModelFactory, Task};
use crate::params::{HyperparameterGrid, ParamSchema, ParamSpec, Params};
use crate::spec::ModelFamily;

use super::{argmax, check_fit_input, check_predict_input};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Weighting {
    Uniform,
    Distance,
}

#[derive(Debug, Clone)]
pub(crate) struct KNearestNeighbors {
    n_neighbors: usize,
    weighting: Weighting,
    task: Task,
    x: DMatrix<f64>,
    y: Vec<f64>,
}

impl KNearestNeighbors {
    fn new(n_neighbors: usize, weighting: Weighting, task: Task) -> Self {
        Self {
            n_neighbors,
            weighting,
            task,
            x: DMatrix::zeros(0, 0),
            y: Vec::new(),
        }
    }

    /// `(distance, training row)` of the nearest neighbours; ties go to the
    /// lower row.
    fn neighbours(&self, x: &DMatrix<f64>, row: usize) -> Vec<(f64, usize)> {
        let query = x.row(row);
        let mut distances: Vec<(f64, usize)> = self
            .x
            .row_iter()
            .enumerate()
            .map(|(i, train)| {
                let squared: f64 = train.iter().zip(query.iter()).map(|(a, b)| (a - b).powi(2)).sum();
                (squared.sqrt(), i)
            })
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        distances.truncate(self.n_neighbors.min(self.y.len()));
        distances
    }

    fn weights(&self, neighbours: &[(f64, usize)]) -> Vec<f64> {
        match self.weighting {
            Weighting::Uniform => vec![1.0; neighbours.len()],
            Weighting::Distance => {
                // exact matches take all the weight
                if neighbours.iter().any(|(d, _)| *d == 0.0) {
                    neighbours
                        .iter()
                        .map(|(d, _)| if *d == 0.0 { 1.0 } else { 0.0 })
                        .collect()
                } else {
                    neighbours.iter().map(|(d, _)| 1.0 / d).collect()
                }
            }
        }
    }
}

impl Estimator for KNearestNeighbors {
    fn fit(&mut self, x: &DMatrix<f64>, y: &[f64], _ctx: &FitContext<'_>) -> Result<()> {
        check_fit_input(x, y)?;
        self.x = x.clone();
        self.y = y.to_vec();
        Ok(())
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<Vec<f64>> {
        if self.y.is_empty() {
            return Err(TrainError::InvalidData("model is not fitted".to_string()));
        }
        check_predict_input(x, self.x.ncols())?;
        Ok((0..x.nrows())
            .map(|row| {
                let neighbours = self.neighbours(x, row);
                let weights = self.weights(&neighbours);
                match self.task {
                    Task::Regression => {
                        let total: f64 = weights.iter().sum();
                        neighbours
                            .iter()
                            .zip(&weights)
                            .map(|((_, i), w)| w * self.y[*i])
                            .sum::<f64>()
                            / total
                    }
                    Task::Classification { n_classes } => {
                        let mut votes = vec![0.0; n_classes];
                        for ((_, i), w) in neighbours.iter().zip(&weights) {
                            votes[self.y[*i] as usize] += w;
                        }
                        argmax(&votes) as f64
                    }
                }
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct KNearestNeighborsFactory;

impl ModelFactory for KNearestNeighborsFactory {
    fn family(&self) -> ModelFamily {
        ModelFamily::KNearestNeighbors
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::int("n_neighbors", 5, 1, None),
            ParamSpec::choice("weights", "uniform", &["uniform", "distance"]),
        ])
    }

    fn supports(&self, _problem_type: ProblemType) -> bool {
        true
    }

    fn default_grid(&self) -> HyperparameterGrid {
        HyperparameterGrid::from([
            (
                "n_neighbors".to_string(),
                vec![json!(3), json!(5), json!(7), json!(9)],
            ),
            (
                "weights".to_string(),
                vec![json!("uniform"), json!("distance")],
            ),
        ])
    }

    fn create(&self, params: &Params<'_>, task: Task) -> Result<Box<dyn Estimator>> {
        let weighting = match params.choice("weights")? {
            "distance" => Weighting::Distance,
            _ => Weighting::Uniform,
        };
        Ok(Box::new(KNearestNeighbors::new(
            params.usize("n_neighbors")?,
            weighting,
            task,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fitted(k: usize, weighting: Weighting, task: Task, y: &[f64]) -> KNearestNeighbors {
        let x = DMatrix::from_column_slice(4, 1, &[0.0, 1.0, 2.0, 10.0]);
        let mut model = KNearestNeighbors::new(k, weighting, task);
        model.fit(&x, y, &FitContext::new(0, None)).unwrap();
        model
    }

    #[test]
    fn test_uniform_regression_averages_neighbours() {
        let model = fitted(2, Weighting::Uniform, Task::Regression, &[1.0, 3.0, 5.0, 100.0]);
        let query = DMatrix::from_column_slice(1, 1, &[0.4]);
        assert_eq!(model.predict(&query).unwrap(), vec![2.0]);
    }

    #[test]
    fn test_distance_weighting() {
        let model = fitted(2, Weighting::Distance, Task::Regression, &[0.0, 3.0, 5.0, 100.0]);
        // distances 0.25 and 0.75: weights 4 and 4/3
        let query = DMatrix::from_column_slice(1, 1, &[0.25]);
        let prediction = model.predict(&query).unwrap()[0];
        assert!((prediction - 0.75).abs() < 1e-12, "{prediction}");

        let exact = DMatrix::from_column_slice(1, 1, &[1.0]);
        assert_eq!(model.predict(&exact).unwrap(), vec![3.0]);
    }

    #[test]
    fn test_classification_vote() {
        let model = fitted(
            3,
            Weighting::Uniform,
            Task::Classification { n_classes: 2 },
            &[0.0, 0.0, 1.0, 1.0],
        );
        let query = DMatrix::from_column_slice(2, 1, &[0.5, 9.0]);
        // the far query still sees rows 1, 2 and 3
        assert_eq!(model.predict(&query).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let model = fitted(10, Weighting::Uniform, Task::Regression, &[1.0, 2.0, 3.0, 6.0]);
        let query = DMatrix::from_column_slice(1, 1, &[0.0]);
        assert_eq!(model.predict(&query).unwrap(), vec![3.0]);
    }
}
