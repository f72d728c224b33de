//! Random forest regressor built from bootstrapped CART trees.
//!
//! Trees split on variance reduction with midpoint thresholds and are grown
//! until leaves are pure or `min_samples_split` / `min_samples_leaf` stop them.
//! Every split considers all features, and each tree draws its own bootstrap
//! sample from an RNG seeded with `seed + tree_index`, so fitting the same data
//! twice yields the same forest even though trees are grown in parallel.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Splits whose variance reduction falls below this are treated as no-ops.
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Error, PartialEq)]
pub enum ForestError {
    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,
    #[error("{rows} feature rows but {targets} targets")]
    LengthMismatch { rows: usize, targets: usize },
    #[error("expected {expected} features, got {actual}")]
    FeatureCount { expected: usize, actual: usize },
    #[error("forest has not been fitted")]
    NotFitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf { value: f64 },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

/// A single regression tree stored as a flat node arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct Split {
    feature: usize,
    threshold: f64,
}

struct Grower<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    params: &'a ForestParams,
    nodes: Vec<Node>,
}

impl Grower<'_> {
    fn grow(&mut self, indices: &mut [usize], depth: usize) -> usize {
        let id = self.nodes.len();
        let n = indices.len();
        let sum: f64 = indices.iter().map(|&i| self.y[i]).sum();
        self.nodes.push(Node::Leaf { value: sum / n as f64 });

        let depth_reached = self.params.max_depth.is_some_and(|d| depth >= d);
        if depth_reached || n < self.params.min_samples_split || n < 2 * self.params.min_samples_leaf {
            return id;
        }

        let Some(split) = self.best_split(indices) else {
            return id;
        };

        // partition in place: rows going left end up in indices[..mid]
        let mut mid = 0;
        for k in 0..n {
            if self.x[[indices[k], split.feature]] <= split.threshold {
                indices.swap(k, mid);
                mid += 1;
            }
        }
        let (left_rows, right_rows) = indices.split_at_mut(mid);
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    /// Lowest summed squared error over every feature and every cut point between
    /// two distinct sorted values.
    fn best_split(&self, indices: &[usize]) -> Option<Split> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total_sum: f64 = indices.iter().map(|&i| self.y[i]).sum();
        let total_sq: f64 = indices.iter().map(|&i| self.y[i] * self.y[i]).sum();
        let parent_sse = total_sq - total_sum * total_sum / n as f64;
        if parent_sse <= MIN_GAIN {
            return None;
        }

        let mut best: Option<(f64, Split)> = None;
        let mut order: Vec<usize> = indices.to_vec();

        for (feature, column) in self.x.columns().into_iter().enumerate() {
            order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for pos in 0..n - 1 {
                let yi = self.y[order[pos]];
                left_sum += yi;
                left_sq += yi * yi;

                let left_n = pos + 1;
                let right_n = n - left_n;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }
                let here = column[order[pos]];
                let next = column[order[pos + 1]];
                if here >= next {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / left_n as f64)
                    + (right_sq - right_sum * right_sum / right_n as f64);
                if parent_sse - sse <= MIN_GAIN {
                    continue;
                }
                if best.as_ref().is_none_or(|(best_sse, _)| sse < *best_sse) {
                    let mut threshold = (here + next) / 2.0;
                    // midpoint can round up to `next` for adjacent floats
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some((sse, Split { feature, threshold }));
                }
            }
        }

        best.map(|(_, split)| split)
    }
}

impl RegressionTree {
    fn fit<'a>(x: ArrayView2<'a, f64>, y: ArrayView1<'a, f64>, sample: &mut [usize], params: &'a ForestParams) -> Self {
        let mut grower = Grower {
            x,
            y,
            params,
            nodes: Vec::new(),
        };
        grower.grow(sample, 0);
        RegressionTree { nodes: grower.nodes }
    }

    pub fn predict_one(&self, sample: ArrayView1<f64>) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes[id] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if sample[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    params: ForestParams,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            n_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), ForestError> {
        let n = x.nrows();
        if n != y.len() {
            return Err(ForestError::LengthMismatch {
                rows: n,
                targets: y.len(),
            });
        }
        if n == 0 {
            return Err(ForestError::EmptyTrainingSet);
        }

        let params = self.params;
        let (x, y) = (x.view(), y.view());
        self.trees = (0..params.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(tree_idx as u64));
                let mut sample: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.random_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                RegressionTree::fit(x, y, &mut sample, &params)
            })
            .collect();
        self.n_features = x.ncols();
        Ok(())
    }

    /// Mean of the per-tree predictions for one sample.
    pub fn predict_one(&self, sample: ArrayView1<f64>) -> Result<f64, ForestError> {
        self.check_fitted(sample.len())?;
        Ok(self.mean_prediction(sample))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, ForestError> {
        self.check_fitted(x.ncols())?;
        Ok(x.outer_iter().map(|row| self.mean_prediction(row)).collect())
    }

    fn check_fitted(&self, n_features: usize) -> Result<(), ForestError> {
        if self.trees.is_empty() {
            return Err(ForestError::NotFitted);
        }
        if n_features != self.n_features {
            return Err(ForestError::FeatureCount {
                expected: self.n_features,
                actual: n_features,
            });
        }
        Ok(())
    }

    fn mean_prediction(&self, sample: ArrayView1<f64>) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.predict_one(sample)).sum();
        total / self.trees.len() as f64
    }
}

/// Hold-out scores logged after training.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub r2: f64,
    pub mae: f64,
    pub rmse: f64,
}

pub fn evaluate(predicted: &Array1<f64>, actual: &Array1<f64>) -> Option<Evaluation> {
    if predicted.len() != actual.len() {
        return None;
    }
    let mean = actual.mean()?;
    let residuals = predicted - actual;
    let mae = residuals.mapv(f64::abs).mean()?;
    let sq_err = residuals.mapv(|r| r * r).sum();
    let total_var = actual.mapv(|a| (a - mean).powi(2)).sum();

    // a constant target scores 1.0 when matched exactly, 0.0 otherwise
    let r2 = if total_var == 0.0 {
        if sq_err == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - sq_err / total_var
    };
    Some(Evaluation {
        r2,
        mae,
        rmse: (sq_err / actual.len() as f64).sqrt(),
    })
}
