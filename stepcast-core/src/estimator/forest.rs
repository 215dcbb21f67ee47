//! Random forest regressor: bootstrap-aggregated variance-reduction trees.
//!
//! Each tree is grown on a bootstrap sample; at every node a random subset of
//! `max_features` (fraction of the covariates) is searched for the split that
//! minimizes the children's summed squared error. The forest's RNG is seeded
//! from the value handed in by the factory, so refitting on the same data
//! reproduces the same trees.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{check_feature_count, check_training_shape, EstimatorFailure, Regressor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Growth limits shared by every tree of a forest.
#[derive(Debug, Clone, Copy)]
struct GrowParams {
    max_depth: usize,
    min_samples_leaf: usize,
    features_per_split: usize,
}

struct TreeBuilder<'x, 'y> {
    x: ArrayView2<'x, f64>,
    y: ArrayView1<'y, f64>,
    params: GrowParams,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    score: f64,
}

impl TreeBuilder<'_, '_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let n = indices.len() as f64;
        let sum: f64 = indices.iter().map(|&i| self.y[i]).sum();
        let mean = sum / n;
        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: mean });

        if depth >= self.params.max_depth || indices.len() < 2 * self.params.min_samples_leaf {
            return node_id;
        }

        let Some(best) = self.best_split(&indices, sum, rng) else {
            return node_id;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[[i, best.feature]] <= best.threshold);

        let left = self.grow(left_idx, depth + 1, rng);
        let right = self.grow(right_idx, depth + 1, rng);
        self.nodes[node_id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node_id
    }

    fn best_split(&self, indices: &[usize], total: f64, rng: &mut StdRng) -> Option<BestSplit> {
        let p = self.x.ncols();
        if p == 0 {
            return None;
        }
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf;
        // Score = sum_l^2/n_l + sum_r^2/n_r; the parent's sum^2/n is the no-split baseline.
        let baseline = total * total / n as f64;
        let mut best: Option<BestSplit> = None;

        let candidates = rand::seq::index::sample(rng, p, self.params.features_per_split.min(p));
        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);

        for feature in candidates.into_iter() {
            pairs.clear();
            pairs.extend(indices.iter().map(|&i| (self.x[[i, feature]], self.y[i])));
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            for k in 0..n - 1 {
                left_sum += pairs[k].1;
                let n_left = k + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf || pairs[k].0 == pairs[k + 1].0 {
                    continue;
                }
                let right_sum = total - left_sum;
                let score =
                    left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
                let improves = score > baseline + 1e-12;
                let better = best.as_ref().map_or(true, |b| score > b.score);
                if improves && better {
                    best = Some(BestSplit {
                        feature,
                        threshold: 0.5 * (pairs[k].0 + pairs[k + 1].0),
                        score,
                    });
                }
            }
        }
        best
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_trees: usize,
    max_depth: usize,
    min_samples_leaf: usize,
    max_features: f64,
    seed: u64,
    trees: Vec<RegressionTree>,
    n_features: Option<usize>,
}

impl RandomForest {
    pub fn new(
        n_trees: usize,
        max_depth: usize,
        min_samples_leaf: usize,
        max_features: f64,
        seed: u64,
    ) -> Self {
        Self {
            n_trees,
            max_depth,
            min_samples_leaf,
            max_features,
            seed,
            trees: Vec::new(),
            n_features: None,
        }
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), EstimatorFailure> {
        check_training_shape(&x, &y)?;
        let n = y.len();
        let p = x.ncols();
        let params = GrowParams {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf.max(1),
            features_per_split: ((self.max_features * p as f64).ceil() as usize).max(1),
        };

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut trees = Vec::with_capacity(self.n_trees);
        for _ in 0..self.n_trees {
            let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let mut builder = TreeBuilder {
                x,
                y,
                params,
                nodes: Vec::new(),
            };
            builder.grow(sample, 0, &mut rng);
            trees.push(RegressionTree {
                nodes: builder.nodes,
            });
        }

        self.trees = trees;
        self.n_features = Some(p);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, EstimatorFailure> {
        check_feature_count(&x, self.n_features)?;
        if self.trees.is_empty() {
            return Err(EstimatorFailure::NotFitted);
        }
        let n_trees = self.trees.len() as f64;
        Ok(x
            .rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect())
    }

    fn is_fitted(&self) -> bool {
        self.n_features.is_some() && !self.trees.is_empty()
    }
}
