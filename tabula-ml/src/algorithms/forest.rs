//! Random forest regression with impurity-based feature importances.

use crate::error::MlError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Forest hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// `None` grows trees until leaves are pure.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
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

/// A single CART regression tree stored as a node arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
    /// Unnormalized impurity decrease per feature.
    importances: Vec<f64>,
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl RegressionTree {
    fn fit(
        features: &[Vec<f64>],
        targets: &[f64],
        indices: Vec<usize>,
        config: &ForestConfig,
    ) -> Self {
        let n_features = features.first().map(|r| r.len()).unwrap_or(0);
        let mut tree = Self {
            nodes: Vec::new(),
            importances: vec![0.0; n_features],
        };
        tree.grow(features, targets, indices, 0, config);
        tree
    }

    fn grow(
        &mut self,
        features: &[Vec<f64>],
        targets: &[f64],
        indices: Vec<usize>,
        depth: usize,
        config: &ForestConfig,
    ) -> usize {
        let id = self.nodes.len();
        let value = indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len().max(1) as f64;
        self.nodes.push(Node::Leaf { value });

        let depth_ok = config.max_depth.is_none_or(|max| depth < max);
        if !depth_ok || indices.len() < config.min_samples_split.max(2) {
            return id;
        }
        let Some(split) = best_split(features, targets, &indices) else {
            return id;
        };
        self.importances[split.feature] += split.gain;
        let left = self.grow(features, targets, split.left, depth + 1, config);
        let right = self.grow(features, targets, split.right, depth + 1, config);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    pub fn predict_one(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row.get(*feature).copied().unwrap_or(0.0) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// Sum of squared errors from running sums.
fn sse(sum: f64, sum_sq: f64, n: f64) -> f64 {
    if n == 0.0 {
        0.0
    } else {
        (sum_sq - sum * sum / n).max(0.0)
    }
}

/// Best variance-reducing split over all features, sweeping sorted values.
fn best_split(features: &[Vec<f64>], targets: &[f64], indices: &[usize]) -> Option<Split> {
    if indices.len() < 2 {
        return None;
    }
    let n = indices.len() as f64;
    let total: f64 = indices.iter().map(|&i| targets[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| targets[i] * targets[i]).sum();
    let parent = sse(total, total_sq, n);
    if parent <= f64::EPSILON {
        return None;
    }
    let n_features = features.first().map(|r| r.len()).unwrap_or(0);

    let mut best: Option<(usize, f64, f64)> = None;
    let mut order = indices.to_vec();
    for feature in 0..n_features {
        order.sort_by(|&a, &b| features[a][feature].total_cmp(&features[b][feature]));
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 0..order.len() - 1 {
            let y = targets[order[k]];
            left_sum += y;
            left_sq += y * y;
            let x = features[order[k]][feature];
            let next = features[order[k + 1]][feature];
            if x == next {
                continue;
            }
            let n_left = (k + 1) as f64;
            let children = sse(left_sum, left_sq, n_left)
                + sse(total - left_sum, total_sq - left_sq, n - n_left);
            let gain = parent - children;
            if gain > best.map(|b| b.2).unwrap_or(0.0) {
                best = Some((feature, (x + next) / 2.0, gain));
            }
        }
    }

    best.map(|(feature, threshold, gain)| {
        let (left, right) = indices
            .iter()
            .partition(|&&i| features[i][feature] <= threshold);
        Split {
            feature,
            threshold,
            gain,
            left,
            right,
        }
    })
}

/// Bagged ensemble of regression trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
    feature_importances: Vec<f64>,
}

impl RandomForestRegressor {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    /// Fit on row-major `features` against `targets`, bootstrapping rows per tree.
    pub fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), MlError> {
        if features.is_empty() || features.len() != targets.len() {
            return Err(MlError::model(format!(
                "forest needs matching non-empty inputs, got {} rows and {} targets",
                features.len(),
                targets.len()
            )));
        }
        let n_features = features[0].len();
        if n_features == 0 || features.iter().any(|r| r.len() != n_features) {
            return Err(MlError::model("forest rows must share a non-zero width"));
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let n = features.len();
        self.trees = (0..self.config.n_trees.max(1))
            .map(|_| {
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(features, targets, sample, &self.config)
            })
            .collect();

        let mut importances = vec![0.0; n_features];
        for tree in &self.trees {
            let sum: f64 = tree.importances.iter().sum();
            if sum > 0.0 {
                for (acc, imp) in importances.iter_mut().zip(&tree.importances) {
                    *acc += imp / sum;
                }
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }
        self.feature_importances = importances;
        Ok(())
    }

    pub fn predict_one(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict_one(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn predict(&self, features: &[Vec<f64>]) -> Vec<f64> {
        features.iter().map(|r| self.predict_one(r)).collect()
    }

    /// Importances summing to 1 (all zeros when no split reduced impurity).
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
