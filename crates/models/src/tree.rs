//! CART regression tree on squared error.
//!
//! Nodes live in a flat arena and reference their children by index, so the
//! serialised form stays shallow however deep the tree grows.

use crate::regressor::Regressor;
use anyhow::{bail, ensure, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// How split thresholds are chosen for each candidate feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Splitter {
    /// Exhaustive sweep over every distinct threshold.
    Best,
    /// One uniformly drawn threshold between the feature's extremes.
    Random,
}

/// Number of features drawn as split candidates at each node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    All,
    Sqrt,
    Log2,
    Count(usize),
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2() as usize,
            MaxFeatures::Count(n) => *n,
        };
        n.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
        /// Reduction of the summed squared error achieved by this split.
        impurity_decrease: f64,
    },
    Leaf {
        value: f64,
        n_samples: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: MaxFeatures,
    splitter: Splitter,
    seed: u64,
    n_features: usize,
    nodes: Vec<TreeNode>,
}

impl Default for DecisionTreeRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTreeRegressor {
    pub fn new() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            splitter: Splitter::Best,
            seed: 0,
            n_features: 0,
            nodes: Vec::new(),
        }
    }

    /// Maximum depth; the root sits at depth 0.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_splitter(mut self, splitter: Splitter) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn is_fitted(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, TreeNode::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let TreeNode::Split { left, right, .. } = self.nodes[id] {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
        deepest
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    id = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

impl Regressor for DecisionTreeRegressor {
    fn name(&self) -> &str {
        "decision_tree"
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        ensure!(
            x.nrows() == y.len(),
            "X has {} rows but y has {} values",
            x.nrows(),
            y.len()
        );
        ensure!(!y.is_empty(), "cannot fit a tree on zero samples");
        ensure!(x.ncols() > 0, "cannot fit a tree without features");
        ensure!(
            y.iter().all(|v| v.is_finite()),
            "targets must be finite"
        );

        let mut grower = Grower {
            x,
            y,
            tree: &*self,
            rng: fastrand::Rng::with_seed(self.seed),
            nodes: Vec::new(),
        };
        grower.grow((0..y.len()).collect(), 0);
        let nodes = grower.nodes;

        self.n_features = x.ncols();
        self.nodes = nodes;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            bail!("decision tree used before fit");
        }
        ensure!(
            x.ncols() == self.n_features,
            "tree was fitted on {} features, got {}",
            self.n_features,
            x.ncols()
        );
        Ok(x.rows().into_iter().map(|row| self.predict_row(row)).collect())
    }

    /// Impurity-decrease importances, normalised to sum to one. A tree
    /// without splits reports zeros.
    fn feature_importances(&self) -> Option<Array1<f64>> {
        if !self.is_fitted() {
            return None;
        }
        let mut importances = Array1::zeros(self.n_features);
        for node in &self.nodes {
            if let TreeNode::Split {
                feature,
                impurity_decrease,
                ..
            } = node
            {
                importances[*feature] += impurity_decrease;
            }
        }
        let total = importances.sum();
        if total > 0.0 {
            importances /= total;
        }
        Some(importances)
    }
}

struct Candidate {
    feature: usize,
    threshold: f64,
    children_sse: f64,
}

struct Grower<'x, 'y, 't> {
    x: ArrayView2<'x, f64>,
    y: ArrayView1<'y, f64>,
    tree: &'t DecisionTreeRegressor,
    rng: fastrand::Rng,
    nodes: Vec<TreeNode>,
}

impl Grower<'_, '_, '_> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let n = rows.len();
        let (sum, sum_sq) = rows.iter().fold((0.0, 0.0), |(s, sq), &r| {
            (s + self.y[r], sq + self.y[r] * self.y[r])
        });
        let value = sum / n as f64;
        let sse = (sum_sq - sum * sum / n as f64).max(0.0);

        let id = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            value,
            n_samples: n,
        });

        let stop = n < self.tree.min_samples_split
            || n < 2 * self.tree.min_samples_leaf
            || self.tree.max_depth.is_some_and(|max| depth >= max)
            || sse <= f64::EPSILON * sum_sq.max(1.0);
        if stop {
            return id;
        }
        let Some(split) = self.best_split(&rows) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| self.x[[r, split.feature]] <= split.threshold);
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[id] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            n_samples: n,
            impurity_decrease: (sse - split.children_sse).max(0.0),
        };
        id
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let n_features = self.x.ncols();
        let mut features: Vec<usize> = (0..n_features).collect();
        let draw = self.tree.max_features.resolve(n_features);
        if draw < n_features {
            self.rng.shuffle(&mut features);
            features.truncate(draw);
            features.sort_unstable();
        }
        features
    }

    fn best_split(&mut self, rows: &[usize]) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for feature in self.candidate_features() {
            let candidate = match self.tree.splitter {
                Splitter::Best => self.sweep(rows, feature),
                Splitter::Random => self.random_threshold(rows, feature),
            };
            if let Some(candidate) = candidate {
                if best
                    .as_ref()
                    .map_or(true, |b| candidate.children_sse < b.children_sse)
                {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    fn sweep(&self, rows: &[usize], feature: usize) -> Option<Candidate> {
        let mut sorted = rows.to_vec();
        sorted.sort_unstable_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

        let n = sorted.len();
        let min_leaf = self.tree.min_samples_leaf;
        let (total, total_sq) = sorted.iter().fold((0.0, 0.0), |(s, sq), &r| {
            (s + self.y[r], sq + self.y[r] * self.y[r])
        });

        let mut best: Option<Candidate> = None;
        let (mut left_sum, mut left_sq) = (0.0, 0.0);
        for i in 1..n {
            let y = self.y[sorted[i - 1]];
            left_sum += y;
            left_sq += y * y;
            if i < min_leaf || n - i < min_leaf {
                continue;
            }
            let lo = self.x[[sorted[i - 1], feature]];
            let hi = self.x[[sorted[i], feature]];
            if lo >= hi {
                continue;
            }
            let n_left = i as f64;
            let n_right = (n - i) as f64;
            let right_sum = total - left_sum;
            let right_sq = total_sq - left_sq;
            let children_sse = (left_sq - left_sum * left_sum / n_left).max(0.0)
                + (right_sq - right_sum * right_sum / n_right).max(0.0);
            if best.as_ref().map_or(true, |b| children_sse < b.children_sse) {
                let mut threshold = lo + (hi - lo) / 2.0;
                if threshold >= hi {
                    threshold = lo;
                }
                best = Some(Candidate {
                    feature,
                    threshold,
                    children_sse,
                });
            }
        }
        best
    }

    fn random_threshold(&mut self, rows: &[usize], feature: usize) -> Option<Candidate> {
        let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
            let v = self.x[[r, feature]];
            (lo.min(v), hi.max(v))
        });
        if !(hi > lo) {
            return None;
        }
        let mut threshold = lo + (hi - lo) * self.rng.f64();
        if threshold >= hi {
            threshold = lo;
        }

        let mut left = (0usize, 0.0, 0.0);
        let mut right = (0usize, 0.0, 0.0);
        for &r in rows {
            let y = self.y[r];
            let side = if self.x[[r, feature]] <= threshold {
                &mut left
            } else {
                &mut right
            };
            side.0 += 1;
            side.1 += y;
            side.2 += y * y;
        }
        let min_leaf = self.tree.min_samples_leaf;
        if left.0 < min_leaf || right.0 < min_leaf {
            return None;
        }
        let sse = |(count, sum, sq): (usize, f64, f64)| (sq - sum * sum / count as f64).max(0.0);
        Some(Candidate {
            feature,
            threshold,
            children_sse: sse(left) + sse(right),
        })
    }
}
