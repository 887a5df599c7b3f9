//! Bagged ensemble of regression trees.

use crate::regressor::Regressor;
use crate::tree::{DecisionTreeRegressor, MaxFeatures, Splitter};
use anyhow::{bail, ensure, Result};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    n_estimators: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: MaxFeatures,
    bootstrap: bool,
    seed: u64,
    trees: Vec<DecisionTreeRegressor>,
}

impl RandomForestRegressor {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            seed: 0,
            trees: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    pub fn trees(&self) -> &[DecisionTreeRegressor] {
        &self.trees
    }

    fn tree_template(&self, seed: u64) -> DecisionTreeRegressor {
        let mut tree = DecisionTreeRegressor::new()
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_max_features(self.max_features)
            .with_splitter(Splitter::Best)
            .with_seed(seed);
        if let Some(depth) = self.max_depth {
            tree = tree.with_max_depth(depth);
        }
        tree
    }
}

/// Draw `n_samples` row indices with replacement.
fn bootstrap_sample(n_samples: usize, rng: &mut fastrand::Rng) -> Vec<usize> {
    (0..n_samples).map(|_| rng.usize(..n_samples)).collect()
}

impl Regressor for RandomForestRegressor {
    fn name(&self) -> &str {
        "random_forest"
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        ensure!(self.n_estimators > 0, "a forest needs at least one tree");
        ensure!(
            x.nrows() == y.len(),
            "X has {} rows but y has {} values",
            x.nrows(),
            y.len()
        );
        ensure!(!y.is_empty(), "cannot fit a forest on zero samples");

        let mut rng = fastrand::Rng::with_seed(self.seed);
        let seeds: Vec<u64> = (0..self.n_estimators).map(|_| rng.u64(..)).collect();

        let trees = seeds
            .par_iter()
            .map(|&seed| -> Result<DecisionTreeRegressor> {
                let mut tree = self.tree_template(seed);
                if self.bootstrap {
                    let mut rng = fastrand::Rng::with_seed(seed ^ 0x9e37_79b9_7f4a_7c15);
                    let rows = bootstrap_sample(y.len(), &mut rng);
                    let x_boot = x.select(Axis(0), &rows);
                    let y_boot = y.select(Axis(0), &rows);
                    tree.fit(x_boot.view(), y_boot.view())?;
                } else {
                    tree.fit(x, y)?;
                }
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            trees = trees.len(),
            leaves = trees.iter().map(DecisionTreeRegressor::n_leaves).sum::<usize>(),
            "fitted random forest"
        );
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            bail!("random forest used before fit");
        }
        let per_tree = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;
        let mut mean = Array1::zeros(x.nrows());
        for predictions in &per_tree {
            mean += predictions;
        }
        Ok(mean / self.trees.len() as f64)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        let mut trees = self.trees.iter();
        let mut total = trees.next()?.feature_importances()?;
        for tree in trees {
            total += &tree.feature_importances()?;
        }
        Some(total / self.trees.len() as f64)
    }
}
