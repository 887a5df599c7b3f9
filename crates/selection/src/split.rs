//! Group-aware random train/test partitions.

use anyhow::{ensure, Result};
use std::collections::BTreeMap;

/// Row indices of one train/test partition, each ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Randomly assigns whole groups to the test side, so that no group is ever
/// split between training and testing.
#[derive(Debug, Clone)]
pub struct GroupShuffleSplit {
    n_splits: usize,
    test_size: f64,
    seed: u64,
}

impl GroupShuffleSplit {
    /// `test_size` is the fraction of distinct groups held out per split.
    pub fn new(n_splits: usize, test_size: f64) -> Self {
        Self {
            n_splits,
            test_size,
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    pub fn split<G: Ord>(&self, groups: &[G]) -> Result<Vec<Split>> {
        ensure!(self.n_splits > 0, "need at least one split");
        ensure!(
            self.test_size > 0.0 && self.test_size < 1.0,
            "test_size must lie in (0, 1), got {}",
            self.test_size
        );

        let mut members: BTreeMap<&G, Vec<usize>> = BTreeMap::new();
        for (row, group) in groups.iter().enumerate() {
            members.entry(group).or_default().push(row);
        }
        let members: Vec<Vec<usize>> = members.into_values().collect();
        let n_groups = members.len();
        let n_test = (self.test_size * n_groups as f64).ceil() as usize;
        ensure!(
            n_test < n_groups,
            "cannot hold out {n_test} of {n_groups} groups and keep a training set"
        );

        let mut rng = fastrand::Rng::with_seed(self.seed);
        let mut order: Vec<usize> = (0..n_groups).collect();
        let mut splits = Vec::with_capacity(self.n_splits);
        for _ in 0..self.n_splits {
            rng.shuffle(&mut order);
            let mut test: Vec<usize> = order[..n_test]
                .iter()
                .flat_map(|&g| members[g].iter().copied())
                .collect();
            let mut train: Vec<usize> = order[n_test..]
                .iter()
                .flat_map(|&g| members[g].iter().copied())
                .collect();
            test.sort_unstable();
            train.sort_unstable();
            splits.push(Split { train, test });
        }
        Ok(splits)
    }
}
