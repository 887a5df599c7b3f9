//! Tree hyperparameters and the search grids explored when tuning them.

use crate::regressor::ModelKind;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use smmpredict_data::AlgorithmClass;
use std::collections::BTreeMap;

/// One point of a parameter grid: parameter name to value.
pub type ParamSet = BTreeMap<String, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Only read by forests.
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
}

fn default_n_estimators() -> usize {
    100
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            max_depth: 18,
            min_samples_split: 2,
            min_samples_leaf: 1,
            n_estimators: default_n_estimators(),
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_depth == 0 {
            return Err("max_depth must be > 0".into());
        }
        if self.min_samples_split < 2 {
            return Err("min_samples_split must be >= 2".into());
        }
        if self.min_samples_leaf == 0 {
            return Err("min_samples_leaf must be >= 1".into());
        }
        if self.n_estimators == 0 {
            return Err("n_estimators must be >= 1".into());
        }
        Ok(())
    }

    pub fn set(&mut self, name: &str, value: usize) -> Result<()> {
        match name {
            "max_depth" => self.max_depth = value,
            "min_samples_split" => self.min_samples_split = value,
            "min_samples_leaf" => self.min_samples_leaf = value,
            "n_estimators" => self.n_estimators = value,
            other => bail!("unknown hyperparameter {other:?}"),
        }
        Ok(())
    }

    pub fn apply(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params {
            self.set(name, *value)?;
        }
        Ok(())
    }
}

/// Named integer axes searched exhaustively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamGrid {
    axes: BTreeMap<String, Vec<usize>>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_axis(mut self, name: &str, values: impl IntoIterator<Item = usize>) -> Self {
        self.axes.insert(name.to_string(), values.into_iter().collect());
        self
    }

    pub fn axes(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.axes
    }

    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.values().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cartesian product of all axes. Axes are taken in name order and the
    /// last axis varies fastest.
    pub fn combinations(&self) -> Vec<ParamSet> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut combos = vec![ParamSet::new()];
        for (name, values) in &self.axes {
            combos = combos
                .into_iter()
                .flat_map(|combo| {
                    values.iter().map(move |&value| {
                        let mut next = combo.clone();
                        next.insert(name.clone(), value);
                        next
                    })
                })
                .collect();
        }
        combos
    }

    /// Grid explored when tuning a model of `kind` for `algo` with
    /// `n_features` predictors.
    pub fn for_model(kind: ModelKind, algo: AlgorithmClass, n_features: usize) -> Self {
        match (kind, algo) {
            (ModelKind::RandomForest, _) => {
                Self::new().with_axis("n_estimators", (1..10).step_by(5).chain((50..200).step_by(50)))
            }
            (ModelKind::DecisionTree, AlgorithmClass::Medium) => {
                Self::new().with_axis("max_depth", (6..13).step_by(2).chain((15..19).step_by(3)))
            }
            (ModelKind::DecisionTree, AlgorithmClass::Tiny) => Self::new()
                .with_axis(
                    "max_depth",
                    (4..n_features).chain((n_features..3 * n_features).step_by(3)),
                )
                .with_axis("min_samples_split", (2..5).chain((8..n_features).step_by(3)))
                .with_axis("min_samples_leaf", (1..5).chain((8..n_features).step_by(3))),
            (ModelKind::DecisionTree, _) => Self::new()
                .with_axis("max_depth", (4..13).step_by(2).chain((15..19).step_by(3)))
                .with_axis("min_samples_split", [2, 5, 13, 18])
                .with_axis("min_samples_leaf", [2, 5, 13, 18]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hyperparameters_valid() {
        assert!(Hyperparameters::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_hyperparameters() {
        let mut hp = Hyperparameters::default();
        hp.min_samples_split = 1;
        assert!(hp.validate().is_err());

        hp = Hyperparameters::default();
        hp.max_depth = 0;
        assert!(hp.validate().is_err());
    }

    #[test]
    fn test_apply_and_unknown_names() {
        let mut hp = Hyperparameters::default();
        let params: ParamSet = [("max_depth".to_string(), 7), ("min_samples_leaf".to_string(), 3)]
            .into_iter()
            .collect();
        hp.apply(&params).unwrap();
        assert_eq!(hp.max_depth, 7);
        assert_eq!(hp.min_samples_leaf, 3);
        assert!(hp.set("learning_rate", 1).is_err());
    }

    #[test]
    fn test_n_estimators_defaults_when_missing() {
        let hp: Hyperparameters =
            serde_json::from_str(r#"{"max_depth": 18, "min_samples_split": 13, "min_samples_leaf": 2}"#)
                .unwrap();
        assert_eq!(hp.n_estimators, 100);
    }

    #[test]
    fn test_combinations_in_name_order() {
        let grid = ParamGrid::new()
            .with_axis("min_samples_leaf", [1, 2])
            .with_axis("max_depth", [3, 4, 5]);
        let combos = grid.combinations();
        assert_eq!(combos.len(), 6);
        assert_eq!(grid.len(), 6);
        assert_eq!(combos[0]["max_depth"], 3);
        assert_eq!(combos[0]["min_samples_leaf"], 1);
        assert_eq!(combos[1]["min_samples_leaf"], 2);
        assert_eq!(combos[5]["max_depth"], 5);
        assert!(ParamGrid::new().combinations().is_empty());
    }

    #[test]
    fn test_grids_per_model_and_class() {
        let medium = ParamGrid::for_model(ModelKind::DecisionTree, AlgorithmClass::Medium, 30);
        assert_eq!(medium.axes()["max_depth"], vec![6, 8, 10, 12, 15, 18]);
        assert_eq!(medium.axes().len(), 1);

        let other = ParamGrid::for_model(ModelKind::DecisionTree, AlgorithmClass::LargeDb1, 30);
        assert_eq!(other.axes()["max_depth"], vec![4, 6, 8, 10, 12, 15, 18]);
        assert_eq!(other.axes()["min_samples_leaf"], vec![2, 5, 13, 18]);
        assert_eq!(other.len(), 7 * 4 * 4);

        let tiny = ParamGrid::for_model(ModelKind::DecisionTree, AlgorithmClass::Tiny, 10);
        assert_eq!(tiny.axes()["max_depth"], vec![4, 5, 6, 7, 8, 9, 10, 13, 16, 19, 22, 25, 28]);
        assert_eq!(tiny.axes()["min_samples_split"], vec![2, 3, 4, 8]);
        assert_eq!(tiny.axes()["min_samples_leaf"], vec![1, 2, 3, 4, 8]);

        let forest = ParamGrid::for_model(ModelKind::RandomForest, AlgorithmClass::Small, 10);
        assert_eq!(forest.axes()["n_estimators"], vec![1, 6, 50, 100, 150]);
    }
}
