//! The regressor interface and the model families selectable at run time.

use crate::forest::RandomForestRegressor;
use crate::hyperparams::{Hyperparameters, ParamSet};
use crate::tree::{DecisionTreeRegressor, MaxFeatures, Splitter};
use anyhow::{anyhow, bail, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A performance model mapping feature rows to predicted performance.
pub trait Regressor: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()>;

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>>;

    /// Relative importance of every input column, if the model is fitted.
    fn feature_importances(&self) -> Option<Array1<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "DT")]
    DecisionTree,
    #[serde(rename = "RF")]
    RandomForest,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::DecisionTree => "DT",
            ModelKind::RandomForest => "RF",
        }
    }

    pub fn long_name(&self) -> &'static str {
        match self {
            ModelKind::DecisionTree => "decision tree",
            ModelKind::RandomForest => "random forest",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DT" => Ok(ModelKind::DecisionTree),
            "RF" => Ok(ModelKind::RandomForest),
            _ => Err(anyhow!("unknown model {s:?}, expected DT or RF")),
        }
    }
}

/// Everything needed to build an unfitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub kind: ModelKind,
    pub hyperparameters: Hyperparameters,
    pub seed: u64,
}

impl ModelSpec {
    pub fn new(kind: ModelKind, hyperparameters: Hyperparameters, seed: u64) -> Self {
        Self {
            kind,
            hyperparameters,
            seed,
        }
    }

    /// Copy of this spec with some hyperparameters overridden.
    pub fn with_params(&self, params: &ParamSet) -> Result<Self> {
        let mut spec = self.clone();
        spec.hyperparameters.apply(params)?;
        Ok(spec)
    }

    pub fn build(&self) -> Result<Model> {
        let hp = &self.hyperparameters;
        if let Err(reason) = hp.validate() {
            bail!("invalid hyperparameters {hp:?}: {reason}");
        }
        Ok(match self.kind {
            ModelKind::DecisionTree => Model::DecisionTree(
                DecisionTreeRegressor::new()
                    .with_max_depth(hp.max_depth)
                    .with_min_samples_split(hp.min_samples_split)
                    .with_min_samples_leaf(hp.min_samples_leaf)
                    .with_max_features(MaxFeatures::All)
                    .with_splitter(Splitter::Random)
                    .with_seed(self.seed),
            ),
            ModelKind::RandomForest => Model::RandomForest(
                RandomForestRegressor::new(hp.n_estimators)
                    .with_max_depth(hp.max_depth)
                    .with_min_samples_split(hp.min_samples_split)
                    .with_min_samples_leaf(hp.min_samples_leaf)
                    .with_max_features(MaxFeatures::Sqrt)
                    .with_bootstrap(true)
                    .with_seed(self.seed),
            ),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    DecisionTree(DecisionTreeRegressor),
    RandomForest(RandomForestRegressor),
}

impl Model {
    pub fn kind(&self) -> ModelKind {
        match self {
            Model::DecisionTree(_) => ModelKind::DecisionTree,
            Model::RandomForest(_) => ModelKind::RandomForest,
        }
    }

    fn inner(&self) -> &dyn Regressor {
        match self {
            Model::DecisionTree(tree) => tree,
            Model::RandomForest(forest) => forest,
        }
    }
}

impl Regressor for Model {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        match self {
            Model::DecisionTree(tree) => tree.fit(x, y),
            Model::RandomForest(forest) => forest.fit(x, y),
        }
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        self.inner().predict(x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.inner().feature_importances()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_model_kind_parsing() {
        assert_eq!("DT".parse::<ModelKind>().unwrap(), ModelKind::DecisionTree);
        assert_eq!("rf".parse::<ModelKind>().unwrap(), ModelKind::RandomForest);
        assert!("GBM".parse::<ModelKind>().is_err());
        assert_eq!(
            serde_json::to_string(&ModelKind::RandomForest).unwrap(),
            "\"RF\""
        );
    }

    #[test]
    fn test_spec_builds_and_fits_both_kinds() {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        for kind in [ModelKind::DecisionTree, ModelKind::RandomForest] {
            let spec = ModelSpec::new(kind, Hyperparameters::default(), 5);
            let mut model = spec.build().unwrap();
            assert_eq!(model.kind(), kind);
            model.fit(x.view(), y.view()).unwrap();
            assert_eq!(model.predict(x.view()).unwrap().len(), 4);
            assert!(model.feature_importances().is_some());
        }
    }

    #[test]
    fn test_invalid_hyperparameters_refuse_to_build() {
        let mut hp = Hyperparameters::default();
        hp.min_samples_leaf = 0;
        assert!(ModelSpec::new(ModelKind::DecisionTree, hp, 0).build().is_err());
    }

    #[test]
    fn test_fitted_model_serialises_with_kind_tag() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 5.0, 9.0];
        let spec = ModelSpec::new(ModelKind::DecisionTree, Hyperparameters::default(), 0);
        let mut model = spec.build().unwrap();
        model.fit(x.view(), y.view()).unwrap();
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["kind"], "decision_tree");
        let back: Model = serde_json::from_value(json).unwrap();
        assert_eq!(back.predict(x.view()).unwrap(), model.predict(x.view()).unwrap());
    }
}
