//! Tree-based performance regressors.
//!
//! Models are built from a [`ModelSpec`], fitted through the [`Regressor`]
//! trait and serialised as a tagged [`Model`] enum.

pub mod forest;
pub mod hyperparams;
pub mod registry;
pub mod regressor;
pub mod tree;

pub use forest::RandomForestRegressor;
pub use hyperparams::{Hyperparameters, ParamGrid, ParamSet};
pub use registry::{AlgorithmPreset, AlgorithmPresets};
pub use regressor::{Model, ModelKind, ModelSpec, Regressor};
pub use tree::{DecisionTreeRegressor, MaxFeatures, Splitter, TreeNode};
