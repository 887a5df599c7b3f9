//! Model selection for performance predictors: grouped splits, scorers,
//! hyperparameter grid search and recursive feature elimination.

pub mod grid;
pub mod rfe;
pub mod scorer;
pub mod split;

pub use grid::{CvResults, GridSearch, GridSearchOutcome, ScorerResults};
pub use rfe::{RfeSettings, Rfecv, RfecvOutcome, RfecvReport};
pub use scorer::{
    scorer_by_name, LossAggregate, NegMeanAbsoluteError, NegMeanSquaredError, Scorer, ScoringSet,
    TopKLossScorer,
};
pub use split::{GroupShuffleSplit, Split};
