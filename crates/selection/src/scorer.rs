//! Named scoring functions for model selection. Higher scores are better, so
//! losses and errors are reported negated.

use anyhow::{bail, Result};
use ndarray::{ArrayView1, ArrayView2};
use smmpredict_data::{Dataset, Mnk};
use smmpredict_metrics::{mean_absolute_error, mean_loss, mean_squared_error, worst_loss};
use smmpredict_models::Regressor;

/// Held-out observations a fitted model is scored on.
#[derive(Debug, Clone, Copy)]
pub struct ScoringSet<'a> {
    pub features: ArrayView2<'a, f64>,
    pub targets: ArrayView1<'a, f64>,
    pub groups: &'a [Mnk],
}

impl<'a> ScoringSet<'a> {
    pub fn from_dataset(data: &'a Dataset) -> Self {
        Self {
            features: data.features(),
            targets: data.targets(),
            groups: data.groups(),
        }
    }
}

pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, model: &dyn Regressor, set: &ScoringSet<'_>) -> Result<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossAggregate {
    Worst,
    Mean,
}

/// Negated worst or mean top-k performance loss over the groups of the set.
#[derive(Debug, Clone)]
pub struct TopKLossScorer {
    name: String,
    aggregate: LossAggregate,
    top_k: usize,
    scaled: bool,
}

impl TopKLossScorer {
    pub fn new(aggregate: LossAggregate, top_k: usize, scaled: bool) -> Self {
        let prefix = match aggregate {
            LossAggregate::Worst => "worse",
            LossAggregate::Mean => "mean",
        };
        Self {
            name: format!("{prefix}_top-{top_k}"),
            aggregate,
            top_k,
            scaled,
        }
    }
}

impl Scorer for TopKLossScorer {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(&self, model: &dyn Regressor, set: &ScoringSet<'_>) -> Result<f64> {
        let predictions = model.predict(set.features)?;
        let y_true = set.targets.to_vec();
        let y_pred = predictions.to_vec();
        let loss = match self.aggregate {
            LossAggregate::Worst => worst_loss(&y_true, &y_pred, self.top_k, set.groups, self.scaled)?,
            LossAggregate::Mean => mean_loss(&y_true, &y_pred, self.top_k, set.groups, self.scaled)?,
        };
        Ok(-loss)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NegMeanSquaredError;

impl Scorer for NegMeanSquaredError {
    fn name(&self) -> &str {
        "neg_mean_squared_error"
    }

    fn score(&self, model: &dyn Regressor, set: &ScoringSet<'_>) -> Result<f64> {
        let predictions = model.predict(set.features)?;
        Ok(-mean_squared_error(&set.targets.to_vec(), &predictions.to_vec())?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NegMeanAbsoluteError;

impl Scorer for NegMeanAbsoluteError {
    fn name(&self) -> &str {
        "neg_mean_absolute_error"
    }

    fn score(&self, model: &dyn Regressor, set: &ScoringSet<'_>) -> Result<f64> {
        let predictions = model.predict(set.features)?;
        Ok(-mean_absolute_error(&set.targets.to_vec(), &predictions.to_vec())?)
    }
}

/// Look a scorer up by name. `scaled` only affects the top-k loss scorers.
pub fn scorer_by_name(name: &str, scaled: bool) -> Result<Box<dyn Scorer>> {
    Ok(match name {
        "worse_top-1" => Box::new(TopKLossScorer::new(LossAggregate::Worst, 1, scaled)),
        "mean_top-1" => Box::new(TopKLossScorer::new(LossAggregate::Mean, 1, scaled)),
        "neg_mean_squared_error" => Box::new(NegMeanSquaredError),
        "neg_mean_absolute_error" => Box::new(NegMeanAbsoluteError),
        other => bail!("unknown scorer {other:?}"),
    })
}
