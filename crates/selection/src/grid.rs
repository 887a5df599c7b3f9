//! Exhaustive hyperparameter search with grouped cross-validation.

use crate::scorer::{Scorer, ScoringSet};
use crate::split::GroupShuffleSplit;
use anyhow::{anyhow, ensure, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smmpredict_data::Dataset;
use smmpredict_models::{Model, ModelSpec, ParamGrid, ParamSet, Regressor};
use std::collections::BTreeMap;
use tracing::info;

/// Cross-validated scores of one scorer for every candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerResults {
    /// `split_scores[candidate][split]`
    pub split_scores: Vec<Vec<f64>>,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    /// 1 is best; tied candidates share the lowest rank.
    pub rank: Vec<usize>,
}

impl ScorerResults {
    fn from_split_scores(split_scores: Vec<Vec<f64>>) -> Self {
        let mean: Vec<f64> = split_scores
            .iter()
            .map(|s| s.iter().sum::<f64>() / s.len() as f64)
            .collect();
        let std = split_scores
            .iter()
            .zip(&mean)
            .map(|(s, m)| (s.iter().map(|v| (v - m).powi(2)).sum::<f64>() / s.len() as f64).sqrt())
            .collect();
        let rank = mean
            .iter()
            .map(|m| 1 + mean.iter().filter(|other| *other > m).count())
            .collect();
        Self {
            split_scores,
            mean,
            std,
            rank,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvResults {
    pub param_grid: ParamGrid,
    pub params: Vec<ParamSet>,
    pub scores: BTreeMap<String, ScorerResults>,
    pub best_index: usize,
    pub best_params: ParamSet,
    pub refit_scorer: String,
}

impl CvResults {
    pub fn best_score(&self) -> f64 {
        self.scores
            .get(&self.refit_scorer)
            .map_or(f64::NAN, |s| s.mean[self.best_index])
    }
}

pub struct GridSearchOutcome {
    pub cv_results: CvResults,
    /// Best candidate refitted on the whole search data.
    pub best_model: Model,
    pub best_spec: ModelSpec,
}

pub struct GridSearch {
    spec: ModelSpec,
    grid: ParamGrid,
    cv: GroupShuffleSplit,
    scorers: Vec<Box<dyn Scorer>>,
    refit: String,
}

impl GridSearch {
    pub fn new(
        spec: ModelSpec,
        grid: ParamGrid,
        cv: GroupShuffleSplit,
        scorers: Vec<Box<dyn Scorer>>,
        refit: &str,
    ) -> Self {
        Self {
            spec,
            grid,
            cv,
            scorers,
            refit: refit.to_string(),
        }
    }

    pub fn fit(&self, data: &Dataset) -> Result<GridSearchOutcome> {
        ensure!(!self.grid.is_empty(), "parameter grid is empty");
        ensure!(
            self.scorers.iter().any(|s| s.name() == self.refit),
            "refit scorer {} is not among the scorers",
            self.refit
        );

        let candidates = self.grid.combinations();
        let splits = self.cv.split(data.groups())?;
        let folds = splits
            .iter()
            .map(|split| Ok((data.select_rows(&split.train)?, data.select_rows(&split.test)?)))
            .collect::<Result<Vec<_>>>()?;
        info!(
            candidates = candidates.len(),
            splits = folds.len(),
            fits = candidates.len() * folds.len(),
            "starting grid search"
        );

        let tasks: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..folds.len()).map(move |s| (c, s)))
            .collect();
        let fold_scores = tasks
            .par_iter()
            .map(|&(c, s)| -> Result<Vec<f64>> {
                let (train, test) = &folds[s];
                let mut model = self.spec.with_params(&candidates[c])?.build()?;
                model.fit(train.features(), train.targets())?;
                let set = ScoringSet::from_dataset(test);
                self.scorers.iter().map(|scorer| scorer.score(&model, &set)).collect()
            })
            .collect::<Result<Vec<_>>>()?;

        let mut scores = BTreeMap::new();
        for (i, scorer) in self.scorers.iter().enumerate() {
            let split_scores = (0..candidates.len())
                .map(|c| (0..folds.len()).map(|s| fold_scores[c * folds.len() + s][i]).collect())
                .collect();
            scores.insert(
                scorer.name().to_string(),
                ScorerResults::from_split_scores(split_scores),
            );
        }

        let decisive = &scores[&self.refit];
        let best_index = decisive
            .rank
            .iter()
            .position(|&rank| rank == 1)
            .ok_or_else(|| anyhow!("no best candidate for scorer {}", self.refit))?;
        let best_params = candidates[best_index].clone();
        info!(
            scorer = %self.refit,
            score = decisive.mean[best_index],
            params = ?best_params,
            "best candidate"
        );

        let best_spec = self.spec.with_params(&best_params)?;
        let mut best_model = best_spec.build()?;
        best_model.fit(data.features(), data.targets())?;

        Ok(GridSearchOutcome {
            cv_results: CvResults {
                param_grid: self.grid.clone(),
                params: candidates,
                scores,
                best_index,
                best_params,
                refit_scorer: self.refit.clone(),
            },
            best_model,
            best_spec,
        })
    }
}
