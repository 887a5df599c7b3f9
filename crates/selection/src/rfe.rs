//! Recursive feature elimination with the feature count chosen by grouped
//! cross-validation.

use crate::scorer::{NegMeanAbsoluteError, NegMeanSquaredError, Scorer, ScoringSet};
use crate::split::GroupShuffleSplit;
use anyhow::{anyhow, ensure, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smmpredict_data::{AlgorithmClass, Dataset};
use smmpredict_models::{Model, ModelSpec, Regressor};
use tracing::{debug, info};

/// Elimination settings used for an algorithm class.
pub struct RfeSettings {
    pub step: usize,
    pub min_features_to_select: usize,
    pub scorer: Box<dyn Scorer>,
}

impl RfeSettings {
    pub fn for_algorithm(algo: AlgorithmClass) -> Self {
        match algo {
            AlgorithmClass::Small | AlgorithmClass::Medium => Self {
                step: 3,
                min_features_to_select: 14,
                scorer: Box::new(NegMeanSquaredError),
            },
            _ => Self {
                step: 1,
                min_features_to_select: 5,
                scorer: Box::new(NegMeanAbsoluteError),
            },
        }
    }
}

/// Serialisable summary of a finished elimination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfecvReport {
    pub scorer: String,
    pub step: usize,
    pub min_features_to_select: usize,
    /// Feature counts visited, ascending.
    pub feature_counts: Vec<usize>,
    /// Mean cross-validated score at each visited count.
    pub mean_scores: Vec<f64>,
    pub n_features: usize,
    pub feature_names: Vec<String>,
    pub support: Vec<bool>,
    /// 1 for selected features, higher for features eliminated earlier.
    pub ranking: Vec<usize>,
    /// Importances of the final estimator over the selected features.
    pub importances: Vec<f64>,
}

impl RfecvReport {
    pub fn selected_features(&self) -> Vec<String> {
        self.feature_names
            .iter()
            .zip(&self.support)
            .filter(|(_, keep)| **keep)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

pub struct RfecvOutcome {
    pub report: RfecvReport,
    /// Estimator fitted on the selected features of the whole data.
    pub estimator: Model,
}

pub struct Rfecv {
    spec: ModelSpec,
    step: usize,
    min_features_to_select: usize,
    cv: GroupShuffleSplit,
    scorer: Box<dyn Scorer>,
}

struct Elimination {
    support: Vec<bool>,
    ranking: Vec<usize>,
    /// (feature count, score) after each round, when a scoring set was given.
    scores: Vec<(usize, f64)>,
    estimator: Model,
}

impl Rfecv {
    pub fn new(spec: ModelSpec, settings: RfeSettings, cv: GroupShuffleSplit) -> Self {
        Self {
            spec,
            step: settings.step,
            min_features_to_select: settings.min_features_to_select,
            cv,
            scorer: settings.scorer,
        }
    }

    pub fn fit(&self, data: &Dataset) -> Result<RfecvOutcome> {
        ensure!(self.step > 0, "elimination step must be positive");
        let n_total = data.n_features();
        let floor = self.min_features_to_select.clamp(1, n_total.max(1));

        let splits = self.cv.split(data.groups())?;
        info!(
            features = n_total,
            min_features = floor,
            step = self.step,
            scorer = self.scorer.name(),
            splits = splits.len(),
            "starting recursive feature elimination"
        );

        let per_split = splits
            .par_iter()
            .map(|split| -> Result<Vec<(usize, f64)>> {
                let train = data.select_rows(&split.train)?;
                let test = data.select_rows(&split.test)?;
                Ok(self.eliminate(&train, floor, Some(&test))?.scores)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut feature_counts: Vec<usize> = per_split
            .first()
            .map(|scores| scores.iter().map(|(count, _)| *count).collect())
            .unwrap_or_default();
        feature_counts.reverse();
        let mean_scores: Vec<f64> = feature_counts
            .iter()
            .map(|count| {
                let total: f64 = per_split
                    .iter()
                    .flat_map(|scores| scores.iter().filter(|(c, _)| c == count))
                    .map(|(_, score)| score)
                    .sum();
                total / per_split.len() as f64
            })
            .collect();

        // Ascending counts with a strict comparison keep the smallest count on ties.
        let mut best = 0;
        for (i, score) in mean_scores.iter().enumerate() {
            if *score > mean_scores[best] {
                best = i;
            }
        }
        let n_features = *feature_counts
            .get(best)
            .ok_or_else(|| anyhow!("feature elimination produced no scores"))?;
        info!(n_features, score = mean_scores[best], "optimal number of features");

        let final_run = self.eliminate(data, n_features, None)?;
        let importances = final_run
            .estimator
            .feature_importances()
            .map(|imp| imp.to_vec())
            .unwrap_or_default();

        Ok(RfecvOutcome {
            report: RfecvReport {
                scorer: self.scorer.name().to_string(),
                step: self.step,
                min_features_to_select: floor,
                feature_counts,
                mean_scores,
                n_features,
                feature_names: data.feature_names().to_vec(),
                support: final_run.support,
                ranking: final_run.ranking,
                importances,
            },
            estimator: final_run.estimator,
        })
    }

    /// Drop the least important features `step` at a time until `target`
    /// remain, scoring every intermediate count on `score_on` if given.
    fn eliminate(
        &self,
        data: &Dataset,
        target: usize,
        score_on: Option<&Dataset>,
    ) -> Result<Elimination> {
        let n_total = data.n_features();
        let mut support = vec![true; n_total];
        let mut ranking = vec![1; n_total];
        let mut scores = Vec::new();

        loop {
            let kept: Vec<usize> = (0..n_total).filter(|&f| support[f]).collect();
            let train = data.select_feature_indices(&kept)?;
            let mut model = self.spec.build()?;
            model.fit(train.features(), train.targets())?;

            if let Some(test) = score_on {
                let test = test.select_feature_indices(&kept)?;
                let score = self.scorer.score(&model, &ScoringSet::from_dataset(&test))?;
                debug!(features = kept.len(), score, "elimination round");
                scores.push((kept.len(), score));
            }

            if kept.len() <= target {
                return Ok(Elimination {
                    support,
                    ranking,
                    scores,
                    estimator: model,
                });
            }

            let importances = model
                .feature_importances()
                .ok_or_else(|| anyhow!("{} does not report feature importances", model.name()))?;
            let mut order: Vec<usize> = (0..kept.len()).collect();
            order.sort_by(|&a, &b| importances[a].total_cmp(&importances[b]));
            let drop = self.step.min(kept.len() - target);
            for &position in &order[..drop] {
                support[kept[position]] = false;
            }
            for f in 0..n_total {
                if !support[f] {
                    ranking[f] += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use smmpredict_data::Mnk;
    use smmpredict_models::{Hyperparameters, ModelKind};

    /// Target depends on the first two of eight features.
    fn data() -> Dataset {
        let n = 160;
        let features = Array2::from_shape_fn((n, 8), |(i, j)| match j {
            0 => (i % 8) as f64,
            1 => ((i / 8) % 5) as f64,
            _ => ((i * (j + 5) + 3 * j) % 13) as f64,
        });
        let targets = Array1::from_shape_fn(n, |i| 3.0 * (i % 8) as f64 + ((i / 8) % 5) as f64);
        let groups = (0..n).map(|i| Mnk::new(i / 16 + 1, 1, 1)).collect();
        let names = (0..8).map(|j| format!("f{j}")).collect();
        Dataset::new(names, features, targets, groups).unwrap()
    }

    fn rfecv(step: usize, min_features: usize) -> Rfecv {
        let mut hp = Hyperparameters::default();
        hp.max_depth = 8;
        let spec = ModelSpec::new(ModelKind::DecisionTree, hp, 7);
        let settings = RfeSettings {
            step,
            min_features_to_select: min_features,
            scorer: Box::new(NegMeanAbsoluteError),
        };
        Rfecv::new(spec, settings, GroupShuffleSplit::new(3, 0.3).with_seed(2))
    }

    #[test]
    fn test_support_matches_selected_count() {
        let outcome = rfecv(1, 2).fit(&data()).unwrap();
        let report = &outcome.report;
        assert_eq!(report.feature_counts, (2..=8).collect::<Vec<_>>());
        assert_eq!(report.mean_scores.len(), report.feature_counts.len());
        assert_eq!(report.support.iter().filter(|s| **s).count(), report.n_features);
        assert_eq!(report.selected_features().len(), report.n_features);
        for (keep, rank) in report.support.iter().zip(&report.ranking) {
            assert_eq!(*keep, *rank == 1);
        }
        assert_eq!(report.importances.len(), report.n_features);
        assert!(outcome
            .estimator
            .predict(data().retain_features(&report.selected_features()).unwrap().features())
            .is_ok());
    }

    #[test]
    fn test_informative_features_survive() {
        let outcome = rfecv(1, 2).fit(&data()).unwrap();
        let selected = outcome.report.selected_features();
        assert!(selected.contains(&"f0".to_string()), "selected {selected:?}");
    }

    #[test]
    fn test_last_step_is_clamped_to_minimum() {
        let outcome = rfecv(4, 3).fit(&data()).unwrap();
        assert_eq!(outcome.report.feature_counts, vec![3, 4, 8]);
    }

    #[test]
    fn test_minimum_above_feature_count_keeps_everything() {
        let outcome = rfecv(1, 20).fit(&data()).unwrap();
        assert_eq!(outcome.report.n_features, 8);
        assert!(outcome.report.support.iter().all(|s| *s));
    }

    #[test]
    fn test_class_settings() {
        let small = RfeSettings::for_algorithm(AlgorithmClass::Small);
        assert_eq!((small.step, small.min_features_to_select), (3, 14));
        assert_eq!(small.scorer.name(), "neg_mean_squared_error");
        let tiny = RfeSettings::for_algorithm(AlgorithmClass::Tiny);
        assert_eq!((tiny.step, tiny.min_features_to_select), (1, 5));
        assert_eq!(tiny.scorer.name(), "neg_mean_absolute_error");
    }
}
