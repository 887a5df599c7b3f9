//! Evaluation of a fitted predictor on its training and test sets.
//!
//! The report is written as JSON next to the model. It carries the top-1
//! losses, the loss histogram of the test groups, prediction-accuracy series
//! and the performance the predicted parameters would deliver per mnk,
//! compared with the baseline and the autotuned maximum.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use smmpredict_data::{AlgorithmClass, Dataset, Mnk, PerfByMnk, PerfType, ReferencePerformances};
use smmpredict_metrics::{perf_loss, scale_back, Histogram, LossSummary};
use smmpredict_models::{Model, ModelKind, Regressor};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

pub const TOP_K: usize = 1;
pub const HISTOGRAM_BINS: usize = 100;

/// How rows and mnks were divided between training and testing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_groups: usize,
    pub test_groups: usize,
    /// Row count per `m*n*k` product.
    pub train_products: BTreeMap<u64, usize>,
    pub test_products: BTreeMap<u64, usize>,
}

impl PartitionSummary {
    pub fn new(train: &Dataset, test: &Dataset) -> Self {
        Self {
            train_rows: train.len(),
            test_rows: test.len(),
            train_groups: train.distinct_groups().len(),
            test_groups: test.distinct_groups().len(),
            train_products: product_counts(train),
            test_products: product_counts(test),
        }
    }

    pub fn log(&self) {
        info!(rows = self.train_rows, mnks = self.train_groups, "training set");
        info!(rows = self.test_rows, mnks = self.test_groups, "test set");
    }
}

fn product_counts(data: &Dataset) -> BTreeMap<u64, usize> {
    let mut counts = BTreeMap::new();
    for mnk in data.groups() {
        *counts.entry(mnk.product()).or_insert(0) += 1;
    }
    counts
}

/// True against predicted performance of every configuration of one mnk,
/// on the target's axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracySeries {
    pub mnk: Mnk,
    pub y_true: Vec<f64>,
    pub y_pred: Vec<f64>,
    pub baseline: Option<f64>,
    pub max: Option<f64>,
}

/// Performance delivered per mnk by the top-1 predicted configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChosenPerformances {
    /// Gflop/s.
    pub absolute: PerfByMnk,
    /// Fraction of the per-class maximum.
    pub scaled: PerfByMnk,
}

/// `model - reference` per mnk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    pub absolute: PerfByMnk,
    pub scaled: PerfByMnk,
}

impl Gains {
    pub fn mean_absolute(&self) -> Option<f64> {
        mean(&self.absolute)
    }

    pub fn mean_scaled(&self) -> Option<f64> {
        mean(&self.scaled)
    }
}

fn mean(values: &PerfByMnk) -> Option<f64> {
    (!values.is_empty()).then(|| values.values().sum::<f64>() / values.len() as f64)
}

/// Gain of `model` over `reference` for every mnk known to both.
pub fn performance_gain(reference: &PerfByMnk, model: &PerfByMnk) -> PerfByMnk {
    model
        .iter()
        .filter_map(|(mnk, perf)| reference.get(mnk).map(|base| (*mnk, perf - base)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetEvaluation {
    pub rows: usize,
    pub losses: LossSummary,
    /// Losses recomputed on Gflop/s, for scaled targets.
    pub losses_gflops: Option<LossSummary>,
    pub chosen: ChosenPerformances,
    pub gain_over_baseline: Gains,
    pub gain_over_max: Gains,
    pub accuracy: Vec<AccuracySeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub algo: AlgorithmClass,
    pub perf_type: PerfType,
    pub model: ModelKind,
    pub generated_at_unix_ms: u128,
    pub features: Vec<String>,
    pub partition: PartitionSummary,
    pub train: SetEvaluation,
    pub test: SetEvaluation,
    /// Unscaled top-1 losses of the test mnks.
    pub test_loss_histogram: Histogram,
    /// Autotuned maximum against the baseline.
    pub max_over_baseline: Gains,
}

pub struct Evaluator<'a> {
    refs: &'a ReferencePerformances,
    algo: AlgorithmClass,
    perf_type: PerfType,
    all_groups: bool,
    seed: u64,
}

impl<'a> Evaluator<'a> {
    pub fn new(refs: &'a ReferencePerformances, algo: AlgorithmClass, perf_type: PerfType) -> Self {
        Self {
            refs,
            algo,
            perf_type,
            all_groups: false,
            seed: 0,
        }
    }

    /// Emit accuracy series for every mnk instead of one sampled mnk per set.
    pub fn with_all_groups(mut self, all_groups: bool) -> Self {
        self.all_groups = all_groups;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn evaluate(
        &self,
        model: &Model,
        train: &Dataset,
        test: &Dataset,
    ) -> Result<EvaluationReport> {
        let mut rng = fastrand::Rng::with_seed(self.seed);

        let train_pred = model.predict(train.features())?.to_vec();
        let test_pred = model.predict(test.features())?.to_vec();

        info!("evaluating on the training set");
        let train_eval = self.evaluate_set(train, &train_pred, &mut rng)?;
        info!("evaluating on the test set");
        let test_eval = self.evaluate_set(test, &test_pred, &mut rng)?;

        let unscaled = perf_loss(&test.targets().to_vec(), &test_pred, TOP_K, test.groups(), false)?;
        let test_loss_histogram = Histogram::new(&unscaled, HISTOGRAM_BINS)?;

        let max_over_baseline = Gains {
            absolute: performance_gain(&self.refs.baseline_by_algo, &self.refs.max_by_algo),
            scaled: performance_gain(&self.refs.baseline_scaled(), &self.refs.max_by_algo_scaled()),
        };
        if let Some(gain) = max_over_baseline.mean_absolute() {
            info!(mean_gflops = gain, "autotuned maximum over baseline");
        }

        Ok(EvaluationReport {
            algo: self.algo,
            perf_type: self.perf_type,
            model: model.kind(),
            generated_at_unix_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0),
            features: train.feature_names().to_vec(),
            partition: PartitionSummary::new(train, test),
            train: train_eval,
            test: test_eval,
            test_loss_histogram,
            max_over_baseline,
        })
    }

    fn evaluate_set(
        &self,
        data: &Dataset,
        y_pred: &[f64],
        rng: &mut fastrand::Rng,
    ) -> Result<SetEvaluation> {
        let y_true = data.targets().to_vec();
        let groups = data.groups();

        let losses = LossSummary::compute(&y_true, y_pred, TOP_K, groups, self.perf_type.is_scaled())?;
        info!(
            top_k = TOP_K,
            worst = losses.worst,
            mean = losses.mean,
            "performance loss [%]"
        );

        let losses_gflops = match self.refs.scaling_reference(self.perf_type) {
            Some(reference) => {
                let true_gflops = scale_back(&y_true, groups, reference)?;
                let pred_gflops = scale_back(y_pred, groups, reference)?;
                let summary = LossSummary::compute(&true_gflops, &pred_gflops, TOP_K, groups, false)?;
                info!(
                    worst = summary.worst,
                    mean = summary.mean,
                    "performance loss on Gflop/s [%]"
                );
                Some(summary)
            }
            None => None,
        };

        let chosen = self.chosen_performances(data, y_pred)?;
        let gain_over_baseline = Gains {
            absolute: performance_gain(&self.refs.baseline_by_algo, &chosen.absolute),
            scaled: performance_gain(&self.refs.baseline_scaled(), &chosen.scaled),
        };
        let gain_over_max = Gains {
            absolute: performance_gain(&self.refs.max_by_algo, &chosen.absolute),
            scaled: performance_gain(&self.refs.max_by_algo_scaled(), &chosen.scaled),
        };
        if let (Some(absolute), Some(scaled)) =
            (gain_over_baseline.mean_absolute(), gain_over_baseline.mean_scaled())
        {
            info!(mean_gflops = absolute, mean_scaled = scaled, "gain over baseline");
        }
        if let (Some(absolute), Some(scaled)) =
            (gain_over_max.mean_absolute(), gain_over_max.mean_scaled())
        {
            info!(mean_gflops = absolute, mean_scaled = scaled, "gain over autotuned maximum");
        }

        let distinct = data.distinct_groups();
        let sampled: Vec<Mnk> = if self.all_groups || distinct.is_empty() {
            distinct
        } else {
            vec![distinct[rng.usize(..distinct.len())]]
        };
        let members = data.group_indices();
        let accuracy = sampled
            .into_iter()
            .filter_map(|mnk| members.get(&mnk).map(|rows| (mnk, rows)))
            .map(|(mnk, rows)| AccuracySeries {
                mnk,
                y_true: rows.iter().map(|&r| y_true[r]).collect(),
                y_pred: rows.iter().map(|&r| y_pred[r]).collect(),
                baseline: self.on_target_axis(mnk, self.refs.baseline_by_algo.get(&mnk).copied()),
                max: self.on_target_axis(mnk, self.refs.max_by_algo.get(&mnk).copied()),
            })
            .collect();

        Ok(SetEvaluation {
            rows: data.len(),
            losses,
            losses_gflops,
            chosen,
            gain_over_baseline,
            gain_over_max,
            accuracy,
        })
    }

    /// True target of the highest prediction in each mnk, in Gflop/s and as
    /// a fraction of the per-class maximum.
    fn chosen_performances(&self, data: &Dataset, y_pred: &[f64]) -> Result<ChosenPerformances> {
        let y_true = data.targets();
        let mut chosen = ChosenPerformances::default();
        for (mnk, rows) in data.group_indices() {
            let mut best = rows[0];
            for &row in &rows[1..] {
                if y_pred[row] > y_pred[best] {
                    best = row;
                }
            }
            let target = y_true[best];
            let max_by_algo = || lookup(&self.refs.max_by_algo, mnk, "per-class maximum");
            let absolute = match self.perf_type {
                PerfType::Perf => target,
                PerfType::PerfSquared => target.max(0.0).sqrt(),
                PerfType::PerfScaled => target * lookup(&self.refs.max_overall, mnk, "maximum")?,
                PerfType::PerfScaledByAlgo => target * max_by_algo()?,
            };
            let scaled = match self.perf_type {
                PerfType::PerfScaledByAlgo => target,
                _ => absolute / max_by_algo()?,
            };
            chosen.absolute.insert(mnk, absolute);
            chosen.scaled.insert(mnk, scaled);
        }
        Ok(chosen)
    }

    fn on_target_axis(&self, mnk: Mnk, gflops: Option<f64>) -> Option<f64> {
        let gflops = gflops?;
        match self.perf_type {
            PerfType::Perf => Some(gflops),
            PerfType::PerfSquared => Some(gflops * gflops),
            PerfType::PerfScaled => self.refs.max_overall.get(&mnk).map(|max| gflops / max),
            PerfType::PerfScaledByAlgo => self.refs.max_by_algo.get(&mnk).map(|max| gflops / max),
        }
    }
}

fn lookup(values: &PerfByMnk, mnk: Mnk, what: &str) -> Result<f64> {
    values
        .get(&mnk)
        .copied()
        .filter(|v| *v > 0.0)
        .ok_or_else(|| anyhow!("no positive {what} recorded for {mnk}"))
}
