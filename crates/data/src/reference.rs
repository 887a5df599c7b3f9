//! Autotuned maxima and baseline performances per mnk.

use crate::mnk::{AlgorithmClass, Mnk, PerfType};
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub type PerfByMnk = BTreeMap<Mnk, f64>;

#[derive(Debug, Clone, Default)]
pub struct ReferencePerformances {
    /// Best measured Gflop/s per mnk over all algorithms.
    pub max_overall: PerfByMnk,
    /// Best measured Gflop/s per mnk within the trained algorithm.
    pub max_by_algo: PerfByMnk,
    /// Gflop/s of the untuned default parameters within the trained algorithm.
    pub baseline_by_algo: PerfByMnk,
}

impl ReferencePerformances {
    pub fn load(in_folder: &Path, algo: AlgorithmClass) -> Result<Self> {
        let max_overall: PerfByMnk = read_json(&in_folder.join("max_performances.json"))?;
        let max_by_algo = for_algo(
            read_json(&in_folder.join("max_performances_by_algo.json"))?,
            algo,
            "max_performances_by_algo.json",
        )?;
        let baseline_by_algo = for_algo(
            read_json(&in_folder.join("baseline_performances_by_algo.json"))?,
            algo,
            "baseline_performances_by_algo.json",
        )?;
        Ok(Self {
            max_overall,
            max_by_algo,
            baseline_by_algo,
        })
    }

    /// Maxima the target was scaled by, if the target is scaled.
    pub fn scaling_reference(&self, perf_type: PerfType) -> Option<&PerfByMnk> {
        match perf_type {
            PerfType::PerfScaled => Some(&self.max_overall),
            PerfType::PerfScaledByAlgo => Some(&self.max_by_algo),
            PerfType::Perf | PerfType::PerfSquared => None,
        }
    }

    /// Baseline divided by the per-algorithm maximum, for mnks present in both.
    pub fn baseline_scaled(&self) -> PerfByMnk {
        self.baseline_by_algo
            .iter()
            .filter_map(|(mnk, baseline)| {
                self.max_by_algo
                    .get(mnk)
                    .filter(|max| **max > 0.0)
                    .map(|max| (*mnk, baseline / max))
            })
            .collect()
    }

    /// Per-algorithm maxima on the scaled axis, i.e. 1.0 everywhere.
    pub fn max_by_algo_scaled(&self) -> PerfByMnk {
        self.max_by_algo.keys().map(|mnk| (*mnk, 1.0)).collect()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let blob = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&blob).with_context(|| format!("parsing {}", path.display()))
}

fn for_algo(
    mut by_algo: BTreeMap<String, PerfByMnk>,
    algo: AlgorithmClass,
    file: &str,
) -> Result<PerfByMnk> {
    by_algo
        .remove(algo.as_str())
        .ok_or_else(|| anyhow!("{file} has no entry for algorithm {algo}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_fixture(dir: &Path) {
        fs::write(
            dir.join("max_performances.json"),
            r#"{"2x2x2": 100.0, "4x4x4": 400.0}"#,
        )
        .unwrap();
        fs::write(
            dir.join("max_performances_by_algo.json"),
            r#"{"tiny": {"2x2x2": 80.0, "4x4x4": 200.0}, "small": {"2x2x2": 90.0}}"#,
        )
        .unwrap();
        fs::write(
            dir.join("baseline_performances_by_algo.json"),
            r#"{"tiny": {"2x2x2": 40.0, "4x4x4": 50.0}}"#,
        )
        .unwrap();
    }

    #[test]
    fn test_load_selects_algorithm_entries() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let refs = ReferencePerformances::load(dir.path(), AlgorithmClass::Tiny).unwrap();
        assert_eq!(refs.max_by_algo[&Mnk::new(4, 4, 4)], 200.0);
        assert_eq!(refs.baseline_scaled()[&Mnk::new(2, 2, 2)], 0.5);
        assert_eq!(refs.max_by_algo_scaled()[&Mnk::new(4, 4, 4)], 1.0);
        assert!(refs.scaling_reference(PerfType::Perf).is_none());
        assert_eq!(
            refs.scaling_reference(PerfType::PerfScaled).unwrap()[&Mnk::new(2, 2, 2)],
            100.0
        );
    }

    #[test]
    fn test_missing_algorithm_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());
        let err = ReferencePerformances::load(dir.path(), AlgorithmClass::Small).unwrap_err();
        assert!(err.to_string().contains("baseline_performances_by_algo.json"));
    }
}
