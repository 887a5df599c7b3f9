//! Per-algorithm presets: the feature subset and hyperparameters that earlier
//! tuning runs settled on.

use crate::hyperparams::Hyperparameters;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use smmpredict_data::AlgorithmClass;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmPreset {
    pub features: Vec<String>,
    pub hyperparameters: Hyperparameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmPresets {
    presets: BTreeMap<AlgorithmClass, AlgorithmPreset>,
}

impl Default for AlgorithmPresets {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AlgorithmPresets {
    pub fn builtin() -> Self {
        let mut presets = BTreeMap::new();
        for algo in AlgorithmClass::ALL {
            let (features, (max_depth, min_samples_leaf, min_samples_split)) = builtin_preset(algo);
            presets.insert(
                algo,
                AlgorithmPreset {
                    features: features.iter().map(|f| f.to_string()).collect(),
                    hyperparameters: Hyperparameters {
                        max_depth,
                        min_samples_split,
                        min_samples_leaf,
                        ..Hyperparameters::default()
                    },
                },
            );
        }
        Self { presets }
    }

    pub fn get(&self, algo: AlgorithmClass) -> Result<&AlgorithmPreset> {
        self.presets
            .get(&algo)
            .ok_or_else(|| anyhow!("no preset for algorithm {algo}"))
    }

    pub fn insert(&mut self, algo: AlgorithmClass, preset: AlgorithmPreset) {
        self.presets.insert(algo, preset);
    }

    /// Built-in presets overridden by the entries of a JSON file. Keys must
    /// name an algorithm class.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path).with_context(|| format!("reading presets {}", path.display()))?;
        let overrides: BTreeMap<AlgorithmClass, AlgorithmPreset> = serde_json::from_slice(&data)
            .with_context(|| format!("parsing presets {}", path.display()))?;
        let mut presets = Self::builtin();
        for (algo, preset) in overrides {
            if let Err(reason) = preset.hyperparameters.validate() {
                return Err(anyhow!("preset for {algo} in {}: {reason}", path.display()));
            }
            presets.insert(algo, preset);
        }
        Ok(presets)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let blob = serde_json::to_vec_pretty(&self.presets)?;
        fs::write(path, blob)?;
        Ok(())
    }
}

/// Selected features and (max_depth, min_samples_leaf, min_samples_split).
fn builtin_preset(algo: AlgorithmClass) -> (&'static [&'static str], (usize, usize, usize)) {
    match algo {
        AlgorithmClass::Tiny => (
            &[
                "nblks",
                "ru_tinysmallmed_unroll_factor_c_total",
                "ru_tiny_smem_per_block",
                "Gflops",
                "size_a",
                "size_c",
                "threads_per_blk",
                "ru_tiny_max_parallel_work",
                "ru_tinysmallmed_unroll_factor_a_total",
                "ru_tiny_buf_size",
            ],
            (39, 8, 11),
        ),
        AlgorithmClass::Small => (
            &[
                "grouping",
                "k",
                "m",
                "minblocks",
                "threads_per_blk",
                "nthreads",
                "Gflops",
                "ru_tinysmallmed_unroll_factor_b",
                "ru_smallmedlarge_cmax",
                "ru_smallmedlarge_T",
                "ru_smallmedlarge_min_threads",
                "ru_smallmed_buf_size",
                "Koth_small_Nmem_shared",
            ],
            (18, 2, 13),
        ),
        AlgorithmClass::Medium => (
            &[
                "k",
                "m",
                "n",
                "minblocks",
                "threads_per_blk",
                "tile_m",
                "tile_n",
                "size_a",
                "size_c",
                "nthreads",
                "sm_desired",
                "nblocks_per_sm_lim_blks_warps",
                "Gflops",
                "ru_tinysmallmed_unroll_factor_a",
                "ru_tinysmallmed_unroll_factor_b",
                "ru_tinysmallmed_unroll_factor_c_total",
                "ru_smallmedlarge_cmax",
                "ru_smallmedlarge_rmax",
                "ru_smallmedlarge_T",
                "ru_smallmedlarge_min_threads",
                "ru_smallmed_unroll_factor_c",
                "ru_smallmed_loop_matmul",
                "ru_smallmed_max_parallel_work",
                "ru_smallmed_regs_per_thread",
            ],
            (18, 2, 13),
        ),
        AlgorithmClass::LargeDb1 => (
            &[
                "size_b",
                "minblocks",
                "tile_n",
                "ru_large_Pc",
                "size_c",
                "size_a",
                "Koth_large_Nmem_glob",
                "nblocks_per_sm_lim_blks_warps",
                "ru_smallmedlarge_cmax",
                "tile_m",
                "m",
                "sm_desired",
                "ru_large_Pa",
                "ru_large_loop_matmul",
                "ru_smallmedlarge_rmax",
                "w",
                "ru_large_unroll_factor_b",
                "threads_per_blk",
                "ru_large_unroll_factor_a",
                "ru_large_Pb",
                "k",
                "Gflops",
            ],
            (18, 13, 5),
        ),
        AlgorithmClass::LargeDb2 => (
            &[
                "size_a",
                "size_b",
                "tile_m",
                "sm_desired",
                "ru_smallmedlarge_rmax",
                "ru_large_loop_matmul",
                "m",
                "Koth_large_Nmem_glob",
                "ru_large_unroll_factor_b",
                "tile_n",
                "w",
                "ru_large_Pc",
                "k",
                "ru_smallmedlarge_cmax",
                "ru_large_Pa",
                "ru_large_unroll_factor_a",
                "size_c",
                "threads_per_blk",
            ],
            (18, 5, 5),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_every_class() {
        let presets = AlgorithmPresets::builtin();
        for algo in AlgorithmClass::ALL {
            let preset = presets.get(algo).unwrap();
            assert!(!preset.features.is_empty());
            assert!(preset.hyperparameters.validate().is_ok());
        }
        let tiny = presets.get(AlgorithmClass::Tiny).unwrap();
        assert_eq!(tiny.hyperparameters.max_depth, 39);
        assert_eq!(tiny.hyperparameters.min_samples_leaf, 8);
        assert_eq!(tiny.hyperparameters.min_samples_split, 11);
        assert_eq!(tiny.features.len(), 10);
        let large = presets.get(AlgorithmClass::LargeDb1).unwrap();
        assert_eq!(large.hyperparameters.min_samples_leaf, 13);
        assert_eq!(large.features.len(), 22);
    }

    #[test]
    fn test_file_overrides_single_class() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        fs::write(
            &path,
            r#"{"small": {"features": ["m", "n"], "hyperparameters": {"max_depth": 4, "min_samples_split": 2, "min_samples_leaf": 1}}}"#,
        )
        .unwrap();
        let presets = AlgorithmPresets::load_from_file(&path).unwrap();
        assert_eq!(presets.get(AlgorithmClass::Small).unwrap().features, vec!["m", "n"]);
        assert_eq!(
            presets.get(AlgorithmClass::Medium).unwrap(),
            AlgorithmPresets::builtin().get(AlgorithmClass::Medium).unwrap()
        );
    }

    #[test]
    fn test_save_then_load_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("presets.json");
        let presets = AlgorithmPresets::builtin();
        presets.save_to_file(&path).unwrap();
        assert_eq!(AlgorithmPresets::load_from_file(&path).unwrap(), presets);
    }

    #[test]
    fn test_misspelled_class_fails_to_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        fs::write(
            &path,
            r#"{"largeDb1": {"features": ["m"], "hyperparameters": {"max_depth": 4, "min_samples_split": 2, "min_samples_leaf": 1}}}"#,
        )
        .unwrap();
        let err = AlgorithmPresets::load_from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("largeDb1"));
    }

    #[test]
    fn test_saved_keys_are_class_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        AlgorithmPresets::builtin().save_to_file(&path).unwrap();
        let saved: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let mut keys: Vec<&str> = saved.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["largeDB1", "largeDB2", "medium", "small", "tiny"]);
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        fs::write(
            &path,
            r#"{"huge": {"features": [], "hyperparameters": {"max_depth": 4, "min_samples_split": 2, "min_samples_leaf": 1}}}"#,
        )
        .unwrap();
        assert!(AlgorithmPresets::load_from_file(&path).is_err());

        fs::write(
            &path,
            r#"{"tiny": {"features": [], "hyperparameters": {"max_depth": 0, "min_samples_split": 2, "min_samples_leaf": 1}}}"#,
        )
        .unwrap();
        assert!(AlgorithmPresets::load_from_file(&path).is_err());
    }
}
