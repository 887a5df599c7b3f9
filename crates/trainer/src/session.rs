//! Run folders, run logs and the options that characterise a run.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use smmpredict_data::{AlgorithmClass, PerfType};
use smmpredict_models::ModelKind;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

pub const OPTIONS_FILE: &str = "options.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    pub in_folder: PathBuf,
    pub algo: AlgorithmClass,
    pub perf_type: PerfType,
    pub plot_all: bool,
    pub tune: bool,
    pub model: ModelKind,
    pub splits: usize,
    pub ntrees: usize,
    /// Worker threads; zero or negative uses every core.
    pub njobs: i64,
    pub nrows: Option<usize>,
    pub prefitted_model: Option<PathBuf>,
    pub seed: Option<u64>,
    pub presets: Option<PathBuf>,
    pub output_root: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            in_folder: PathBuf::from("tune_dataset"),
            algo: AlgorithmClass::Medium,
            perf_type: PerfType::PerfScaled,
            plot_all: false,
            tune: false,
            model: ModelKind::DecisionTree,
            splits: 5,
            ntrees: 3,
            njobs: -1,
            nrows: None,
            prefitted_model: None,
            seed: None,
            presets: None,
            output_root: PathBuf::from("model_selection"),
        }
    }
}

impl RunOptions {
    /// Take over the options that determine how a saved model was produced.
    pub fn adopt_characteristic(&mut self, saved: &RunOptions) {
        self.in_folder = saved.in_folder.clone();
        self.algo = saved.algo;
        self.perf_type = saved.perf_type;
        self.tune = saved.tune;
        self.model = saved.model;
        self.splits = saved.splits;
        self.ntrees = saved.ntrees;
        self.njobs = saved.njobs;
        self.nrows = saved.nrows;
    }

    pub fn num_threads(&self) -> usize {
        usize::try_from(self.njobs).unwrap_or(0)
    }
}

/// Where the artifacts and the log of one run go.
#[derive(Debug, Clone)]
pub struct RunSession {
    folder: PathBuf,
    log_file: PathBuf,
    prefitted: bool,
}

impl RunSession {
    /// A fresh `<output_root>/<algo>/<unix-millis>/` folder when training,
    /// or the pre-fitted model's folder with a new timestamped log file.
    pub fn create(options: &RunOptions) -> Result<Self> {
        let signature = unix_millis();
        match &options.prefitted_model {
            None => {
                let folder = fresh_folder(&options.output_root.join(options.algo.as_str()), signature)?;
                Ok(Self {
                    log_file: folder.join("log.txt"),
                    folder,
                    prefitted: false,
                })
            }
            Some(folder) => {
                if !folder.is_dir() {
                    bail!("pre-fitted model folder {} does not exist", folder.display());
                }
                Ok(Self {
                    log_file: folder.join(format!("log_{signature}.txt")),
                    folder: folder.clone(),
                    prefitted: true,
                })
            }
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn is_prefitted(&self) -> bool {
        self.prefitted
    }

    pub fn open_log(&self) -> Result<File> {
        File::create(&self.log_file)
            .with_context(|| format!("creating log file {}", self.log_file.display()))
    }

    /// Dump the options of a training run, or reload the characteristic
    /// options of the pre-fitted model being evaluated.
    pub fn resolve_options(&self, mut options: RunOptions) -> Result<RunOptions> {
        let path = self.folder.join(OPTIONS_FILE);
        if self.prefitted {
            info!(path = %path.display(), "reading options");
            let blob = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let saved: RunOptions = serde_json::from_str(&blob)
                .with_context(|| format!("parsing {}", path.display()))?;
            options.adopt_characteristic(&saved);
        } else {
            info!(path = %path.display(), "dumping options");
            fs::write(&path, serde_json::to_vec_pretty(&options)?)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        Ok(options)
    }
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis()
}

/// Create `<parent>/<stamp>`, bumping the stamp while the name is taken.
fn fresh_folder(parent: &Path, mut stamp: u128) -> Result<PathBuf> {
    fs::create_dir_all(parent)
        .with_context(|| format!("creating run folder parent {}", parent.display()))?;
    loop {
        let folder = parent.join(stamp.to_string());
        match fs::create_dir(&folder) {
            Ok(()) => return Ok(folder),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => stamp += 1,
            Err(err) => {
                return Err(err).with_context(|| format!("creating run folder {}", folder.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_run_gets_fresh_folder() {
        let root = tempfile::tempdir().unwrap();
        let options = RunOptions {
            output_root: root.path().to_path_buf(),
            algo: AlgorithmClass::Tiny,
            ..RunOptions::default()
        };
        let session = RunSession::create(&options).unwrap();
        assert!(session.folder().starts_with(root.path().join("tiny")));
        assert!(session.folder().is_dir());
        assert_eq!(session.log_file(), session.folder().join("log.txt"));
        assert!(!session.is_prefitted());
    }

    #[test]
    fn test_back_to_back_runs_get_distinct_folders() {
        let root = tempfile::tempdir().unwrap();
        let options = RunOptions {
            output_root: root.path().to_path_buf(),
            algo: AlgorithmClass::Small,
            ..RunOptions::default()
        };
        let first = RunSession::create(&options).unwrap();
        let second = RunSession::create(&options).unwrap();
        assert_ne!(first.folder(), second.folder());
        assert!(first.folder().is_dir());
        assert!(second.folder().is_dir());
    }

    #[test]
    fn test_taken_stamp_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("1000")).unwrap();
        let folder = fresh_folder(root.path(), 1000).unwrap();
        assert_eq!(folder, root.path().join("1001"));
    }

    #[test]
    fn test_options_round_trip_through_prefitted_folder() {
        let root = tempfile::tempdir().unwrap();
        let trained = RunOptions {
            output_root: root.path().to_path_buf(),
            algo: AlgorithmClass::LargeDb2,
            perf_type: PerfType::Perf,
            model: ModelKind::RandomForest,
            splits: 3,
            nrows: Some(1000),
            ..RunOptions::default()
        };
        let session = RunSession::create(&trained).unwrap();
        session.resolve_options(trained.clone()).unwrap();

        let evaluating = RunOptions {
            prefitted_model: Some(session.folder().to_path_buf()),
            plot_all: true,
            ..RunOptions::default()
        };
        let reuse = RunSession::create(&evaluating).unwrap();
        assert!(reuse.is_prefitted());
        assert!(reuse
            .log_file()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("log_"));

        let resolved = reuse.resolve_options(evaluating).unwrap();
        assert_eq!(resolved.algo, AlgorithmClass::LargeDb2);
        assert_eq!(resolved.perf_type, PerfType::Perf);
        assert_eq!(resolved.model, ModelKind::RandomForest);
        assert_eq!(resolved.splits, 3);
        assert_eq!(resolved.nrows, Some(1000));
        assert!(resolved.plot_all, "non-characteristic options are kept");
    }

    #[test]
    fn test_missing_prefitted_folder() {
        let options = RunOptions {
            prefitted_model: Some(PathBuf::from("/definitely/not/here")),
            ..RunOptions::default()
        };
        assert!(RunSession::create(&options).is_err());
    }

    #[test]
    fn test_thread_count() {
        let mut options = RunOptions::default();
        assert_eq!(options.num_threads(), 0);
        options.njobs = 4;
        assert_eq!(options.num_threads(), 4);
    }
}
