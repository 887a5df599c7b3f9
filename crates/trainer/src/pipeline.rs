//! Training pipeline: partition, optional tuning, fitting and evaluation.

use crate::artifacts::{self, ModelArtifact};
use crate::eval::{EvaluationReport, Evaluator, PartitionSummary};
use crate::session::{RunOptions, RunSession};
use anyhow::{anyhow, ensure, Result};
use smmpredict_data::{Dataset, ReferencePerformances};
use smmpredict_models::{AlgorithmPresets, Model, ModelSpec, ParamGrid, Regressor};
use smmpredict_selection::{scorer_by_name, GridSearch, GroupShuffleSplit, RfeSettings, Rfecv};
use std::path::PathBuf;
use tracing::{info, warn};

/// Fraction of mnks held out from training.
pub const OUTER_TEST_SIZE: f64 = 0.2;
/// Fraction of the training mnks held out in every cross-validation split.
pub const CV_TEST_SIZE: f64 = 0.3;
pub const DECISIVE_SCORER: &str = "mean_top-1";
pub const SEARCH_SCORERS: [&str; 2] = ["worse_top-1", DECISIVE_SCORER];

/// A fitted model with the partition it was fitted and is evaluated on.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub artifact: ModelArtifact,
    pub train: Dataset,
    pub test: Dataset,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub folder: PathBuf,
    pub seed: u64,
    pub artifact: ModelArtifact,
    pub report: EvaluationReport,
}

pub struct TrainingPipeline<'a> {
    options: &'a RunOptions,
    session: &'a RunSession,
    seed: u64,
}

impl<'a> TrainingPipeline<'a> {
    pub fn new(options: &'a RunOptions, session: &'a RunSession) -> Self {
        let seed = options.seed.unwrap_or_else(|| fastrand::u64(..));
        Self {
            options,
            session,
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Run on a dedicated thread pool sized by `njobs`.
    pub fn run(&self) -> Result<RunOutcome> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.num_threads())
            .build()?;
        info!(threads = pool.current_num_threads(), seed = self.seed, "starting run");
        pool.install(|| self.run_in_pool())
    }

    fn run_in_pool(&self) -> Result<RunOutcome> {
        let options = self.options;
        let data = Dataset::load(&options.in_folder, options.algo, options.nrows, options.perf_type)?;
        let refs = ReferencePerformances::load(&options.in_folder, options.algo)?;

        let trained = if self.session.is_prefitted() {
            self.load_prefitted(&data)?
        } else {
            self.train(&data)?
        };

        let report = Evaluator::new(&refs, options.algo, options.perf_type)
            .with_all_groups(options.plot_all)
            .with_seed(self.seed.wrapping_add(2))
            .evaluate(&trained.artifact.model, &trained.train, &trained.test)?;
        artifacts::write_json(&self.session.folder().join(artifacts::EVALUATION_FILE), &report)?;

        Ok(RunOutcome {
            folder: self.session.folder().to_path_buf(),
            seed: self.seed,
            artifact: trained.artifact,
            report,
        })
    }

    pub fn train(&self, data: &Dataset) -> Result<TrainedModel> {
        let options = self.options;
        let splits = GroupShuffleSplit::new(2, OUTER_TEST_SIZE)
            .with_seed(self.seed)
            .split(data.groups())?;
        let outer = splits
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("outer split produced no partition"))?;
        let train = data.select_rows(&outer.train)?;
        let test = data.select_rows(&outer.test)?;
        PartitionSummary::new(&train, &test).log();

        let presets = match &options.presets {
            Some(path) => AlgorithmPresets::load_from_file(path)?,
            None => AlgorithmPresets::builtin(),
        };
        let preset = presets.get(options.algo)?;
        let mut hyperparameters = preset.hyperparameters;
        hyperparameters.n_estimators = options.ntrees;
        let spec = ModelSpec::new(options.model, hyperparameters, self.seed);

        let (train, model) = if options.tune {
            self.tune(&train, spec)?
        } else {
            let train = train.retain_features(&preset.features)?;
            if train.n_features() < preset.features.len() {
                warn!(
                    expected = preset.features.len(),
                    found = train.n_features(),
                    "some preset features are missing from the data"
                );
            }
            info!(
                model = options.model.long_name(),
                features = train.n_features(),
                "fitting with preset hyperparameters"
            );
            let mut model = spec.build()?;
            model.fit(train.features(), train.targets())?;
            (train, model)
        };
        let test = test.retain_features(train.feature_names())?;

        let artifact = ModelArtifact {
            features: train.feature_names().to_vec(),
            model,
            test_indices: outer.test,
        };
        artifact.save_to_file(&self.session.folder().join(artifacts::MODEL_FILE))?;
        Ok(TrainedModel {
            artifact,
            train,
            test,
        })
    }

    /// Feature elimination followed by a hyperparameter grid search, both
    /// cross-validated over mnk groups of the training set.
    fn tune(&self, train: &Dataset, spec: ModelSpec) -> Result<(Dataset, Model)> {
        let options = self.options;
        let cv = GroupShuffleSplit::new(options.splits, CV_TEST_SIZE)
            .with_seed(self.seed.wrapping_add(1));
        let grid = ParamGrid::for_model(options.model, options.algo, train.n_features());

        let rfecv = Rfecv::new(spec.clone(), RfeSettings::for_algorithm(options.algo), cv.clone())
            .fit(train)?;
        artifacts::write_json(&self.session.folder().join(artifacts::RFECV_FILE), &rfecv.report)?;
        let selected = rfecv.report.selected_features();
        info!(features = ?selected, "selected features");
        let train = train.retain_features(&selected)?;

        let scorers = SEARCH_SCORERS
            .iter()
            .map(|name| scorer_by_name(name, options.perf_type.is_scaled()))
            .collect::<Result<Vec<_>>>()?;
        let search = GridSearch::new(spec, grid, cv, scorers, DECISIVE_SCORER).fit(&train)?;
        artifacts::write_json(
            &self.session.folder().join(artifacts::CV_RESULTS_FILE),
            &search.cv_results,
        )?;
        info!(
            params = ?search.cv_results.best_params,
            score = search.cv_results.best_score(),
            "tuned hyperparameters"
        );
        Ok((train, search.best_model))
    }

    /// Reuse the model and partition saved in the session folder.
    pub fn load_prefitted(&self, data: &Dataset) -> Result<TrainedModel> {
        let path = self.session.folder().join(artifacts::MODEL_FILE);
        info!(path = %path.display(), "loading pre-fitted model");
        let artifact = ModelArtifact::load_from_file(&path)?;

        let train_rows = complement(data.len(), &artifact.test_indices)?;
        ensure!(
            artifact.test_indices.len() < train_rows.len(),
            "test set ({} rows) must be smaller than the training set ({} rows)",
            artifact.test_indices.len(),
            train_rows.len()
        );
        let train = data.select_rows(&train_rows)?.retain_features(&artifact.features)?;
        let test = data
            .select_rows(&artifact.test_indices)?
            .retain_features(&artifact.features)?;
        ensure!(
            train.n_features() == artifact.features.len(),
            "data lacks features the model was trained on"
        );
        PartitionSummary::new(&train, &test).log();

        Ok(TrainedModel {
            artifact,
            train,
            test,
        })
    }
}

/// Ascending row indices in `0..n` not listed in `excluded`.
fn complement(n: usize, excluded: &[usize]) -> Result<Vec<usize>> {
    let mut keep = vec![true; n];
    for &row in excluded {
        ensure!(row < n, "row index {row} out of range for {n} rows");
        keep[row] = false;
    }
    Ok((0..n).filter(|&row| keep[row]).collect())
}
