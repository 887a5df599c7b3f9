//! CLI wiring for the training driver.

use crate::pipeline::TrainingPipeline;
use crate::session::{RunOptions, RunSession};
use anyhow::Result;
use clap::Parser;
use smmpredict_data::{AlgorithmClass, PerfType};
use smmpredict_models::ModelKind;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "predict-train",
    about = "Train and evaluate predictors of small-matrix-multiplication kernel performance"
)]
pub struct Cli {
    /// Folder holding the training data and reference performances.
    #[arg(short = 'f', long, default_value = "tune_dataset/")]
    pub in_folder: PathBuf,

    /// Algorithm class to train for (tiny, small, medium, largeDB1, largeDB2).
    #[arg(short = 'a', long, default_value = "medium")]
    pub algo: AlgorithmClass,

    /// Regression target (perf, perf_squared, perf_scaled, perf_scaled_by_algo).
    #[arg(short = 'd', long, default_value = "perf_scaled")]
    pub perf_type: PerfType,

    /// Emit accuracy series for every mnk, not only a sampled one.
    #[arg(short = 'c', long)]
    pub plot_all: bool,

    /// Select features and hyperparameters by cross-validation.
    #[arg(short = 't', long)]
    pub tune: bool,

    /// Model to train (DT or RF).
    #[arg(short = 'm', long, default_value = "DT")]
    pub model: ModelKind,

    /// Number of cross-validation splits.
    #[arg(short = 's', long, default_value_t = 5)]
    pub splits: usize,

    /// Number of trees of a random forest.
    #[arg(short = 'e', long, default_value_t = 3)]
    pub ntrees: usize,

    /// Worker threads, -1 for all cores.
    #[arg(short = 'j', long, default_value_t = -1, allow_negative_numbers = true)]
    pub njobs: i64,

    /// Read at most this many rows of each data file.
    #[arg(short = 'r', long)]
    pub nrows: Option<usize>,

    /// Evaluate the model saved in this run folder instead of training.
    #[arg(short = 'g', long)]
    pub prefitted_model: Option<PathBuf>,

    /// Seed for partitioning and model randomness.
    #[arg(long)]
    pub seed: Option<u64>,

    /// JSON file overriding the built-in per-class features and hyperparameters.
    #[arg(long)]
    pub presets: Option<PathBuf>,

    #[arg(long, default_value = "model_selection")]
    pub output_root: PathBuf,
}

impl From<Cli> for RunOptions {
    fn from(cli: Cli) -> Self {
        RunOptions {
            in_folder: cli.in_folder,
            algo: cli.algo,
            perf_type: cli.perf_type,
            plot_all: cli.plot_all,
            tune: cli.tune,
            model: cli.model,
            splits: cli.splits,
            ntrees: cli.ntrees,
            njobs: cli.njobs,
            nrows: cli.nrows,
            prefitted_model: cli.prefitted_model,
            seed: cli.seed,
            presets: cli.presets,
            output_root: cli.output_root,
        }
    }
}

pub fn run_cli(cli: Cli) -> Result<()> {
    let options = RunOptions::from(cli);
    let session = RunSession::create(&options)?;
    init_logging(session.open_log()?);
    info!(folder = %session.folder().display(), "run folder");

    let options = session.resolve_options(options)?;
    let pipeline = TrainingPipeline::new(&options, &session);
    let outcome = pipeline.run()?;

    let test = &outcome.report.test.losses;
    println!(
        "{} {} on {}: test top-{} loss worst {:.2}% mean {:.2}% (seed {})",
        options.model.long_name(),
        options.algo,
        options.perf_type,
        test.top_k,
        test.worst,
        test.mean,
        outcome.seed
    );
    println!("artifacts in {}", outcome.folder.display());
    Ok(())
}

/// Log to stderr and to the run's log file. `RUST_LOG` overrides the
/// default `info` level.
fn init_logging(log_file: File) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr.and(Mutex::new(log_file)))
        .init();
}
