//! Command-line entry point: `predict-train`.

use anyhow::Result;
use clap::Parser;
use smmpredict_trainer::{run_cli, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    run_cli(cli)
}
