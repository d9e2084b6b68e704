use clap::Args;
use std::path::PathBuf;

use bob::config;
use bob::{BuildPlan, Builder};

use crate::commands::CmdResult;

#[derive(Args)]
pub struct PlanArgs {
    /// Build configuration file (TOML)
    pub config: PathBuf,
}

/// Validate a configuration and show the layout a build would use.
/// Runs no external command and writes no log.
pub fn run(args: PlanArgs) -> CmdResult<BuildPlan> {
    let config = config::load(&args.config)?;
    Ok((Builder::plan(&config), 0))
}
