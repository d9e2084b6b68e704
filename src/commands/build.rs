use clap::Args;
use std::path::{Path, PathBuf};

use bob::config;
use bob::logs::BuildLog;
use bob::{BuildConfiguration, Builder, PipelineRun, SystemRunner};

use crate::commands::CmdResult;

#[derive(Args)]
pub struct BuildArgs {
    /// Build configuration file (TOML)
    pub config: PathBuf,
}

pub fn run(args: BuildArgs) -> CmdResult<PipelineRun> {
    let config = load_logged(&args.config)?;
    let log = config.build_log();

    let run = Builder::new(&config, &SystemRunner, &log).run()?;
    Ok((run, 0))
}

/// Load a configuration, recording a failure in the global log it names
/// (or the default one) before returning it.
pub(crate) fn load_logged(path: &Path) -> bob::Result<BuildConfiguration> {
    config::load(path).map_err(|err| {
        BuildLog::new(config::global_log_hint(path)).error(&err);
        if err.code.is_config() {
            err.with_hint(format!("Check the file with: bob plan {}", path.display()))
        } else {
            err
        }
    })
}
