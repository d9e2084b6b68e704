//! The nightly build pipeline.
//!
//! Stages run in a fixed order and are never retried:
//!
//! 1. refresh: clone when absent, then pull
//! 2. prepare delivery: create the delivery directory
//! 3. prepare build: force the branch, drop local changes
//! 4. pre-build: import the tool environment, clean, bootstrap
//! 5. build: resolve the version, build and verify
//! 6. deliver: locate the artifact and copy it out
//!
//! Git and pre-build failures degrade a stage but let the run continue.
//! Everything else is fatal: it is logged, recorded on the stage report and
//! returned to the caller.

use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;

use crate::artifact;
use crate::config::BuildConfiguration;
use crate::environment::{self, EnvOverrides};
use crate::error::{BuildTargetFailedDetails, Error, Result};
use crate::executor::{CommandResult, CommandRunner, Executor, Invocation};
use crate::git::{self, RepositoryState, Synchronizer};
use crate::logs::BuildLog;
use crate::utils::{io, parser};
use crate::version::{self, VersionDescriptor};

/// Lines of build-tool output carried by a build failure.
const OUTPUT_TAIL_LINES: usize = 15;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Refresh,
    PrepareDelivery,
    PrepareBuild,
    PreBuild,
    Build,
    Deliver,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Refresh,
        Stage::PrepareDelivery,
        Stage::PrepareBuild,
        Stage::PreBuild,
        Stage::Build,
        Stage::Deliver,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Refresh => "refresh",
            Stage::PrepareDelivery => "prepare_delivery",
            Stage::PrepareBuild => "prepare_build",
            Stage::PreBuild => "pre_build",
            Stage::Build => "build",
            Stage::Deliver => "deliver",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    /// Ran with logged, non-fatal failures.
    Degraded,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl StageReport {
    fn new(stage: Stage, messages: Vec<String>) -> Self {
        let status = if messages.is_empty() {
            StageStatus::Success
        } else {
            StageStatus::Degraded
        };
        Self {
            stage,
            status,
            messages,
        }
    }

    fn skipped(stage: Stage, message: &str) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            messages: vec![message.to_string()],
        }
    }

    fn failed(stage: Stage, err: &Error) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            messages: vec![err.message.clone()],
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub pallet: String,
    pub branch: String,
    /// Working tree as observed after refresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    pub stages: Vec<StageReport>,
    pub status: StageStatus,
}

impl PipelineRun {
    fn new(config: &BuildConfiguration) -> Self {
        Self {
            pallet: config.pallet_name.clone(),
            branch: config.branch.clone(),
            repository: None,
            commit: None,
            version: None,
            artifact: None,
            stages: Vec::new(),
            status: StageStatus::Success,
        }
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    fn finish(&mut self) {
        self.status = if self
            .stages
            .iter()
            .any(|r| r.status == StageStatus::Degraded)
        {
            StageStatus::Degraded
        } else {
            StageStatus::Success
        };
    }

    /// `refresh=success prepare_delivery=success ...`
    pub fn summary(&self) -> String {
        self.stages
            .iter()
            .map(|r| format!("{}={:?}", r.stage.as_str(), r.status).to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a run would do, without running anything.
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    pub pallet: String,
    pub branch: String,
    pub clone_url: String,
    pub source_root: PathBuf,
    pub makefile_dir: PathBuf,
    pub version_file: PathBuf,
    pub build_output_dir: PathBuf,
    pub delivery_dir: PathBuf,
    pub build_log: PathBuf,
    pub global_log: PathBuf,
    pub stages: Vec<PlannedStage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedStage {
    pub stage: Stage,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

pub struct Builder<'a> {
    config: &'a BuildConfiguration,
    exec: Executor<'a>,
}

impl<'a> Builder<'a> {
    pub fn new(
        config: &'a BuildConfiguration,
        runner: &'a dyn CommandRunner,
        log: &'a BuildLog,
    ) -> Self {
        Self {
            config,
            exec: Executor::new(runner, log),
        }
    }

    pub fn plan(config: &BuildConfiguration) -> BuildPlan {
        let bootstrap_note = if config.skip.bootstrap {
            "bootstrap skipped".to_string()
        } else {
            format!("bootstrap passes: {}", config.tool.bootstrap_passes)
        };
        let stamp_note = if config.skip.stamp {
            "version not stamped".to_string()
        } else if config.is_default_branch() {
            "version stamped with commit".to_string()
        } else {
            "version stamped with branch and commit".to_string()
        };

        BuildPlan {
            pallet: config.pallet_name.clone(),
            branch: config.branch.clone(),
            clone_url: config.clone_url(),
            source_root: config.source_root(),
            makefile_dir: config.makefile_path(),
            version_file: config.version_file_path(),
            build_output_dir: config.build_output_dir(),
            delivery_dir: config.delivery_dir(),
            build_log: config.build_log_path(),
            global_log: config.global_log.clone(),
            stages: Stage::ALL
                .iter()
                .map(|&stage| {
                    let (enabled, note) = match stage {
                        Stage::Refresh => (!config.skip.refresh, None),
                        Stage::PrepareBuild => (!config.skip.clean, None),
                        Stage::PreBuild => (true, Some(bootstrap_note.clone())),
                        Stage::Build => (true, Some(stamp_note.clone())),
                        Stage::PrepareDelivery | Stage::Deliver => (true, None),
                    };
                    PlannedStage {
                        stage,
                        enabled,
                        note,
                    }
                })
                .collect(),
        }
    }

    /// Run every stage. A fatal error ends the run and is returned after it
    /// has been written to the global log.
    pub fn run(&self) -> Result<PipelineRun> {
        let log = self.exec.log();
        log.global(&format!(
            "starting build job for {}",
            self.config.pallet_name
        ));

        let mut run = PipelineRun::new(self.config);
        match self.run_stages(&mut run) {
            Ok(()) => {
                run.finish();
                log.global(&format!(
                    "build job for {} finished: {}",
                    self.config.pallet_name,
                    run.summary()
                ));
                Ok(run)
            }
            Err(err) => {
                log.error(&err);
                log.global(&format!(
                    "build job for {} aborted: {}",
                    self.config.pallet_name,
                    run.summary()
                ));
                Err(err)
            }
        }
    }

    fn run_stages(&self, run: &mut PipelineRun) -> Result<()> {
        let sync = Synchronizer::new(
            self.exec,
            &self.config.build_root,
            &self.config.repo_base_dir,
            self.config.clone_url(),
            Some(self.config.credentials.git_auth()),
        );

        let (report, repository) = self.refresh(&sync);
        run.repository = repository;
        run.stages.push(report);

        let result = self.prepare_delivery();
        let report = fatal(run, Stage::PrepareDelivery, result)?;
        run.stages.push(report);

        let report = self.prepare_build(&sync);
        run.stages.push(report);
        run.commit = git::short_commit(&self.exec, &self.config.source_root());

        let result = self.pre_build();
        let (report, env) = fatal(run, Stage::PreBuild, result)?;
        run.stages.push(report);

        let result = self.build(&env, run);
        let (report, version) = fatal(run, Stage::Build, result)?;
        run.stages.push(report);

        let result = self.deliver(&version);
        let (report, delivered) = fatal(run, Stage::Deliver, result)?;
        run.artifact = Some(delivered);
        run.stages.push(report);

        Ok(())
    }

    fn refresh(&self, sync: &Synchronizer<'_>) -> (StageReport, Option<RepositoryState>) {
        if self.config.skip.refresh {
            self.exec.log().global("skipping refresh");
            return (StageReport::skipped(Stage::Refresh, "skipping refresh"), None);
        }

        match sync.synchronize() {
            Ok(outcome) => {
                let mut messages = outcome.failures;
                let state = sync.state();
                if !state.present {
                    messages.push(self.note("working tree missing after refresh"));
                } else if !state.clean {
                    self.exec
                        .log()
                        .global("working tree has local changes, prepare will discard them");
                }
                (StageReport::new(Stage::Refresh, messages), Some(state))
            }
            Err(err) => {
                self.exec.log().error(&err);
                (StageReport::new(Stage::Refresh, vec![err.message]), None)
            }
        }
    }

    fn prepare_delivery(&self) -> Result<StageReport> {
        io::ensure_dir(&self.config.delivery_dir(), "create delivery directory")?;
        Ok(StageReport::new(Stage::PrepareDelivery, Vec::new()))
    }

    fn prepare_build(&self, sync: &Synchronizer<'_>) -> StageReport {
        if self.config.skip.clean {
            self.exec.log().global("skipping build directory preparation");
            return StageReport::skipped(Stage::PrepareBuild, "skipping build directory preparation");
        }
        StageReport::new(Stage::PrepareBuild, sync.prepare(&self.config.branch))
    }

    fn pre_build(&self) -> Result<(StageReport, EnvOverrides)> {
        let makefile_dir = self.config.makefile_path();
        if !makefile_dir.is_dir() {
            return Err(Error::build_dir_missing(makefile_dir.display().to_string()));
        }

        let tool = &self.config.tool;
        let env = environment::import_profile(
            &self.exec,
            &tool.profile,
            &tool.env_prefixes,
            &makefile_dir,
        );
        let mut messages = Vec::new();

        if !self.make(&tool.clean_target, &[], &env).success() {
            messages.push(self.note(&format!("error, make {}", tool.clean_target)));
        }

        if self.config.skip.bootstrap {
            let message = format!("skipping {}", tool.bootstrap_target);
            self.exec.log().global(&message);
        } else {
            for _ in 0..tool.bootstrap_passes {
                let result = self.make(&tool.bootstrap_target, &[], &env);
                if result.success() {
                    continue;
                }
                if is_missing_target(&result, &tool.bootstrap_target) {
                    self.exec
                        .log()
                        .global(&format!("no target for make {}", tool.bootstrap_target));
                    break;
                }
                messages.push(self.note(&format!("error, make {}", tool.bootstrap_target)));
            }
        }

        Ok((StageReport::new(Stage::PreBuild, messages), env))
    }

    fn build(
        &self,
        env: &EnvOverrides,
        run: &mut PipelineRun,
    ) -> Result<(StageReport, VersionDescriptor)> {
        let config = self.config;
        let tool = &config.tool;
        let makefile_dir = config.makefile_path();
        let mut messages = Vec::new();

        let output_dir = config.build_output_dir();
        match io::remove_dir_if_present(&output_dir, "remove previous build tree") {
            Ok(true) => self
                .exec
                .log()
                .global(&format!("removed previous build tree {}", output_dir.display())),
            Ok(false) => {}
            Err(err) => {
                self.exec.log().global("could not delete build directory");
                return Err(err);
            }
        }

        let commit = run.commit.clone();
        if commit.is_none() && !config.skip.stamp {
            messages.push(self.note("commit id unavailable, version left unstamped"));
        }

        let version = version::resolve_base(
            &self.exec,
            &config.version_file_path(),
            &makefile_dir,
            tool,
            env,
        )?
        .stamped(
            &config.branch,
            &config.default_branch,
            commit.as_deref(),
            !config.skip.stamp,
        );
        run.version = Some(version.final_version());
        self.exec.log().global(&format!(
            "building {} version {}",
            config.pallet_name,
            version.final_version()
        ));

        let result = self.make(&tool.build_target, &[version.make_argument()], env);
        if !result.success() {
            self.exec
                .log()
                .global(&format!("error, make {}", tool.build_target));
            return Err(Error::build_target_failed(
                self.failure_details(&tool.build_target, &result),
            ));
        }

        let result = self.make(&tool.verify_target, &[], env);
        if !result.success() {
            self.exec
                .log()
                .global(&format!("error, make {}", tool.verify_target));
            return Err(Error::build_verify_failed(
                self.failure_details(&tool.verify_target, &result),
            ));
        }

        Ok((StageReport::new(Stage::Build, messages), version))
    }

    fn deliver(&self, version: &VersionDescriptor) -> Result<(StageReport, PathBuf)> {
        let config = self.config;
        let pattern = artifact::pattern(
            &config.build_output_dir(),
            &config.pallet_name,
            &version.final_version(),
            &config.tool.artifact_extension,
        );

        let found = artifact::locate(&pattern, self.exec.log())?;
        let delivered = artifact::deliver(&found, &config.delivery_dir(), self.exec.log())?;

        Ok((StageReport::new(Stage::Deliver, Vec::new()), delivered))
    }

    /// Run one build-tool target in the makefile directory. Output always
    /// lands in the build log.
    fn make(&self, target: &str, args: &[String], env: &EnvOverrides) -> CommandResult {
        let mut argv = vec![self.config.tool.program.clone(), target.to_string()];
        argv.extend(args.iter().cloned());

        let invocation = Invocation::new(argv)
            .in_dir(self.config.makefile_path())
            .with_envs(env.vars());
        let result = self.exec.execute(&invocation, None);
        self.exec
            .log()
            .build(&invocation.command_line(), &result.output);
        result
    }

    fn note(&self, message: &str) -> String {
        self.exec.log().global(message);
        message.to_string()
    }

    fn failure_details(&self, target: &str, result: &CommandResult) -> BuildTargetFailedDetails {
        BuildTargetFailedDetails {
            target: target.to_string(),
            exit_code: result.exit_status,
            working_dir: self.config.makefile_path().display().to_string(),
            output_tail: parser::tail(&result.output, OUTPUT_TAIL_LINES),
        }
    }
}

/// Record a failed stage before handing its error back.
fn fatal<T>(run: &mut PipelineRun, stage: Stage, result: Result<T>) -> Result<T> {
    result.map_err(|err| {
        run.stages.push(StageReport::failed(stage, &err));
        err
    })
}

/// True when make reports `target` itself as unknown, not one of its
/// prerequisites.
fn is_missing_target(result: &CommandResult, target: &str) -> bool {
    let pattern = format!(r"No rule to make target [`']{}'\.", regex::escape(target));
    Regex::new(&pattern).is_ok_and(|re| re.is_match(&result.output))
}
