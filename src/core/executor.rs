//! External process execution.
//!
//! Every external command the pipeline runs goes through an [`Executor`]:
//! the command line is written to the global build log first (optionally
//! passed through a redactor), then the process runs to completion with
//! stdout and stderr merged into a single captured stream. A non-zero exit
//! is never an error here; callers inspect [`CommandResult::exit_status`].
//!
//! There is no timeout. A hung build tool blocks the run until it exits.

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::logs::BuildLog;
use crate::utils::shell;

/// One external process: argv, explicit working directory and explicit
/// environment overrides layered on top of the inherited environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Shell-quoted command line, as written to the log.
    pub fn command_line(&self) -> String {
        shell::quote_args(&self.argv)
    }
}

/// Captured merged output and exit status of one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub output: String,
    pub exit_status: i32,
}

impl CommandResult {
    pub fn new(output: impl Into<String>, exit_status: i32) -> Self {
        Self {
            output: output.into(),
            exit_status,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    pub fn trimmed(&self) -> &str {
        self.output.trim()
    }
}

/// Seam between the pipeline and the operating system.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> CommandResult;
}

/// Spawns real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> CommandResult {
        let Some((program, args)) = invocation.argv.split_first() else {
            return CommandResult::new("Command error: empty command line", -1);
        };

        match run_merged(program, args, invocation) {
            Ok(result) => result,
            Err(e) => CommandResult::new(format!("Command error: {}", e), -1),
        }
    }
}

/// Run with stdout and stderr attached to the same pipe so the captured
/// output keeps the interleaving the tool produced.
fn run_merged(
    program: &str,
    args: &[String],
    invocation: &Invocation,
) -> std::io::Result<CommandResult> {
    let (mut reader, writer) = std::io::pipe()?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(&invocation.env)
        .stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);

    if let Some(dir) = &invocation.cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn()?;
    // The parent's copies of the write end must be closed or the read below
    // never sees EOF.
    drop(cmd);

    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let status = child.wait()?;

    Ok(CommandResult {
        output: String::from_utf8_lossy(&buf).into_owned(),
        exit_status: status.code().unwrap_or(-1),
    })
}

/// Runs invocations through a [`CommandRunner`], logging each command line.
#[derive(Clone, Copy)]
pub struct Executor<'a> {
    runner: &'a dyn CommandRunner,
    log: &'a BuildLog,
}

impl<'a> Executor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, log: &'a BuildLog) -> Self {
        Self { runner, log }
    }

    pub fn log(&self) -> &'a BuildLog {
        self.log
    }

    /// Log the command line, then run the invocation to completion.
    ///
    /// When `redactor` is given the logged line is its output, never the
    /// literal argv.
    pub fn execute(
        &self,
        invocation: &Invocation,
        redactor: Option<&dyn Fn(&str) -> String>,
    ) -> CommandResult {
        let mut line = invocation.command_line();
        if let Some(dir) = &invocation.cwd {
            line = format!("{} (in {})", line, dir.display());
        }
        let line = match redactor {
            Some(redact) => redact(&line),
            None => line,
        };
        self.log.global(&line);

        self.runner.run(invocation)
    }
}
