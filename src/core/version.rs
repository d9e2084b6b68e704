//! Pallet version resolution.
//!
//! The base version comes from the first recognised assignment in the
//! version file. A single `$(shell <command>)` macro in the assigned value is
//! run and replaced by its trimmed output. When no assignment is found the
//! configured version command is run instead. The version file is only ever
//! read; the result travels to the build tool as a command-line variable.

use regex::Regex;
use serde::Serialize;
use std::path::Path;

use crate::defaults::ToolConfig;
use crate::environment::EnvOverrides;
use crate::error::{Error, Result};
use crate::executor::{Executor, Invocation};
use crate::utils::{io, parser, shell};

const ASSIGNMENT_PATTERN: &str = r"^\s*(?:export\s+)?(ROLLVERSION|VERSION)\s*[:?]?=\s*(.*?)\s*$";
const MACRO_OPEN: &str = "$(shell ";

/// A resolved version and the build-tool variable that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDescriptor {
    pub variable: String,
    pub base: String,
    pub suffix: Option<String>,
}

impl VersionDescriptor {
    /// `base`, or `base_suffix` once stamped.
    pub fn final_version(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}_{}", self.base, suffix),
            None => self.base.clone(),
        }
    }

    /// Attach branch and commit identity.
    ///
    /// The suffix is `<commit>` on the default branch and `<branch>_<commit>`
    /// elsewhere. Without a commit id the version stays unstamped.
    pub fn stamped(
        mut self,
        branch: &str,
        default_branch: &str,
        commit: Option<&str>,
        enabled: bool,
    ) -> Self {
        self.suffix = match commit {
            Some(commit) if enabled => Some(if branch == default_branch {
                commit.to_string()
            } else {
                format!("{}_{}", branch, commit)
            }),
            _ => None,
        };
        self
    }

    /// `VAR=version` argument for the build target.
    pub fn make_argument(&self) -> String {
        format!("{}={}", self.variable, self.final_version())
    }
}

fn regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::internal_unexpected(format!("invalid pattern {}: {}", pattern, e)))
}

/// Find the first recognised assignment: `(variable, raw value)`.
pub fn find_assignment(content: &str) -> Result<Option<(String, String)>> {
    let re = regex(ASSIGNMENT_PATTERN)?;
    Ok(parser::first_line_captures(content, &re).and_then(|caps| {
        let mut caps = caps.into_iter();
        Some((caps.next()?, caps.next()?))
    }))
}

/// Replace the first `$(shell ...)` macro in `text` with its command output.
///
/// Only one macro is resolved. Its body runs to the balancing `)`, so the
/// command may itself contain parentheses. The body is split on whitespace
/// and run in `cwd` with the imported environment; a failing command is
/// logged and its trimmed output is still spliced.
pub fn interpolate(
    exec: &Executor<'_>,
    text: &str,
    cwd: &Path,
    env: &EnvOverrides,
) -> Result<String> {
    let Some(start) = text.find(MACRO_OPEN) else {
        return Ok(text.to_string());
    };
    let body_start = start + MACRO_OPEN.len();
    let Some(body_end) = closing_paren(&text[body_start..]).map(|i| body_start + i) else {
        exec.log()
            .global(&format!("unbalanced version macro: {}", text));
        return Err(Error::build_version_unresolved(
            text,
            "unbalanced $(shell ...) macro",
        ));
    };
    let command = &text[body_start..body_end];

    let argv = shell::split_words(command);
    if argv.is_empty() {
        return Err(Error::build_version_unresolved(
            text,
            "empty command in version macro",
        ));
    }

    let invocation = Invocation::new(argv).in_dir(cwd).with_envs(env.vars());
    let result = exec.execute(&invocation, None);
    if !result.success() {
        exec.log()
            .global(&format!("version macro command failed: {}", command));
    }

    Ok(format!(
        "{}{}{}",
        &text[..start],
        result.trimmed(),
        &text[body_end + 1..]
    ))
}

/// Byte offset of the `)` closing an already-open paren.
fn closing_paren(body: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Resolve the unstamped version for a checkout.
pub fn resolve_base(
    exec: &Executor<'_>,
    version_file: &Path,
    makefile_dir: &Path,
    tool: &ToolConfig,
    env: &EnvOverrides,
) -> Result<VersionDescriptor> {
    let assignment = if version_file.is_file() {
        let content = io::read_file(version_file, "read version file")?;
        find_assignment(&content)?
    } else {
        exec.log().global(&format!(
            "version file {} not found",
            version_file.display()
        ));
        None
    };

    let descriptor = match assignment {
        Some((variable, raw)) => VersionDescriptor {
            variable,
            base: interpolate(exec, &raw, makefile_dir, env)?,
            suffix: None,
        },
        None => VersionDescriptor {
            variable: tool.version_variable.clone(),
            base: from_version_command(exec, makefile_dir, tool, env)?,
            suffix: None,
        },
    };

    if descriptor.base.is_empty() {
        return Err(Error::build_version_unresolved(
            version_file.display().to_string(),
            "resolved version is empty",
        ));
    }

    exec.log()
        .global(&format!("resolved base version {}", descriptor.base));
    Ok(descriptor)
}

fn from_version_command(
    exec: &Executor<'_>,
    makefile_dir: &Path,
    tool: &ToolConfig,
    env: &EnvOverrides,
) -> Result<String> {
    let invocation = Invocation::new(tool.version_command.iter().cloned())
        .in_dir(makefile_dir)
        .with_envs(env.vars());
    let result = exec.execute(&invocation, None);

    if !result.success() {
        exec.log()
            .build(&invocation.command_line(), &result.output);
        return Err(Error::build_version_unresolved(
            invocation.command_line(),
            format!("exited with status {}", result.exit_status),
        ));
    }

    Ok(result.trimmed().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::parse_env_dump;
    use crate::executor::testing::ScriptedRunner;
    use crate::logs::BuildLog;
    use std::fs;
    use tempfile::tempdir;

    fn none() -> EnvOverrides {
        EnvOverrides::default()
    }

    fn descriptor(base: &str) -> VersionDescriptor {
        VersionDescriptor {
            variable: "ROLLVERSION".to_string(),
            base: base.to_string(),
            suffix: None,
        }
    }

    #[test]
    fn plain_assignment_is_the_base_version() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("version.mk");
        fs::write(&file, "# pallet version\nROLLVERSION = 1.2.3\n").unwrap();
        let log = BuildLog::new(dir.path().join("build_log.txt"));
        let runner = ScriptedRunner::new();
        let exec = Executor::new(&runner, &log);

        let version = resolve_base(&exec, &file, dir.path(), &ToolConfig::default(), &none()).unwrap();

        assert_eq!(version.base, "1.2.3");
        assert_eq!(version.variable, "ROLLVERSION");
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn shell_macro_is_substituted() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("version.mk");
        fs::write(&file, "ROLLVERSION = 1.2.$(shell echo 3)\n").unwrap();
        let log = BuildLog::new(dir.path().join("build_log.txt"));
        let runner = ScriptedRunner::new().on(&["echo", "3"], "3\n", 0);
        let exec = Executor::new(&runner, &log);

        let version = resolve_base(&exec, &file, dir.path(), &ToolConfig::default(), &none()).unwrap();

        assert_eq!(version.base, "1.2.3");
        assert_eq!(runner.calls()[0].cwd.as_deref(), Some(dir.path()));
    }

    #[test]
    fn only_first_macro_is_resolved() {
        let dir = tempdir().unwrap();
        let log = BuildLog::new(dir.path().join("build_log.txt"));
        let runner = ScriptedRunner::new()
            .on(&["echo", "1"], "1", 0)
            .on(&["echo", "2"], "2", 0);
        let exec = Executor::new(&runner, &log);

        let text = interpolate(&exec, "$(shell echo 1).$(shell echo 2)", dir.path(), &none()).unwrap();

        assert_eq!(text, "1.$(shell echo 2)");
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn macro_command_may_contain_parentheses() {
        let dir = tempdir().unwrap();
        let log = BuildLog::new(dir.path().join("build_log.txt"));
        let runner = ScriptedRunner::new().on(&["sh", "-c"], "3\n", 0);
        let exec = Executor::new(&runner, &log);

        let text = interpolate(&exec, "1.2.$(shell sh -c echo$(true)3)", dir.path(), &none()).unwrap();

        assert_eq!(text, "1.2.3");
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].argv, vec!["sh", "-c", "echo$(true)3"]);
    }

    #[test]
    fn unbalanced_macro_is_an_error() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("build_log.txt");
        let log = BuildLog::new(&log_path);
        let runner = ScriptedRunner::new();
        let exec = Executor::new(&runner, &log);

        let err = interpolate(&exec, "1.$(shell date +%s", dir.path(), &none()).unwrap_err();

        assert_eq!(err.code.as_str(), "build.version_unresolved");
        assert!(runner.calls().is_empty());
        assert!(fs::read_to_string(&log_path)
            .unwrap()
            .contains("unbalanced version macro"));
    }

    #[test]
    fn imported_environment_reaches_version_commands() {
        let dir = tempdir().unwrap();
        let log = BuildLog::new(dir.path().join("build_log.txt"));
        let runner = ScriptedRunner::new()
            .on(&["make", "-s", "version"], "5.4.1\n", 0)
            .on(&["git"], "abc\n", 0);
        let exec = Executor::new(&runner, &log);
        let env = parse_env_dump("ROLLS_ROOT=/export/rolls\nHOME=/root\n", &["ROLL"]);

        resolve_base(
            &exec,
            &dir.path().join("version.mk"),
            dir.path(),
            &ToolConfig::default(),
            &env,
        )
        .unwrap();
        interpolate(&exec, "1.$(shell git rev-parse HEAD)", dir.path(), &env).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        for call in calls {
            assert_eq!(call.env.get("ROLLS_ROOT").map(String::as_str), Some("/export/rolls"));
            assert!(!call.env.contains_key("HOME"));
        }
    }

    #[test]
    fn exported_and_colon_assignments_are_recognised() {
        assert_eq!(
            find_assignment("export ROLLVERSION := 5.0\n").unwrap(),
            Some(("ROLLVERSION".to_string(), "5.0".to_string()))
        );
        assert_eq!(
            find_assignment("NAME = stacki\nVERSION ?= 4.1\nROLLVERSION = 9\n").unwrap(),
            Some(("VERSION".to_string(), "4.1".to_string()))
        );
        assert_eq!(find_assignment("RELEASE = 1\n").unwrap(), None);
    }

    #[test]
    fn falls_back_to_version_command() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("version.mk");
        fs::write(&file, "NAME = stacki\n").unwrap();
        let log = BuildLog::new(dir.path().join("build_log.txt"));
        let runner = ScriptedRunner::new().on(&["make", "-s", "version"], "5.4.1\n", 0);
        let exec = Executor::new(&runner, &log);

        let version = resolve_base(&exec, &file, dir.path(), &ToolConfig::default(), &none()).unwrap();

        assert_eq!(version.base, "5.4.1");
        assert_eq!(version.variable, "ROLLVERSION");
        assert_eq!(runner.count(&["make", "-s", "version"]), 1);
    }

    #[test]
    fn missing_version_file_uses_version_command() {
        let dir = tempdir().unwrap();
        let log = BuildLog::new(dir.path().join("build_log.txt"));
        let runner = ScriptedRunner::new().on(&["make"], "2.0", 0);
        let exec = Executor::new(&runner, &log);

        let version = resolve_base(
            &exec,
            &dir.path().join("version.mk"),
            dir.path(),
            &ToolConfig::default(),
            &none(),
        )
        .unwrap();
        assert_eq!(version.base, "2.0");
    }

    #[test]
    fn failing_version_command_is_an_error() {
        let dir = tempdir().unwrap();
        let log = BuildLog::new(dir.path().join("build_log.txt"));
        let runner = ScriptedRunner::new().on(&["make"], "No rule to make target", 2);
        let exec = Executor::new(&runner, &log);

        let err = resolve_base(
            &exec,
            &dir.path().join("version.mk"),
            dir.path(),
            &ToolConfig::default(),
            &none(),
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "build.version_unresolved");
    }

    #[test]
    fn version_file_is_never_modified() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("version.mk");
        let content = "ROLLVERSION = 1.$(shell echo 0)\n";
        fs::write(&file, content).unwrap();
        let log = BuildLog::new(dir.path().join("build_log.txt"));
        let runner = ScriptedRunner::new().on(&["echo"], "0", 0);
        let exec = Executor::new(&runner, &log);

        resolve_base(&exec, &file, dir.path(), &ToolConfig::default(), &none()).unwrap();

        assert_eq!(fs::read_to_string(&file).unwrap(), content);
    }

    #[test]
    fn stamping_on_default_branch_adds_commit_only() {
        let version = descriptor("1.2.3").stamped("master", "master", Some("abcdef1"), true);
        assert_eq!(version.final_version(), "1.2.3_abcdef1");
    }

    #[test]
    fn stamping_off_default_branch_adds_branch_and_commit() {
        let version = descriptor("1.2.3").stamped("feature-x", "master", Some("abcdef1"), true);
        assert_eq!(version.final_version(), "1.2.3_feature-x_abcdef1");
        assert_eq!(version.make_argument(), "ROLLVERSION=1.2.3_feature-x_abcdef1");
    }

    #[test]
    fn disabled_or_commitless_stamping_keeps_base() {
        let skipped = descriptor("1.2.3").stamped("feature-x", "master", Some("abcdef1"), false);
        assert_eq!(skipped.final_version(), "1.2.3");

        let no_commit = descriptor("1.2.3").stamped("feature-x", "master", None, true);
        assert_eq!(no_commit.final_version(), "1.2.3");
    }
}
