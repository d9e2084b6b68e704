use serde::Serialize;
use std::path::{Path, PathBuf};

use super::primitives;
use crate::credentials::GitAuth;
use crate::error::Result;
use crate::executor::Executor;
use crate::utils::io;

/// What a refresh did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub cloned: bool,
    pub pulled: bool,
    /// Fixed failure messages, in the order they occurred.
    pub failures: Vec<String>,
}

impl SyncOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Observed state of a working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryState {
    pub present: bool,
    pub branch: Option<String>,
    pub clean: bool,
}

impl RepositoryState {
    pub fn inspect(exec: &Executor<'_>, repo_dir: &Path) -> Self {
        if !repo_dir.is_dir() {
            return Self {
                present: false,
                branch: None,
                clean: false,
            };
        }
        Self {
            present: true,
            branch: primitives::current_branch(exec, repo_dir),
            clean: primitives::is_workdir_clean(exec, repo_dir),
        }
    }
}

/// Keeps one local working tree in step with its remote.
pub struct Synchronizer<'a> {
    exec: Executor<'a>,
    build_root: PathBuf,
    dir_name: String,
    url: String,
    auth: Option<GitAuth>,
}

impl<'a> Synchronizer<'a> {
    pub fn new(
        exec: Executor<'a>,
        build_root: impl Into<PathBuf>,
        dir_name: impl Into<String>,
        url: impl Into<String>,
        auth: Option<GitAuth>,
    ) -> Self {
        Self {
            exec,
            build_root: build_root.into(),
            dir_name: dir_name.into(),
            url: url.into(),
            auth,
        }
    }

    pub fn repo_dir(&self) -> PathBuf {
        self.build_root.join(&self.dir_name)
    }

    /// Clone when the working tree is absent, then pull.
    ///
    /// Git failures are logged and collected. Only failing to create the
    /// build root is an error.
    pub fn synchronize(&self) -> Result<SyncOutcome> {
        let repo_dir = self.repo_dir();
        let mut outcome = SyncOutcome::default();

        if !repo_dir.is_dir() {
            self.exec.log().global(&format!(
                "no working tree at {}, cloning",
                repo_dir.display()
            ));
            io::ensure_dir(&self.build_root, "create build root")?;

            let result = primitives::clone_repo(
                &self.exec,
                &self.url,
                &self.build_root,
                &self.dir_name,
                self.auth.as_ref(),
            );
            outcome.cloned = result.success();
            if !result.success() {
                outcome.failures.push("git clone failed".to_string());
            }
        }

        let result = primitives::pull(&self.exec, &repo_dir, self.auth.as_ref());
        outcome.pulled = result.success();
        if !result.success() {
            outcome.failures.push("git pull failed".to_string());
        }

        Ok(outcome)
    }

    /// Force the working tree onto `branch` and discard every local change.
    ///
    /// Returns the failure messages; each step runs even if an earlier one failed.
    pub fn prepare(&self, branch: &str) -> Vec<String> {
        let repo_dir = self.repo_dir();
        let mut failures = Vec::new();

        if !primitives::checkout(&self.exec, &repo_dir, branch).success() {
            failures.push("git checkout failed".to_string());
        }
        if !primitives::clean_untracked(&self.exec, &repo_dir).success() {
            failures.push("git clean failed".to_string());
        }
        if !primitives::reset_hard(&self.exec, &repo_dir).success() {
            failures.push("git reset failed".to_string());
        }

        failures
    }

    pub fn state(&self) -> RepositoryState {
        RepositoryState::inspect(&self.exec, &self.repo_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;
    use crate::executor::testing::ScriptedRunner;
    use crate::logs::BuildLog;
    use std::fs;
    use tempfile::tempdir;

    fn auth() -> Option<GitAuth> {
        Some(Credentials::new("alice", "s3cr3t").unwrap().git_auth())
    }

    #[test]
    fn missing_tree_is_cloned_then_pulled() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("build");
        let log = BuildLog::new(dir.path().join("build_log.txt"));
        let runner = ScriptedRunner::new();
        let exec = Executor::new(&runner, &log);

        let sync = Synchronizer::new(exec, &root, "stacki", "https://example.com/stacki.git", auth());
        let outcome = sync.synchronize().unwrap();

        assert!(outcome.cloned);
        assert!(outcome.pulled);
        assert!(outcome.is_clean());
        assert!(root.is_dir());

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].argv.contains(&"clone".to_string()));
        assert_eq!(calls[0].cwd.as_deref(), Some(root.as_path()));
        assert!(calls[1].argv.contains(&"pull".to_string()));
        assert_eq!(calls[1].cwd, Some(root.join("stacki")));
    }

    #[test]
    fn existing_tree_is_only_pulled() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("stacki")).unwrap();
        let log = BuildLog::new(dir.path().join("build_log.txt"));
        let runner = ScriptedRunner::new();
        let exec = Executor::new(&runner, &log);

        let sync = Synchronizer::new(exec, dir.path(), "stacki", "https://example.com/stacki.git", auth());
        let outcome = sync.synchronize().unwrap();

        assert!(!outcome.cloned);
        assert!(outcome.pulled);
        assert_eq!(runner.calls().len(), 1);
        assert!(runner.calls()[0].argv.contains(&"pull".to_string()));
    }

    #[test]
    fn failed_clone_still_attempts_pull() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("build_log.txt");
        let log = BuildLog::new(&log_path);
        let runner = ScriptedRunner::new().on(&["git"], "fatal: repository not found", 128);
        let exec = Executor::new(&runner, &log);

        let sync = Synchronizer::new(exec, dir.path().join("build"), "stacki", "https://example.com/stacki.git", auth());
        let outcome = sync.synchronize().unwrap();

        assert_eq!(outcome.failures, vec!["git clone failed", "git pull failed"]);
        let logged = fs::read_to_string(&log_path).unwrap();
        assert!(!logged.contains("s3cr3t"));
    }

    #[test]
    fn prepare_runs_checkout_clean_reset_in_order() {
        let dir = tempdir().unwrap();
        let log = BuildLog::new(dir.path().join("build_log.txt"));
        let runner = ScriptedRunner::new().on(&["git", "checkout"], "error: pathspec", 1);
        let exec = Executor::new(&runner, &log);

        let sync = Synchronizer::new(exec, dir.path(), "stacki", "https://example.com/stacki.git", None);
        let failures = sync.prepare("develop");

        assert_eq!(failures, vec!["git checkout failed"]);
        let argv: Vec<String> = runner.calls().iter().map(|c| c.argv[1].clone()).collect();
        assert_eq!(argv, vec!["checkout", "clean", "reset"]);
        assert!(runner
            .calls()
            .iter()
            .all(|c| c.cwd == Some(dir.path().join("stacki"))));
    }

    #[test]
    fn state_reports_absent_tree() {
        let dir = tempdir().unwrap();
        let log = BuildLog::new(dir.path().join("build_log.txt"));
        let runner = ScriptedRunner::new();
        let exec = Executor::new(&runner, &log);

        let sync = Synchronizer::new(exec, dir.path(), "missing", "x", None);
        let state = sync.state();

        assert!(!state.present);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn state_reads_branch_and_cleanliness() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("stacki")).unwrap();
        let log = BuildLog::new(dir.path().join("build_log.txt"));
        let runner = ScriptedRunner::new()
            .on(&["git", "rev-parse"], "develop\n", 0)
            .on(&["git", "status"], "", 0);
        let exec = Executor::new(&runner, &log);

        let state = Synchronizer::new(exec, dir.path(), "stacki", "x", None).state();

        assert!(state.present);
        assert_eq!(state.branch.as_deref(), Some("develop"));
        assert!(state.clean);
    }
}
