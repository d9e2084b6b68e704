//! Build-tool environment imported from a shell profile.
//!
//! The profile is sourced in a throwaway bash whose `env` dump is parsed; only
//! variables with a recognised prefix are kept. The result is an explicit
//! override map layered onto later build-tool invocations. The pipeline's own
//! process environment is never modified.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::executor::{Executor, Invocation};
use crate::utils::{parser, shell};

/// Variables to layer onto build-tool invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvOverrides {
    vars: BTreeMap<String, String>,
}

impl EnvOverrides {
    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// Parse a `KEY=VALUE` dump, keeping keys that start with any prefix.
///
/// Lines are split on the first `=` so values may themselves contain `=`.
/// Lines without `=` (continuations of multi-line values) are ignored.
pub fn parse_env_dump<S: AsRef<str>>(dump: &str, prefixes: &[S]) -> EnvOverrides {
    let vars = parser::lines(dump)
        .filter_map(|line| line.split_once('='))
        .filter(|(key, _)| {
            prefixes
                .iter()
                .any(|prefix| key.starts_with(prefix.as_ref()))
        })
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

    EnvOverrides { vars }
}

/// Source `profile` in a subshell and import matching variables.
///
/// A failed or missing profile yields whatever the dump contained (usually
/// nothing) and a line in the global log; it never aborts the run.
pub fn import_profile<S: AsRef<str>>(
    exec: &Executor<'_>,
    profile: &str,
    prefixes: &[S],
    cwd: &Path,
) -> EnvOverrides {
    let script = format!("source {} && env", shell::quote_arg(profile));
    let result = exec.execute(
        &Invocation::new(["/bin/bash", "-c", script.as_str()]).in_dir(cwd),
        None,
    );

    if !result.success() {
        exec.log()
            .global(&format!("could not source build profile {}", profile));
        exec.log().build("source build profile", &result.output);
    }

    let overrides = parse_env_dump(&result.output, prefixes);
    exec.log().global(&format!(
        "imported {} build environment variables from {}",
        overrides.len(),
        profile
    ));
    overrides
}
