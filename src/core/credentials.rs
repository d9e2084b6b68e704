//! Git credentials and their injection into git child processes.
//!
//! The password never becomes part of a URL or an argv. [`GitAuth`] hands
//! both values to git through child-only environment variables read by an
//! inline credential helper, and [`Redactor`] scrubs any literal occurrence
//! from command lines before they are logged.

use keyring::Entry;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::executor::Invocation;
use crate::utils::{io, parser};

pub const USERNAME_ENV: &str = "BOB_GIT_USERNAME";
pub const PASSWORD_ENV: &str = "BOB_GIT_PASSWORD";

const USERNAME_PLACEHOLDER: &str = "USERNAME";
const PASSWORD_PLACEHOLDER: &str = "PASSWORD";

/// Inline helper answering only `get` requests from the two env variables.
const CREDENTIAL_HELPER: &str = "credential.helper=!f() { test \"$1\" = get || exit 0; \
echo \"username=${BOB_GIT_USERNAME}\"; echo \"password=${BOB_GIT_PASSWORD}\"; }; f";

/// Where the git password comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordSource {
    Literal(String),
    /// First line of the file is the password.
    File(PathBuf),
    /// OS keyring entry `<service>` / `<username>`.
    Keyring { service: String },
}

impl PasswordSource {
    /// Interpret a `git_passwd` value: a readable file path wins, anything
    /// else is the password itself.
    pub fn from_config_value(value: &str) -> Self {
        let expanded = shellexpand::tilde(value);
        let path = Path::new(expanded.as_ref());
        if path.is_file() {
            PasswordSource::File(path.to_path_buf())
        } else {
            PasswordSource::Literal(value.to_string())
        }
    }

    /// Label safe to show in plans and logs.
    pub fn describe(&self) -> String {
        match self {
            PasswordSource::Literal(_) => "literal".to_string(),
            PasswordSource::File(path) => format!("file:{}", path.display()),
            PasswordSource::Keyring { service } => format!("keyring:{}", service),
        }
    }

    fn resolve(&self, username: &str) -> Result<String> {
        match self {
            PasswordSource::Literal(value) => Ok(value.clone()),
            PasswordSource::File(path) => {
                let content = io::read_file(path, "read git password file").map_err(|e| {
                    Error::credential_unavailable(self.describe(), e.details.to_string())
                })?;
                parser::first_line(&content).ok_or_else(|| {
                    Error::credential_unavailable(self.describe(), "password file is empty")
                })
            }
            PasswordSource::Keyring { service } => {
                let entry = Entry::new(service, username).map_err(|e| {
                    Error::credential_unavailable(self.describe(), e.to_string())
                })?;
                match entry.get_password() {
                    Ok(value) => Ok(value),
                    Err(keyring::Error::NoEntry) => Err(Error::credential_unavailable(
                        self.describe(),
                        format!("no keyring entry for user '{}'", username),
                    )),
                    Err(e) => Err(Error::credential_unavailable(self.describe(), e.to_string())),
                }
            }
        }
    }
}

/// Resolved username and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &PASSWORD_PLACEHOLDER)
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let password = password.into();

        if username.trim().is_empty() {
            return Err(Error::config_missing_key("git_user", None));
        }
        if password.is_empty() {
            return Err(Error::config_missing_key("git_passwd", None));
        }

        Ok(Self { username, password })
    }

    pub fn resolve(username: &str, source: &PasswordSource) -> Result<Self> {
        let password = source.resolve(username)?;
        Self::new(username, password)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn redactor(&self) -> Redactor {
        Redactor {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    pub fn git_auth(&self) -> GitAuth {
        GitAuth {
            credentials: self.clone(),
        }
    }
}

/// Replaces literal credentials with placeholder tokens.
#[derive(Clone)]
pub struct Redactor {
    username: String,
    password: String,
}

impl Redactor {
    pub fn redact(&self, line: &str) -> String {
        // Longer secret first so a username contained in the password
        // cannot leave a partial password behind.
        let mut pairs = [
            (self.username.as_str(), USERNAME_PLACEHOLDER),
            (self.password.as_str(), PASSWORD_PLACEHOLDER),
        ];
        pairs.sort_by_key(|(secret, _)| std::cmp::Reverse(secret.len()));

        pairs
            .iter()
            .filter(|(secret, _)| !secret.is_empty())
            .fold(line.to_string(), |acc, (secret, token)| {
                acc.replace(*secret, token)
            })
    }
}

/// Injects credentials into a git invocation.
#[derive(Clone)]
pub struct GitAuth {
    credentials: Credentials,
}

impl GitAuth {
    /// `git <config args> <subcommand> ...`: clears inherited helpers and
    /// installs the env-reading helper for this process only.
    pub fn config_args() -> Vec<String> {
        vec![
            "-c".to_string(),
            "credential.helper=".to_string(),
            "-c".to_string(),
            CREDENTIAL_HELPER.to_string(),
        ]
    }

    pub fn apply(&self, invocation: Invocation) -> Invocation {
        invocation
            .with_env(USERNAME_ENV, self.credentials.username.clone())
            .with_env(PASSWORD_ENV, self.credentials.password.clone())
    }

    pub fn redactor(&self) -> Redactor {
        self.credentials.redactor()
    }
}
