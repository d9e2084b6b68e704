//! Build configuration: loading, validation and derived paths.
//!
//! A configuration file is TOML with a mandatory `[build]` table and optional
//! `[paths]` / `[tool]` tables:
//!
//! ```toml
//! [build]
//! pallet_name = "stacki"
//! repo_url = "github.com/Teradata/stacki.git"
//! git_user = "nightly"
//! git_passwd = "~/.git_passwd"
//! branch = "develop"
//! skip_bootstrap = true
//!
//! [tool]
//! bootstrap_passes = 2
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::credentials::{Credentials, PasswordSource};
use crate::defaults::{self, PathsConfig, ToolConfig};
use crate::error::{Error, Result};
use crate::logs::BuildLog;
use crate::utils::io;

/// Raw file contents before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildFile {
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tool: ToolConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    pub pallet_name: Option<String>,
    pub repo_url: Option<String>,
    pub git_user: Option<String>,
    pub git_passwd: Option<String>,
    pub git_passwd_keyring: Option<String>,
    pub branch: Option<String>,
    pub default_branch: Option<String>,
    pub repo_base_dir: Option<String>,
    pub makefile_dir: Option<String>,
    pub version_file: Option<String>,
    #[serde(default)]
    pub skip_refresh: bool,
    #[serde(default, alias = "force_build")]
    pub skip_clean: bool,
    #[serde(default)]
    pub skip_bootstrap: bool,
    #[serde(default)]
    pub skip_stamp: bool,
}

/// Stages the operator asked to skip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageSkips {
    pub refresh: bool,
    pub clean: bool,
    pub bootstrap: bool,
    pub stamp: bool,
}

/// Validated, immutable configuration for one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct BuildConfiguration {
    pub pallet_name: String,
    pub repo_url: String,
    pub git_user: String,
    pub password_source: String,
    #[serde(skip)]
    pub credentials: Credentials,
    pub branch: String,
    pub default_branch: String,
    pub repo_base_dir: String,
    pub makefile_dir: String,
    pub version_file: String,
    pub build_root: PathBuf,
    pub delivery_root: PathBuf,
    pub global_log: PathBuf,
    pub skip: StageSkips,
    pub tool: ToolConfig,
}

/// Load and validate a configuration file.
pub fn load(path: &Path) -> Result<BuildConfiguration> {
    if !path.is_file() {
        return Err(Error::config_file_not_found(path.display().to_string()));
    }

    let content = io::read_file(path, "read build configuration")?;
    from_toml_str(&content, Some(path))
}

/// Parse and validate configuration text.
pub fn from_toml_str(content: &str, path: Option<&Path>) -> Result<BuildConfiguration> {
    let path_label = path.map(|p| p.display().to_string());
    let file: BuildFile = toml::from_str(content)
        .map_err(|e| Error::config_invalid_toml(path_label.clone().unwrap_or_default(), e))?;
    BuildConfiguration::from_file(file, path_label)
}

/// The global log named by a configuration file, falling back to the default
/// host log when the file cannot be read or parsed.
pub fn global_log_hint(path: &Path) -> PathBuf {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| toml::from_str::<BuildFile>(&content).ok())
        .map(|file| expand(&file.paths.global_log))
        .unwrap_or_else(|| expand(&PathsConfig::default().global_log))
}

fn required(value: Option<String>, key: &str, path: &Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(Error::config_missing_key(key, path.clone())),
    }
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

fn password_source(section: &BuildSection, path: &Option<String>) -> Result<PasswordSource> {
    let literal = optional(section.git_passwd.clone());
    let keyring = optional(section.git_passwd_keyring.clone());

    match (literal, keyring) {
        (Some(_), Some(_)) => Err(Error::config_invalid_value(
            "git_passwd_keyring",
            None,
            "set either git_passwd or git_passwd_keyring, not both",
        )),
        (Some(value), None) => Ok(PasswordSource::from_config_value(&value)),
        (None, Some(service)) => Ok(PasswordSource::Keyring { service }),
        (None, None) => Err(Error::config_missing_key("git_passwd", path.clone())),
    }
}

/// Last URL segment without `.git`: `github.com/Teradata/stacki.git` -> `stacki`.
pub fn repo_dir_name(url: &str) -> String {
    let last = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

impl BuildConfiguration {
    /// Validate raw file contents. Mandatory keys are checked before the
    /// password source is touched, so a bad file never reads secrets.
    pub fn from_file(file: BuildFile, path: Option<String>) -> Result<Self> {
        let section = file.build;

        let pallet_name = required(section.pallet_name.clone(), "pallet_name", &path)?;
        let repo_url = required(section.repo_url.clone(), "repo_url", &path)?;
        let git_user = required(section.git_user.clone(), "git_user", &path)?;
        let source = password_source(&section, &path)?;

        if file.tool.bootstrap_passes == 0 {
            return Err(Error::config_invalid_value(
                "bootstrap_passes",
                Some("0".to_string()),
                "must be at least 1",
            ));
        }
        if file.tool.version_command.is_empty() {
            return Err(Error::config_invalid_value(
                "version_command",
                None,
                "must name a command",
            ));
        }

        let credentials = Credentials::resolve(&git_user, &source)?;

        let repo_base_dir =
            optional(section.repo_base_dir).unwrap_or_else(|| repo_dir_name(&repo_url));
        if repo_base_dir.is_empty() {
            return Err(Error::config_invalid_value(
                "repo_base_dir",
                None,
                "could not derive a checkout directory from repo_url",
            ));
        }

        Ok(Self {
            pallet_name,
            repo_url,
            git_user,
            password_source: source.describe(),
            credentials,
            branch: optional(section.branch).unwrap_or_else(defaults::default_branch),
            default_branch: optional(section.default_branch)
                .unwrap_or_else(defaults::default_branch),
            repo_base_dir,
            makefile_dir: optional(section.makefile_dir).unwrap_or_default(),
            version_file: optional(section.version_file)
                .unwrap_or_else(defaults::default_version_file),
            build_root: expand(&file.paths.build_root),
            delivery_root: expand(&file.paths.delivery_root),
            global_log: expand(&file.paths.global_log),
            skip: StageSkips {
                refresh: section.skip_refresh,
                clean: section.skip_clean,
                bootstrap: section.skip_bootstrap,
                stamp: section.skip_stamp,
            },
            tool: file.tool,
        })
    }

    pub fn is_default_branch(&self) -> bool {
        self.branch == self.default_branch
    }

    /// URL handed to `git clone`. Credentials are never part of it.
    pub fn clone_url(&self) -> String {
        if self.repo_url.contains("://") || self.repo_url.starts_with("git@") {
            self.repo_url.clone()
        } else {
            format!("https://{}", self.repo_url)
        }
    }

    /// Local working tree.
    pub fn source_root(&self) -> PathBuf {
        self.build_root.join(&self.repo_base_dir)
    }

    pub fn makefile_path(&self) -> PathBuf {
        if self.makefile_dir.is_empty() {
            self.source_root()
        } else {
            self.source_root().join(&self.makefile_dir)
        }
    }

    pub fn version_file_path(&self) -> PathBuf {
        self.makefile_path().join(&self.version_file)
    }

    /// `<delivery root>/<pallet>`, suffixed with `_<branch>` off the default branch.
    pub fn delivery_dir(&self) -> PathBuf {
        if self.is_default_branch() {
            self.delivery_root.join(&self.pallet_name)
        } else {
            self.delivery_root
                .join(format!("{}_{}", self.pallet_name, self.branch))
        }
    }

    pub fn build_log_path(&self) -> PathBuf {
        self.delivery_dir().join(format!(
            "nightly-{}-{}-build.txt",
            self.pallet_name, self.branch
        ))
    }

    /// Logger for one run: the global log plus this pallet's build log.
    pub fn build_log(&self) -> BuildLog {
        BuildLog::new(&self.global_log).for_build(&self.pallet_name, self.build_log_path())
    }

    /// Build tool's output tree for this pallet and branch.
    pub fn build_output_dir(&self) -> PathBuf {
        self.makefile_path()
            .join(format!("build-{}-{}", self.pallet_name, self.branch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const MINIMAL: &str = r#"
[build]
pallet_name = "stacki"
repo_url = "github.com/Teradata/stacki.git"
git_user = "alice"
git_passwd = "s3cr3t"
"#;

    #[test]
    fn minimal_configuration_uses_host_defaults() {
        let config = from_toml_str(MINIMAL, None).unwrap();

        assert_eq!(config.branch, "master");
        assert!(config.is_default_branch());
        assert_eq!(config.repo_base_dir, "stacki");
        assert_eq!(config.source_root(), PathBuf::from("/export/build/stacki"));
        assert_eq!(config.makefile_path(), PathBuf::from("/export/build/stacki"));
        assert_eq!(
            config.version_file_path(),
            PathBuf::from("/export/build/stacki/version.mk")
        );
        assert_eq!(config.delivery_dir(), PathBuf::from("/export/nightly/stacki"));
        assert_eq!(
            config.build_log_path(),
            PathBuf::from("/export/nightly/stacki/nightly-stacki-master-build.txt")
        );
        assert_eq!(config.skip, StageSkips::default());
        assert_eq!(config.password_source, "literal");
    }

    #[test]
    fn feature_branch_gets_suffixed_delivery_dir() {
        let content = format!("{}branch = \"feature-x\"\nmakefile_dir = \"common\"\n", MINIMAL);
        let config = from_toml_str(&content, None).unwrap();

        assert!(!config.is_default_branch());
        assert_eq!(
            config.delivery_dir(),
            PathBuf::from("/export/nightly/stacki_feature-x")
        );
        assert_eq!(
            config.build_output_dir(),
            PathBuf::from("/export/build/stacki/common/build-stacki-feature-x")
        );
    }

    #[test]
    fn missing_mandatory_keys_fail_construction() {
        for key in ["pallet_name", "repo_url", "git_user", "git_passwd"] {
            let content: String = MINIMAL
                .lines()
                .filter(|l| !l.starts_with(&format!("{} ", key)))
                .collect::<Vec<_>>()
                .join("\n");

            let err = from_toml_str(&content, None).unwrap_err();
            assert_eq!(err.code.as_str(), "config.missing_key", "key {}", key);
            assert_eq!(err.details["key"], key);
        }
    }

    #[test]
    fn blank_mandatory_value_counts_as_missing() {
        let content = MINIMAL.replace("pallet_name = \"stacki\"", "pallet_name = \"  \"");
        let err = from_toml_str(&content, None).unwrap_err();
        assert_eq!(err.details["key"], "pallet_name");
    }

    #[test]
    fn force_build_is_an_alias_for_skip_clean() {
        let content = format!("{}force_build = true\n", MINIMAL);
        let config = from_toml_str(&content, None).unwrap();
        assert!(config.skip.clean);
    }

    #[test]
    fn unknown_build_key_is_rejected() {
        let content = format!("{}pallet = \"typo\"\n", MINIMAL);
        let err = from_toml_str(&content, None).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_toml");
    }

    #[test]
    fn both_password_sources_are_rejected() {
        let content = format!("{}git_passwd_keyring = \"bob\"\n", MINIMAL);
        let err = from_toml_str(&content, None).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
    }

    #[test]
    fn zero_bootstrap_passes_is_rejected() {
        let content = format!("{}\n[tool]\nbootstrap_passes = 0\n", MINIMAL);
        let err = from_toml_str(&content, None).unwrap_err();
        assert_eq!(err.details["key"], "bootstrap_passes");
    }

    #[test]
    fn password_file_first_line_is_used() {
        let dir = tempdir().unwrap();
        let pw = dir.path().join("git_passwd");
        fs::write(&pw, "from-file\n").unwrap();

        let content = MINIMAL.replace(
            "git_passwd = \"s3cr3t\"",
            &format!("git_passwd = \"{}\"", pw.display()),
        );
        let config = from_toml_str(&content, None).unwrap();

        assert!(config.password_source.starts_with("file:"));
        let redacted = config.credentials.redactor().redact("x from-file y");
        assert_eq!(redacted, "x PASSWORD y");
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load(Path::new("/nonexistent/build.toml")).unwrap_err();
        assert_eq!(err.code.as_str(), "config.file_not_found");
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("build.toml");
        fs::write(&path, MINIMAL).unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.pallet_name, "stacki");
    }

    #[test]
    fn global_log_hint_falls_back_to_default() {
        assert_eq!(
            global_log_hint(Path::new("/nonexistent/build.toml")),
            PathBuf::from("/export/nightly/build_log.txt")
        );
    }

    #[test]
    fn clone_url_adds_scheme_only_when_missing() {
        let config = from_toml_str(MINIMAL, None).unwrap();
        assert_eq!(config.clone_url(), "https://github.com/Teradata/stacki.git");

        let content = MINIMAL.replace(
            "github.com/Teradata/stacki.git",
            "https://example.com/x/pallet.git",
        );
        let config = from_toml_str(&content, None).unwrap();
        assert_eq!(config.clone_url(), "https://example.com/x/pallet.git");
        assert_eq!(config.repo_base_dir, "pallet");
    }

    #[test]
    fn serialized_configuration_omits_password() {
        let config = from_toml_str(MINIMAL, None).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("s3cr3t"));
        assert!(json.contains("\"password_source\":\"literal\""));
    }
}
