use serde::{Deserialize, Serialize};

/// Host layout, overridable via the `[paths]` table of a build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Parent of every source checkout.
    #[serde(default = "default_build_root")]
    pub build_root: String,

    /// Parent of every pallet delivery directory.
    #[serde(default = "default_delivery_root")]
    pub delivery_root: String,

    /// Host-wide append-only build log.
    #[serde(default = "default_global_log")]
    pub global_log: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            build_root: default_build_root(),
            delivery_root: default_delivery_root(),
            global_log: default_global_log(),
        }
    }
}

/// Build-tool contract, overridable via the `[tool]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_clean_target")]
    pub clean_target: String,

    #[serde(default = "default_bootstrap_target")]
    pub bootstrap_target: String,

    #[serde(default = "default_build_target")]
    pub build_target: String,

    #[serde(default = "default_verify_target")]
    pub verify_target: String,

    /// Number of times the bootstrap target is invoked. Some pallets have a
    /// bootstrap that only settles on the second pass.
    #[serde(default = "default_bootstrap_passes")]
    pub bootstrap_passes: u32,

    /// Variable carrying the resolved version on the build-target command line
    /// when the version file does not name one.
    #[serde(default = "default_version_variable")]
    pub version_variable: String,

    /// Command whose trimmed output is the version when the version file has
    /// no recognised assignment. Runs in the makefile directory.
    #[serde(default = "default_version_command")]
    pub version_command: Vec<String>,

    /// Shell profile sourced to obtain build-tool environment variables.
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Only variables whose names start with one of these are imported.
    #[serde(default = "default_env_prefixes")]
    pub env_prefixes: Vec<String>,

    /// File extension of the delivered artifact.
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            clean_target: default_clean_target(),
            bootstrap_target: default_bootstrap_target(),
            build_target: default_build_target(),
            verify_target: default_verify_target(),
            bootstrap_passes: default_bootstrap_passes(),
            version_variable: default_version_variable(),
            version_command: default_version_command(),
            profile: default_profile(),
            env_prefixes: default_env_prefixes(),
            artifact_extension: default_artifact_extension(),
        }
    }
}

pub fn default_branch() -> String {
    "master".to_string()
}

pub fn default_version_file() -> String {
    "version.mk".to_string()
}

fn default_build_root() -> String {
    "/export/build".to_string()
}

fn default_delivery_root() -> String {
    "/export/nightly".to_string()
}

fn default_global_log() -> String {
    "/export/nightly/build_log.txt".to_string()
}

fn default_program() -> String {
    "make".to_string()
}

fn default_clean_target() -> String {
    "nuke.all".to_string()
}

fn default_bootstrap_target() -> String {
    "bootstrap".to_string()
}

fn default_build_target() -> String {
    "roll".to_string()
}

fn default_verify_target() -> String {
    "manifest-check".to_string()
}

fn default_bootstrap_passes() -> u32 {
    1
}

fn default_version_variable() -> String {
    "ROLLVERSION".to_string()
}

fn default_version_command() -> Vec<String> {
    vec!["make".to_string(), "-s".to_string(), "version".to_string()]
}

fn default_profile() -> String {
    "/etc/profile.d/stack-build.sh".to_string()
}

fn default_env_prefixes() -> Vec<String> {
    ["STACK", "ROCKS", "PALLET", "ROLL"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_artifact_extension() -> String {
    "iso".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tool_table_uses_defaults() {
        let tool: ToolConfig = toml::from_str("").unwrap();
        assert_eq!(tool, ToolConfig::default());
        assert_eq!(tool.bootstrap_passes, 1);
        assert_eq!(tool.env_prefixes, vec!["STACK", "ROCKS", "PALLET", "ROLL"]);
    }

    #[test]
    fn partial_paths_table_keeps_other_defaults() {
        let paths: PathsConfig = toml::from_str("build_root = \"/tmp/build\"").unwrap();
        assert_eq!(paths.build_root, "/tmp/build");
        assert_eq!(paths.delivery_root, "/export/nightly");
        assert_eq!(paths.global_log, "/export/nightly/build_log.txt");
    }
}
