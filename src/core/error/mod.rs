use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigFileNotFound,
    ConfigInvalidToml,
    ConfigMissingKey,
    ConfigInvalidValue,

    ValidationInvalidArgument,

    CredentialUnavailable,

    BuildDirMissing,
    BuildTargetFailed,
    BuildVerifyFailed,
    BuildVersionUnresolved,

    DeliveryArtifactNotFound,
    DeliveryCopyFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigFileNotFound => "config.file_not_found",
            ErrorCode::ConfigInvalidToml => "config.invalid_toml",
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::CredentialUnavailable => "credential.unavailable",

            ErrorCode::BuildDirMissing => "build.dir_missing",
            ErrorCode::BuildTargetFailed => "build.target_failed",
            ErrorCode::BuildVerifyFailed => "build.verify_failed",
            ErrorCode::BuildVersionUnresolved => "build.version_unresolved",

            ErrorCode::DeliveryArtifactNotFound => "delivery.artifact_not_found",
            ErrorCode::DeliveryCopyFailed => "delivery.copy_failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    /// Configuration errors surface before any stage runs.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConfigFileNotFound
                | ErrorCode::ConfigInvalidToml
                | ErrorCode::ConfigMissingKey
                | ErrorCode::ConfigInvalidValue
                | ErrorCode::CredentialUnavailable
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTargetFailedDetails {
    pub target: String,
    pub exit_code: i32,
    pub working_dir: String,
    /// Last lines of the merged tool output.
    pub output_tail: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn config_file_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigFileNotFound,
            format!("Build configuration file {} does not exist", path),
            serde_json::json!({ "path": path }),
        )
        .with_hint("Pass the path of a build.toml file: bob build <config>")
    }

    pub fn config_invalid_toml(path: impl Into<String>, err: toml::de::Error) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidToml,
            "Invalid TOML in build configuration",
            serde_json::json!({ "path": path.into(), "error": err.to_string() }),
        )
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        Self::new(
            ErrorCode::ConfigMissingKey,
            "Not all mandatory keys are specified in the build configuration",
            to_details(ConfigMissingKeyDetails {
                key: key.into(),
                path,
            }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            to_details(ConfigInvalidValueDetails {
                key: key.into(),
                value,
                problem: problem.into(),
            }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            to_details(InvalidArgumentDetails {
                field: field.into(),
                problem: problem.into(),
                id,
            }),
        )
    }

    pub fn credential_unavailable(source: impl Into<String>, problem: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::CredentialUnavailable,
            "Git password could not be resolved",
            serde_json::json!({ "source": source.into(), "problem": problem.into() }),
        )
    }

    pub fn build_dir_missing(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::BuildDirMissing,
            format!("Makefile directory {} does not exist", path),
            serde_json::json!({ "path": path }),
        )
        .with_hint("Check makefile_dir in the build configuration, or run without skip_refresh")
    }

    pub fn build_target_failed(details: BuildTargetFailedDetails) -> Self {
        let message = format!("Error in make {}", details.target);
        Self::new(ErrorCode::BuildTargetFailed, message, to_details(details))
    }

    pub fn build_verify_failed(details: BuildTargetFailedDetails) -> Self {
        let message = format!("Error in make {}", details.target);
        Self::new(ErrorCode::BuildVerifyFailed, message, to_details(details))
    }

    pub fn build_version_unresolved(source: impl Into<String>, problem: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::BuildVersionUnresolved,
            "Could not determine the pallet version",
            serde_json::json!({ "source": source.into(), "problem": problem.into() }),
        )
    }

    pub fn delivery_artifact_not_found(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        Self::new(
            ErrorCode::DeliveryArtifactNotFound,
            format!("Could not find an artifact with glob: {}", pattern),
            serde_json::json!({ "pattern": pattern }),
        )
    }

    pub fn delivery_copy_failed(
        artifact: impl Into<String>,
        target: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::DeliveryCopyFailed,
            "Could not copy artifact to delivery directory",
            serde_json::json!({
                "artifact": artifact.into(),
                "target": target.into(),
                "error": error.into(),
            }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalIoErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// One-line rendering used for the global build log.
    pub fn log_line(&self) -> String {
        match &self.details {
            Value::Object(map) if !map.is_empty() => {
                format!("{} ({}): {}", self.message, self.code.as_str(), self.details)
            }
            _ => format!("{} ({})", self.message, self.code.as_str()),
        }
    }
}
