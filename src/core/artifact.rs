//! Locating the built artifact and delivering it.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::logs::BuildLog;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
}

impl Artifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// `<output dir>/<pallet>-<version>*.<ext>` with the literal parts escaped.
pub fn pattern(output_dir: &Path, pallet: &str, version: &str, extension: &str) -> String {
    format!(
        "{}/{}-{}*.{}",
        glob::Pattern::escape(&output_dir.to_string_lossy()),
        glob::Pattern::escape(pallet),
        glob::Pattern::escape(version),
        glob::Pattern::escape(extension)
    )
}

/// Resolve `pattern` to a single file.
///
/// With several matches the most recently modified one wins and the others
/// are named in the log.
pub fn locate(pattern: &str, log: &BuildLog) -> Result<Artifact> {
    let mut matches: Vec<PathBuf> = glob::glob(pattern)
        .map_err(|e| {
            Error::validation_invalid_argument(
                "artifact_pattern",
                format!("Invalid glob pattern '{}': {}", pattern, e),
                Some(pattern.to_string()),
            )
        })?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();

    if matches.len() > 1 {
        log.global(&format!(
            "{} artifacts match {}, delivering the newest",
            matches.len(),
            pattern
        ));
    }

    matches.sort_by_key(|p| p.metadata().and_then(|m| m.modified()).ok());
    match matches.pop() {
        Some(path) => {
            log_status!("deliver", "Resolved '{}' -> '{}'", pattern, path.display());
            Ok(Artifact { path })
        }
        None => Err(Error::delivery_artifact_not_found(pattern)),
    }
}

/// Copy the artifact into `delivery_dir`, keeping its file name.
pub fn deliver(artifact: &Artifact, delivery_dir: &Path, log: &BuildLog) -> Result<PathBuf> {
    let target = delivery_dir.join(artifact.file_name());
    log.global(&format!(
        "copying {} to {}",
        artifact.path.display(),
        delivery_dir.display()
    ));

    fs::copy(&artifact.path, &target).map_err(|e| {
        Error::delivery_copy_failed(
            artifact.path.display().to_string(),
            target.display().to_string(),
            e.to_string(),
        )
    })?;

    Ok(target)
}
