//! Build log files.
//!
//! Two append-only sinks: the host-wide global log, which records every
//! command line and every stage diagnostic, and the per-pallet-per-branch
//! build log, which receives raw build-tool output. A `BuildLog` is created
//! once per run and handed to every component by reference.

use chrono::{Local, SecondsFormat};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::utils::io;

#[derive(Debug, Clone)]
pub struct BuildLog {
    global: PathBuf,
    build: Option<PathBuf>,
    label: Option<String>,
}

impl BuildLog {
    /// Logger writing only to the global log.
    pub fn new(global: impl Into<PathBuf>) -> Self {
        Self {
            global: global.into(),
            build: None,
            label: None,
        }
    }

    /// Attach the per-build log and the pallet label used to prefix global lines.
    pub fn for_build(mut self, label: impl Into<String>, build: impl Into<PathBuf>) -> Self {
        self.label = Some(label.into());
        self.build = Some(build.into());
        self
    }

    /// Append one timestamped line to the global log.
    pub fn global(&self, message: &str) {
        log_status!("bob", "{}", message);

        let line = match &self.label {
            Some(label) => format!("{} [{}] {}", timestamp(), label, message),
            None => format!("{} {}", timestamp(), message),
        };
        if let Err(e) = io::append_file(&self.global, &line, "write global build log") {
            eprintln!(
                "[bob] could not write {}: {}",
                self.global.display(),
                e.details
            );
        }
    }

    /// Record a fatal or non-fatal error in the global log.
    pub fn error(&self, err: &Error) {
        self.global(&err.log_line());
    }

    /// Append raw build-tool output to the per-build log.
    ///
    /// Without a per-build log, or before its directory exists, the output
    /// goes to the global log.
    pub fn build(&self, heading: &str, output: &str) {
        let path = match &self.build {
            Some(path) if path.parent().is_none_or(Path::is_dir) => path,
            _ => {
                self.global(&format!("{}\n{}", heading, output));
                return;
            }
        };

        let entry = format!("==> {} {}\n{}", timestamp(), heading, output);
        if let Err(e) = io::append_file(path, &entry, "write build log") {
            eprintln!("[bob] could not write {}: {}", path.display(), e.details);
        }
    }
}

fn timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}
