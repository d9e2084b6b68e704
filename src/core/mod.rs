// Public modules
pub mod artifact;
pub mod config;
pub mod credentials;
pub mod defaults;
pub mod environment;
pub mod error;
pub mod executor;
pub mod git;
pub mod logs;
pub mod pipeline;
pub mod version;

// Re-export common types for convenience
pub use config::BuildConfiguration;
pub use error::{Error, ErrorCode, Result};
pub use executor::{CommandResult, CommandRunner, Executor, Invocation, SystemRunner};
pub use logs::BuildLog;
pub use pipeline::{BuildPlan, Builder, PipelineRun, Stage, StageReport, StageStatus};
