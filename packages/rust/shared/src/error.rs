//! Error types for cocosbuild.
//!
//! Library crates use [`PipelineError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

use crate::types::StageId;

/// Exit status for usage errors and every failure that is not a tool's own exit code.
pub const GENERIC_FAILURE_EXIT_CODE: i32 = 1;

/// Top-level error type for all pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The build parameter file does not exist.
    #[error("parameter file not found: {}", path.display())]
    ConfigMissing { path: PathBuf },

    /// Parameter or settings parsing/validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A path a stage needs is absent before the stage starts.
    #[error(
        "{stage}: {what} does not exist: {}{}",
        path.display(),
        run_first.map(|s| format!(" (run {s} first)")).unwrap_or_default()
    )]
    PreconditionFailed {
        stage: StageId,
        what: String,
        path: PathBuf,
        run_first: Option<StageId>,
    },

    /// The external process could not be started.
    #[error("failed to start {program}: {message}")]
    ToolSpawnFailed { program: String, message: String },

    /// The external process ran and exited with a non-accepted status.
    #[error(
        "{program} failed ({})",
        code.map(|c| format!("exit code {c}")).unwrap_or_else(|| "terminated by signal".into())
    )]
    ToolReportedFailure { program: String, code: Option<i32> },

    /// The external process outlived its timeout and was killed.
    #[error("{program} timed out after {after:?} and was killed")]
    ToolTimedOut { program: String, after: Duration },

    /// Verification found no packaged artifact.
    #[error("no .apk artifact found in {}", dir.display())]
    NoArtifactFound { dir: PathBuf },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a precondition failure for a missing path.
    pub fn precondition(stage: StageId, what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::PreconditionFailed {
            stage,
            what: what.into(),
            path: path.into(),
            run_first: None,
        }
    }

    /// Attach a "run this stage first" hint to a precondition failure.
    #[must_use]
    pub fn run_first(self, upstream: Option<StageId>) -> Self {
        match self {
            Self::PreconditionFailed {
                stage, what, path, ..
            } => Self::PreconditionFailed {
                stage,
                what,
                path,
                run_first: upstream,
            },
            other => other,
        }
    }

    /// Process exit status the CLI should terminate with for this failure.
    ///
    /// A tool's own non-zero exit code is propagated verbatim when it fits a
    /// process status; everything else maps to [`GENERIC_FAILURE_EXIT_CODE`].
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ToolReportedFailure {
                code: Some(code), ..
            } if (1..=255).contains(code) => *code,
            _ => GENERIC_FAILURE_EXIT_CODE,
        }
    }
}
