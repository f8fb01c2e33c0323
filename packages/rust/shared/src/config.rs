//! Pipeline settings for cocosbuild.
//!
//! Settings live at `~/.cocosbuild/cocosbuild.toml`.
//! CLI flags override settings file values, which override defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::params::DEFAULT_PARAMS_FILE;

/// Default settings file name.
const SETTINGS_FILE_NAME: &str = "cocosbuild.toml";

/// Default settings directory name under the user's home.
const SETTINGS_DIR_NAME: &str = ".cocosbuild";

// ---------------------------------------------------------------------------
// Settings structs (matching cocosbuild.toml schema)
// ---------------------------------------------------------------------------

/// Top-level pipeline settings, deserialized from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsSettings,

    /// External process settings.
    #[serde(default)]
    pub runner: RunnerSettings,

    /// Version-control stage settings.
    #[serde(default)]
    pub git: GitSettings,
}

/// `[defaults]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsSettings {
    /// Build parameter file used when `--params` is not given.
    #[serde(default = "default_params_file")]
    pub params_file: String,
}

impl Default for DefaultsSettings {
    fn default() -> Self {
        Self {
            params_file: default_params_file(),
        }
    }
}

fn default_params_file() -> String {
    DEFAULT_PARAMS_FILE.into()
}

/// `[runner]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerSettings {
    /// Kill any external process still running after this many seconds.
    /// Absent means wait indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl RunnerSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// `[git]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitSettings {
    /// Version-control client executable.
    #[serde(default = "default_git_program")]
    pub program: String,

    /// What a pipeline does when its `git_update` step fails.
    #[serde(default)]
    pub on_failure: GitFailurePolicy,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            program: default_git_program(),
            on_failure: GitFailurePolicy::default(),
        }
    }
}

fn default_git_program() -> String {
    "git".into()
}

/// Whether a failed `git_update` inside a multi-stage plan halts the plan.
///
/// A standalone `git_update` invocation always fails the run regardless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitFailurePolicy {
    #[default]
    Abort,
    Continue,
}

impl fmt::Display for GitFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.write_str("abort"),
            Self::Continue => f.write_str("continue"),
        }
    }
}

impl FromStr for GitFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(format!(
                "unknown git failure policy {other:?}: expected \"abort\" or \"continue\""
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings loading
// ---------------------------------------------------------------------------

/// Get the path to the settings directory (`~/.cocosbuild/`).
pub fn settings_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PipelineError::config("could not determine home directory"))?;
    Ok(home.join(SETTINGS_DIR_NAME))
}

/// Get the path to the settings file (`~/.cocosbuild/cocosbuild.toml`).
pub fn settings_file_path() -> Result<PathBuf> {
    Ok(settings_dir()?.join(SETTINGS_FILE_NAME))
}

/// Load settings from `path`, or from the default location when `None`.
/// Returns defaults if the file does not exist.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => settings_file_path()?,
    };

    if !path.exists() {
        tracing::debug!(?path, "settings file not found, using defaults");
        return Ok(Settings::default());
    }

    load_settings_from(&path)
}

/// Load settings from a specific file path.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PipelineError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Write a default settings file to `path` (or the default location).
/// Returns the path to the created file.
pub fn init_settings(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => settings_file_path()?,
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&Settings::default())
        .map_err(|e| PipelineError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PipelineError::io(&path, e))?;
    tracing::info!(?path, "created default settings file");

    Ok(path)
}
