//! Build parameter store.
//!
//! Parameters live in a JSON object (conventionally `build_params.json`).
//! Every supplied key is logged before defaults are overlaid so operators can
//! audit what was given versus substituted.

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};
use crate::log::PipelineLog;
use crate::types::BuildMode;

/// Conventional parameter file name, resolved against the working directory.
pub const DEFAULT_PARAMS_FILE: &str = "build_params.json";

/// Fallback Cocos Creator executable when `creator_path` is absent.
pub const DEFAULT_CREATOR_PATH: &str = "C:/ProgramData/cocos/editors/Creator/3.6.3/CocosCreator.exe";

/// Fallback project root when `project_path` is absent.
pub const DEFAULT_PROJECT_PATH: &str = "D:/work/Game363";

/// Fallback build configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "buildConfig_android.json";

/// Recognised parameter keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKey {
    CreatorPath,
    ProjectPath,
    ConfigPath,
    GameType,
}

impl ParamKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatorPath => "creator_path",
            Self::ProjectPath => "project_path",
            Self::ConfigPath => "config_path",
            Self::GameType => "game_type",
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters threaded through every stage; immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildParameters {
    /// Cocos Creator executable.
    pub creator_path: PathBuf,
    /// Game project root (a git working tree).
    pub project_path: PathBuf,
    /// Build configuration file name, relative to `project_path`.
    pub config_path: String,
    /// Debug or release packaging.
    pub build_mode: BuildMode,
    /// Unrecognised keys, kept for auditing only.
    pub extra: Map<String, Value>,
    /// Recognised keys that were filled in from defaults.
    pub defaulted: Vec<ParamKey>,
}

impl BuildParameters {
    /// Parameters given explicitly (e.g. from CLI flags); nothing is defaulted.
    pub fn new(
        creator_path: impl Into<PathBuf>,
        project_path: impl Into<PathBuf>,
        config_path: impl Into<String>,
        build_mode: BuildMode,
    ) -> Self {
        Self {
            creator_path: creator_path.into(),
            project_path: project_path.into(),
            config_path: config_path.into(),
            build_mode,
            extra: Map::new(),
            defaulted: Vec::new(),
        }
    }

    /// Absolute location of the build configuration file.
    pub fn config_file(&self) -> PathBuf {
        self.project_path.join(&self.config_path)
    }

    /// Gradle project generated by Cocos Creator.
    pub fn android_project_dir(&self) -> PathBuf {
        self.project_path.join("build").join("android").join("proj")
    }

    /// Directory Gradle writes the packaged APKs into.
    pub fn apk_output_dir(&self) -> PathBuf {
        self.android_project_dir()
            .join("app")
            .join("build")
            .join("outputs")
            .join("apk")
            .join(self.build_mode.as_str())
    }

    /// Build a parameter set from a decoded JSON object, overlaying defaults.
    pub fn from_map(mut map: Map<String, Value>, log: &dyn PipelineLog) -> Result<Self> {
        let mut defaulted = Vec::new();

        let creator_path = match take_string(&mut map, ParamKey::CreatorPath)? {
            Some(path) => path,
            None => {
                log.info(&format!("  using default creator_path: {DEFAULT_CREATOR_PATH}"));
                defaulted.push(ParamKey::CreatorPath);
                DEFAULT_CREATOR_PATH.to_string()
            }
        };

        let project_path = match take_string(&mut map, ParamKey::ProjectPath)? {
            Some(path) => path,
            None => {
                log.info(&format!("  using default project_path: {DEFAULT_PROJECT_PATH}"));
                defaulted.push(ParamKey::ProjectPath);
                DEFAULT_PROJECT_PATH.to_string()
            }
        };

        let config_path = take_string(&mut map, ParamKey::ConfigPath)?.unwrap_or_else(|| {
            defaulted.push(ParamKey::ConfigPath);
            DEFAULT_CONFIG_FILE.to_string()
        });

        let build_mode = match take_string(&mut map, ParamKey::GameType)? {
            Some(raw) => raw
                .parse::<BuildMode>()
                .map_err(|e| PipelineError::config(format!("game_type: {e}")))?,
            None => {
                defaulted.push(ParamKey::GameType);
                BuildMode::default()
            }
        };

        Ok(Self {
            creator_path: PathBuf::from(creator_path),
            project_path: PathBuf::from(project_path),
            config_path,
            build_mode,
            extra: map,
            defaulted,
        })
    }
}

/// Remove `key` from the map, requiring a string when present.
fn take_string(map: &mut Map<String, Value>, key: ParamKey) -> Result<Option<String>> {
    match map.remove(key.as_str()) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(PipelineError::config(format!(
            "{key} must be a string, got {other}"
        ))),
    }
}

/// Load build parameters from a JSON file.
///
/// Fails with [`PipelineError::ConfigMissing`] when the file does not exist.
/// Path existence is not checked here; stages verify what they dereference.
pub fn load_build_params(path: &Path, log: &dyn PipelineLog) -> Result<BuildParameters> {
    log.info("loading build parameters");

    if !path.exists() {
        return Err(PipelineError::ConfigMissing {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    let value: Value = serde_json::from_str(&content).map_err(|e| {
        PipelineError::config(format!("failed to parse {}: {e}", path.display()))
    })?;

    let Value::Object(map) = value else {
        return Err(PipelineError::config(format!(
            "{} must contain a JSON object",
            path.display()
        )));
    };

    log.info("build parameters read:");
    for (key, value) in &map {
        match value {
            Value::String(s) => log.info(&format!("  {key}: {s}")),
            other => log.info(&format!("  {key}: {other}")),
        }
    }

    BuildParameters::from_map(map, log)
}
