//! Core domain types shared by every cocosbuild crate.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline invocation (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BuildMode
// ---------------------------------------------------------------------------

/// Packaging flavour; selects the Gradle task and the APK output directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BuildMode {
    Debug,
    #[default]
    Release,
}

impl BuildMode {
    /// Name used in parameter files and in the APK output path.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    /// Gradle task that produces this flavour.
    pub fn gradle_task(self) -> &'static str {
        match self {
            Self::Debug => "assembleDebug",
            Self::Release => "assembleRelease",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            other => Err(format!(
                "unknown build mode {other:?}: expected \"debug\" or \"release\""
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// StageId
// ---------------------------------------------------------------------------

/// The independently invocable pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    GitUpdate,
    CocosBuild,
    ApkBuild,
    VerifyBuild,
}

impl StageId {
    /// Every stage in dependency order.
    pub const ALL: [StageId; 4] = [
        Self::GitUpdate,
        Self::CocosBuild,
        Self::ApkBuild,
        Self::VerifyBuild,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitUpdate => "git_update",
            Self::CocosBuild => "cocos_build",
            Self::ApkBuild => "apk_build",
            Self::VerifyBuild => "verify_build",
        }
    }

    /// The stage whose output this stage consumes, if any.
    pub fn depends_on(self) -> Option<StageId> {
        match self {
            Self::GitUpdate | Self::CocosBuild => None,
            Self::ApkBuild => Some(Self::CocosBuild),
            Self::VerifyBuild => Some(Self::ApkBuild),
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
