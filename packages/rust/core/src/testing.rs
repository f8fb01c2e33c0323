//! Test doubles shared by the stage and pipeline tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use cocosbuild_runner::{CommandRunner, CommandSpec, ProcessOutcome};
use cocosbuild_shared::{BuildMode, BuildParameters, DEFAULT_CONFIG_FILE, PipelineLog};
use tempfile::TempDir;

/// Replays scripted outcomes in order and records every command it receives.
/// Once the script is exhausted every command exits 0.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    script: Mutex<VecDeque<ProcessOutcome>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub(crate) fn new(script: impl IntoIterator<Item = ProcessOutcome>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::default(),
        }
    }

    pub(crate) fn succeeding() -> Self {
        Self::default()
    }

    pub(crate) fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec, log: &dyn PipelineLog) -> ProcessOutcome {
        log.info(&format!("executing: {}", spec.command_line()));
        self.calls.lock().unwrap().push(spec.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            // the policy always comes from the command being run
            Some(ProcessOutcome::Exited { code, .. }) => ProcessOutcome::Exited {
                code,
                kind: spec.kind,
            },
            Some(other) => other,
            None => ProcessOutcome::Exited {
                code: 0,
                kind: spec.kind,
            },
        }
    }
}

/// A scratch directory holding `project/` and a `creator` executable stand-in.
pub(crate) struct ProjectFixture {
    dir: TempDir,
}

impl ProjectFixture {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("project")).unwrap();
        std::fs::write(dir.path().join("creator"), "").unwrap();
        Self { dir }
    }

    pub(crate) fn root(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn project(&self) -> PathBuf {
        self.root().join("project")
    }

    pub(crate) fn params(&self, mode: BuildMode) -> BuildParameters {
        BuildParameters::new(
            self.root().join("creator"),
            self.project(),
            DEFAULT_CONFIG_FILE,
            mode,
        )
    }

    /// Create the Gradle project Cocos Creator would generate.
    pub(crate) fn android_project(&self) -> PathBuf {
        let dir = self.params(BuildMode::Release).android_project_dir();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Create the APK output directory Gradle would fill for `mode`.
    pub(crate) fn apk_dir(&self, mode: BuildMode) -> PathBuf {
        let dir = self.params(mode).apk_output_dir();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
