//! The four pipeline stages.
//!
//! Each stage checks its own preconditions, runs its external tools through a
//! [`CommandRunner`], and reports failure as an error value. Stages never
//! terminate the process and never change the process working directory.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::instrument;

use cocosbuild_runner::{CommandRunner, CommandSpec, ToolKind};
use cocosbuild_shared::{BuildParameters, PipelineError, PipelineLog, Result, StageId};

/// Gradle wrapper script inside the generated Android project.
pub const GRADLE_WRAPPER: &str = if cfg!(windows) { "gradlew.bat" } else { "gradlew" };

/// File-name suffix of packaged artifacts.
pub const ARTIFACT_SUFFIX: &str = ".apk";

/// `git` invocations run by `git_update`, in order.
const GIT_STEPS: [&[&str]; 3] = [&["checkout", "."], &["clean", "-xdf"], &["pull"]];

/// Everything a stage needs to run.
pub struct StageContext<'a, R: CommandRunner> {
    pub params: &'a BuildParameters,
    pub runner: &'a R,
    pub log: &'a dyn PipelineLog,
    /// Version-control client executable.
    pub git_program: &'a str,
    /// Fail `cocos_build` up front when the build configuration file is absent.
    pub require_config_file: bool,
}

/// A packaged artifact found by `verify_build`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl Artifact {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Dispatch a stage by id.
pub async fn run_stage<R: CommandRunner>(stage: StageId, ctx: &StageContext<'_, R>) -> Result<()> {
    match stage {
        StageId::GitUpdate => git_update(ctx).await,
        StageId::CocosBuild => cocos_build(ctx).await,
        StageId::ApkBuild => apk_build(ctx).await,
        StageId::VerifyBuild => verify_build(ctx).await.map(|_| ()),
    }
}

/// Reset, clean, and pull the project working tree. Stops at the first
/// failing git command.
#[instrument(skip_all, fields(project = %ctx.params.project_path.display()))]
pub async fn git_update<R: CommandRunner>(ctx: &StageContext<'_, R>) -> Result<()> {
    let project = &ctx.params.project_path;
    require_path(StageId::GitUpdate, "project directory", project)?;

    for args in GIT_STEPS {
        let step = args.join(" ");
        ctx.log.info(&format!("running git {step}"));
        let spec = CommandSpec::new(ctx.git_program, ToolKind::Generic, "GIT")
            .args(args)
            .current_dir(project);
        run_tool(ctx, spec).await?;
        ctx.log.info(&format!("git {step} done"));
    }

    ctx.log.info("git update complete");
    Ok(())
}

/// Generate the native Android project with Cocos Creator.
#[instrument(skip_all, fields(creator = %ctx.params.creator_path.display()))]
pub async fn cocos_build<R: CommandRunner>(ctx: &StageContext<'_, R>) -> Result<()> {
    let params = ctx.params;
    require_path(StageId::CocosBuild, "Cocos Creator executable", &params.creator_path)?;
    require_path(StageId::CocosBuild, "project directory", &params.project_path)?;

    let config_file = params.config_file();
    if ctx.require_config_file {
        require_path(StageId::CocosBuild, "build configuration file", &config_file)?;
    }

    let mut build_arg = OsString::from("configPath=");
    build_arg.push(config_file.as_os_str());

    let spec = CommandSpec::new(&params.creator_path, ToolKind::ContentBuildTool, "COCOS")
        .arg("--project")
        .arg(&params.project_path)
        .arg("--build")
        .arg(build_arg);
    run_tool(ctx, spec).await?;

    ctx.log.info("cocos project generation complete");
    Ok(())
}

/// Package the APK with the Gradle wrapper of the generated project.
#[instrument(skip_all, fields(mode = %ctx.params.build_mode))]
pub async fn apk_build<R: CommandRunner>(ctx: &StageContext<'_, R>) -> Result<()> {
    let project_dir = ctx.params.android_project_dir();
    require_path(StageId::ApkBuild, "android build directory", &project_dir)
        .map_err(|e| e.run_first(StageId::ApkBuild.depends_on()))?;

    let task = ctx.params.build_mode.gradle_task();
    ctx.log.info(&format!("running gradle {task} in {}", project_dir.display()));

    let spec = CommandSpec::new(project_dir.join(GRADLE_WRAPPER), ToolKind::PackagingTool, "GRADLE")
        .arg(task)
        .current_dir(&project_dir);
    run_tool(ctx, spec).await?;

    ctx.log.info("apk packaging complete");
    Ok(())
}

/// Check that at least one APK was produced for the configured build mode.
#[instrument(skip_all, fields(mode = %ctx.params.build_mode))]
pub async fn verify_build<R: CommandRunner>(ctx: &StageContext<'_, R>) -> Result<Vec<Artifact>> {
    let dir = ctx.params.apk_output_dir();
    ctx.log.info(&format!("checking apk output directory: {}", dir.display()));
    require_path(StageId::VerifyBuild, "apk output directory", &dir)
        .map_err(|e| e.run_first(StageId::VerifyBuild.depends_on()))?;

    let artifacts = find_artifacts(&dir).await?;
    if artifacts.is_empty() {
        return Err(PipelineError::NoArtifactFound { dir });
    }

    ctx.log.info("found apk files:");
    for artifact in &artifacts {
        let name = artifact
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ctx.log.info(&format!(
            "  {name} ({} bytes, {:.2} MB)",
            artifact.size_bytes,
            artifact.size_mb()
        ));
    }

    ctx.log.info("build verification complete");
    Ok(artifacts)
}

/// Regular files in `dir` whose name ends with the artifact suffix, sorted by
/// name. A file named just `.apk` counts.
async fn find_artifacts(dir: &Path) -> Result<Vec<Artifact>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| PipelineError::io(dir, e))?;

    let mut artifacts = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PipelineError::io(dir, e))?
    {
        if !entry
            .file_name()
            .to_string_lossy()
            .ends_with(ARTIFACT_SUFFIX)
        {
            continue;
        }
        let path = entry.path();
        let meta = entry
            .metadata()
            .await
            .map_err(|e| PipelineError::io(&path, e))?;
        if meta.is_file() {
            artifacts.push(Artifact {
                path,
                size_bytes: meta.len(),
            });
        }
    }

    artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(artifacts)
}

fn require_path(stage: StageId, what: &str, path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(PipelineError::precondition(stage, what, path))
    }
}

async fn run_tool<R: CommandRunner>(ctx: &StageContext<'_, R>, spec: CommandSpec) -> Result<()> {
    let program = spec.program_name();
    ctx.runner.run(&spec, ctx.log).await.into_result(&program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedRunner, ProjectFixture};
    use cocosbuild_runner::ProcessOutcome;
    use cocosbuild_shared::{BuildMode, MemoryLog};
    use tracing::Level;

    fn ctx<'a>(
        params: &'a BuildParameters,
        runner: &'a ScriptedRunner,
        log: &'a MemoryLog,
    ) -> StageContext<'a, ScriptedRunner> {
        StageContext {
            params,
            runner,
            log,
            git_program: "git",
            require_config_file: false,
        }
    }

    #[tokio::test]
    async fn git_update_runs_three_steps_in_project() {
        let fixture = ProjectFixture::new();
        let params = fixture.params(BuildMode::Release);
        let runner = ScriptedRunner::succeeding();
        let log = MemoryLog::new();

        git_update(&ctx(&params, &runner, &log)).await.unwrap();

        let calls = runner.calls();
        let argv: Vec<Vec<String>> = calls
            .iter()
            .map(|c| c.args.iter().map(|a| a.to_string_lossy().into_owned()).collect())
            .collect();
        assert_eq!(argv, vec![vec!["checkout", "."], vec!["clean", "-xdf"], vec!["pull"]]);
        for call in &calls {
            assert_eq!(call.kind, ToolKind::Generic);
            assert_eq!(call.cwd.as_deref(), Some(params.project_path.as_path()));
        }
    }

    #[tokio::test]
    async fn git_update_stops_at_failed_reset() {
        let fixture = ProjectFixture::new();
        let params = fixture.params(BuildMode::Release);
        let runner = ScriptedRunner::new([ProcessOutcome::Exited {
            code: 1,
            kind: ToolKind::Generic,
        }]);
        let log = MemoryLog::new();

        let err = git_update(&ctx(&params, &runner, &log)).await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolReportedFailure { code: Some(1), .. }));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn git_update_stops_at_failed_clean() {
        let fixture = ProjectFixture::new();
        let params = fixture.params(BuildMode::Release);
        let runner = ScriptedRunner::new([
            ProcessOutcome::Exited { code: 0, kind: ToolKind::Generic },
            ProcessOutcome::Exited { code: 128, kind: ToolKind::Generic },
        ]);
        let log = MemoryLog::new();

        assert!(git_update(&ctx(&params, &runner, &log)).await.is_err());
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn git_update_without_project_spawns_nothing() {
        let params = BuildParameters::new("/nope/creator", "/nope/project", "cfg.json", BuildMode::Release);
        let runner = ScriptedRunner::succeeding();
        let log = MemoryLog::new();

        let err = git_update(&ctx(&params, &runner, &log)).await.unwrap_err();
        assert!(matches!(err, PipelineError::PreconditionFailed { stage: StageId::GitUpdate, .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn cocos_build_passes_project_and_config_path() {
        let fixture = ProjectFixture::new();
        let params = fixture.params(BuildMode::Release);
        let runner = ScriptedRunner::new([ProcessOutcome::Exited {
            code: 36,
            kind: ToolKind::ContentBuildTool,
        }]);
        let log = MemoryLog::new();

        cocos_build(&ctx(&params, &runner, &log)).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, ToolKind::ContentBuildTool);
        assert_eq!(calls[0].program, params.creator_path);
        let expected = format!(
            "configPath={}",
            params.project_path.join("buildConfig_android.json").display()
        );
        let args: Vec<String> = calls[0].args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "--project".to_string(),
                params.project_path.display().to_string(),
                "--build".to_string(),
                expected,
            ]
        );
    }

    #[tokio::test]
    async fn cocos_build_requires_creator() {
        let fixture = ProjectFixture::new();
        let mut params = fixture.params(BuildMode::Release);
        params.creator_path = fixture.root().join("missing-creator");
        let runner = ScriptedRunner::succeeding();
        let log = MemoryLog::new();

        let err = cocos_build(&ctx(&params, &runner, &log)).await.unwrap_err();
        assert!(err.to_string().contains("Cocos Creator executable"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn cocos_build_can_require_config_file() {
        let fixture = ProjectFixture::new();
        let params = fixture.params(BuildMode::Release);
        let runner = ScriptedRunner::succeeding();
        let log = MemoryLog::new();
        let mut context = ctx(&params, &runner, &log);
        context.require_config_file = true;

        let err = cocos_build(&context).await.unwrap_err();
        assert!(err.to_string().contains("build configuration file"));

        std::fs::write(params.config_file(), "{}").unwrap();
        cocos_build(&context).await.unwrap();
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn apk_build_without_android_project_spawns_nothing() {
        let fixture = ProjectFixture::new();
        let params = fixture.params(BuildMode::Release);
        let runner = ScriptedRunner::succeeding();
        let log = MemoryLog::new();

        let err = apk_build(&ctx(&params, &runner, &log)).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::PreconditionFailed {
                stage: StageId::ApkBuild,
                run_first: Some(StageId::CocosBuild),
                ..
            }
        ));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn apk_build_runs_wrapper_with_mode_task() {
        let fixture = ProjectFixture::new();
        fixture.android_project();
        let params = fixture.params(BuildMode::Debug);
        let runner = ScriptedRunner::succeeding();
        let log = MemoryLog::new();

        apk_build(&ctx(&params, &runner, &log)).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, ToolKind::PackagingTool);
        assert_eq!(calls[0].program, params.android_project_dir().join(GRADLE_WRAPPER));
        assert_eq!(calls[0].args, vec![OsString::from("assembleDebug")]);
        assert_eq!(calls[0].cwd.as_deref(), Some(params.android_project_dir().as_path()));
    }

    #[tokio::test]
    async fn apk_build_does_not_accept_36() {
        let fixture = ProjectFixture::new();
        fixture.android_project();
        let params = fixture.params(BuildMode::Release);
        let runner = ScriptedRunner::new([ProcessOutcome::Exited {
            code: 36,
            kind: ToolKind::PackagingTool,
        }]);
        let log = MemoryLog::new();

        let err = apk_build(&ctx(&params, &runner, &log)).await.unwrap_err();
        assert_eq!(err.exit_code(), 36);
    }

    #[tokio::test]
    async fn verify_build_reports_single_apk_size() {
        let fixture = ProjectFixture::new();
        let params = fixture.params(BuildMode::Release);
        let apk_dir = fixture.apk_dir(BuildMode::Release);
        std::fs::write(apk_dir.join("app-release.apk"), vec![0u8; 2048]).unwrap();
        std::fs::write(apk_dir.join("output-metadata.json"), "{}").unwrap();
        let runner = ScriptedRunner::succeeding();
        let log = MemoryLog::new();

        let artifacts = verify_build(&ctx(&params, &runner, &log)).await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].size_bytes, 2048);
        assert!(artifacts[0].path.ends_with("app-release.apk"));
        assert!(log
            .messages(Level::INFO)
            .iter()
            .any(|m| m.contains("app-release.apk (2048 bytes")));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn verify_build_accepts_bare_suffix_name() {
        let fixture = ProjectFixture::new();
        let params = fixture.params(BuildMode::Debug);
        let apk_dir = fixture.apk_dir(BuildMode::Debug);
        std::fs::write(apk_dir.join(".apk"), b"PK").unwrap();
        std::fs::write(apk_dir.join("notes.apk.txt"), b"x").unwrap();
        let runner = ScriptedRunner::succeeding();
        let log = MemoryLog::new();

        let artifacts = verify_build(&ctx(&params, &runner, &log)).await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert!(artifacts[0].path.ends_with(".apk"));
        assert_eq!(artifacts[0].size_bytes, 2);
    }

    #[tokio::test]
    async fn verify_build_fails_on_empty_directory() {
        let fixture = ProjectFixture::new();
        let params = fixture.params(BuildMode::Release);
        let apk_dir = fixture.apk_dir(BuildMode::Release);
        std::fs::create_dir(apk_dir.join("nested.apk")).unwrap();
        let runner = ScriptedRunner::succeeding();
        let log = MemoryLog::new();

        let err = verify_build(&ctx(&params, &runner, &log)).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoArtifactFound { .. }));
    }

    #[tokio::test]
    async fn verify_build_fails_on_missing_directory() {
        let fixture = ProjectFixture::new();
        fixture.apk_dir(BuildMode::Release);
        let params = fixture.params(BuildMode::Debug);
        let runner = ScriptedRunner::succeeding();
        let log = MemoryLog::new();

        let err = verify_build(&ctx(&params, &runner, &log)).await.unwrap_err();
        assert!(err.to_string().contains("run apk_build first"));
    }
}
