//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cocosbuild_core::{Pipeline, PipelineOptions, PipelinePlan};
use cocosbuild_runner::SystemRunner;
use cocosbuild_shared::{
    BuildMode, BuildParameters, DEFAULT_CONFIG_FILE, GENERIC_FAILURE_EXIT_CODE, GitFailurePolicy,
    Settings, StageId, TracingLog, init_settings, load_settings,
};
use color_eyre::eyre::Result;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// cocosbuild: staged Cocos Creator to Android APK build pipeline.
#[derive(Parser)]
#[command(
    name = "cocosbuild",
    version,
    about = "Update, generate, package, and verify a Cocos Creator Android build.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Build parameter file (defaults to the settings' params_file).
    #[arg(long, global = true, env = "COCOSBUILD_PARAMS")]
    pub params: Option<PathBuf>,

    /// Settings file (defaults to ~/.cocosbuild/cocosbuild.toml).
    #[arg(long, global = true, env = "COCOSBUILD_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Kill any external tool still running after this many seconds.
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Whether a failed git_update halts a multi-stage run: abort or continue.
    #[arg(long, global = true)]
    pub on_git_failure: Option<GitFailurePolicy>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Reset, clean, and pull the project working tree.
    #[command(name = "git_update")]
    GitUpdate,

    /// Generate the Android project with Cocos Creator.
    #[command(name = "cocos_build")]
    CocosBuild,

    /// Package the APK with the Gradle wrapper.
    #[command(name = "apk_build")]
    ApkBuild,

    /// Check that the APK was produced.
    #[command(name = "verify_build")]
    VerifyBuild,

    /// Run every stage in order: git_update, cocos_build, apk_build, verify_build.
    All,

    /// Generate and package from explicit paths instead of a parameter file.
    Build {
        /// Cocos Creator executable.
        #[arg(long)]
        creator: PathBuf,

        /// Cocos project root.
        #[arg(long)]
        project: PathBuf,

        /// Build configuration file name, relative to the project.
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: String,

        /// Gradle build mode: debug or release.
        #[arg(long, default_value = "release")]
        mode: BuildMode,

        /// Update the working tree with git before building.
        #[arg(long)]
        git_update: bool,
    },

    /// Settings management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a settings file with defaults.
    Init,
    /// Show resolved settings.
    Show,
}

/// Print a clap error and map it to the process status: help and version
/// exit 0, every usage error exits 1.
pub(crate) fn usage_error(err: &clap::Error) -> ExitCode {
    let _ = err.print();
    if err.use_stderr() {
        exit_code(GENERIC_FAILURE_EXIT_CODE)
    } else {
        ExitCode::SUCCESS
    }
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = ["cocosbuild", "cocosbuild_shared", "cocosbuild_runner", "cocosbuild_core"]
        .map(|target| format!("{target}={level}"))
        .join(",");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// What a pipeline command resolved to.
enum Job {
    /// Stages with parameters from the parameter file.
    Stages(PipelinePlan),
    /// Generate + package with parameters from flags.
    Build {
        params: BuildParameters,
        git_update: bool,
    },
}

/// Run the CLI command and return the process exit status.
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    let Cli {
        params,
        settings: settings_path,
        timeout,
        on_git_failure,
        command,
        ..
    } = cli;

    let job = match command {
        Command::Config { action } => {
            match action {
                ConfigAction::Init => cmd_config_init(settings_path.as_deref())?,
                ConfigAction::Show => cmd_config_show(settings_path.as_deref())?,
            }
            return Ok(ExitCode::SUCCESS);
        }
        Command::GitUpdate => Job::Stages(PipelinePlan::single(StageId::GitUpdate)),
        Command::CocosBuild => Job::Stages(PipelinePlan::single(StageId::CocosBuild)),
        Command::ApkBuild => Job::Stages(PipelinePlan::single(StageId::ApkBuild)),
        Command::VerifyBuild => Job::Stages(PipelinePlan::single(StageId::VerifyBuild)),
        Command::All => Job::Stages(PipelinePlan::all()),
        Command::Build {
            creator,
            project,
            config,
            mode,
            git_update,
        } => Job::Build {
            params: BuildParameters::new(creator, project, config, mode),
            git_update,
        },
    };

    let mut settings = load_settings(settings_path.as_deref())?;
    if let Some(secs) = timeout {
        settings.runner.timeout_secs = Some(secs);
    }
    if let Some(policy) = on_git_failure {
        settings.git.on_failure = policy;
    }

    let code = match job {
        Job::Stages(plan) => {
            let params_file =
                params.unwrap_or_else(|| PathBuf::from(&settings.defaults.params_file));
            cmd_stages(plan, &params_file, &settings).await
        }
        Job::Build { params, git_update } => cmd_build(&params, git_update, &settings).await,
    };

    Ok(exit_code(code))
}

/// Run a plan with parameters loaded from `params_file`.
async fn cmd_stages(plan: PipelinePlan, params_file: &Path, settings: &Settings) -> i32 {
    let runner = SystemRunner::new().with_timeout(settings.runner.timeout());
    let log = TracingLog;
    let pipeline = Pipeline::new(&runner, &log, PipelineOptions::from(settings));

    info!(plan = plan.name(), params = %params_file.display(), "starting pipeline");
    match pipeline.run_from_file(&plan, params_file).await {
        Ok(report) => report.exit_code(),
        Err(e) => e.exit_code(),
    }
}

/// Run the flag-driven generate + package plan.
async fn cmd_build(params: &BuildParameters, git_update: bool, settings: &Settings) -> i32 {
    let runner = SystemRunner::new().with_timeout(settings.runner.timeout());
    let log = TracingLog;
    let pipeline = Pipeline::new(&runner, &log, PipelineOptions::from(settings));

    info!(
        creator = %params.creator_path.display(),
        project = %params.project_path.display(),
        config = %params.config_path,
        mode = %params.build_mode,
        git_update,
        "starting build"
    );

    let plan = PipelinePlan::build(git_update);
    let report = pipeline.run(&plan, params).await;
    if report.success() {
        info!(apk_dir = %params.apk_output_dir().display(), "apk output directory");
    }
    report.exit_code()
}

fn cmd_config_init(path: Option<&Path>) -> Result<()> {
    let path = init_settings(path)?;
    println!("Settings initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let settings: Settings = load_settings(path)?;
    let toml_str = toml::to_string_pretty(&settings)?;
    println!("{toml_str}");
    Ok(())
}
