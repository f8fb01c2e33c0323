//! Pipeline driver: parameters → stages → report → exit status.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{Instrument, info_span};

use cocosbuild_runner::CommandRunner;
use cocosbuild_shared::{
    BuildParameters, GitFailurePolicy, PipelineError, PipelineLog, Result, RunId, Settings,
    StageId, load_build_params,
};

use crate::stages::{self, StageContext};

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// An ordered list of stages to run in one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    name: String,
    stages: Vec<StageId>,
    require_config_file: bool,
}

impl PipelinePlan {
    /// Exactly one stage.
    pub fn single(stage: StageId) -> Self {
        Self {
            name: stage.as_str().to_string(),
            stages: vec![stage],
            require_config_file: false,
        }
    }

    /// Every stage in dependency order.
    pub fn all() -> Self {
        Self {
            name: "all".to_string(),
            stages: StageId::ALL.to_vec(),
            require_config_file: false,
        }
    }

    /// Generate and package from explicit parameters, optionally updating the
    /// working tree first. The build configuration file must exist.
    pub fn build(with_git_update: bool) -> Self {
        let mut stages = Vec::with_capacity(3);
        if with_git_update {
            stages.push(StageId::GitUpdate);
        }
        stages.extend([StageId::CocosBuild, StageId::ApkBuild]);
        Self {
            name: "build".to_string(),
            stages,
            require_config_file: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[StageId] {
        &self.stages
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of one stage execution.
#[derive(Debug)]
pub struct StageResult {
    pub stage: StageId,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub failure: Option<PipelineError>,
}

/// Outcome of a whole plan.
#[derive(Debug)]
pub struct PipelineReport {
    pub run_id: RunId,
    pub plan: String,
    pub results: Vec<StageResult>,
    pub elapsed: Duration,
    /// Index into `results` of the failure that halted the run.
    fatal: Option<usize>,
}

impl PipelineReport {
    pub fn success(&self) -> bool {
        self.fatal.is_none()
    }

    /// The stage result that failed the run, if any.
    pub fn fatal_failure(&self) -> Option<&StageResult> {
        self.fatal.and_then(|i| self.results.get(i))
    }

    /// Process exit status for this run: 0 on success, otherwise the failing
    /// stage's error code.
    pub fn exit_code(&self) -> i32 {
        self.fatal_failure()
            .and_then(|r| r.failure.as_ref())
            .map_or(0, PipelineError::exit_code)
    }
}

/// Format a duration as `HH:MM:SS`.
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Driver options resolved from settings and CLI flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Version-control client executable.
    pub git_program: String,
    /// Whether a failed `git_update` halts a multi-stage plan.
    pub git_failure: GitFailurePolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for PipelineOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            git_program: settings.git.program.clone(),
            git_failure: settings.git.on_failure,
        }
    }
}

/// Runs plans sequentially against one runner and log sink.
pub struct Pipeline<'a, R: CommandRunner> {
    runner: &'a R,
    log: &'a dyn PipelineLog,
    options: PipelineOptions,
}

impl<'a, R: CommandRunner> Pipeline<'a, R> {
    pub fn new(runner: &'a R, log: &'a dyn PipelineLog, options: PipelineOptions) -> Self {
        Self {
            runner,
            log,
            options,
        }
    }

    /// Load parameters from `params_file`, then run `plan`.
    ///
    /// Fails before any stage runs when the parameter file is missing or
    /// malformed.
    pub async fn run_from_file(&self, plan: &PipelinePlan, params_file: &Path) -> Result<PipelineReport> {
        let params = load_build_params(params_file, self.log).inspect_err(|e| {
            self.log.error(&format!("[ERROR] {e}"));
        })?;
        Ok(self.run(plan, &params).await)
    }

    /// Run `plan` with already-resolved parameters.
    pub async fn run(&self, plan: &PipelinePlan, params: &BuildParameters) -> PipelineReport {
        let run_id = RunId::new();
        let span = info_span!("pipeline", run_id = %run_id, plan = plan.name());
        self.execute(run_id, plan, params).instrument(span).await
    }

    async fn execute(&self, run_id: RunId, plan: &PipelinePlan, params: &BuildParameters) -> PipelineReport {
        let start = Instant::now();
        let ctx = StageContext {
            params,
            runner: self.runner,
            log: self.log,
            git_program: &self.options.git_program,
            require_config_file: plan.require_config_file,
        };

        let mut results = Vec::with_capacity(plan.stages.len());
        let mut fatal = None;

        for (i, &stage) in plan.stages.iter().enumerate() {
            let result = self.run_stage(stage, &ctx).await;
            let failed = !result.success;
            results.push(result);

            if !failed {
                continue;
            }

            let more_to_run = i + 1 < plan.stages.len();
            if stage == StageId::GitUpdate
                && more_to_run
                && self.options.git_failure == GitFailurePolicy::Continue
            {
                self.log.warn(
                    "[WARN] git_update failed; continuing with the working tree as is (git on_failure = continue)",
                );
                continue;
            }

            fatal = Some(results.len() - 1);
            break;
        }

        let report = PipelineReport {
            run_id,
            plan: plan.name.clone(),
            results,
            elapsed: start.elapsed(),
            fatal,
        };
        self.summarize(&report);
        report
    }

    async fn run_stage(&self, stage: StageId, ctx: &StageContext<'_, R>) -> StageResult {
        self.log.info(&format!("STAGE: {stage}"));
        let started_at = Utc::now();
        let start = Instant::now();

        let outcome = stages::run_stage(stage, ctx).await;
        let duration = start.elapsed();

        match outcome {
            Ok(()) => {
                self.log
                    .info(&format!("{stage} succeeded in {}", format_hms(duration)));
                StageResult {
                    stage,
                    success: true,
                    started_at,
                    duration,
                    failure: None,
                }
            }
            Err(e) => {
                self.log.error(&format!("[ERROR] {e}"));
                StageResult {
                    stage,
                    success: false,
                    started_at,
                    duration,
                    failure: Some(e),
                }
            }
        }
    }

    fn summarize(&self, report: &PipelineReport) {
        if report.results.len() > 1 {
            for result in &report.results {
                let status = if result.success { "ok" } else { "FAILED" };
                self.log.info(&format!(
                    "  {:<13} {status:<6} {} (started {})",
                    result.stage.as_str(),
                    format_hms(result.duration),
                    result.started_at.format("%Y-%m-%d %H:%M:%S")
                ));
            }
        }

        let elapsed = format_hms(report.elapsed);
        match report.fatal_failure() {
            None => self
                .log
                .info(&format!("operation {} finished, elapsed: {elapsed}", report.plan)),
            Some(failed) => self.log.error(&format!(
                "operation {} failed at {}, elapsed: {elapsed}",
                report.plan, failed.stage
            )),
        }
    }
}
