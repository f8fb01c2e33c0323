//! External process execution with streamed, merged output.

use std::ffi::{OsStr, OsString};
use std::future::Future;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use os_pipe::PipeReader;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::debug;

use cocosbuild_shared::{PipelineError, PipelineLog, Result};

use crate::decode::decode_line;
use crate::policy::ToolKind;

// ---------------------------------------------------------------------------
// Command description
// ---------------------------------------------------------------------------

/// One external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable to spawn (no shell is involved).
    pub program: PathBuf,
    /// Arguments passed verbatim.
    pub args: Vec<OsString>,
    /// Working directory; inherited from this process when `None`.
    pub cwd: Option<PathBuf>,
    /// Selects the exit-code policy.
    pub kind: ToolKind,
    /// Tag attached to every streamed output line (e.g. `GIT`).
    pub label: String,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, kind: ToolKind, label: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            kind,
            label: label.into(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Short program name for diagnostics.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Human-readable command line, quoting arguments that contain spaces.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| {
                let part = part.to_string_lossy();
                if part.contains(' ') {
                    format!("\"{part}\"")
                } else {
                    part.into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How an external process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process exited normally with `code`.
    Exited { code: i32, kind: ToolKind },
    /// The process was terminated without an exit code (e.g. by a signal).
    Signaled { kind: ToolKind },
    /// The process outlived the runner's timeout and was killed.
    TimedOut { after: Duration },
    /// The process could not be started, or its status could not be collected.
    SpawnFailed { message: String },
}

impl ProcessOutcome {
    /// Whether the tool's exit-code policy counts this outcome as success.
    pub fn success(&self) -> bool {
        match self {
            Self::Exited { code, kind } => kind.accepts(*code),
            _ => false,
        }
    }

    /// Convert into the pipeline error taxonomy.
    pub fn into_result(self, program: &str) -> Result<()> {
        match self {
            Self::Exited { code, kind } if kind.accepts(code) => Ok(()),
            Self::Exited { code, .. } => Err(PipelineError::ToolReportedFailure {
                program: program.to_string(),
                code: Some(code),
            }),
            Self::Signaled { .. } => Err(PipelineError::ToolReportedFailure {
                program: program.to_string(),
                code: None,
            }),
            Self::TimedOut { after } => Err(PipelineError::ToolTimedOut {
                program: program.to_string(),
                after,
            }),
            Self::SpawnFailed { message } => Err(PipelineError::ToolSpawnFailed {
                program: program.to_string(),
                message,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Executes external commands. Stages are generic over this seam so tests can
/// substitute a scripted runner.
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion, forwarding its output to `log` line by line.
    fn run(
        &self,
        spec: &CommandSpec,
        log: &dyn PipelineLog,
    ) -> impl Future<Output = ProcessOutcome> + Send;
}

/// Runs real processes through `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill processes that run longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec, log: &dyn PipelineLog) -> ProcessOutcome {
        log.info(&format!("executing: {}", spec.command_line()));

        let (mut child, output) = match spawn_merged(spec) {
            Ok(spawned) => spawned,
            Err(e) => {
                let outcome = ProcessOutcome::SpawnFailed {
                    message: e.to_string(),
                };
                report(spec, &outcome, log);
                return outcome;
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        pump_lines(output, tx);

        let drained = async {
            while let Some(raw) = rx.recv().await {
                let line = decode_line(&raw);
                if !line.is_empty() {
                    log.tool_line(&spec.label, &line);
                }
            }
            child.wait().await
        };

        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, drained).await.ok(),
            None => Some(drained.await),
        };

        let outcome = match waited {
            Some(Ok(status)) => match status.code() {
                Some(code) => ProcessOutcome::Exited {
                    code,
                    kind: spec.kind,
                },
                None => ProcessOutcome::Signaled { kind: spec.kind },
            },
            Some(Err(e)) => ProcessOutcome::SpawnFailed {
                message: format!("failed to wait for process: {e}"),
            },
            None => {
                terminate(&mut child).await;
                ProcessOutcome::TimedOut {
                    after: self.timeout.unwrap_or_default(),
                }
            }
        };

        report(spec, &outcome, log);
        outcome
    }
}

/// Spawn `spec` with stdout and stderr sharing one pipe, so the child's own
/// write order is the order lines are read back.
///
/// On Unix the child leads a new process group; see [`terminate`].
fn spawn_merged(spec: &CommandSpec) -> std::io::Result<(Child, PipeReader)> {
    let (reader, writer) = os_pipe::pipe()?;
    let stderr = writer.try_clone()?;

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(writer))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    #[cfg(unix)]
    command.process_group(0);

    let child = command.spawn()?;
    // `command` still owns the parent's copies of the write end; they must be
    // closed before the reader can ever see EOF.
    drop(command);
    Ok((child, reader))
}

/// Kill a timed-out child. On Unix the whole process group goes, so helpers
/// the tool started (shell wrappers, editor workers) do not outlive it. On
/// other platforms only the direct child is killed.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pgid) = child.id().and_then(|id| libc::pid_t::try_from(id).ok()) {
            // SAFETY: kill(2) takes no pointers; a negative pid addresses the
            // process group created in `spawn_merged`.
            if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
                debug!(error = %std::io::Error::last_os_error(), "process group kill failed");
            }
        }
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "kill after timeout failed");
    }
}

/// Forward raw lines from `reader` into `tx` until EOF. The pipe is a
/// blocking handle, so it is drained on the blocking pool.
fn pump_lines(reader: PipeReader, tx: mpsc::UnboundedSender<Vec<u8>>) {
    tokio::task::spawn_blocking(move || {
        let mut reader = BufReader::new(reader);
        loop {
            let mut buf = Vec::new();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(buf).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "output pipe read failed");
                    break;
                }
            }
        }
    });
}

/// Log the diagnostic line for a finished process.
fn report(spec: &CommandSpec, outcome: &ProcessOutcome, log: &dyn PipelineLog) {
    let program = spec.program_name();
    match outcome {
        ProcessOutcome::Exited { code: 0, .. } => {
            log.info(&format!("{program} finished successfully"));
        }
        ProcessOutcome::Exited { code, kind } if kind.accepts(*code) => {
            log.info(&format!(
                "{program} returned exit code {code}, accepted as success for the {kind}"
            ));
        }
        ProcessOutcome::Exited { code, .. } => {
            log.error(&format!("[ERROR] {program} failed with exit code {code}"));
        }
        ProcessOutcome::Signaled { .. } => {
            log.error(&format!("[ERROR] {program} was terminated without an exit code"));
        }
        ProcessOutcome::TimedOut { after } => {
            log.error(&format!(
                "[ERROR] {program} did not finish within {after:?} and was killed"
            ));
        }
        ProcessOutcome::SpawnFailed { message } => {
            log.error(&format!("[ERROR] could not run {program}: {message}"));
        }
    }
}
