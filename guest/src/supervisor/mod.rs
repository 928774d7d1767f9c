//! Stage 2: run the embedded programs and power off.
//!
//! Programs run strictly one after another. While a program runs its output
//! is drained line by line and any orphaned process is reaped. A program
//! that can't be started is logged and skipped. Output lines are logged and
//! counted; they are only kept when capture is turned on.

mod drain;
mod reap;

use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use bluebox_shared::errors::{BlueboxError, BlueboxResult};
use bluebox_shared::Program;
use nix::fcntl::OFlag;
use nix::unistd::{pipe2, Pid};
use tracing::{error, info, warn};

use crate::system::System;

pub use drain::{Drained, Stream};
pub use reap::{ExitStatus, Reaped};

/// Outcome of one launched program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub name: String,
    pub pid: Pid,
    /// `None` if waiting for the program failed.
    pub status: Option<ExitStatus>,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
    /// Orphans reaped while this program ran.
    pub orphans_reaped: usize,
    /// Output lines, present only when the supervisor captures output.
    pub output: Option<CapturedOutput>,
}

/// Output lines of one program.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// Counters of a whole supervisor run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Programs that were started.
    pub launched: usize,
    /// Programs that could not be started.
    pub launch_failures: usize,
    /// Started programs that exited with code 0.
    pub succeeded: usize,
    pub orphans_reaped: usize,
    /// Whether power-off was requested.
    pub power_off_attempted: bool,
    /// Error of a refused power-off request.
    pub power_off_error: Option<String>,
}

impl RunSummary {
    /// True unless power-off was requested and accepted.
    pub fn machine_still_running(&self) -> bool {
        !self.power_off_attempted || self.power_off_error.is_some()
    }

    fn record(&mut self, result: &ProcessResult) {
        self.launched += 1;
        if result.status.is_some_and(|s| s.success()) {
            self.succeeded += 1;
        }
        self.orphans_reaped += result.orphans_reaped;
    }
}

/// Runs programs from a working directory and shuts the machine down.
pub struct Supervisor<S: System> {
    system: S,
    workdir: PathBuf,
    capture_output: bool,
}

impl<S: System> Supervisor<S> {
    /// Supervisor running programs from the current directory.
    pub fn new(system: S) -> Self {
        Self {
            system,
            workdir: PathBuf::from("."),
            capture_output: false,
        }
    }

    /// Run programs from `workdir` instead.
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Keep every output line in [`ProcessResult::output`].
    pub fn capturing_output(mut self) -> Self {
        self.capture_output = true;
        self
    }

    /// Run `programs` in order, then power off.
    ///
    /// Power-off is only requested when the root filesystem is a tmpfs. That
    /// keeps an accidental start on a regular system from shutting it down.
    pub async fn run(&self, programs: &[Program]) -> RunSummary {
        let on_tmpfs = match self.system.root_is_tmpfs() {
            Ok(on_tmpfs) => on_tmpfs,
            Err(e) => {
                warn!("could not determine root filesystem: {}", e);
                false
            }
        };
        if !on_tmpfs {
            warn!("root filesystem is not a tmpfs, power off will be skipped");
        }

        let mut summary = RunSummary::default();
        for program in programs {
            match self.run_program(program).await {
                Ok(result) => summary.record(&result),
                Err(e) => {
                    error!("{}", e);
                    summary.launch_failures += 1;
                }
            }
        }

        info!(
            launched = summary.launched,
            failed = summary.launch_failures,
            succeeded = summary.succeeded,
            orphans = summary.orphans_reaped,
            "all programs finished"
        );

        if on_tmpfs {
            info!("powering off");
            summary.power_off_attempted = true;
            if let Err(e) = self.system.power_off() {
                error!("{}", e);
                summary.power_off_error = Some(e.to_string());
            }
        }
        summary
    }

    /// Launch one program and wait for it while draining its output.
    pub async fn run_program(&self, program: &Program) -> BlueboxResult<ProcessResult> {
        let path = self.workdir.join(&program.name);
        let (stdout_read, stdout_write) = pipe()?;
        let (stderr_read, stderr_write) = pipe()?;

        let mut cmd = Command::new(&path);
        if let Some(arg) = program.joined_argument() {
            cmd.arg(arg);
        }
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::from(stdout_write))
            .stderr(Stdio::from(stderr_write));

        let stdout_task = drain::spawn(stdout_read, Stream::Stdout, self.capture_output);
        let stderr_task = drain::spawn(stderr_read, Stream::Stderr, self.capture_output);

        let spawned = cmd.spawn();
        // Closes our copies of the write ends so the drains see EOF.
        drop(cmd);

        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                let _ = stdout_task.await;
                let _ = stderr_task.await;
                return Err(BlueboxError::Launch(format!("{}: {}", path.display(), e)));
            }
        };

        let pid = Pid::from_raw(child.id() as i32);
        info!("started {} (PID {})", path.display(), pid);

        let reaped = tokio::task::spawn_blocking(move || reap::reap_until(pid, reap::wait_any))
            .await
            .map_err(|e| BlueboxError::Launch(format!("wait task failed: {}", e)))?;

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        // Already reaped above; dropping a std Child never waits.
        drop(child);

        match reaped.status {
            Some(status) => info!(
                stdout_lines = stdout.lines,
                stderr_lines = stderr.lines,
                orphans = reaped.orphans,
                "{} finished, {}",
                path.display(),
                status
            ),
            None => warn!("{} finished with unknown status", path.display()),
        }

        let output = match (stdout.captured, stderr.captured) {
            (Some(stdout), Some(stderr)) => Some(CapturedOutput { stdout, stderr }),
            _ => None,
        };
        Ok(ProcessResult {
            name: program.name.clone(),
            pid,
            status: reaped.status,
            stdout_lines: stdout.lines,
            stderr_lines: stderr.lines,
            orphans_reaped: reaped.orphans,
            output,
        })
    }
}

fn pipe() -> BlueboxResult<(OwnedFd, OwnedFd)> {
    pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| BlueboxError::Launch(format!("Failed to create pipe: {}", e)))
}
