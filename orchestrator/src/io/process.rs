//! Child process launch and supervision with timeout and stall detection.
//!
//! The supervisor polls the child at a short fixed interval. Each tick checks
//! the wall-clock limit first, then whether either capture file has grown
//! since the last observed change. Cancellation is a forceful kill.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::{ProcessExit, Supervision};

/// Everything needed to start one task command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

/// Liveness as seen by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Exited(ProcessExit),
}

/// A started process the supervisor can poll and kill.
pub trait ProcessHandle {
    /// Wait up to `wait` for the process to exit.
    fn poll(&mut self, wait: Duration) -> Result<ProcessStatus>;
    /// Kill the process and reap it.
    fn kill(&mut self) -> Result<ProcessExit>;
}

/// Abstraction over process backends so tests can script child behavior.
pub trait Launcher {
    type Handle: ProcessHandle;
    fn launch(&self, spec: &LaunchSpec) -> Result<Self::Handle>;
}

/// Limits enforced while a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisionLimits {
    pub max_runtime: Duration,
    pub no_progress: Option<Duration>,
    pub poll_interval: Duration,
}

/// Launcher backed by `std::process::Command`.
pub struct SystemLauncher;

pub struct ChildHandle {
    child: Child,
}

impl Launcher for SystemLauncher {
    type Handle = ChildHandle;

    #[instrument(skip_all, fields(program = %spec.program))]
    fn launch(&self, spec: &LaunchSpec) -> Result<ChildHandle> {
        let stdout = open_capture(&spec.stdout_path)?;
        let stderr = open_capture(&spec.stderr_path)?;
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .with_context(|| format!("spawn {}", spec.program))?;
        debug!(pid = child.id(), "child process spawned");
        Ok(ChildHandle { child })
    }
}

impl ProcessHandle for ChildHandle {
    fn poll(&mut self, wait: Duration) -> Result<ProcessStatus> {
        match self.child.wait_timeout(wait).context("wait for child")? {
            Some(status) => Ok(ProcessStatus::Exited(exit_from_status(status))),
            None => Ok(ProcessStatus::Running),
        }
    }

    fn kill(&mut self) -> Result<ProcessExit> {
        if let Err(err) = self.child.kill() {
            warn!(err = %err, "kill failed; child may have already exited");
        }
        let status = self.child.wait().context("wait child after kill")?;
        Ok(exit_from_status(status))
    }
}

fn open_capture(path: &Path) -> Result<File> {
    fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("open capture file {}", path.display()))
}

#[cfg(unix)]
fn exit_from_status(status: ExitStatus) -> ProcessExit {
    use std::os::unix::process::ExitStatusExt;
    ProcessExit {
        code: status.code(),
        signal: status.signal(),
    }
}

#[cfg(not(unix))]
fn exit_from_status(status: ExitStatus) -> ProcessExit {
    ProcessExit {
        code: status.code(),
        signal: None,
    }
}

/// Poll `handle` until it exits, exceeds `max_runtime`, or stops producing output.
///
/// `watched` are the capture files whose combined growth counts as progress.
/// Timeout is checked before stall on every tick, so the two outcomes never
/// both apply.
#[instrument(skip_all, fields(max_runtime = ?limits.max_runtime, no_progress = ?limits.no_progress))]
pub fn supervise<H: ProcessHandle>(
    handle: &mut H,
    limits: &SupervisionLimits,
    watched: &[&Path],
) -> Result<Supervision> {
    let started = Instant::now();
    let mut last_size = combined_size(watched);
    let mut last_growth = started;

    loop {
        let elapsed = started.elapsed();
        let wait = limits
            .poll_interval
            .min(limits.max_runtime.saturating_sub(elapsed));
        let status = match handle.poll(wait) {
            Ok(status) => status,
            Err(err) => {
                warn!(err = %err, "poll failed, killing child");
                if let Err(kill_err) = handle.kill() {
                    warn!(err = %kill_err, "kill after poll failure failed");
                }
                return Err(err.context("poll child"));
            }
        };
        if let ProcessStatus::Exited(exit) = status {
            debug!(code = ?exit.code, signal = ?exit.signal, "child exited");
            return Ok(Supervision::Exited(exit));
        }

        let now = Instant::now();
        if now.duration_since(started) >= limits.max_runtime {
            warn!("runtime limit reached, killing child");
            let exit = handle.kill()?;
            return Ok(Supervision::TimedOut(exit));
        }

        if let Some(stall) = limits.no_progress {
            let size = combined_size(watched);
            if size != last_size {
                last_size = size;
                last_growth = now;
            } else if now.duration_since(last_growth) >= stall {
                warn!("no output growth, killing child");
                let exit = handle.kill()?;
                return Ok(Supervision::Stalled(exit));
            }
        }
    }
}

fn combined_size(paths: &[&Path]) -> u64 {
    paths
        .iter()
        .map(|path| fs::metadata(path).map(|meta| meta.len()).unwrap_or(0))
        .sum()
}
