//! Task executor: runs one task and leaves its artifacts on disk.
//!
//! Every task gets its own directory with `stdout.log`, `stderr.log` and
//! `evidence.json` (plus `diff.patch` for no-op workers). Capture files are
//! created before anything runs so the audit trail never points at a missing
//! file, whether the task spawned a process or not.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{ProcessExit, Supervision, TaskOutcome};
use crate::core::worker::{CapturedRun, Evidence, Worker};
use crate::io::hash::hash_existing;
use crate::io::process::{LaunchSpec, Launcher, SupervisionLimits, supervise};
use crate::plan::Task;

pub const STDOUT_FILE: &str = "stdout.log";
pub const STDERR_FILE: &str = "stderr.log";
pub const EVIDENCE_FILE: &str = "evidence.json";
pub const DIFF_FILE: &str = "diff.patch";

/// Per-task parameters decided by the run loop.
#[derive(Debug, Clone)]
pub struct TaskContext<'a> {
    /// Workspace root: the child's working directory and the base for
    /// declared input/output paths.
    pub root: &'a Path,
    pub task_dir: PathBuf,
    pub plan_id: &'a str,
    pub correlation_id: &'a str,
    /// Effective wall-clock limit (task limit capped by remaining budget).
    pub max_runtime: Duration,
    pub poll_interval: Duration,
    pub output_limit_bytes: usize,
}

/// What the run loop needs to know after a task finished.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub task_id: String,
    pub outcome: TaskOutcome,
    pub exit: Option<ProcessExit>,
    pub runtime_seconds: f64,
    pub files_touched: u64,
    /// Artifact path relative to the root, mapped to its SHA-256.
    pub artifacts: BTreeMap<String, String>,
    pub reason: Option<String>,
}

/// Run `task` to a terminal outcome and write its evidence.
///
/// Errors are reserved for infrastructure failures (unwritable task dir,
/// unpollable child). A command that cannot be spawned is a `failed` task.
#[instrument(skip_all, fields(task_id = %task.task_id, role = task.role.as_str()))]
pub fn execute_task<L: Launcher>(
    launcher: &L,
    task: &Task,
    ctx: &TaskContext<'_>,
) -> Result<TaskReport> {
    fs::create_dir_all(&ctx.task_dir)
        .with_context(|| format!("create task dir {}", ctx.task_dir.display()))?;
    let stdout_path = ctx.task_dir.join(STDOUT_FILE);
    let stderr_path = ctx.task_dir.join(STDERR_FILE);
    for path in [&stdout_path, &stderr_path] {
        File::create(path).with_context(|| format!("create {}", path.display()))?;
    }

    let before = snapshot_outputs(ctx.root, &task.outputs);
    let started = Instant::now();
    let supervision = match task.exec.as_deref() {
        Some(exec) => {
            let spec = LaunchSpec {
                program: exec.to_string(),
                args: substitute_placeholders(task.args(), ctx),
                workdir: ctx.root.to_path_buf(),
                stdout_path: stdout_path.clone(),
                stderr_path: stderr_path.clone(),
            };
            Some(run_command(launcher, task, &spec, ctx)?)
        }
        None => None,
    };
    let runtime_seconds = started.elapsed().as_secs_f64();

    let after = snapshot_outputs(ctx.root, &task.outputs);
    let outputs_present: Vec<String> = task
        .outputs
        .iter()
        .filter(|output| after.contains_key(*output))
        .cloned()
        .collect();
    let outputs_changed: Vec<String> = outputs_present
        .iter()
        .filter(|output| before.get(*output) != after.get(*output))
        .cloned()
        .collect();
    let captured = CapturedRun {
        supervision,
        runtime_seconds,
        outputs_present,
        outputs_changed,
    };

    let worker = Worker::dispatch(task.role, &task.allowed_operations);
    let report = worker.execute(task, &captured);
    let mut evidence = report.evidence;
    let mut reason = None;

    if matches!(supervision, Some(Supervision::SpawnFailed)) {
        reason = Some("spawn_failed".to_string());
    }
    let file_limit = u64::try_from(task.max_files_touched).unwrap_or(0);
    if evidence.outcome.is_success() && evidence.files_touched > file_limit {
        warn!(
            files = evidence.files_touched,
            limit = file_limit,
            "task touched more files than allowed"
        );
        evidence.outcome = TaskOutcome::Failed;
        evidence.notes.push(format!(
            "touched {} files, task allows {}",
            evidence.files_touched, file_limit
        ));
        reason = Some(format!(
            "files_limit_exceeded:{}>{}",
            evidence.files_touched, file_limit
        ));
    }
    evidence.stderr_tail = read_tail(&stderr_path, ctx.output_limit_bytes)?;

    let evidence_path = ctx.task_dir.join(EVIDENCE_FILE);
    write_json(&evidence_path, &evidence)?;
    let diff_path = ctx.task_dir.join(DIFF_FILE);
    if let Some(diff) = report.placeholder_diff {
        fs::write(&diff_path, diff).with_context(|| format!("write {}", diff_path.display()))?;
    }

    let mut artifacts = hash_existing(
        [&stdout_path, &stderr_path, &evidence_path, &diff_path]
            .into_iter()
            .map(|path| (relative_label(ctx.root, path), path.as_path())),
    );
    artifacts.extend(after);

    info!(
        outcome = %evidence.outcome,
        runtime_seconds = evidence.runtime_seconds,
        files_touched = evidence.files_touched,
        "task finished"
    );
    Ok(report_from(evidence, supervision, artifacts, reason))
}

fn run_command<L: Launcher>(
    launcher: &L,
    task: &Task,
    spec: &LaunchSpec,
    ctx: &TaskContext<'_>,
) -> Result<Supervision> {
    let mut handle = match launcher.launch(spec) {
        Ok(handle) => handle,
        Err(err) => {
            warn!(program = %spec.program, err = %err, "spawn failed");
            let mut stderr = OpenOptions::new()
                .append(true)
                .open(&spec.stderr_path)
                .with_context(|| format!("open {}", spec.stderr_path.display()))?;
            writeln!(stderr, "orchestrator: failed to spawn {}: {err:#}", spec.program)
                .with_context(|| format!("write {}", spec.stderr_path.display()))?;
            return Ok(Supervision::SpawnFailed);
        }
    };
    let limits = SupervisionLimits {
        max_runtime: ctx.max_runtime,
        no_progress: task
            .no_progress_seconds
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
        poll_interval: ctx.poll_interval,
    };
    debug!(args = ?spec.args, "supervising task command");
    supervise(
        &mut handle,
        &limits,
        &[spec.stdout_path.as_path(), spec.stderr_path.as_path()],
    )
}

/// Hashes of the declared outputs that are regular files inside `root`.
///
/// Symlinks are resolved first, so an output linked outside the root is
/// treated as absent.
fn snapshot_outputs(root: &Path, outputs: &[String]) -> BTreeMap<String, String> {
    let Ok(root) = root.canonicalize() else {
        return BTreeMap::new();
    };
    let inside: Vec<(String, PathBuf)> = outputs
        .iter()
        .filter_map(|output| {
            let resolved = root.join(output).canonicalize().ok()?;
            resolved
                .starts_with(&root)
                .then(|| (output.clone(), resolved))
        })
        .collect();
    hash_existing(
        inside
            .iter()
            .map(|(label, path)| (label.clone(), path.as_path())),
    )
}

fn substitute_placeholders(args: &[String], ctx: &TaskContext<'_>) -> Vec<String> {
    args.iter()
        .map(|arg| {
            arg.replace("{correlation_id}", ctx.correlation_id)
                .replace("{plan_id}", ctx.plan_id)
        })
        .collect()
}

fn report_from(
    evidence: Evidence,
    supervision: Option<Supervision>,
    artifacts: BTreeMap<String, String>,
    reason: Option<String>,
) -> TaskReport {
    TaskReport {
        task_id: evidence.task_id,
        outcome: evidence.outcome,
        exit: supervision.and_then(|s| s.exit()),
        runtime_seconds: evidence.runtime_seconds,
        files_touched: evidence.files_touched,
        artifacts,
        reason,
    }
}

/// Lossy UTF-8 of the last `limit` bytes of `path`; `None` when empty.
fn read_tail(path: &Path, limit: usize) -> Result<Option<String>> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    if bytes.is_empty() || limit == 0 {
        return Ok(None);
    }
    let start = bytes.len().saturating_sub(limit);
    Ok(Some(String::from_utf8_lossy(&bytes[start..]).into_owned()))
}

fn relative_label(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
