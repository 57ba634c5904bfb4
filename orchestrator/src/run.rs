//! `orchestrator --dry-run` / `--execute` orchestration.
//!
//! One invocation: submit the plan, audit the validation outcome, then (in
//! execute mode) run every task in topological order under the plan's
//! budgets and failure policy.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::budget::BudgetAccount;
use crate::core::graph::{dependents_closure, topological_order};
use crate::core::types::{RunMode, TaskOutcome};
use crate::core::validator::Validation;
use crate::io::audit::{AuditEvent, AuditLog, CompletionStatus};
use crate::io::config::{CONFIG_FILE, OrchestratorConfig, WorkspacePaths, load_config};
use crate::io::executor::{TaskContext, TaskReport, execute_task};
use crate::io::process::{Launcher, SystemLauncher};
use crate::plan::{FailPolicy, Plan};
use crate::validate::submit_plan;

/// How an executed plan ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Every task succeeded.
    Completed,
    /// `partial_allowed` plan reached the end with failed or skipped tasks.
    CompletedWithFailures,
    /// A task failure under `fail_closed` or a budget overrun stopped the run.
    Aborted { reason: String },
}

/// Result of one invocation, before mapping to an exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Rejected {
        violations: Vec<String>,
    },
    DryRun {
        order: Vec<String>,
    },
    Executed {
        correlation_id: String,
        status: RunStatus,
    },
}

/// Where an invocation reads its config and keeps its state.
#[derive(Debug, Clone)]
pub struct InvocationOptions<'a> {
    pub root: &'a Path,
    /// Defaults to `<root>/orchestrator.toml`.
    pub config_path: Option<&'a Path>,
    pub mode: RunMode,
}

/// Run one invocation with real child processes.
pub fn invoke(plan_path: &Path, options: &InvocationOptions<'_>) -> Result<Invocation> {
    invoke_with(&SystemLauncher, plan_path, options)
}

/// Run one invocation with the given process backend.
#[instrument(skip_all, fields(mode = ?options.mode))]
pub fn invoke_with<L: Launcher>(
    launcher: &L,
    plan_path: &Path,
    options: &InvocationOptions<'_>,
) -> Result<Invocation> {
    let default_config = options.root.join(CONFIG_FILE);
    let config_path = options.config_path.unwrap_or(default_config.as_path());
    let cfg = load_config(config_path).context("load orchestrator config")?;
    let paths = WorkspacePaths::new(options.root, &cfg);

    let submission = submit_plan(plan_path, &paths, &cfg, options.mode, Utc::now())?;
    let mut audit = AuditLog::open(
        &paths.audit_log,
        submission.plan_id.clone(),
        &submission.correlation_id,
    )?;

    let plan = match submission.validation {
        Validation::Valid(plan) => plan,
        Validation::Rejected(violations) => {
            warn!(count = violations.len(), "plan rejected");
            audit.append(AuditEvent::PlanRejected {
                mode: options.mode,
                violations: violations.clone(),
            })?;
            return Ok(Invocation::Rejected { violations });
        }
    };

    let order = topological_order(&plan.nodes, &plan.edges)?;
    audit.append(AuditEvent::PlanValidated {
        mode: options.mode,
        order: order.clone(),
    })?;
    if options.mode == RunMode::DryRun {
        return Ok(Invocation::DryRun { order });
    }

    let status = execute_plan(launcher, &plan, &order, &paths, &cfg, &mut audit)?;
    Ok(Invocation::Executed {
        correlation_id: submission.correlation_id,
        status,
    })
}

#[derive(Debug, Default)]
struct Tally {
    succeeded: usize,
    failed: usize,
    skipped: usize,
}

/// Execute a validated plan in `order`, writing task and completion records.
///
/// Aborted runs end after their last `task_end`; `plan_complete` is only
/// written when the loop reaches the end of the order.
pub fn execute_plan<L: Launcher>(
    launcher: &L,
    plan: &Plan,
    order: &[String],
    paths: &WorkspacePaths,
    cfg: &OrchestratorConfig,
    audit: &mut AuditLog,
) -> Result<RunStatus> {
    let correlation_id = audit.correlation_id().to_string();
    let mut budget = BudgetAccount::new(plan.global_budgets);
    if let Err(overrun) = budget.check() {
        return Ok(abort(overrun.to_string()));
    }

    let mut tally = Tally::default();
    // Task id -> the failed upstream task that blocks it.
    let mut blocked: BTreeMap<String, String> = BTreeMap::new();

    for task_id in order {
        let task = plan
            .task(task_id)
            .ok_or_else(|| anyhow!("scheduled task {task_id} is not in the plan"))?;

        audit.append(AuditEvent::TaskStart {
            task_id: task.task_id.clone(),
            role: task.role,
            exec: task.exec.clone(),
        })?;

        if let Some(upstream) = blocked.get(task_id) {
            info!(%task_id, %upstream, "skipping task after upstream failure");
            audit.append(AuditEvent::TaskEnd {
                task_id: task.task_id.clone(),
                outcome: TaskOutcome::Skipped,
                exit_code: None,
                signal: None,
                runtime_seconds: 0.0,
                files_touched: 0,
                artifacts: BTreeMap::new(),
                reason: Some(format!("upstream_failed:{upstream}")),
            })?;
            tally.skipped += 1;
            continue;
        }

        let remaining = match budget.remaining_runtime() {
            Ok(remaining) => remaining,
            Err(overrun) => {
                audit.append(budget_stop_event(&task.task_id, &overrun.to_string()))?;
                return Ok(abort(overrun.to_string()));
            }
        };
        let task_limit = Duration::try_from_secs_f64(task.max_runtime_seconds)
            .unwrap_or(remaining);
        let ctx = TaskContext {
            root: &paths.root,
            task_dir: paths.task_dir(&correlation_id, &task.task_id),
            plan_id: &plan.plan_id,
            correlation_id: &correlation_id,
            max_runtime: task_limit.min(remaining),
            poll_interval: cfg.poll_interval(),
            output_limit_bytes: cfg.output_limit_bytes,
        };
        let report = execute_task(launcher, task, &ctx)?;
        budget.record(report.runtime_seconds, report.files_touched);
        audit.append(task_end_event(&report))?;

        if report.outcome.is_success() {
            tally.succeeded += 1;
        } else {
            tally.failed += 1;
        }

        if let Err(overrun) = budget.check() {
            warn!(%overrun, "budget exceeded, aborting run");
            return Ok(abort(overrun.to_string()));
        }

        if !report.outcome.is_success() {
            match plan.fail_policy {
                FailPolicy::FailClosed => {
                    return Ok(abort(format!(
                        "task {} ended with {}",
                        report.task_id, report.outcome
                    )));
                }
                FailPolicy::PartialAllowed => {
                    for dependent in dependents_closure(task_id, &plan.edges) {
                        blocked.entry(dependent).or_insert_with(|| task_id.clone());
                    }
                }
            }
        }
    }

    let status = if tally.failed == 0 && tally.skipped == 0 {
        CompletionStatus::Success
    } else {
        CompletionStatus::Partial
    };
    audit.append(AuditEvent::PlanComplete {
        status,
        succeeded: tally.succeeded,
        failed: tally.failed,
        skipped: tally.skipped,
        runtime_used: budget.runtime_used(),
        files_touched: budget.files_touched(),
    })?;
    info!(?status, ?tally, "plan complete");

    Ok(match status {
        CompletionStatus::Success => RunStatus::Completed,
        CompletionStatus::Partial => RunStatus::CompletedWithFailures,
    })
}

fn abort(reason: String) -> RunStatus {
    warn!(%reason, "run aborted");
    RunStatus::Aborted { reason }
}

fn task_end_event(report: &TaskReport) -> AuditEvent {
    AuditEvent::TaskEnd {
        task_id: report.task_id.clone(),
        outcome: report.outcome,
        exit_code: report.exit.and_then(|exit| exit.code),
        signal: report.exit.and_then(|exit| exit.signal),
        runtime_seconds: report.runtime_seconds,
        files_touched: report.files_touched,
        artifacts: report.artifacts.clone(),
        reason: report.reason.clone(),
    }
}

/// `task_end` for a task that was started but never ran: the runtime budget
/// had no headroom left.
fn budget_stop_event(task_id: &str, reason: &str) -> AuditEvent {
    AuditEvent::TaskEnd {
        task_id: task_id.to_string(),
        outcome: TaskOutcome::Skipped,
        exit_code: None,
        signal: None,
        runtime_seconds: 0.0,
        files_touched: 0,
        artifacts: BTreeMap::new(),
        reason: Some(format!("budget_exhausted:{reason}")),
    }
}
