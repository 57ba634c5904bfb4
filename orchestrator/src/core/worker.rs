//! Built-in workers that turn a task's execution into an evidence record.
//!
//! Selection is a pure function of the task's role and declared operations;
//! the task's content is never inspected beyond those two fields.

use serde::{Deserialize, Serialize};

use crate::core::types::{Supervision, TaskOutcome};
use crate::plan::{Operation, Role, Task};

const PLACEHOLDER_DIFF: &str = "# no changes: structural task staged without execution\n";

/// What the executor observed while running (or not running) a task.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRun {
    /// `None` when the task declares no `exec`.
    pub supervision: Option<Supervision>,
    pub runtime_seconds: f64,
    /// Declared outputs that exist on disk after the run, in declaration order.
    pub outputs_present: Vec<String>,
    /// Subset of `outputs_present` created or modified during the run.
    pub outputs_changed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Worker {
    /// Wraps a child-process result into evidence.
    Test,
    /// Stages a placeholder diff and reports nothing touched.
    NoOp,
}

/// Evidence file contents (`evidence.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub task_id: String,
    pub role: Role,
    pub worker: Worker,
    pub outcome: TaskOutcome,
    /// Whether a child process was started for this task.
    pub spawned: bool,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub runtime_seconds: f64,
    pub files_touched: u64,
    pub outputs_present: Vec<String>,
    #[serde(default)]
    pub outputs_changed: Vec<String>,
    pub required_evidence: Vec<String>,
    pub notes: Vec<String>,
    /// Last bytes of the stderr capture, filled in by the executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_tail: Option<String>,
}

/// Evidence plus any placeholder artifact the worker wants written.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub evidence: Evidence,
    pub placeholder_diff: Option<&'static str>,
}

impl Worker {
    pub fn dispatch(role: Role, operations: &[Operation]) -> Self {
        if role == Role::Tester || operations.contains(&Operation::Test) {
            Worker::Test
        } else {
            Worker::NoOp
        }
    }

    pub fn execute(self, task: &Task, captured: &CapturedRun) -> WorkerReport {
        let mut notes = Vec::new();
        let outcome = match captured.supervision {
            Some(supervision) => supervision.outcome(),
            None => {
                notes.push("no command bound; dispatched without a child process".to_string());
                TaskOutcome::Success
            }
        };
        if matches!(captured.supervision, Some(Supervision::SpawnFailed)) {
            notes.push("command could not be spawned (see stderr.log)".to_string());
        }

        let exit = captured.supervision.and_then(|s| s.exit());
        let mut evidence = Evidence {
            task_id: task.task_id.clone(),
            role: task.role,
            worker: self,
            outcome,
            spawned: captured
                .supervision
                .is_some_and(|s| !matches!(s, Supervision::SpawnFailed)),
            exit_code: exit.and_then(|e| e.code),
            signal: exit.and_then(|e| e.signal),
            runtime_seconds: captured.runtime_seconds,
            files_touched: 0,
            outputs_present: captured.outputs_present.clone(),
            outputs_changed: captured.outputs_changed.clone(),
            required_evidence: task.required_evidence.clone(),
            notes,
            stderr_tail: None,
        };

        match self {
            Worker::Test => {
                evidence.files_touched = captured.outputs_changed.len() as u64;
                WorkerReport {
                    evidence,
                    placeholder_diff: None,
                }
            }
            Worker::NoOp => WorkerReport {
                evidence,
                placeholder_diff: Some(PLACEHOLDER_DIFF),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ProcessExit;
    use crate::test_support::task;

    fn captured(supervision: Option<Supervision>, outputs: &[&str]) -> CapturedRun {
        let outputs: Vec<String> = outputs.iter().map(|s| s.to_string()).collect();
        CapturedRun {
            supervision,
            runtime_seconds: 0.5,
            outputs_present: outputs.clone(),
            outputs_changed: outputs,
        }
    }

    #[test]
    fn dispatch_depends_on_role_and_operations() {
        assert_eq!(
            Worker::dispatch(Role::Tester, &[Operation::Read]),
            Worker::Test
        );
        assert_eq!(
            Worker::dispatch(Role::Builder, &[Operation::Write, Operation::Test]),
            Worker::Test
        );
        assert_eq!(
            Worker::dispatch(Role::Reporter, &[Operation::Read, Operation::Report]),
            Worker::NoOp
        );
        assert_eq!(
            Worker::dispatch(Role::Planner, &[Operation::Write]),
            Worker::NoOp
        );
    }

    #[test]
    fn noop_reports_zero_files_and_placeholder() {
        let task = task("a", Role::Reporter);
        let report = Worker::NoOp.execute(&task, &captured(None, &["docs/x.md"]));
        assert_eq!(report.evidence.outcome, TaskOutcome::Success);
        assert_eq!(report.evidence.files_touched, 0);
        assert!(!report.evidence.spawned);
        assert!(report.placeholder_diff.is_some());
    }

    #[test]
    fn test_worker_wraps_process_result() {
        let task = task("t", Role::Tester);
        let report = Worker::Test.execute(
            &task,
            &captured(Some(Supervision::Exited(ProcessExit::code(1))), &["out/a"]),
        );
        assert_eq!(report.evidence.outcome, TaskOutcome::Failed);
        assert_eq!(report.evidence.exit_code, Some(1));
        assert_eq!(report.evidence.files_touched, 1);
        assert!(report.evidence.spawned);
        assert!(report.placeholder_diff.is_none());
    }

    #[test]
    fn unchanged_outputs_are_not_touched_files() {
        let task = task("t", Role::Tester);
        let mut run = captured(Some(Supervision::Exited(ProcessExit::code(0))), &["out/a"]);
        run.outputs_changed.clear();
        let report = Worker::Test.execute(&task, &run);
        assert_eq!(report.evidence.files_touched, 0);
        assert_eq!(report.evidence.outputs_present, vec!["out/a".to_string()]);
    }

    #[test]
    fn spawn_failure_is_noted() {
        let task = task("t", Role::Tester);
        let report = Worker::Test.execute(&task, &captured(Some(Supervision::SpawnFailed), &[]));
        assert_eq!(report.evidence.outcome, TaskOutcome::Failed);
        assert!(!report.evidence.spawned);
        assert_eq!(report.evidence.exit_code, None);
        assert!(report.evidence.notes.iter().any(|n| n.contains("spawned")));
    }
}
