//! Plan and task data model as submitted by callers.
//!
//! These types mirror the plan document one-to-one. They are parsed once,
//! after structural validation, and never mutated afterwards.

use serde::{Deserialize, Serialize};

/// A DAG of tasks with global budgets and a failure policy.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub plan_id: String,
    pub nodes: Vec<Task>,
    pub edges: Vec<Edge>,
    pub global_budgets: GlobalBudgets,
    pub fail_policy: FailPolicy,
}

impl Plan {
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.nodes.iter().find(|task| task.task_id == task_id)
    }
}

/// Dependency edge: `to` may only start after `from` finished.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct GlobalBudgets {
    pub total_runtime_seconds: f64,
    pub total_files_changed: i64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailPolicy {
    /// Any task failure aborts the remaining work.
    FailClosed,
    /// Failures are recorded; independent branches keep running.
    PartialAllowed,
}

/// An atomic, budget-bound unit of work.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub role: Role,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub allowed_operations: Vec<Operation>,
    pub max_runtime_seconds: f64,
    pub max_files_touched: i64,
    pub success_criteria: Vec<String>,
    pub required_evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_progress_seconds: Option<f64>,
}

impl Task {
    pub fn args(&self) -> &[String] {
        self.args.as_deref().unwrap_or(&[])
    }

    pub fn allows(&self, op: Operation) -> bool {
        self.allowed_operations.contains(&op)
    }
}

/// Operation classes a task may perform.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
    Test,
    Report,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Test => "test",
            Operation::Report => "report",
        }
    }
}

/// Actor roles, each with a fixed permission envelope.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Stages structural changes; never executed.
    Planner,
    Builder,
    /// Exists to run tests, so it must bind a command.
    Tester,
    Reviewer,
    Reporter,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Builder => "builder",
            Role::Tester => "tester",
            Role::Reviewer => "reviewer",
            Role::Reporter => "reporter",
        }
    }

    /// Roles that may appear in a plan submitted for execution.
    pub fn is_execute_eligible(self) -> bool {
        !matches!(self, Role::Planner)
    }

    /// Roles allowed to declare the `write` operation in execute mode.
    pub fn is_write_capable(self) -> bool {
        matches!(self, Role::Builder)
    }

    /// Roles whose tasks must declare `exec` in execute mode.
    pub fn requires_exec(self) -> bool {
        matches!(self, Role::Tester)
    }
}
