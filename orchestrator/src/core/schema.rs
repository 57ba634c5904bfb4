//! Structural validation of plan documents against the plan and task contracts.
//!
//! Every node is checked independently so one rejection reports the whole
//! defect set. Only shape is checked here (required fields, types, enums);
//! value ranges belong to the plan validator.

use anyhow::{Context, Result};
use jsonschema::{Draft, Validator};
use serde_json::Value;

pub const PLAN_CONTRACT: &str = include_str!("../../schemas/plan.schema.json");
pub const TASK_CONTRACT: &str = include_str!("../../schemas/task.schema.json");

/// Compiled plan and task contracts.
pub struct Contracts {
    plan: Validator,
    task: Validator,
}

impl Contracts {
    /// Compile the contracts shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_sources(PLAN_CONTRACT, TASK_CONTRACT)
    }

    pub fn from_sources(plan_raw: &str, task_raw: &str) -> Result<Self> {
        let plan: Value = serde_json::from_str(plan_raw).context("parse plan contract")?;
        let task: Value = serde_json::from_str(task_raw).context("parse task contract")?;
        Ok(Self {
            plan: compile(&plan).context("compile plan contract")?,
            task: compile(&task).context("compile task contract")?,
        })
    }
}

fn compile(schema: &Value) -> Result<Validator> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| anyhow::anyhow!("invalid schema: {err}"))
}

/// Return every structural violation of `plan` (empty = valid).
///
/// Plan-level violations are labelled `schema:plan:<pointer>:<message>`;
/// task violations `schema:task:<task_id>:<pointer>:<message>`, falling back
/// to `nodes[<index>]` when the node has no usable `task_id`.
pub fn validate_structure(plan: &Value, contracts: &Contracts) -> Vec<String> {
    let mut violations: Vec<String> = contracts
        .plan
        .iter_errors(plan)
        .map(|err| {
            format!(
                "schema:plan:{}:{}",
                pointer(&err.instance_path().to_string()),
                err
            )
        })
        .collect();

    let Some(nodes) = plan.get("nodes").and_then(Value::as_array) else {
        return violations;
    };
    for (index, node) in nodes.iter().enumerate() {
        let label = task_label(node, index);
        violations.extend(contracts.task.iter_errors(node).map(|err| {
            format!(
                "schema:task:{}:{}:{}",
                label,
                pointer(&err.instance_path().to_string()),
                err
            )
        }));
    }
    violations
}

fn task_label(node: &Value, index: usize) -> String {
    match node.get("task_id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("nodes[{index}]"),
    }
}

fn pointer(path: &str) -> &str {
    if path.is_empty() { "/" } else { path }
}
