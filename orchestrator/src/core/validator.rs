//! Plan-level validation: structure, graph, budgets, paths and policy.
//!
//! Validation is read-only and deterministic. All violations are collected
//! into one ordered list; a plan is either fully accepted or fully rejected.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::core::graph::cycle_members;
use crate::core::path::confine;
use crate::core::policy::{PolicyContext, check_capabilities, check_commands};
use crate::core::schema::{Contracts, validate_structure};
use crate::core::types::RunMode;
use crate::plan::{Operation, Plan};

/// Inputs that shape validation beyond the plan itself.
#[derive(Debug, Clone, Copy)]
pub struct ValidationOptions<'a> {
    pub mode: RunMode,
    pub permitted_roots: &'a [String],
}

/// Outcome of validating one plan document.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Valid(Plan),
    Rejected(Vec<String>),
}

impl Validation {
    pub fn violations(&self) -> &[String] {
        match self {
            Validation::Valid(_) => &[],
            Validation::Rejected(violations) => violations,
        }
    }
}

/// Validate a raw plan document.
///
/// Structural violations stop validation early because the document cannot
/// be typed; every later check runs to completion and accumulates.
pub fn validate_plan(
    document: &Value,
    contracts: &Contracts,
    policy: &PolicyContext,
    options: &ValidationOptions<'_>,
) -> Validation {
    let structural = validate_structure(document, contracts);
    if !structural.is_empty() {
        return Validation::Rejected(structural);
    }
    let plan: Plan = match serde_json::from_value(document.clone()) {
        Ok(plan) => plan,
        Err(err) => return Validation::Rejected(vec![format!("schema:plan:/:{err}")]),
    };

    let violations = validate_typed(&plan, policy, options);
    if violations.is_empty() {
        Validation::Valid(plan)
    } else {
        Validation::Rejected(violations)
    }
}

/// Semantic checks on an already-typed plan.
pub fn validate_typed(
    plan: &Plan,
    policy: &PolicyContext,
    options: &ValidationOptions<'_>,
) -> Vec<String> {
    let mut violations = Vec::new();
    check_graph(plan, &mut violations);
    check_budgets(plan, &mut violations);
    check_paths(plan, options.permitted_roots, &mut violations);
    violations.extend(check_capabilities(plan, &policy.capabilities));
    violations.extend(check_commands(plan, &policy.commands));
    if options.mode == RunMode::Execute {
        check_execute_rules(plan, &mut violations);
    }
    violations
}

fn check_graph(plan: &Plan, violations: &mut Vec<String>) {
    let mut seen = BTreeSet::new();
    for task in &plan.nodes {
        if !seen.insert(task.task_id.as_str()) {
            violations.push(format!("duplicate_task_id:{}", task.task_id));
        }
    }
    for edge in &plan.edges {
        if !seen.contains(edge.from.as_str()) || !seen.contains(edge.to.as_str()) {
            violations.push(format!("unknown_edge_endpoint:{}->{}", edge.from, edge.to));
        }
    }
    let cyclic = cycle_members(&plan.nodes, &plan.edges);
    if !cyclic.is_empty() {
        violations.push(format!("cycle_detected:{}", cyclic.join(",")));
    }
}

fn check_budgets(plan: &Plan, violations: &mut Vec<String>) {
    let budgets = &plan.global_budgets;
    if !(budgets.total_runtime_seconds.is_finite() && budgets.total_runtime_seconds > 0.0) {
        violations.push("invalid_budget:total_runtime_seconds".to_string());
    }
    if budgets.total_files_changed < 0 {
        violations.push("invalid_budget:total_files_changed".to_string());
    }
    for task in &plan.nodes {
        if !(task.max_runtime_seconds.is_finite() && task.max_runtime_seconds > 0.0) {
            violations.push(format!(
                "invalid_task_budget:{}:max_runtime_seconds",
                task.task_id
            ));
        }
        if task.max_files_touched < 0 {
            violations.push(format!(
                "invalid_task_budget:{}:max_files_touched",
                task.task_id
            ));
        }
        if let Some(stall) = task.no_progress_seconds
            && !(stall.is_finite() && stall > 0.0)
        {
            violations.push(format!(
                "invalid_task_budget:{}:no_progress_seconds",
                task.task_id
            ));
        }
    }
}

fn check_paths(plan: &Plan, roots: &[String], violations: &mut Vec<String>) {
    for task in &plan.nodes {
        for path in task.inputs.iter().chain(&task.outputs) {
            if let Err(reason) = confine(path, roots) {
                violations.push(format!(
                    "path_not_confined:{}:{}:{}",
                    task.task_id, path, reason
                ));
            }
        }
    }
}

fn check_execute_rules(plan: &Plan, violations: &mut Vec<String>) {
    for task in &plan.nodes {
        if !task.role.is_execute_eligible() {
            violations.push(format!(
                "role_not_executable:{}:{}",
                task.task_id,
                task.role.as_str()
            ));
        }
        if task.allows(Operation::Write) && !task.role.is_write_capable() {
            violations.push(format!("write_not_permitted:{}", task.task_id));
        }
        if task.role.requires_exec() && task.exec.is_none() {
            violations.push(format!("missing_exec:{}", task.task_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Role;
    use crate::test_support::{edge, permissive_policy, plan_with, task};

    fn roots() -> Vec<String> {
        vec!["src".to_string(), "docs".to_string()]
    }

    fn validate(plan: &Plan, mode: RunMode) -> Validation {
        let contracts = Contracts::builtin().expect("contracts");
        let document = serde_json::to_value(plan).expect("to value");
        let roots = roots();
        validate_plan(
            &document,
            &contracts,
            &permissive_policy(),
            &ValidationOptions {
                mode,
                permitted_roots: &roots,
            },
        )
    }

    #[test]
    fn accepts_simple_plan() {
        let plan = plan_with(
            vec![task("a", Role::Reporter), task("b", Role::Reporter)],
            vec![edge("a", "b")],
        );
        assert!(matches!(validate(&plan, RunMode::Execute), Validation::Valid(_)));
    }

    #[test]
    fn rejects_cycle_with_dedicated_violation() {
        let plan = plan_with(
            vec![task("a", Role::Reporter), task("b", Role::Reporter)],
            vec![edge("a", "b"), edge("b", "a")],
        );
        assert_eq!(
            validate(&plan, RunMode::DryRun).violations(),
            ["cycle_detected:a,b".to_string()]
        );
    }

    #[test]
    fn reports_graph_budget_and_path_violations_together() {
        let mut a = task("a", Role::Reporter);
        a.inputs = vec!["../etc/passwd".to_string(), "/abs".to_string()];
        a.max_runtime_seconds = 0.0;
        let mut plan = plan_with(
            vec![a, task("a", Role::Reporter)],
            vec![edge("a", "ghost")],
        );
        plan.global_budgets.total_runtime_seconds = 0.0;
        plan.global_budgets.total_files_changed = -1;

        assert_eq!(
            validate(&plan, RunMode::DryRun).violations(),
            [
                "duplicate_task_id:a".to_string(),
                "unknown_edge_endpoint:a->ghost".to_string(),
                "invalid_budget:total_runtime_seconds".to_string(),
                "invalid_budget:total_files_changed".to_string(),
                "invalid_task_budget:a:max_runtime_seconds".to_string(),
                "path_not_confined:a:../etc/passwd:traversal".to_string(),
                "path_not_confined:a:/abs:absolute".to_string(),
            ]
        );
    }

    #[test]
    fn execute_mode_adds_role_rules() {
        let planner = task("p", Role::Planner);
        let mut reviewer = task("r", Role::Reviewer);
        reviewer.allowed_operations = vec![Operation::Read, Operation::Write];
        let tester = task("t", Role::Tester);
        let plan = plan_with(vec![planner, reviewer, tester], vec![]);

        assert!(matches!(validate(&plan, RunMode::DryRun), Validation::Valid(_)));
        assert_eq!(
            validate(&plan, RunMode::Execute).violations(),
            [
                "role_not_executable:p:planner".to_string(),
                "write_not_permitted:r".to_string(),
                "missing_exec:t".to_string(),
            ]
        );
    }

    #[test]
    fn builder_may_write_in_execute_mode() {
        let mut builder = task("b", Role::Builder);
        builder.allowed_operations = vec![Operation::Read, Operation::Write];
        let plan = plan_with(vec![builder], vec![]);
        assert!(matches!(validate(&plan, RunMode::Execute), Validation::Valid(_)));
    }

    #[test]
    fn validation_is_idempotent() {
        let mut a = task("a", Role::Tester);
        a.exec = Some("curl".to_string());
        a.args = Some(vec!["https://example.com".to_string()]);
        let plan = plan_with(vec![a], vec![edge("a", "a")]);

        let first = validate(&plan, RunMode::Execute);
        let second = validate(&plan, RunMode::Execute);
        assert_eq!(first, second);
        assert!(
            first
                .violations()
                .contains(&"denied_by_policy:a:denied_executable".to_string())
        );
    }

    #[test]
    fn structural_violations_short_circuit() {
        let contracts = Contracts::builtin().expect("contracts");
        let roots = roots();
        let document = serde_json::json!({"plan_id": "p", "nodes": [{}]});
        let validation = validate_plan(
            &document,
            &contracts,
            &permissive_policy(),
            &ValidationOptions {
                mode: RunMode::DryRun,
                permitted_roots: &roots,
            },
        );
        assert!(
            validation
                .violations()
                .iter()
                .all(|v| v.starts_with("schema:"))
        );
        assert!(validation.violations().len() >= 4);
    }
}
