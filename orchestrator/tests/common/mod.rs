//! Shared fixtures: a temporary workspace with policies and a fast config.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::TempDir;

use orchestrator::io::audit::{AuditRecord, read_records};

pub struct Workspace {
    temp: TempDir,
}

impl Workspace {
    /// Workspace whose tier allows `read`/`report` and whose allow-list
    /// permits `sh` and `sleep` for testers.
    pub fn new() -> Self {
        Self::with_policies(
            json!({
                "current_tier": "t1_test",
                "tiers": {
                    "t0_readonly": {"allowed_operations": ["read", "report"]},
                    "t1_test": {"allowed_operations": ["read", "test", "report"]}
                }
            }),
            json!({
                "tester": [
                    {"exec": "sh"},
                    {"exec": "sleep"},
                    {"exec": "curl"}
                ]
            }),
        )
    }

    pub fn with_policies(capabilities: Value, commands: Value) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("policy")).expect("policy dir");
        write_json(&root.join("policy/capabilities.json"), &capabilities);
        write_json(&root.join("policy/command_allowlist.json"), &commands);
        fs::write(root.join("orchestrator.toml"), "poll_interval_ms = 50\n").expect("config");
        Self { temp }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn write_plan(&self, plan: &Value) -> PathBuf {
        let path = self.root().join("plan.json");
        write_json(&path, plan);
        path
    }

    pub fn audit_path(&self) -> PathBuf {
        self.root().join(".orchestrator/audit.jsonl")
    }

    pub fn audit(&self) -> Vec<AuditRecord> {
        read_records(&self.audit_path()).expect("audit records")
    }

    pub fn events(&self) -> Vec<String> {
        self.audit()
            .iter()
            .map(|record| record.event.name().to_string())
            .collect()
    }

    pub fn task_dir(&self, correlation_id: &str, task_id: &str) -> PathBuf {
        self.root()
            .join(".orchestrator/runs")
            .join(correlation_id)
            .join(task_id)
    }
}

/// Task object with every required field and read/report operations.
pub fn task(id: &str, role: &str) -> Value {
    json!({
        "task_id": id,
        "role": role,
        "inputs": [],
        "outputs": [],
        "allowed_operations": ["read", "report"],
        "max_runtime_seconds": 5,
        "max_files_touched": 0,
        "success_criteria": ["evidence recorded"],
        "required_evidence": ["evidence.json"]
    })
}

pub fn plan(nodes: Vec<Value>, edges: &[(&str, &str)]) -> Value {
    let edges: Vec<Value> = edges
        .iter()
        .map(|(from, to)| json!({"from": from, "to": to}))
        .collect();
    json!({
        "plan_id": "plan-1",
        "nodes": nodes,
        "edges": edges,
        "global_budgets": {"total_runtime_seconds": 60, "total_files_changed": 10},
        "fail_policy": "fail_closed"
    })
}

fn write_json(path: &Path, value: &Value) {
    let raw = serde_json::to_string_pretty(value).expect("serialize");
    fs::write(path, raw).expect("write json");
}
