//! Append-only audit log (`audit.jsonl`).
//!
//! One JSON object per line, written and flushed as each event happens.
//! Existing lines are never rewritten. Peripheral tools read this file as a
//! feed via [`read_records`].

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{RunMode, TaskOutcome};
use crate::plan::Role;

/// One audit line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// UTC timestamp, RFC 3339 with milliseconds.
    pub ts: String,
    pub plan_id: Option<String>,
    pub correlation_id: String,
    #[serde(flatten)]
    pub event: AuditEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    PlanRejected {
        mode: RunMode,
        violations: Vec<String>,
    },
    PlanValidated {
        mode: RunMode,
        order: Vec<String>,
    },
    TaskStart {
        task_id: String,
        role: Role,
        exec: Option<String>,
    },
    TaskEnd {
        task_id: String,
        outcome: TaskOutcome,
        exit_code: Option<i32>,
        signal: Option<i32>,
        runtime_seconds: f64,
        files_touched: u64,
        /// Artifact path (relative to the workspace root) to SHA-256.
        artifacts: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    PlanComplete {
        status: CompletionStatus,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        runtime_used: f64,
        files_touched: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// Every task succeeded.
    Success,
    /// The plan ran to the end under `partial_allowed` with failures.
    Partial,
}

impl AuditEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuditEvent::PlanRejected { .. } => "plan_rejected",
            AuditEvent::PlanValidated { .. } => "plan_validated",
            AuditEvent::TaskStart { .. } => "task_start",
            AuditEvent::TaskEnd { .. } => "task_end",
            AuditEvent::PlanComplete { .. } => "plan_complete",
        }
    }
}

/// Writer for the audit log of one invocation.
pub struct AuditLog {
    path: PathBuf,
    file: File,
    plan_id: Option<String>,
    correlation_id: String,
}

impl AuditLog {
    /// Open (creating if needed) the log for appending.
    pub fn open(path: &Path, plan_id: Option<String>, correlation_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create audit dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open audit log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            plan_id,
            correlation_id: correlation_id.to_string(),
        })
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Append one event stamped with the current UTC time, then flush.
    pub fn append(&mut self, event: AuditEvent) -> Result<AuditRecord> {
        let record = AuditRecord {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            plan_id: self.plan_id.clone(),
            correlation_id: self.correlation_id.clone(),
            event,
        };
        let mut line = serde_json::to_string(&record).context("serialize audit record")?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .with_context(|| format!("append audit log {}", self.path.display()))?;
        self.file
            .flush()
            .with_context(|| format!("flush audit log {}", self.path.display()))?;
        debug!(event = record.event.name(), "audit record appended");
        Ok(record)
    }
}

/// Read every record from an audit log, oldest first.
pub fn read_records(path: &Path) -> Result<Vec<AuditRecord>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read audit log {}", path.display()))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse audit line {} of {}", index + 1, path.display()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_line_per_event() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state/audit.jsonl");

        let mut log = AuditLog::open(&path, Some("p1".to_string()), "cid").expect("open");
        log.append(AuditEvent::PlanValidated {
            mode: RunMode::Execute,
            order: vec!["a".to_string()],
        })
        .expect("append");
        log.append(AuditEvent::TaskStart {
            task_id: "a".to_string(),
            role: Role::Reporter,
            exec: None,
        })
        .expect("append");

        let contents = fs::read_to_string(&path).expect("read");
        assert_eq!(contents.lines().count(), 2);
        let first: serde_json::Value =
            serde_json::from_str(contents.lines().next().expect("line")).expect("json");
        assert_eq!(first["event"], "plan_validated");
        assert_eq!(first["plan_id"], "p1");
        assert_eq!(first["correlation_id"], "cid");
        assert_eq!(first["mode"], "execute");
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("audit.jsonl");
        for cid in ["one", "two"] {
            let mut log = AuditLog::open(&path, None, cid).expect("open");
            log.append(AuditEvent::PlanRejected {
                mode: RunMode::DryRun,
                violations: vec!["x".to_string()],
            })
            .expect("append");
        }

        let records = read_records(&path).expect("read");
        let ids: Vec<&str> = records.iter().map(|r| r.correlation_id.as_str()).collect();
        assert_eq!(ids, vec!["one", "two"]);
        assert_eq!(records[0].plan_id, None);
    }

    #[test]
    fn task_end_round_trips_through_reader() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("audit.jsonl");
        let mut log = AuditLog::open(&path, Some("p".to_string()), "cid").expect("open");
        let mut artifacts = BTreeMap::new();
        artifacts.insert("out/a.txt".to_string(), "00".to_string());
        let written = log
            .append(AuditEvent::TaskEnd {
                task_id: "a".to_string(),
                outcome: TaskOutcome::Timeout,
                exit_code: None,
                signal: Some(9),
                runtime_seconds: 2.0,
                files_touched: 0,
                artifacts,
                reason: None,
            })
            .expect("append");

        let records = read_records(&path).expect("read");
        assert_eq!(records, vec![written]);
    }
}
