//! Plan submission: load the document, compute its identity, validate it.
//!
//! Nothing here writes to disk. The caller decides how the outcome is
//! audited and what happens next.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::schema::{Contracts, PLAN_CONTRACT, TASK_CONTRACT};
use crate::core::types::RunMode;
use crate::core::validator::{Validation, ValidationOptions, validate_plan};
use crate::io::config::{OrchestratorConfig, WorkspacePaths};
use crate::io::hash::{correlation_id, sha256_hex};
use crate::io::policy_store::load_policies;

/// A validated (or rejected) plan together with its run identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// SHA-256 of the plan file bytes.
    pub plan_hash: String,
    pub correlation_id: String,
    /// Best-effort `plan_id`, available even for rejected documents.
    pub plan_id: Option<String>,
    pub validation: Validation,
}

/// Load the plan at `plan_path` and validate it for `mode`.
///
/// Errors cover unreadable files and broken policy or contract documents.
/// A plan that is not valid JSON is a rejection, not an error.
#[instrument(skip_all, fields(plan = %plan_path.display(), mode = ?mode))]
pub fn submit_plan(
    plan_path: &Path,
    paths: &WorkspacePaths,
    cfg: &OrchestratorConfig,
    mode: RunMode,
    submitted_at: DateTime<Utc>,
) -> Result<Submission> {
    let bytes = fs::read(plan_path).with_context(|| format!("read plan {}", plan_path.display()))?;
    let plan_hash = sha256_hex(&bytes);
    let correlation_id = correlation_id(&plan_hash, submitted_at);
    debug!(%plan_hash, %correlation_id, "plan loaded");

    let document: Value = match serde_json::from_slice(&bytes) {
        Ok(document) => document,
        Err(err) => {
            return Ok(Submission {
                plan_hash,
                correlation_id,
                plan_id: None,
                validation: Validation::Rejected(vec![format!("schema:plan:/:invalid json: {err}")]),
            });
        }
    };
    let plan_id = document
        .get("plan_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    let contracts = load_contracts(paths.schema_dir.as_deref())?;
    let policy = load_policies(&paths.capability_policy, &paths.command_policy)?;
    let validation = validate_plan(
        &document,
        &contracts,
        &policy,
        &ValidationOptions {
            mode,
            permitted_roots: &cfg.permitted_roots,
        },
    );
    info!(
        violations = validation.violations().len(),
        "plan validation finished"
    );

    Ok(Submission {
        plan_hash,
        correlation_id,
        plan_id,
        validation,
    })
}

/// Compile the contracts from `schema_dir`, or the built-in ones.
///
/// A file missing from the directory falls back to its built-in counterpart.
pub fn load_contracts(schema_dir: Option<&Path>) -> Result<Contracts> {
    let Some(dir) = schema_dir else {
        return Contracts::builtin();
    };
    let plan_raw = read_or(&dir.join("plan.schema.json"), PLAN_CONTRACT)?;
    let task_raw = read_or(&dir.join("task.schema.json"), TASK_CONTRACT)?;
    Contracts::from_sources(&plan_raw, &task_raw)
}

fn read_or(path: &Path, fallback: &str) -> Result<String> {
    if !path.exists() {
        return Ok(fallback.to_string());
    }
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}
