//! Orchestrator configuration (`orchestrator.toml` at the workspace root).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "orchestrator.toml";

/// Orchestrator configuration (TOML).
///
/// Relative paths are resolved against the workspace root. Missing fields
/// fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Directory holding the audit log and per-run task directories.
    pub state_dir: PathBuf,

    /// Top-level directories task inputs/outputs must live under.
    pub permitted_roots: Vec<String>,

    /// Interval between liveness checks of a running task command.
    pub poll_interval_ms: u64,

    /// Capability policy document.
    pub capability_policy: PathBuf,

    /// Command allow-list policy document.
    pub command_policy: PathBuf,

    /// Directory with `plan.schema.json` / `task.schema.json` overriding the
    /// built-in contracts.
    pub schema_dir: Option<PathBuf>,

    /// Tail of the stderr capture copied into `evidence.json`.
    pub output_limit_bytes: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".orchestrator"),
            permitted_roots: ["src", "tests", "docs", "artifacts"]
                .iter()
                .map(|root| root.to_string())
                .collect(),
            poll_interval_ms: 1_000,
            capability_policy: PathBuf::from("policy/capabilities.json"),
            command_policy: PathBuf::from("policy/command_allowlist.json"),
            schema_dir: None,
            output_limit_bytes: 4_096,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be > 0"));
        }
        if self.permitted_roots.is_empty()
            || self.permitted_roots.iter().any(|root| root.trim().is_empty())
        {
            return Err(anyhow!("permitted_roots must be a non-empty array of names"));
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(anyhow!("state_dir must not be empty"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// All canonical paths for one workspace root.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub audit_log: PathBuf,
    pub runs_dir: PathBuf,
    pub capability_policy: PathBuf,
    pub command_policy: PathBuf,
    pub schema_dir: Option<PathBuf>,
}

impl WorkspacePaths {
    pub fn new(root: &Path, cfg: &OrchestratorConfig) -> Self {
        let state_dir = root.join(&cfg.state_dir);
        Self {
            root: root.to_path_buf(),
            audit_log: state_dir.join("audit.jsonl"),
            runs_dir: state_dir.join("runs"),
            state_dir,
            capability_policy: root.join(&cfg.capability_policy),
            command_policy: root.join(&cfg.command_policy),
            schema_dir: cfg.schema_dir.as_ref().map(|dir| root.join(dir)),
        }
    }

    /// Directory holding one task's captures and evidence.
    pub fn task_dir(&self, correlation_id: &str, task_id: &str) -> PathBuf {
        self.runs_dir.join(correlation_id).join(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, OrchestratorConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "poll_interval_ms = 50\npermitted_roots = [\"out\"]\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.poll_interval(), Duration::from_millis(50));
        assert_eq!(cfg.permitted_roots, vec!["out"]);
        assert_eq!(cfg.state_dir, PathBuf::from(".orchestrator"));
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "poll_interval_ms = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(err.to_string().contains("poll_interval_ms"));
    }

    #[test]
    fn task_dirs_nest_under_correlation_id() {
        let root = Path::new("/work");
        let paths = WorkspacePaths::new(root, &OrchestratorConfig::default());
        assert_eq!(
            paths.task_dir("cid", "a"),
            PathBuf::from("/work/.orchestrator/runs/cid/a")
        );
        assert_eq!(
            paths.audit_log,
            PathBuf::from("/work/.orchestrator/audit.jsonl")
        );
    }
}
