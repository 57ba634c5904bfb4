//! Capability tiers and the per-role command allow-list.
//!
//! Both checks deny by default: an operation or command that is not
//! explicitly allowed is rejected. A fixed deny-list sits beneath the
//! configurable allow-list and cannot be overridden by any role policy.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::plan::{Operation, Plan, Role};

/// Executables that are never allowed, whatever the role policy says.
const DENIED_EXECUTABLES: &[&str] = &[
    "curl", "wget", "nc", "ncat", "netcat", "ssh", "scp", "sftp", "ftp", "telnet", "rsync",
    "sudo", "su", "doas",
];

/// `(executable, subcommand)` pairs that are never allowed.
const DENIED_SUBCOMMANDS: &[(&str, &str)] = &[
    ("git", "push"),
    ("git", "remote"),
    ("pip", "install"),
    ("pip3", "install"),
    ("npm", "install"),
    ("yarn", "install"),
    ("pnpm", "install"),
    ("cargo", "install"),
    ("gem", "install"),
    ("apt", "install"),
    ("apt-get", "install"),
    ("brew", "install"),
];

const SCRIPT_EXTENSIONS: &[&str] = &[".py", ".sh", ".bash", ".ps1", ".js", ".rb", ".pl"];

static URL_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b[a-z][a-z0-9+.-]*://").unwrap());

/// Capability policy document: the tiers and which one is active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilityPolicy {
    pub current_tier: String,
    pub tiers: BTreeMap<String, CapabilityTier>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilityTier {
    pub allowed_operations: BTreeSet<Operation>,
}

impl CapabilityPolicy {
    pub fn current(&self) -> Option<&CapabilityTier> {
        self.tiers.get(&self.current_tier)
    }
}

/// One sanctioned invocation shape for a role.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AllowListEntry {
    pub exec: String,
    pub required_arg_prefixes: Vec<String>,
    pub forbidden_flags: Vec<String>,
    pub allowed_script_paths: Vec<String>,
}

/// Command allow-list document, keyed by role.
pub type CommandAllowList = BTreeMap<Role, Vec<AllowListEntry>>;

/// Policy documents loaded once per invocation and passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyContext {
    pub capabilities: CapabilityPolicy,
    pub commands: CommandAllowList,
}

/// Why a command was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    DeniedExecutable,
    DeniedSubcommand(String),
    DeniedArgument,
    CommandNotAllowed,
    MissingRequiredPrefix,
    ForbiddenFlag(String),
    ScriptNotAllowed(String),
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::DeniedExecutable => write!(f, "denied_executable"),
            Denial::DeniedSubcommand(sub) => write!(f, "denied_subcommand:{sub}"),
            Denial::DeniedArgument => write!(f, "denied_argument"),
            Denial::CommandNotAllowed => write!(f, "command_not_allowed"),
            Denial::MissingRequiredPrefix => write!(f, "missing_required_prefix"),
            Denial::ForbiddenFlag(flag) => write!(f, "forbidden_flag:{flag}"),
            Denial::ScriptNotAllowed(path) => write!(f, "script_not_allowed:{path}"),
        }
    }
}

/// Verify every task's operations fit inside the current capability tier.
pub fn check_capabilities(plan: &Plan, capabilities: &CapabilityPolicy) -> Vec<String> {
    let Some(tier) = capabilities.current() else {
        return vec![format!(
            "capability_tier_unknown:{}",
            capabilities.current_tier
        )];
    };
    plan.nodes
        .iter()
        .filter(|task| {
            task.allowed_operations
                .iter()
                .any(|op| !tier.allowed_operations.contains(op))
        })
        .map(|task| format!("capability_exceeded:{}", task.task_id))
        .collect()
}

/// Verify every exec-bearing task matches its role's allow-list.
pub fn check_commands(plan: &Plan, commands: &CommandAllowList) -> Vec<String> {
    let mut violations = Vec::new();
    for task in &plan.nodes {
        let Some(exec) = task.exec.as_deref() else {
            continue;
        };
        if let Err(denial) = check_command(task.role, exec, task.args(), commands) {
            violations.push(format!("denied_by_policy:{}:{}", task.task_id, denial));
        }
    }
    violations
}

/// Match one `(role, exec, args)` invocation against the policy.
///
/// The hard deny-list is consulted first and short-circuits the allow-list.
pub fn check_command(
    role: Role,
    exec: &str,
    args: &[String],
    commands: &CommandAllowList,
) -> Result<(), Denial> {
    check_deny_floor(exec, args)?;

    let candidates: Vec<&AllowListEntry> = commands
        .get(&role)
        .map(|entries| {
            entries
                .iter()
                .filter(|entry| entry.exec.eq_ignore_ascii_case(exec))
                .collect()
        })
        .unwrap_or_default();

    let mut first_denial = None;
    for entry in candidates {
        match match_entry(entry, args) {
            Ok(()) => return Ok(()),
            Err(denial) => {
                first_denial.get_or_insert(denial);
            }
        }
    }
    Err(first_denial.unwrap_or(Denial::CommandNotAllowed))
}

fn check_deny_floor(exec: &str, args: &[String]) -> Result<(), Denial> {
    let name = executable_name(exec);
    if DENIED_EXECUTABLES.contains(&name.as_str()) {
        return Err(Denial::DeniedExecutable);
    }
    // Any position counts: global options such as `git -C <dir>` take values
    // that would otherwise hide the subcommand.
    for arg in args {
        let arg = arg.to_ascii_lowercase();
        if DENIED_SUBCOMMANDS
            .iter()
            .any(|(denied_exec, denied_sub)| *denied_exec == name && *denied_sub == arg)
        {
            return Err(Denial::DeniedSubcommand(arg));
        }
    }
    if args.iter().any(|arg| URL_ARG.is_match(arg)) {
        return Err(Denial::DeniedArgument);
    }
    Ok(())
}

fn match_entry(entry: &AllowListEntry, args: &[String]) -> Result<(), Denial> {
    let prefix = &entry.required_arg_prefixes;
    if args.len() < prefix.len() || args.iter().zip(prefix).any(|(arg, want)| arg != want) {
        return Err(Denial::MissingRequiredPrefix);
    }
    for arg in args {
        if let Some(flag) = entry
            .forbidden_flags
            .iter()
            .find(|flag| collides_with_flag(arg, flag))
        {
            return Err(Denial::ForbiddenFlag(flag.clone()));
        }
    }
    for arg in args.iter().filter(|arg| is_script_like(arg)) {
        let normalized = normalize_script_path(arg);
        if !entry
            .allowed_script_paths
            .iter()
            .any(|allowed| normalize_script_path(allowed) == normalized)
        {
            return Err(Denial::ScriptNotAllowed(arg.clone()));
        }
    }
    Ok(())
}

/// Lowercased basename without a trailing `.exe`.
fn executable_name(exec: &str) -> String {
    let base = exec.rsplit(['/', '\\']).next().unwrap_or(exec);
    let lower = base.to_ascii_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}

fn collides_with_flag(arg: &str, flag: &str) -> bool {
    if flag.is_empty() {
        return false;
    }
    arg == flag
        || arg
            .strip_prefix(flag)
            .is_some_and(|rest| rest.starts_with('='))
}

fn is_script_like(arg: &str) -> bool {
    let lower = arg.to_ascii_lowercase();
    SCRIPT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn normalize_script_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut trimmed = unified.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}
