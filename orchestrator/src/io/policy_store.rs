//! Loading of the capability and command allow-list policy documents.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::core::policy::{CapabilityPolicy, CommandAllowList, PolicyContext};

/// Read both policy documents. A missing or malformed document is an error;
/// there is no implicit policy.
pub fn load_policies(capability_path: &Path, command_path: &Path) -> Result<PolicyContext> {
    let capabilities: CapabilityPolicy =
        read_json(capability_path).context("load capability policy")?;
    let commands: CommandAllowList = read_json(command_path).context("load command allow-list")?;
    debug!(
        tier = %capabilities.current_tier,
        roles = commands.len(),
        "policies loaded"
    );
    Ok(PolicyContext {
        capabilities,
        commands,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}
