//! I/O helpers for orchestrator commands.

pub mod audit;
pub mod config;
pub mod executor;
pub mod hash;
pub mod policy_store;
pub mod process;
