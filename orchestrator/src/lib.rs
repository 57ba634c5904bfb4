//! Plan orchestrator: validate a DAG of bounded tasks, run it, audit it.
//!
//! A plan is checked against structural contracts, capability tiers, the
//! per-role command allow-list and plan-level invariants before anything
//! runs. Valid plans execute one task at a time in topological order under
//! global budgets, and every step lands in an append-only audit log.
//!
//! - **[`core`]**: Pure, deterministic logic (schema and policy checks, graph
//!   ordering, budgets, worker dispatch). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config and policy loading, child
//!   process supervision, evidence and audit files).
//!
//! Orchestration modules ([`validate`], [`run`]) coordinate core logic with
//! I/O to implement the CLI modes.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod plan;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
