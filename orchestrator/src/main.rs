//! Plan orchestrator CLI.
//!
//! Validates a plan document and either prints its execution order
//! (`--dry-run`) or runs it (`--execute`), recording everything in
//! `.orchestrator/audit.jsonl` under the workspace root.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};

use orchestrator::core::types::RunMode;
use orchestrator::exit_codes;
use orchestrator::logging;
use orchestrator::run::{Invocation, InvocationOptions, RunStatus, invoke};

#[derive(Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Validate and run a DAG of bounded, policy-scoped tasks"
)]
#[command(group(ArgGroup::new("mode").required(true).args(["dry_run", "execute"])))]
struct Cli {
    /// Path to the plan document (JSON).
    plan: PathBuf,

    /// Validate and print the execution order; run nothing.
    #[arg(long)]
    dry_run: bool,

    /// Validate, then run every task in order.
    #[arg(long)]
    execute: bool,

    /// Config file (default: `<root>/orchestrator.toml`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Workspace root holding policies, task paths and state.
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let mode = if cli.execute {
        RunMode::Execute
    } else {
        RunMode::DryRun
    };
    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("resolve root {}", cli.root.display()))?;

    let invocation = invoke(
        &cli.plan,
        &InvocationOptions {
            root: &root,
            config_path: cli.config.as_deref(),
            mode,
        },
    )?;

    match &invocation {
        Invocation::Rejected { violations } => {
            eprintln!("plan rejected:");
            for violation in violations {
                eprintln!("- {violation}");
            }
        }
        Invocation::DryRun { order } => {
            for task_id in order {
                println!("{task_id}");
            }
        }
        Invocation::Executed {
            correlation_id,
            status,
        } => match status {
            RunStatus::Completed => println!("plan completed ({correlation_id})"),
            RunStatus::CompletedWithFailures => {
                eprintln!("plan completed with failures ({correlation_id})");
            }
            RunStatus::Aborted { reason } => {
                eprintln!("plan aborted ({correlation_id}): {reason}");
            }
        },
    }
    Ok(exit_codes::for_invocation(&invocation))
}
