//! Stable exit codes for the orchestrator CLI.

use crate::run::{Invocation, RunStatus};

/// Dry-run found a valid plan, or every task succeeded.
pub const OK: i32 = 0;
/// Plan rejected, run aborted, tasks failed, or an infrastructure error.
pub const FAILED: i32 = 1;

pub fn for_invocation(invocation: &Invocation) -> i32 {
    match invocation {
        Invocation::DryRun { .. }
        | Invocation::Executed {
            status: RunStatus::Completed,
            ..
        } => OK,
        Invocation::Rejected { .. } | Invocation::Executed { .. } => FAILED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_clean_outcomes_exit_zero() {
        let executed = |status| Invocation::Executed {
            correlation_id: "cid".to_string(),
            status,
        };
        assert_eq!(for_invocation(&Invocation::DryRun { order: vec![] }), OK);
        assert_eq!(for_invocation(&executed(RunStatus::Completed)), OK);
        assert_eq!(
            for_invocation(&executed(RunStatus::CompletedWithFailures)),
            FAILED
        );
        assert_eq!(
            for_invocation(&executed(RunStatus::Aborted {
                reason: "budget".to_string()
            })),
            FAILED
        );
        assert_eq!(
            for_invocation(&Invocation::Rejected {
                violations: vec!["x".to_string()]
            }),
            FAILED
        );
    }
}
