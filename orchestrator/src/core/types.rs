//! Shared deterministic types for orchestrator core logic.
//!
//! These types define stable contracts between core components and the
//! audit/evidence files. Their serialized forms are part of the output format.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Invocation mode chosen on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Validate and print the order; nothing runs.
    DryRun,
    /// Validate with the stricter execute rules, then run.
    Execute,
}

/// Terminal state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Failed,
    /// Killed after exceeding its wall-clock limit.
    Timeout,
    /// Killed because its output stopped growing.
    NoProgress,
    /// Not run because an upstream task failed.
    Skipped,
}

impl TaskOutcome {
    pub fn is_success(self) -> bool {
        self == TaskOutcome::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskOutcome::Success => "success",
            TaskOutcome::Failed => "failed",
            TaskOutcome::Timeout => "timeout",
            TaskOutcome::NoProgress => "no_progress",
            TaskOutcome::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a child process ended: a normal exit code or a terminating signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ProcessExit {
    pub fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Result of supervising one child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Supervision {
    Exited(ProcessExit),
    TimedOut(ProcessExit),
    Stalled(ProcessExit),
    /// The process could not be started at all.
    SpawnFailed,
}

impl Supervision {
    pub fn outcome(&self) -> TaskOutcome {
        match self {
            Supervision::Exited(exit) if exit.success() => TaskOutcome::Success,
            Supervision::Exited(_) | Supervision::SpawnFailed => TaskOutcome::Failed,
            Supervision::TimedOut(_) => TaskOutcome::Timeout,
            Supervision::Stalled(_) => TaskOutcome::NoProgress,
        }
    }

    pub fn exit(&self) -> Option<ProcessExit> {
        match self {
            Supervision::Exited(exit) | Supervision::TimedOut(exit) | Supervision::Stalled(exit) => {
                Some(*exit)
            }
            Supervision::SpawnFailed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supervision_maps_to_outcome() {
        assert_eq!(
            Supervision::Exited(ProcessExit::code(0)).outcome(),
            TaskOutcome::Success
        );
        assert_eq!(
            Supervision::Exited(ProcessExit::code(3)).outcome(),
            TaskOutcome::Failed
        );
        let killed = ProcessExit {
            code: None,
            signal: Some(9),
        };
        assert_eq!(Supervision::TimedOut(killed).outcome(), TaskOutcome::Timeout);
        assert_eq!(Supervision::Stalled(killed).outcome(), TaskOutcome::NoProgress);
        assert_eq!(Supervision::SpawnFailed.outcome(), TaskOutcome::Failed);
        assert_eq!(Supervision::SpawnFailed.exit(), None);
    }

    #[test]
    fn outcome_serializes_snake_case() {
        let raw = serde_json::to_string(&TaskOutcome::NoProgress).expect("serialize");
        assert_eq!(raw, "\"no_progress\"");
    }
}
