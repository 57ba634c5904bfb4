//! Plan-wide budget accounting.
//!
//! Totals only ever grow. Overruns are a hard stop for the whole run and are
//! not subject to the plan's failure policy.

use std::fmt;
use std::time::Duration;

use crate::plan::GlobalBudgets;

/// A ceiling that was exceeded.
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetOverrun {
    Runtime { used: f64, limit: f64 },
    FilesChanged { used: u64, limit: i64 },
}

impl fmt::Display for BudgetOverrun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetOverrun::Runtime { used, limit } => {
                write!(f, "runtime budget exceeded: used {used:.3}s of {limit}s")
            }
            BudgetOverrun::FilesChanged { used, limit } => {
                write!(f, "files budget exceeded: touched {used} of {limit}")
            }
        }
    }
}

impl std::error::Error for BudgetOverrun {}

/// Running totals checked against a plan's `global_budgets`.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetAccount {
    limits: GlobalBudgets,
    runtime_used: f64,
    files_touched: u64,
}

impl BudgetAccount {
    pub fn new(limits: GlobalBudgets) -> Self {
        Self {
            limits,
            runtime_used: 0.0,
            files_touched: 0,
        }
    }

    pub fn runtime_used(&self) -> f64 {
        self.runtime_used
    }

    pub fn files_touched(&self) -> u64 {
        self.files_touched
    }

    /// Add one task's consumption. Negative or non-finite runtimes count as zero.
    pub fn record(&mut self, runtime_seconds: f64, files: u64) {
        if runtime_seconds.is_finite() && runtime_seconds > 0.0 {
            self.runtime_used += runtime_seconds;
        }
        self.files_touched = self.files_touched.saturating_add(files);
    }

    /// Compare totals against both ceilings.
    pub fn check(&self) -> Result<(), BudgetOverrun> {
        if self.runtime_used > self.limits.total_runtime_seconds {
            return Err(BudgetOverrun::Runtime {
                used: self.runtime_used,
                limit: self.limits.total_runtime_seconds,
            });
        }
        let within_files = u64::try_from(self.limits.total_files_changed)
            .is_ok_and(|limit| self.files_touched <= limit);
        if !within_files {
            return Err(BudgetOverrun::FilesChanged {
                used: self.files_touched,
                limit: self.limits.total_files_changed,
            });
        }
        Ok(())
    }

    /// Runtime still available to the next task.
    ///
    /// Errors when nothing is left, since a task started now could only
    /// overrun.
    pub fn remaining_runtime(&self) -> Result<Duration, BudgetOverrun> {
        self.check()?;
        let remaining = self.limits.total_runtime_seconds - self.runtime_used;
        if remaining <= 0.0 {
            return Err(BudgetOverrun::Runtime {
                used: self.runtime_used,
                limit: self.limits.total_runtime_seconds,
            });
        }
        Ok(Duration::try_from_secs_f64(remaining).unwrap_or(Duration::MAX))
    }
}
