//! Test-only builders for plans and policies, plus a scripted process backend.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

use crate::core::policy::{
    AllowListEntry, CapabilityPolicy, CapabilityTier, CommandAllowList, PolicyContext,
};
use crate::core::types::ProcessExit;
use crate::io::process::{LaunchSpec, Launcher, ProcessHandle, ProcessStatus};
use crate::plan::{Edge, FailPolicy, GlobalBudgets, Operation, Plan, Role, Task};

/// Create a read-only task with no command and generous limits.
pub fn task(id: &str, role: Role) -> Task {
    Task {
        task_id: id.to_string(),
        parent_id: None,
        role,
        inputs: Vec::new(),
        outputs: Vec::new(),
        allowed_operations: vec![Operation::Read],
        max_runtime_seconds: 5.0,
        max_files_touched: 0,
        success_criteria: Vec::new(),
        required_evidence: Vec::new(),
        exec: None,
        args: None,
        no_progress_seconds: None,
    }
}

/// Create a task bound to `exec` with `args`.
pub fn command_task(id: &str, role: Role, exec: &str, args: &[&str]) -> Task {
    Task {
        exec: Some(exec.to_string()),
        args: Some(args.iter().map(|arg| arg.to_string()).collect()),
        ..task(id, role)
    }
}

pub fn edge(from: &str, to: &str) -> Edge {
    Edge {
        from: from.to_string(),
        to: to.to_string(),
    }
}

/// Plan `p1` with a 60s / 10 file budget under `fail_closed`.
pub fn plan_with(nodes: Vec<Task>, edges: Vec<Edge>) -> Plan {
    Plan {
        plan_id: "p1".to_string(),
        nodes,
        edges,
        global_budgets: GlobalBudgets {
            total_runtime_seconds: 60.0,
            total_files_changed: 10,
        },
        fail_policy: FailPolicy::FailClosed,
    }
}

/// A policy whose tier allows every operation and whose allow-list lets
/// every role run `sh`, `sleep`, `true` and `false` with any arguments.
pub fn permissive_policy() -> PolicyContext {
    let mut tiers = BTreeMap::new();
    tiers.insert(
        "all".to_string(),
        CapabilityTier {
            allowed_operations: [
                Operation::Read,
                Operation::Write,
                Operation::Test,
                Operation::Report,
            ]
            .into_iter()
            .collect(),
        },
    );
    let entries: Vec<AllowListEntry> = ["sh", "sleep", "true", "false"]
        .iter()
        .map(|exec| AllowListEntry {
            exec: exec.to_string(),
            ..AllowListEntry::default()
        })
        .collect();
    let commands: CommandAllowList = [
        Role::Planner,
        Role::Builder,
        Role::Tester,
        Role::Reviewer,
        Role::Reporter,
    ]
    .into_iter()
    .map(|role| (role, entries.clone()))
    .collect();
    PolicyContext {
        capabilities: CapabilityPolicy {
            current_tier: "all".to_string(),
            tiers,
        },
        commands,
    }
}

/// Scripted behavior for one fake process.
#[derive(Debug, Clone)]
pub struct ScriptedProcess {
    behavior: Behavior,
    creates: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum Behavior {
    ExitsAfter(Duration, i32),
    RunsForever { grow_output: bool },
    FailsToSpawn,
    PollFails,
}

impl ScriptedProcess {
    pub fn exits_after(delay: Duration, code: i32) -> Self {
        Self {
            behavior: Behavior::ExitsAfter(delay, code),
            creates: Vec::new(),
        }
    }

    /// Never exits on its own; optionally appends to stdout on every poll.
    pub fn runs_forever(grow_output: bool) -> Self {
        Self {
            behavior: Behavior::RunsForever { grow_output },
            creates: Vec::new(),
        }
    }

    pub fn fails_to_spawn() -> Self {
        Self {
            behavior: Behavior::FailsToSpawn,
            creates: Vec::new(),
        }
    }

    /// Spawns, then errors on the first poll.
    pub fn fails_on_poll() -> Self {
        Self {
            behavior: Behavior::PollFails,
            creates: Vec::new(),
        }
    }

    /// Files (relative to the launch workdir) written when the process exits.
    pub fn creating(mut self, paths: &[&str]) -> Self {
        self.creates = paths.iter().map(|path| path.to_string()).collect();
        self
    }
}

/// Launcher that hands out scripted processes in order and records specs.
pub struct ScriptedLauncher {
    queue: RefCell<VecDeque<ScriptedProcess>>,
    launched: RefCell<Vec<LaunchSpec>>,
    kills: Rc<Cell<usize>>,
}

impl ScriptedLauncher {
    pub fn new(processes: Vec<ScriptedProcess>) -> Self {
        Self {
            queue: RefCell::new(processes.into()),
            launched: RefCell::new(Vec::new()),
            kills: Rc::new(Cell::new(0)),
        }
    }

    /// Every spec passed to `launch`, including failed spawns.
    pub fn launched(&self) -> Vec<LaunchSpec> {
        self.launched.borrow().clone()
    }

    /// How many times any handed-out process was killed.
    pub fn kills(&self) -> usize {
        self.kills.get()
    }
}

impl Launcher for ScriptedLauncher {
    type Handle = ScriptedHandle;

    fn launch(&self, spec: &LaunchSpec) -> Result<ScriptedHandle> {
        self.launched.borrow_mut().push(spec.clone());
        let process = self
            .queue
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted process left for {}", spec.program))?;
        if matches!(process.behavior, Behavior::FailsToSpawn) {
            return Err(anyhow!("scripted spawn failure for {}", spec.program));
        }
        Ok(ScriptedHandle {
            process,
            started: Instant::now(),
            workdir: spec.workdir.clone(),
            stdout_path: spec.stdout_path.clone(),
            kills: Rc::clone(&self.kills),
        })
    }
}

pub struct ScriptedHandle {
    process: ScriptedProcess,
    started: Instant,
    workdir: PathBuf,
    stdout_path: PathBuf,
    kills: Rc<Cell<usize>>,
}

impl ScriptedHandle {
    fn finish(&self, code: i32) -> Result<ProcessStatus> {
        for rel in &self.process.creates {
            let path = self.workdir.join(rel);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, "scripted\n")?;
        }
        Ok(ProcessStatus::Exited(ProcessExit::code(code)))
    }
}

impl ProcessHandle for ScriptedHandle {
    fn poll(&mut self, wait: Duration) -> Result<ProcessStatus> {
        match self.process.behavior {
            Behavior::ExitsAfter(delay, code) => {
                let remaining = delay.saturating_sub(self.started.elapsed());
                thread::sleep(remaining.min(wait));
                if self.started.elapsed() >= delay {
                    return self.finish(code);
                }
                Ok(ProcessStatus::Running)
            }
            Behavior::RunsForever { grow_output } => {
                thread::sleep(wait);
                if grow_output {
                    let mut file = OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&self.stdout_path)?;
                    file.write_all(b".")?;
                }
                Ok(ProcessStatus::Running)
            }
            Behavior::FailsToSpawn => Err(anyhow!("scripted process was never spawned")),
            Behavior::PollFails => Err(anyhow!("scripted poll failure")),
        }
    }

    fn kill(&mut self) -> Result<ProcessExit> {
        self.kills.set(self.kills.get() + 1);
        Ok(ProcessExit {
            code: None,
            signal: Some(9),
        })
    }
}
