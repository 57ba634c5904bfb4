//! Deterministic ordering of the task dependency graph.
//!
//! Kahn's algorithm with a sorted ready set: among tasks whose dependencies
//! are satisfied, the smallest `task_id` always goes first, so a fixed plan
//! yields the same order on every run.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::plan::{Edge, Task};

/// A cycle reached the scheduler even though validation should have caught it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleInvariantError {
    /// Tasks left unordered when the ready set ran dry.
    pub remaining: Vec<String>,
}

impl fmt::Display for CycleInvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "internal invariant violated: dependency cycle among [{}] after validation",
            self.remaining.join(", ")
        )
    }
}

impl std::error::Error for CycleInvariantError {}

/// Compute a total order consistent with every edge.
///
/// Edges whose endpoints are not in `nodes` are ignored; the validator
/// reports them separately.
pub fn topological_order(nodes: &[Task], edges: &[Edge]) -> Result<Vec<String>, CycleInvariantError> {
    let (order, remaining) = kahn(nodes, edges);
    if remaining.is_empty() {
        Ok(order)
    } else {
        Err(CycleInvariantError { remaining })
    }
}

/// Task ids that sit on, or downstream of, a dependency cycle.
///
/// Empty when the graph is acyclic.
pub fn cycle_members(nodes: &[Task], edges: &[Edge]) -> Vec<String> {
    kahn(nodes, edges).1
}

/// Every task reachable from `task_id` along dependency edges, sorted.
pub fn dependents_closure(task_id: &str, edges: &[Edge]) -> BTreeSet<String> {
    let successors = successor_map(edges);
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([task_id.to_string()]);
    while let Some(current) = queue.pop_front() {
        let Some(next) = successors.get(current.as_str()) else {
            continue;
        };
        for succ in next {
            if seen.insert(succ.to_string()) {
                queue.push_back(succ.to_string());
            }
        }
    }
    seen.remove(task_id);
    seen
}

fn successor_map(edges: &[Edge]) -> BTreeMap<&str, Vec<&str>> {
    let mut successors: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for edge in edges {
        successors
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
    }
    successors
}

fn kahn(nodes: &[Task], edges: &[Edge]) -> (Vec<String>, Vec<String>) {
    let ids: BTreeSet<&str> = nodes.iter().map(|task| task.task_id.as_str()).collect();
    let mut in_degree: BTreeMap<&str, usize> = ids.iter().map(|id| (*id, 0)).collect();
    let mut successors: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for edge in edges {
        let (from, to) = (edge.from.as_str(), edge.to.as_str());
        if !ids.contains(from) || !ids.contains(to) {
            continue;
        }
        successors.entry(from).or_default().push(to);
        if let Some(degree) = in_degree.get_mut(to) {
            *degree += 1;
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(ids.len());

    while let Some(current) = ready.pop_first() {
        order.push(current.to_string());
        for succ in successors.get(current).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(succ) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*succ);
                }
            }
        }
    }

    let remaining = in_degree
        .into_iter()
        .filter(|(_, degree)| *degree > 0)
        .map(|(id, _)| id.to_string())
        .collect();
    (order, remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Role;
    use crate::test_support::{edge, task};

    fn tasks(ids: &[&str]) -> Vec<Task> {
        ids.iter().map(|id| task(id, Role::Reporter)).collect()
    }

    #[test]
    fn ties_break_by_ascending_id() {
        let nodes = tasks(&["c", "a", "b"]);
        assert_eq!(
            topological_order(&nodes, &[]).expect("order"),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn respects_every_edge() {
        let nodes = tasks(&["a", "b", "c", "d"]);
        let edges = vec![edge("d", "a"), edge("c", "b"), edge("a", "b")];
        let order = topological_order(&nodes, &edges).expect("order");
        assert_eq!(order, vec!["c", "d", "a", "b"]);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let nodes = tasks(&["x", "m", "a", "q"]);
        let edges = vec![edge("q", "a"), edge("m", "x")];
        let first = topological_order(&nodes, &edges).expect("order");
        for _ in 0..10 {
            assert_eq!(topological_order(&nodes, &edges).expect("order"), first);
        }
    }

    #[test]
    fn cycle_is_an_invariant_error() {
        let nodes = tasks(&["a", "b", "c"]);
        let edges = vec![edge("a", "b"), edge("b", "a"), edge("b", "c")];
        let err = topological_order(&nodes, &edges).expect_err("cycle");
        assert_eq!(err.remaining, vec!["a", "b", "c"]);
        assert_eq!(cycle_members(&nodes, &edges), vec!["a", "b", "c"]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let nodes = tasks(&["a"]);
        assert_eq!(cycle_members(&nodes, &[edge("a", "a")]), vec!["a"]);
    }

    #[test]
    fn dependents_closure_is_transitive() {
        let edges = vec![edge("a", "b"), edge("b", "c"), edge("x", "y")];
        let closure: Vec<String> = dependents_closure("a", &edges).into_iter().collect();
        assert_eq!(closure, vec!["b", "c"]);
        assert!(dependents_closure("c", &edges).is_empty());
    }
}
