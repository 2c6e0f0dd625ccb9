//! Deterministic topological ordering of a resolved stack set.
//!
//! Ordering uses Kahn's algorithm over the induced subgraph with an ordered
//! ready set, so whenever several stacks are free to go next the smallest
//! key is taken first. Reverse plans run the same algorithm over reversed
//! edges, which puts dependents ahead of their dependencies while keeping the
//! same ascending tie-break.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{StackError, StackResult};
use crate::graph::StackGraph;

/// Which way dependency edges are honoured in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Dependencies before dependents (bring-up, configuration changes).
    Forward,
    /// Dependents before dependencies (teardown, removal).
    Reverse,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order `resolved` so that every stack's dependencies come before it
/// ([`Direction::Forward`]) or after it ([`Direction::Reverse`]).
///
/// Edges to stacks outside `resolved` are ignored. Fails with
/// [`StackError::DependencyCycle`] rather than returning a partial order.
pub fn order(
    graph: &StackGraph,
    resolved: &BTreeSet<String>,
    direction: Direction,
) -> StackResult<Vec<String>> {
    // `blockers[k]` = members that must be emitted before `k`;
    // `unblocks[k]` = members waiting on `k`.
    let mut blockers: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut unblocks: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for key in resolved {
        let stack = graph.stack(key)?;
        blockers.entry(stack.key.as_str()).or_default();
        unblocks.entry(stack.key.as_str()).or_default();

        for dep in stack.depends_on.iter().filter(|d| resolved.contains(*d)) {
            let (before, after) = match direction {
                Direction::Forward => (dep.as_str(), stack.key.as_str()),
                Direction::Reverse => (stack.key.as_str(), dep.as_str()),
            };
            blockers.entry(after).or_default().insert(before);
            unblocks.entry(before).or_default().insert(after);
        }
    }

    let mut ready: BTreeSet<&str> = blockers
        .iter()
        .filter(|(_, b)| b.is_empty())
        .map(|(k, _)| *k)
        .collect();
    let mut sorted: Vec<String> = Vec::with_capacity(resolved.len());

    while let Some(key) = ready.pop_first() {
        sorted.push(key.to_string());
        for next in unblocks.get(key).into_iter().flatten() {
            if let Some(waiting) = blockers.get_mut(next) {
                waiting.remove(key);
                if waiting.is_empty() {
                    ready.insert(*next);
                }
            }
        }
    }

    if sorted.len() != resolved.len() {
        let path = graph
            .find_cycle(resolved)
            .unwrap_or_else(|| resolved.iter().cloned().collect());
        return Err(StackError::DependencyCycle { path });
    }

    Ok(sorted)
}
