//! Dependency closure over a requested set of stacks.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{StackError, StackResult};
use crate::graph::StackGraph;

/// Compute the set of stacks needed to satisfy `requested`.
///
/// An empty request means every stack in the graph. Otherwise the result is
/// the requested stacks plus, transitively, everything they depend on.
///
/// Fails with [`StackError::UnknownStack`] when a requested name or any
/// dependency reached from it is missing, and with
/// [`StackError::DependencyCycle`] when the resolved set contains a cycle.
pub fn resolve<S: AsRef<str>>(graph: &StackGraph, requested: &[S]) -> StackResult<BTreeSet<String>> {
    for name in requested {
        let name = name.as_ref();
        if !graph.contains(name) {
            return Err(StackError::UnknownStack {
                stack: name.to_string(),
                referenced_by: None,
            });
        }
    }

    let resolved = if requested.is_empty() {
        let all: BTreeSet<String> = graph.keys().map(str::to_string).collect();
        // Dangling edges are still an error when every stack is selected.
        for key in &all {
            check_dependencies(graph, key)?;
        }
        all
    } else {
        closure(graph, requested)?
    };

    if let Some(path) = graph.find_cycle(&resolved) {
        return Err(StackError::DependencyCycle { path });
    }

    debug!(
        requested = requested.len(),
        resolved = resolved.len(),
        "resolved stack closure"
    );
    Ok(resolved)
}

/// Resolve a request for a command that operates on exactly one stack,
/// without pulling in its dependencies.
///
/// An empty request selects every stack, which only succeeds when the graph
/// holds a single stack.
pub fn resolve_single<S: AsRef<str>>(
    graph: &StackGraph,
    requested: &[S],
    command: &str,
) -> StackResult<String> {
    let mut selected: BTreeSet<&str> = BTreeSet::new();
    for name in requested {
        let stack = graph.stack(name.as_ref())?;
        selected.insert(stack.key.as_str());
    }
    if selected.is_empty() {
        selected = graph.keys().collect();
    }

    let mut iter = selected.iter();
    match (iter.next(), iter.next()) {
        (Some(key), None) => Ok(key.to_string()),
        _ => Err(StackError::SingleStackRequired {
            command: command.to_string(),
            count: selected.len(),
        }),
    }
}

fn check_dependencies(graph: &StackGraph, key: &str) -> StackResult<()> {
    for dep in graph.dependencies_of(key)? {
        if !graph.contains(dep) {
            return Err(StackError::UnknownStack {
                stack: dep.clone(),
                referenced_by: Some(key.to_string()),
            });
        }
    }
    Ok(())
}

fn closure<S: AsRef<str>>(graph: &StackGraph, requested: &[S]) -> StackResult<BTreeSet<String>> {
    let mut resolved: BTreeSet<String> = BTreeSet::new();
    let mut pending: Vec<String> = requested.iter().map(|s| s.as_ref().to_string()).collect();

    while let Some(key) = pending.pop() {
        if !resolved.insert(key.clone()) {
            continue;
        }
        check_dependencies(graph, &key)?;
        for dep in graph.dependencies_of(&key)? {
            if !resolved.contains(dep) {
                pending.push(dep.clone());
            }
        }
    }

    Ok(resolved)
}
