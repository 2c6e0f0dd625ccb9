//! Stack graph: named compose projects and their declared dependencies.
//!
//! Stacks are stored keyed by identity in a `BTreeMap`, and each stack lists
//! the keys it depends on. An edge `web → networks` means "web depends on
//! networks": networks must be brought up before web, and torn down after it.
//!
//! The graph is built once per invocation and never mutated while a command
//! runs. Traversals are key based so they can be exercised in isolation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{StackError, StackResult};

/// A single compose project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    /// Unique identity, the key under `stacks:` in the stacks file.
    pub key: String,
    /// Compose project name passed as `-p`. Defaults to the key.
    pub name: String,
    /// Project directory. Defaults to the key; relative paths are resolved
    /// against the stacks file's directory.
    pub directory: Option<PathBuf>,
    /// Compose files passed as `-f`. Empty means the tool's own discovery.
    pub files: Vec<String>,
    /// Environment overlay applied to every invocation for this stack.
    pub environment: BTreeMap<String, String>,
    /// Keys of the stacks this one depends on, in declaration order.
    pub depends_on: Vec<String>,
}

impl Stack {
    /// Create a stack whose name and directory default to `key`.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            directory: None,
            files: Vec::new(),
            environment: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    /// Builder-style helper to declare dependencies.
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    /// The working directory for this stack's invocations.
    pub fn working_dir(&self, base_dir: &Path) -> PathBuf {
        match &self.directory {
            Some(dir) => base_dir.join(dir),
            None => base_dir.join(&self.key),
        }
    }
}

/// Three-colour marking used by the cycle search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Read-only mapping from stack key to [`Stack`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackGraph {
    stacks: BTreeMap<String, Stack>,
}

impl StackGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a [`Stack`]. Re-registering an existing key replaces it.
    pub fn insert(&mut self, stack: Stack) {
        self.stacks.insert(stack.key.clone(), stack);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, stack: Stack) -> Self {
        self.insert(stack);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Stack> {
        self.stacks.get(key)
    }

    /// Look up a stack, failing with [`StackError::UnknownStack`].
    pub fn stack(&self, key: &str) -> StackResult<&Stack> {
        self.stacks.get(key).ok_or_else(|| StackError::UnknownStack {
            stack: key.to_string(),
            referenced_by: None,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.stacks.contains_key(key)
    }

    /// All keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.stacks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Direct dependencies of `key`.
    pub fn dependencies_of(&self, key: &str) -> StackResult<&[String]> {
        Ok(&self.stack(key)?.depends_on)
    }

    /// Check referential integrity and acyclicity over the whole graph.
    pub fn validate(&self) -> StackResult<()> {
        for stack in self.stacks.values() {
            for dep in &stack.depends_on {
                if !self.stacks.contains_key(dep) {
                    return Err(StackError::UnknownStack {
                        stack: dep.clone(),
                        referenced_by: Some(stack.key.clone()),
                    });
                }
            }
        }

        let all: BTreeSet<String> = self.stacks.keys().cloned().collect();
        match self.find_cycle(&all) {
            Some(path) => Err(StackError::DependencyCycle { path }),
            None => Ok(()),
        }
    }

    /// Depth-first search for a cycle among `members`, following only edges
    /// whose target is also a member. Returns the cycle as a closed path,
    /// e.g. `["a", "b", "a"]`, or `["a", "a"]` for a self-dependency.
    ///
    /// Roots and edges are visited in ascending key order so the reported
    /// cycle is stable across runs.
    pub fn find_cycle(&self, members: &BTreeSet<String>) -> Option<Vec<String>> {
        let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();
        let mut path: Vec<&str> = Vec::new();

        for root in members {
            if marks.contains_key(root.as_str()) {
                continue;
            }
            if let Some(cycle) = self.visit(root, members, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    fn visit<'a>(
        &'a self,
        key: &'a str,
        members: &BTreeSet<String>,
        marks: &mut BTreeMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(key) {
            Some(Mark::Done) => return None,
            Some(Mark::InProgress) => {
                // `key` is on the current path: the cycle is the suffix
                // starting at its first occurrence, closed with `key`.
                let start = path.iter().position(|k| *k == key).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|k| k.to_string()).collect();
                cycle.push(key.to_string());
                return Some(cycle);
            }
            None => {}
        }

        marks.insert(key, Mark::InProgress);
        path.push(key);

        if let Some(stack) = self.stacks.get(key) {
            let deps: BTreeSet<&str> = stack
                .depends_on
                .iter()
                .map(String::as_str)
                .filter(|d| members.contains(*d))
                .collect();
            for dep in deps {
                if let Some(cycle) = self.visit(dep, members, marks, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        marks.insert(key, Mark::Done);
        None
    }
}

impl FromIterator<Stack> for StackGraph {
    fn from_iter<I: IntoIterator<Item = Stack>>(iter: I) -> Self {
        let mut graph = StackGraph::new();
        for stack in iter {
            graph.insert(stack);
        }
        graph
    }
}
