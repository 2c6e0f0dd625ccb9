//! Error types for stack resolution, ordering and execution.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while planning or running a command across stacks.
#[derive(Debug, Error)]
pub enum StackError {
    /// A stack was requested, or referenced as a dependency, but is not
    /// defined in the graph.
    #[error("{}", unknown_stack_message(.stack, .referenced_by.as_deref()))]
    UnknownStack {
        stack: String,
        referenced_by: Option<String>,
    },

    /// The dependency relation contains a cycle.
    #[error("invalid dependency cycle: {}", .path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    /// The command or its passthrough arguments cannot be turned into an
    /// invocation.
    #[error("invalid arguments: {reason}")]
    InvalidArguments { reason: String },

    /// A single-stack command was given zero or several stacks.
    #[error("command `{command}` can only operate on one stack but {count} were provided")]
    SingleStackRequired { command: String, count: usize },

    /// An invocation for a stack did not succeed.
    #[error("stack \"{stack}\" failed at step `{step}`: {reason}")]
    StackOperation {
        stack: String,
        step: String,
        reason: String,
    },

    /// The stacks file could not be read or decoded.
    #[error("invalid stacks file {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    /// No stacks file was found during discovery.
    #[error("no stacks.yml file present in {} or any of its parents", .searched.display())]
    ConfigNotFound { searched: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StackError {
    /// `true` for errors that are detected before any invocation is issued.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StackError::UnknownStack { .. }
                | StackError::DependencyCycle { .. }
                | StackError::InvalidArguments { .. }
                | StackError::SingleStackRequired { .. }
        )
    }
}

fn unknown_stack_message(stack: &str, referenced_by: Option<&str>) -> String {
    match referenced_by {
        Some(parent) => format!(
            "invalid dependency: \"{}\" (required by \"{}\") is not a known stack",
            stack, parent
        ),
        None => format!("unknown stack \"{}\"", stack),
    }
}

/// Convenience result alias.
pub type StackResult<T> = std::result::Result<T, StackError>;
