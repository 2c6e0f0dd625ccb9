//! Command translation: user-facing command names to invocation templates.
//!
//! A handful of commands get special treatment (`up` waits for services,
//! `update` pulls before bringing up, teardown commands run in reverse
//! order). Everything else is handed to the compose tool verbatim so the
//! CLI stays a superset of the tool's command surface.

use serde::{Deserialize, Serialize};

use crate::error::{StackError, StackResult};
use crate::order::Direction;

/// Flag that makes `up` block until services are running/healthy.
pub const WAIT_FLAG: &str = "--wait";

/// Commands passed through in reverse (dependents first) order.
const REVERSE_COMMANDS: &[&str] = &["down", "kill", "pause", "rm"];

/// Commands that target exactly one stack and skip its dependencies.
const SINGLE_STACK_COMMANDS: &[&str] = &[
    "cp", "events", "exec", "logs", "port", "run", "start", "stop", "top",
];

/// Which stacks a pass applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// The requested stacks plus everything they depend on.
    WithDependencies,
    /// Exactly one stack, dependencies untouched.
    Single,
}

/// Commands with a fixed expansion, plus the passthrough fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// `up --wait`
    Up,
    /// `pull` then `up --wait`
    Update,
    /// `down` in reverse order, then `up --wait` in forward order
    Restart,
    /// Any other compose subcommand.
    Passthrough(String),
}

impl Command {
    /// Classify a command name. Never fails; unknown names pass through.
    pub fn parse(name: &str) -> Self {
        match name {
            "up" => Command::Up,
            "update" => Command::Update,
            "restart" => Command::Restart,
            other => Command::Passthrough(other.to_string()),
        }
    }

    /// The name as typed by the user.
    pub fn name(&self) -> &str {
        match self {
            Command::Up => "up",
            Command::Update => "update",
            Command::Restart => "restart",
            Command::Passthrough(name) => name,
        }
    }

    /// Expand into passes, with `args` placed where the command expects
    /// them.
    pub fn passes(&self, args: &[String]) -> Vec<Pass> {
        match self {
            Command::Up => vec![Pass::forward(vec![InvocationTemplate::up(args)])],
            Command::Update => vec![Pass::forward(vec![
                InvocationTemplate::new("pull", "pull", Vec::new()),
                InvocationTemplate::up(args),
            ])],
            Command::Restart => vec![
                Pass {
                    direction: Direction::Reverse,
                    scope: Scope::WithDependencies,
                    steps: vec![InvocationTemplate::new("down", "down", args.to_vec())],
                },
                Pass::forward(vec![InvocationTemplate::up(&[])]),
            ],
            Command::Passthrough(name) => {
                let template = InvocationTemplate::new(name, name, args.to_vec());
                let (direction, scope) = if REVERSE_COMMANDS.contains(&name.as_str()) {
                    (Direction::Reverse, Scope::WithDependencies)
                } else if SINGLE_STACK_COMMANDS.contains(&name.as_str()) {
                    (Direction::Forward, Scope::Single)
                } else {
                    (Direction::Forward, Scope::WithDependencies)
                };
                vec![Pass {
                    direction,
                    scope,
                    steps: vec![template],
                }]
            }
        }
    }
}

/// A stack-agnostic description of one compose tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationTemplate {
    /// Label used in logs and errors, e.g. `pull` or `up`.
    pub step: String,
    /// Compose subcommand.
    pub subcommand: String,
    /// Arguments following the subcommand.
    pub args: Vec<String>,
}

impl InvocationTemplate {
    pub fn new(step: impl Into<String>, subcommand: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            step: step.into(),
            subcommand: subcommand.into(),
            args,
        }
    }

    /// `up --wait <args>`, without doubling a user-supplied `--wait`.
    fn up(args: &[String]) -> Self {
        let mut full = Vec::with_capacity(args.len() + 1);
        if !args.iter().any(|a| a == WAIT_FLAG) {
            full.push(WAIT_FLAG.to_string());
        }
        full.extend(args.iter().cloned());
        Self::new("up", "up", full)
    }
}

/// One sweep over an ordered plan, applying `steps` to every stack in turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pass {
    pub direction: Direction,
    pub scope: Scope,
    /// Templates run for each stack, in order.
    pub steps: Vec<InvocationTemplate>,
}

impl Pass {
    fn forward(steps: Vec<InvocationTemplate>) -> Self {
        Self {
            direction: Direction::Forward,
            scope: Scope::WithDependencies,
            steps,
        }
    }
}

/// Result of translating a command: the passes to run, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub command: Command,
    pub passes: Vec<Pass>,
}

/// Translate a command name and passthrough arguments into passes of
/// invocation templates.
///
/// Fails with [`StackError::InvalidArguments`] when the command name is
/// empty or looks like a flag, or when any argument contains a NUL byte.
pub fn translate(command: &str, args: &[String]) -> StackResult<Translation> {
    if command.is_empty() {
        return Err(StackError::InvalidArguments {
            reason: "command name is empty".to_string(),
        });
    }
    if command.starts_with('-') {
        return Err(StackError::InvalidArguments {
            reason: format!("`{}` is not a command name", command),
        });
    }
    if command.contains('\0') {
        return Err(StackError::InvalidArguments {
            reason: "command name contains a NUL byte".to_string(),
        });
    }
    if let Some(pos) = args.iter().position(|a| a.contains('\0')) {
        return Err(StackError::InvalidArguments {
            reason: format!("argument {} contains a NUL byte", pos + 1),
        });
    }

    let command = Command::parse(command);
    let passes = command.passes(args);
    Ok(Translation { command, passes })
}
