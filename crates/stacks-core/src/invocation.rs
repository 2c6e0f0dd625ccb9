//! Concrete invocations: templates parameterized for a single stack.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{StackError, StackResult};
use crate::graph::Stack;
use crate::translate::InvocationTemplate;

/// The program prefix every invocation starts with, e.g. `docker compose`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeTool {
    /// Program followed by any fixed leading arguments.
    pub command: Vec<String>,
}

impl Default for ComposeTool {
    fn default() -> Self {
        Self {
            command: vec!["docker".to_string(), "compose".to_string()],
        }
    }
}

impl ComposeTool {
    /// Parse a space separated command line such as `podman compose`.
    pub fn parse(command: &str) -> StackResult<Self> {
        let command: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if command.is_empty() {
            return Err(StackError::InvalidArguments {
                reason: "compose command is empty".to_string(),
            });
        }
        Ok(Self { command })
    }

    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("docker")
    }
}

/// A fully resolved tool call for one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Stack this invocation belongs to.
    pub stack: String,
    /// Step label copied from the template.
    pub step: String,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Environment overlay on top of the inherited environment.
    pub environment: BTreeMap<String, String>,
}

impl Invocation {
    /// Build the invocation for `stack` from `template`.
    ///
    /// Arguments are laid out as `<tool args> -p <name> [-f <file>]...
    /// <subcommand> <template args>`.
    pub fn new(
        template: &InvocationTemplate,
        tool: &ComposeTool,
        stack: &Stack,
        base_dir: &Path,
    ) -> Self {
        let mut args: Vec<String> = tool.command.iter().skip(1).cloned().collect();
        args.push("-p".to_string());
        args.push(stack.name.clone());
        for file in &stack.files {
            args.push("-f".to_string());
            args.push(file.clone());
        }
        args.push(template.subcommand.clone());
        args.extend(template.args.iter().cloned());

        Self {
            stack: stack.key.clone(),
            step: template.step.clone(),
            program: tool.program().to_string(),
            args,
            working_dir: stack.working_dir(base_dir),
            environment: stack.environment.clone(),
        }
    }

    /// Human-readable command line, for logs and dry runs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatusKind {
    Success,
    /// The process exited unsuccessfully; `None` when killed by a signal.
    Failed { code: Option<i32> },
    /// The user interrupted the run while this invocation was active.
    Interrupted,
    TimedOut,
}

/// Outcome reported by an executor for one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub status: ExitStatusKind,
    /// Captured output, empty when the executor streams to the terminal.
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl InvocationResult {
    pub fn success(duration_ms: u64) -> Self {
        Self {
            status: ExitStatusKind::Success,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms,
        }
    }

    pub fn failed(code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            status: ExitStatusKind::Failed { code },
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == ExitStatusKind::Success
    }

    /// Short reason suitable for an error message.
    pub fn failure_reason(&self) -> String {
        let base = match self.status {
            ExitStatusKind::Success => return "succeeded".to_string(),
            ExitStatusKind::Failed { code: Some(code) } => format!("exited with code {}", code),
            ExitStatusKind::Failed { code: None } => "terminated by signal".to_string(),
            ExitStatusKind::Interrupted => "interrupted".to_string(),
            ExitStatusKind::TimedOut => "timed out".to_string(),
        };
        match self.stderr.trim().lines().last() {
            Some(line) if !line.is_empty() => format!("{}: {}", base, line),
            _ => base,
        }
    }
}
