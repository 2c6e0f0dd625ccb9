//! Stacks CLI
//!
//! The `stack` command runs a compose tool across a set of stacks in
//! dependency order.
//!
//! ## Commands
//!
//! - `up`: start stacks, dependencies first, waiting for each to be ready
//! - `update`: pull images, then `up`
//! - `restart`: `down` dependents first, then `up` dependencies first
//! - `down`, `kill`, `pause`, `rm`: run dependents first
//! - `logs`, `exec`, `run`, ...: target a single stack
//! - anything else is passed through to the compose tool

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use stacks_core::{
    level_from_verbosity, run, Executor, Invocation, InvocationResult, RunContext, RunRequest,
    StackResult, StacksFile,
};
use stacks_exec::ProcessExecutor;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "stack")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run compose commands across stacks in dependency order", long_about = None)]
struct Cli {
    /// Stacks file (default: search for stacks.yml upwards from the current directory)
    #[arg(short, long, env = "STACKS_FILE")]
    file: Option<PathBuf>,

    /// Comma separated stacks to target (default: all)
    #[arg(short, long, value_delimiter = ',')]
    stacks: Vec<String>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Print the commands that would run without running them
    #[arg(long)]
    dry_run: bool,

    /// Kill an invocation after this many seconds (0 = no limit)
    #[arg(long, default_value = "0")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

/// Arguments forwarded to the compose tool.
#[derive(Args, Debug, Default)]
struct Passthrough {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create and start stacks, dependencies first, waiting until ready
    Up(Passthrough),

    /// Pull images, then bring stacks up
    Update(Passthrough),

    /// Take stacks down, then bring them back up
    Restart(Passthrough),

    /// Stop and remove stacks, dependents first
    Down(Passthrough),

    /// Pull images for stacks
    Pull(Passthrough),

    /// List containers of stacks
    Ps(Passthrough),

    /// Show logs of a single stack
    Logs(Passthrough),

    /// Execute a command in a running service of a single stack
    Exec(Passthrough),

    /// Any other compose subcommand
    #[command(external_subcommand)]
    External(Vec<String>),
}

impl Commands {
    fn is_external(&self) -> bool {
        matches!(self, Commands::External(_))
    }

    /// Split into the command name and its passthrough arguments.
    fn into_parts(self) -> (String, Vec<String>) {
        let (name, pass) = match self {
            Commands::Up(p) => ("up", p),
            Commands::Update(p) => ("update", p),
            Commands::Restart(p) => ("restart", p),
            Commands::Down(p) => ("down", p),
            Commands::Pull(p) => ("pull", p),
            Commands::Ps(p) => ("ps", p),
            Commands::Logs(p) => ("logs", p),
            Commands::Exec(p) => ("exec", p),
            Commands::External(mut argv) => {
                let name = if argv.is_empty() {
                    String::new()
                } else {
                    argv.remove(0)
                };
                return (name, argv);
            }
        };
        (name.to_string(), pass.args)
    }
}

/// Prints each invocation instead of running it.
struct DryRunExecutor;

#[async_trait::async_trait]
impl Executor for DryRunExecutor {
    async fn execute(&self, invocation: &Invocation) -> StackResult<InvocationResult> {
        println!("{}", describe(invocation));
        Ok(InvocationResult::success(0))
    }
}

fn describe(invocation: &Invocation) -> String {
    let mut line = format!("[{}] ", invocation.stack);
    for (key, value) in &invocation.environment {
        line.push_str(&format!("{}={} ", key, value));
    }
    line.push_str(&invocation.command_line());
    line.push_str(&format!("  (in {})", invocation.working_dir.display()));
    line
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = level_from_verbosity(cli.verbose, cli.quiet);
    stacks_core::init_tracing(cli.json, level);

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let file = StacksFile::discover(&cwd, cli.file.as_deref())
        .context("Failed to load stacks file")?;
    info!(path = %file.path.display(), stacks = file.graph.len(), "loaded stacks file");

    let external = cli.command.is_external();
    let (command, args) = cli.command.into_parts();
    if external {
        reject_stack_as_command(&file, &command)?;
    }
    let request = RunRequest::new(command).stacks(cli.stacks).args(args);

    if cli.dry_run {
        cmd_run(&file, &request, &DryRunExecutor).await
    } else {
        let executor = ProcessExecutor::new().with_timeout_secs(cli.timeout);
        executor.listen_for_interrupts();
        cmd_run(&file, &request, &executor).await
    }
}

/// Catches `stack web up`, where the stacks were meant for `--stacks`.
fn reject_stack_as_command(file: &StacksFile, command: &str) -> Result<()> {
    if command.split(',').any(|key| file.graph.contains(key)) {
        anyhow::bail!(
            "`{}` names a stack, not a compose command; select stacks with `--stacks {}`",
            command,
            command
        );
    }
    Ok(())
}

async fn cmd_run(file: &StacksFile, request: &RunRequest, executor: &dyn Executor) -> Result<()> {
    let ctx = RunContext {
        graph: &file.graph,
        base_dir: &file.base_dir,
        tool: &file.tool,
    };

    let report = run(ctx, request, executor)
        .await
        .with_context(|| format!("`{}` failed", request.command))?;

    info!(
        run_id = %report.run_id,
        steps = report.completed.len(),
        "run completed"
    );
    Ok(())
}
