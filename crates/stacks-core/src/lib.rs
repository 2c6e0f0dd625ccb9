//! Stacks Core Library
//!
//! Dependency resolution and execution ordering for a fleet of compose
//! projects ("stacks").
//!
//! - [`graph::StackGraph`]: stacks keyed by identity, with dependency edges
//! - [`resolve::resolve`]: transitive dependency closure of a request
//! - [`order::order`]: deterministic topological order, forward or reverse
//! - [`translate::translate`]: command name → passes of invocation templates
//! - [`driver::run`]: validate everything, then execute sequentially
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use stacks_core::{run, RunContext, RunRequest, StacksFile};
//!
//! let file = StacksFile::discover(&std::env::current_dir()?, None)?;
//! let ctx = RunContext { graph: &file.graph, base_dir: &file.base_dir, tool: &file.tool };
//! run(ctx, &RunRequest::new("up").stacks(["web"]), &executor).await?;
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod graph;
pub mod invocation;
pub mod obs;
pub mod order;
pub mod resolve;
pub mod telemetry;
pub mod translate;

pub use config::{find_stacks_file, StacksFile, STACKS_FILE_NAME};
pub use driver::{
    execute, plan, run, Executor, PlannedPass, RunContext, RunReport, RunRequest, StepRecord,
};
pub use error::{StackError, StackResult};
pub use graph::{Stack, StackGraph};
pub use invocation::{ComposeTool, ExitStatusKind, Invocation, InvocationResult};
pub use order::{order, Direction};
pub use resolve::{resolve, resolve_single};
pub use telemetry::{init_tracing, level_from_verbosity};
pub use translate::{translate, Command, InvocationTemplate, Pass, Scope, Translation};
