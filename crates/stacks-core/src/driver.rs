//! Plan execution: runs translated invocations stack by stack.
//!
//! [`run`] validates everything up front (arguments, unknown stacks, cycles)
//! and only then hands invocations to an [`Executor`], strictly one at a
//! time in plan order. The first failing invocation halts the run; stacks
//! already processed are left as they are.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::error::{StackError, StackResult};
use crate::graph::StackGraph;
use crate::invocation::{ComposeTool, Invocation, InvocationResult};
use crate::obs::{
    emit_plan_resolved, emit_run_finished, emit_step_failed, emit_step_finished,
    emit_step_started, run_span,
};
use crate::order::{order, Direction};
use crate::resolve::{resolve, resolve_single};
use crate::translate::{translate, InvocationTemplate, Scope};

/// Backend that performs one invocation and blocks until it completes.
///
/// The `stacks-exec` crate provides a process-spawning implementation;
/// tests use a recording fake. `Err` means the invocation could not
/// be performed at all (e.g. the program failed to spawn).
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, invocation: &Invocation) -> StackResult<InvocationResult>;
}

/// What the user asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub command: String,
    /// Requested stack keys; empty means all stacks.
    pub stacks: Vec<String>,
    /// Arguments passed through to the compose tool.
    pub args: Vec<String>,
}

impl RunRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn stacks<I, S>(mut self, stacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stacks = stacks.into_iter().map(Into::into).collect();
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// One ordered sweep, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedPass {
    pub direction: Direction,
    /// Stack keys in execution order.
    pub plan: Vec<String>,
    pub steps: Vec<InvocationTemplate>,
}

/// A successfully completed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub stack: String,
    pub step: String,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of a successful [`run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub command: String,
    pub passes: Vec<PlannedPass>,
    pub completed: Vec<StepRecord>,
}

/// Everything the driver needs besides the request.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    pub graph: &'a StackGraph,
    /// Directory relative stack directories are resolved against.
    pub base_dir: &'a Path,
    pub tool: &'a ComposeTool,
}

/// Translate, resolve and order every pass of `request` without executing
/// anything. All validation errors surface here.
pub fn plan(graph: &StackGraph, request: &RunRequest) -> StackResult<Vec<PlannedPass>> {
    let translation = translate(&request.command, &request.args)?;

    let mut passes = Vec::with_capacity(translation.passes.len());
    for pass in translation.passes {
        let plan = match pass.scope {
            Scope::WithDependencies => {
                let resolved = resolve(graph, &request.stacks)?;
                order(graph, &resolved, pass.direction)?
            }
            Scope::Single => {
                let key = resolve_single(graph, &request.stacks, translation.command.name())?;
                let single: BTreeSet<String> = [key].into_iter().collect();
                order(graph, &single, pass.direction)?
            }
        };
        passes.push(PlannedPass {
            direction: pass.direction,
            plan,
            steps: pass.steps,
        });
    }

    Ok(passes)
}

/// Execute `steps` for every stack of `plan`, in order.
///
/// Invocations are awaited one at a time. If any step of a stack fails, the
/// remaining steps of that stack and all later stacks are skipped and
/// [`StackError::StackOperation`] is returned.
pub async fn execute(
    ctx: RunContext<'_>,
    plan: &[String],
    steps: &[InvocationTemplate],
    executor: &dyn Executor,
) -> StackResult<Vec<StepRecord>> {
    let mut completed = Vec::with_capacity(plan.len() * steps.len());

    for key in plan {
        let stack = ctx.graph.stack(key)?;

        for template in steps {
            let invocation = Invocation::new(template, ctx.tool, stack, ctx.base_dir);
            emit_step_started(&stack.key, &template.step, &invocation.command_line());

            let result = match executor.execute(&invocation).await {
                Ok(result) => result,
                Err(e) => {
                    emit_step_failed(&stack.key, &template.step, &e);
                    return Err(StackError::StackOperation {
                        stack: stack.key.clone(),
                        step: template.step.clone(),
                        reason: e.to_string(),
                    });
                }
            };

            if !result.passed() {
                let reason = result.failure_reason();
                emit_step_failed(&stack.key, &template.step, &reason);
                return Err(StackError::StackOperation {
                    stack: stack.key.clone(),
                    step: template.step.clone(),
                    reason,
                });
            }

            emit_step_finished(&stack.key, &template.step, result.duration_ms);
            completed.push(StepRecord {
                stack: stack.key.clone(),
                step: template.step.clone(),
                duration_ms: result.duration_ms,
                finished_at: Utc::now(),
            });
        }
    }

    Ok(completed)
}

/// Entry point: plan `request` against the graph, then execute each pass.
///
/// No invocation is issued unless every pass plans successfully.
pub async fn run(
    ctx: RunContext<'_>,
    request: &RunRequest,
    executor: &dyn Executor,
) -> StackResult<RunReport> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let span = run_span(&run_id, &request.command);
    run_passes(ctx, request, executor, run_id)
        .instrument(span)
        .await
}

async fn run_passes(
    ctx: RunContext<'_>,
    request: &RunRequest,
    executor: &dyn Executor,
    run_id: String,
) -> StackResult<RunReport> {
    let passes = plan(ctx.graph, request)?;
    for (i, pass) in passes.iter().enumerate() {
        emit_plan_resolved(i, pass.direction, &pass.plan);
    }

    let mut completed = Vec::new();
    for pass in &passes {
        match execute(ctx, &pass.plan, &pass.steps, executor).await {
            Ok(records) => completed.extend(records),
            Err(e) => {
                emit_run_finished(&run_id, completed.len(), false);
                return Err(e);
            }
        }
    }

    emit_run_finished(&run_id, completed.len(), true);
    Ok(RunReport {
        run_id,
        command: request.command.clone(),
        passes,
        completed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Stack;
    use crate::invocation::ExitStatusKind;
    use std::sync::Mutex;

    /// Records every invocation and fails the configured `(stack, step)`.
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<(String, String)>>,
        fail_on: Option<(String, String)>,
    }

    impl RecordingExecutor {
        fn failing(stack: &str, step: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: Some((stack.to_string(), step.to_string())),
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Executor for RecordingExecutor {
        async fn execute(&self, invocation: &Invocation) -> StackResult<InvocationResult> {
            let call = (invocation.stack.clone(), invocation.step.clone());
            self.calls.lock().unwrap().push(call.clone());
            if self.fail_on.as_ref() == Some(&call) {
                Ok(InvocationResult::failed(Some(1), "boom"))
            } else {
                Ok(InvocationResult::success(1))
            }
        }
    }

    fn fleet() -> StackGraph {
        StackGraph::new()
            .with(Stack::new("networks"))
            .with(Stack::new("web").depends_on(["networks"]))
            .with(Stack::new("worker").depends_on(["networks"]))
    }

    fn ctx<'a>(graph: &'a StackGraph, tool: &'a ComposeTool) -> RunContext<'a> {
        RunContext {
            graph,
            base_dir: Path::new("/srv/stacks"),
            tool,
        }
    }

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_up_runs_dependencies_first() {
        let graph = fleet();
        let tool = ComposeTool::default();
        let exec = RecordingExecutor::default();
        let report = run(ctx(&graph, &tool), &RunRequest::new("up").stacks(["web"]), &exec)
            .await
            .unwrap();
        assert_eq!(exec.calls(), pairs(&[("networks", "up"), ("web", "up")]));
        assert_eq!(report.passes[0].plan, vec!["networks", "web"]);
        assert_eq!(report.completed.len(), 2);
    }

    #[tokio::test]
    async fn test_down_runs_dependents_first() {
        let graph = fleet();
        let tool = ComposeTool::default();
        let exec = RecordingExecutor::default();
        run(ctx(&graph, &tool), &RunRequest::new("down"), &exec)
            .await
            .unwrap();
        assert_eq!(
            exec.calls(),
            pairs(&[("web", "down"), ("worker", "down"), ("networks", "down")])
        );
    }

    #[tokio::test]
    async fn test_update_pull_failure_halts_stack_and_plan() {
        let graph = fleet();
        let tool = ComposeTool::default();
        let exec = RecordingExecutor::failing("networks", "pull");
        let err = run(ctx(&graph, &tool), &RunRequest::new("update"), &exec)
            .await
            .unwrap_err();

        // `up` for networks and everything after it never ran.
        assert_eq!(exec.calls(), pairs(&[("networks", "pull")]));
        match err {
            StackError::StackOperation {
                stack,
                step,
                reason,
            } => {
                assert_eq!(stack, "networks");
                assert_eq!(step, "pull");
                assert!(reason.contains("code 1"));
            }
            other => panic!("expected StackOperation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_runs_two_steps_per_stack() {
        let graph = fleet();
        let tool = ComposeTool::default();
        let exec = RecordingExecutor::default();
        run(ctx(&graph, &tool), &RunRequest::new("update").stacks(["worker"]), &exec)
            .await
            .unwrap();
        assert_eq!(
            exec.calls(),
            pairs(&[
                ("networks", "pull"),
                ("networks", "up"),
                ("worker", "pull"),
                ("worker", "up"),
            ])
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_earlier_stacks() {
        let graph = fleet();
        let tool = ComposeTool::default();
        let exec = RecordingExecutor::failing("web", "up");
        let err = run(ctx(&graph, &tool), &RunRequest::new("up"), &exec)
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::StackOperation { ref stack, .. } if stack == "web"));
        // worker comes after web and is never attempted.
        assert_eq!(exec.calls(), pairs(&[("networks", "up"), ("web", "up")]));
    }

    #[tokio::test]
    async fn test_unknown_stack_never_reaches_executor() {
        let graph = fleet();
        let tool = ComposeTool::default();
        let exec = RecordingExecutor::default();
        let err = run(ctx(&graph, &tool), &RunRequest::new("up").stacks(["ghost"]), &exec)
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::UnknownStack { .. }));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_never_reaches_executor() {
        let graph = StackGraph::new()
            .with(Stack::new("a").depends_on(["b"]))
            .with(Stack::new("b").depends_on(["a"]));
        let tool = ComposeTool::default();
        let exec = RecordingExecutor::default();
        let err = run(ctx(&graph, &tool), &RunRequest::new("up").stacks(["a"]), &exec)
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::DependencyCycle { .. }));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_executor() {
        let graph = fleet();
        let tool = ComposeTool::default();
        let exec = RecordingExecutor::default();

        let err = run(ctx(&graph, &tool), &RunRequest::new("--bad"), &exec)
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::InvalidArguments { .. }));

        let err = run(
            ctx(&graph, &tool),
            &RunRequest::new("up").args(["-d", "bad\0arg"]),
            &exec,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StackError::InvalidArguments { .. }));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_single_stack_error_never_reaches_executor() {
        let graph = fleet();
        let tool = ComposeTool::default();
        let exec = RecordingExecutor::default();
        let err = run(
            ctx(&graph, &tool),
            &RunRequest::new("exec").stacks(["web", "worker"]).args(["app", "sh"]),
            &exec,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StackError::SingleStackRequired { count: 2, .. }));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restart_with_unknown_stack_runs_neither_pass() {
        let graph = fleet();
        let tool = ComposeTool::default();
        let exec = RecordingExecutor::default();
        let err = run(
            ctx(&graph, &tool),
            &RunRequest::new("restart").stacks(["web", "ghost"]),
            &exec,
        )
        .await
        .unwrap_err();
        assert!(err.is_validation());
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restart_validates_both_passes_before_running() {
        let graph = fleet();
        let tool = ComposeTool::default();
        let exec = RecordingExecutor::default();
        run(ctx(&graph, &tool), &RunRequest::new("restart").stacks(["web"]), &exec)
            .await
            .unwrap();
        assert_eq!(
            exec.calls(),
            pairs(&[
                ("web", "down"),
                ("networks", "down"),
                ("networks", "up"),
                ("web", "up"),
            ])
        );
    }

    #[tokio::test]
    async fn test_single_stack_command_skips_dependencies() {
        let graph = fleet();
        let tool = ComposeTool::default();
        let exec = RecordingExecutor::default();
        run(
            ctx(&graph, &tool),
            &RunRequest::new("logs").stacks(["web"]).args(["--tail=5"]),
            &exec,
        )
        .await
        .unwrap();
        assert_eq!(exec.calls(), pairs(&[("web", "logs")]));

        let err = run(ctx(&graph, &tool), &RunRequest::new("logs"), &exec)
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::SingleStackRequired { count: 3, .. }));
    }

    #[tokio::test]
    async fn test_interrupted_invocation_halts_run() {
        struct Interrupting;

        #[async_trait::async_trait]
        impl Executor for Interrupting {
            async fn execute(&self, _invocation: &Invocation) -> StackResult<InvocationResult> {
                Ok(InvocationResult {
                    status: ExitStatusKind::Interrupted,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration_ms: 0,
                })
            }
        }

        let graph = fleet();
        let tool = ComposeTool::default();
        let err = run(ctx(&graph, &tool), &RunRequest::new("up"), &Interrupting)
            .await
            .unwrap_err();
        match err {
            StackError::StackOperation { stack, reason, .. } => {
                assert_eq!(stack, "networks");
                assert_eq!(reason, "interrupted");
            }
            other => panic!("expected StackOperation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_executor_error_is_reported_as_stack_operation() {
        struct Unspawnable;

        #[async_trait::async_trait]
        impl Executor for Unspawnable {
            async fn execute(&self, _invocation: &Invocation) -> StackResult<InvocationResult> {
                Err(StackError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "docker: not found",
                )))
            }
        }

        let graph = fleet();
        let tool = ComposeTool::default();
        let err = run(ctx(&graph, &tool), &RunRequest::new("ps"), &Unspawnable)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("docker: not found"));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_plan_reports_all_passes() {
        let graph = fleet();
        let passes = plan(&graph, &RunRequest::new("restart")).unwrap();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].plan, vec!["web", "worker", "networks"]);
        assert_eq!(passes[1].plan, vec!["networks", "web", "worker"]);
    }

    #[test]
    fn test_report_serializes() {
        let report = RunReport {
            run_id: "r1".to_string(),
            command: "up".to_string(),
            passes: plan(&fleet(), &RunRequest::new("up")).unwrap(),
            completed: Vec::new(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["passes"][0]["direction"], "forward");
        assert_eq!(json["passes"][0]["plan"][0], "networks");
    }
}
