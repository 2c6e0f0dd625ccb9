//! Structured observability hooks for run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via [`run_span`]
//! - Emission functions for plan resolution and per-step progress
//!
//! Events are emitted at `info!` level except step starts, which are
//! `debug!`. Filter with `RUST_LOG`; pass `--json` to the CLI for JSON lines.

use tracing::{debug, info, warn, Span};

use crate::order::Direction;

/// Span that tags every event of one run with its id and command.
///
/// # Example
///
/// ```ignore
/// async { /* plan and execute */ }.instrument(run_span(&run_id, "up")).await
/// ```
pub fn run_span(run_id: &str, command: &str) -> Span {
    tracing::info_span!("stacks.run", run_id = %run_id, command = %command)
}

/// Emit event: a pass has been resolved and ordered.
pub fn emit_plan_resolved(pass: usize, direction: Direction, plan: &[String]) {
    info!(
        event = "plan.resolved",
        pass = pass,
        direction = %direction,
        stacks = %plan.join(","),
    );
}

/// Emit event: an invocation is about to start.
pub fn emit_step_started(stack: &str, step: &str, command_line: &str) {
    debug!(event = "step.started", stack = %stack, step = %step, command = %command_line);
}

/// Emit event: an invocation completed successfully.
pub fn emit_step_finished(stack: &str, step: &str, duration_ms: u64) {
    info!(
        event = "step.finished",
        stack = %stack,
        step = %step,
        duration_ms = duration_ms,
    );
}

/// Emit event: an invocation failed and the run is halting (warning level).
pub fn emit_step_failed(stack: &str, step: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "step.failed", stack = %stack, step = %step, reason = %reason);
}

/// Emit event: run finished.
pub fn emit_run_finished(run_id: &str, steps: usize, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        steps = steps,
        success = success,
    );
}
