//! Compose tool execution as child processes.

use std::process::{Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use stacks_core::{ExitStatusKind, Executor, Invocation, InvocationResult, StackResult};
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Where a child's stdout and stderr go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Stream straight to the terminal.
    #[default]
    Inherit,
    /// Collect into the [`InvocationResult`].
    Capture,
}

/// Ctrl-C state shared by every invocation an executor runs.
///
/// A single listener is installed for the life of the executor, so a
/// signal arriving between two invocations is still seen by the next one.
#[derive(Debug, Default)]
struct InterruptState {
    listening: OnceLock<()>,
    interrupted: AtomicBool,
    notify: Notify,
}

impl InterruptState {
    fn trigger(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_set(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Resolves once an interrupt has been recorded.
    async fn wait(&self) {
        loop {
            // Registered before the check so a trigger in between is not lost.
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

/// Spawn the Ctrl-C listener once. Must be called within a tokio runtime.
fn listen(state: &Arc<InterruptState>) {
    state.listening.get_or_init(|| {
        let state = Arc::clone(state);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, halting after the current invocation");
                state.trigger();
            }
        });
    });
}

/// [`Executor`] that spawns the compose tool and waits for it to exit.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    output: OutputMode,
    timeout: Option<Duration>,
    interruptible: bool,
    interrupt: Arc<InterruptState>,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self {
            output: OutputMode::Inherit,
            timeout: None,
            interruptible: true,
            interrupt: Arc::new(InterruptState::default()),
        }
    }
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Per-invocation time limit; `0` disables it.
    pub fn with_timeout_secs(self, secs: u64) -> Self {
        let timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self.with_timeout(timeout)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether Ctrl-C kills the active child and reports it as interrupted.
    pub fn interruptible(mut self, interruptible: bool) -> Self {
        self.interruptible = interruptible;
        self
    }

    /// Start listening for Ctrl-C now rather than at the first invocation.
    ///
    /// Once listening, a Ctrl-C no longer terminates the process; it makes
    /// the active invocation, or the next one, report
    /// [`ExitStatusKind::Interrupted`]. Does nothing when not interruptible.
    /// Must be called within a tokio runtime.
    pub fn listen_for_interrupts(&self) {
        if self.interruptible {
            listen(&self.interrupt);
        }
    }

    fn command(&self, invocation: &Invocation) -> Command {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .envs(&invocation.environment)
            .kill_on_drop(true);

        match self.output {
            OutputMode::Inherit => {
                command
                    .stdin(Stdio::inherit())
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit());
            }
            OutputMode::Capture => {
                command
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped());
            }
        }
        command
    }
}

enum Outcome {
    Exited(Output),
    TimedOut,
    Interrupted,
}

fn interrupted(duration_ms: u64) -> InvocationResult {
    InvocationResult {
        status: ExitStatusKind::Interrupted,
        stdout: String::new(),
        stderr: String::new(),
        duration_ms,
    }
}

#[async_trait::async_trait]
impl Executor for ProcessExecutor {
    async fn execute(&self, invocation: &Invocation) -> StackResult<InvocationResult> {
        let start = Instant::now();
        self.listen_for_interrupts();
        if self.interruptible && self.interrupt.is_set() {
            return Ok(interrupted(0));
        }

        let child = self.command(invocation).spawn()?;
        debug!(
            stack = %invocation.stack,
            step = %invocation.step,
            pid = child.id(),
            "spawned compose tool"
        );

        // Dropping the wait future drops the child, which kills it.
        let timeout = self.timeout;
        let wait = async move {
            let output = child.wait_with_output();
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, output).await {
                    Ok(output) => output.map(Outcome::Exited),
                    Err(_) => Ok(Outcome::TimedOut),
                },
                None => output.await.map(Outcome::Exited),
            }
        };

        let interrupt = async {
            if self.interruptible {
                self.interrupt.wait().await
            } else {
                std::future::pending::<()>().await
            }
        };
        let outcome = tokio::select! {
            outcome = wait => outcome?,
            _ = interrupt => Outcome::Interrupted,
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let result = match outcome {
            Outcome::Exited(output) => InvocationResult {
                status: if output.status.success() {
                    ExitStatusKind::Success
                } else {
                    ExitStatusKind::Failed {
                        code: output.status.code(),
                    }
                },
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                duration_ms,
            },
            Outcome::TimedOut => InvocationResult {
                status: ExitStatusKind::TimedOut,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms,
            },
            Outcome::Interrupted => interrupted(duration_ms),
        };

        Ok(result)
    }
}
