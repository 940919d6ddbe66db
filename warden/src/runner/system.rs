//! Runner backed by real child processes.

use super::result::{CapturedOutput, CommandOutcome, CommandResult};
use super::{CommandRunner, CommandSpec, KILL_GRACE, OUTPUT_CEILING_BYTES};
use crate::util::process::signal_process_group;
use async_trait::async_trait;
use nix::sys::signal::Signal;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use warden_shared::{WardenError, WardenResult};

enum Termination {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Runs commands as child processes of the orchestrator.
///
/// Each child is placed in its own process group so that a timeout or an
/// operator interrupt terminates the whole tree, not just the immediate child.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    cancel: CancellationToken,
    output_ceiling: usize,
    kill_grace: Duration,
}

impl SystemRunner {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            output_ceiling: OUTPUT_CEILING_BYTES,
            kill_grace: KILL_GRACE,
        }
    }

    pub fn with_output_ceiling(mut self, bytes: usize) -> Self {
        self.output_ceiling = bytes;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// SIGTERM the process group, then SIGKILL it if the child outlives the grace period.
    async fn terminate_group(&self, pgid: Option<u32>, child: &mut Child) {
        let Some(pgid) = pgid else {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return;
        };

        signal_process_group(pgid, Signal::SIGTERM);
        match tokio::time::timeout(self.kill_grace, child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!(pgid, "Process group ignored SIGTERM, sending SIGKILL");
                signal_process_group(pgid, Signal::SIGKILL);
                let _ = child.wait().await;
            }
        }
        // Stragglers that left the leader's wait() behind still share the group.
        signal_process_group(pgid, Signal::SIGKILL);
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> WardenResult<CommandResult> {
        if self.cancel.is_cancelled() {
            return Err(WardenError::Interrupted);
        }

        let command_line = spec.display();
        tracing::debug!(
            command = %command_line,
            timeout_secs = spec.timeout_duration().as_secs(),
            allow_failure = spec.allows_failure(),
            "Running command"
        );

        let started = Instant::now();
        let mut cmd = tokio::process::Command::new(spec.program());
        cmd.args(&spec.argv()[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0);
        for (key, value) in spec.env_vars() {
            cmd.env(key, value);
        }
        if let Some(dir) = spec.cwd() {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!(command = %command_line, error = %e, "Failed to spawn command");
                let detail = format!("`{}` could not be started: {}", command_line, e);
                return Ok(CommandResult {
                    command: command_line,
                    exit_code: None,
                    stdout: CapturedOutput::default(),
                    stderr: CapturedOutput::default(),
                    duration: started.elapsed(),
                    timed_out: false,
                    outcome: CommandOutcome::failure(spec.allows_failure(), detail),
                });
            }
        };

        // With process_group(0) the group id equals the leader's pid.
        let pgid = child.id();
        let stdout_task = tokio::spawn(read_capped(child.stdout.take(), self.output_ceiling));
        let stderr_task = tokio::spawn(read_capped(child.stderr.take(), self.output_ceiling));

        let termination = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => Termination::Exited(status),
                Err(e) => {
                    return Err(WardenError::Internal(format!(
                        "failed to wait for `{}`: {}",
                        command_line, e
                    )));
                }
            },
            _ = tokio::time::sleep(spec.timeout_duration()) => Termination::TimedOut,
            _ = self.cancel.cancelled() => Termination::Cancelled,
        };

        let exit_status = match termination {
            Termination::Exited(status) => Some(status),
            Termination::TimedOut => {
                tracing::warn!(
                    command = %command_line,
                    timeout_secs = spec.timeout_duration().as_secs(),
                    "Command timed out, terminating process group"
                );
                self.terminate_group(pgid, &mut child).await;
                None
            }
            Termination::Cancelled => {
                tracing::warn!(command = %command_line, "Interrupted, terminating process group");
                self.terminate_group(pgid, &mut child).await;
                None
            }
        };

        let stdout = join_capture(stdout_task, self.kill_grace).await;
        let stderr = join_capture(stderr_task, self.kill_grace).await;
        let duration = started.elapsed();

        if self.cancel.is_cancelled() && exit_status.is_none() {
            return Err(WardenError::Interrupted);
        }

        let timed_out = exit_status.is_none();
        let exit_code = exit_status.and_then(|s| s.code());
        let succeeded = exit_code == Some(0);

        let outcome = if succeeded {
            CommandOutcome::Success
        } else {
            let detail =
                CommandResult::failure_detail(&command_line, exit_code, timed_out, &stdout, &stderr);
            CommandOutcome::failure(spec.allows_failure(), detail)
        };

        tracing::debug!(
            command = %command_line,
            exit_code = ?exit_code,
            duration_ms = duration.as_millis() as u64,
            success = succeeded,
            "Command finished"
        );

        Ok(CommandResult {
            command: command_line,
            exit_code,
            stdout,
            stderr,
            duration,
            timed_out,
            outcome,
        })
    }
}

async fn read_capped<R>(reader: Option<R>, ceiling: usize) -> CapturedOutput
where
    R: AsyncRead + Unpin,
{
    let mut captured = CapturedOutput::with_ceiling(ceiling);
    let Some(mut reader) = reader else {
        return captured;
    };

    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => captured.push(&buf[..n]),
            Err(_) => break,
        }
    }
    captured
}

/// A descendant that escaped the group can hold the pipe open; don't wait forever on it.
async fn join_capture(
    task: tokio::task::JoinHandle<CapturedOutput>,
    limit: Duration,
) -> CapturedOutput {
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(captured)) => captured,
        _ => CapturedOutput::default(),
    }
}
