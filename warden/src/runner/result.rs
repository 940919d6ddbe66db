//! Structured outcome of one external invocation.

use std::borrow::Cow;
use std::time::Duration;

/// Lines of captured output quoted in failure details.
const DETAIL_TAIL_LINES: usize = 20;

/// Classification of a finished command.
///
/// Determined by the exit status and whether the caller declared failure
/// acceptable; never inferred from output text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    /// Failed, but the caller asked to continue (`allow_failure`).
    RecoverableFailure { detail: String },
    FatalFailure { detail: String },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, CommandOutcome::FatalFailure { .. })
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            CommandOutcome::Success => None,
            CommandOutcome::RecoverableFailure { detail }
            | CommandOutcome::FatalFailure { detail } => Some(detail),
        }
    }

    /// Classify a non-successful run.
    pub fn failure(allow_failure: bool, detail: String) -> Self {
        if allow_failure {
            CommandOutcome::RecoverableFailure { detail }
        } else {
            CommandOutcome::FatalFailure { detail }
        }
    }
}

/// Head of one output stream, bounded by a byte ceiling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    bytes: Vec<u8>,
    total_len: usize,
    ceiling: usize,
}

impl CapturedOutput {
    pub fn with_ceiling(ceiling: usize) -> Self {
        Self {
            bytes: Vec::new(),
            total_len: 0,
            ceiling,
        }
    }

    /// Build from a complete buffer (used by fakes).
    pub fn from_text(text: &str) -> Self {
        Self {
            bytes: text.as_bytes().to_vec(),
            total_len: text.len(),
            ceiling: text.len(),
        }
    }

    /// Append a chunk, keeping at most `ceiling` bytes overall.
    pub fn push(&mut self, chunk: &[u8]) {
        self.total_len += chunk.len();
        let room = self.ceiling.saturating_sub(self.bytes.len());
        let take = room.min(chunk.len());
        self.bytes.extend_from_slice(&chunk[..take]);
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn is_truncated(&self) -> bool {
        self.total_len > self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    /// Bytes the process wrote, including discarded ones.
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Last `lines` lines of the kept output.
    pub fn tail(&self, lines: usize) -> String {
        let text = self.text();
        let all: Vec<&str> = text.lines().collect();
        let start = all.len().saturating_sub(lines);
        let mut tail = all[start..].join("\n");
        if self.is_truncated() {
            tail.push_str(&format!(
                "\n[output truncated: {} of {} bytes kept]",
                self.bytes.len(),
                self.total_len
            ));
        }
        tail
    }
}

/// Outcome of one external invocation. Ephemeral: never persisted.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Command line as logged (redacted when the spec is sensitive).
    pub command: String,
    /// `None` when killed by a signal, timed out, or never spawned.
    pub exit_code: Option<i32>,
    pub stdout: CapturedOutput,
    pub stderr: CapturedOutput,
    pub duration: Duration,
    pub timed_out: bool,
    pub outcome: CommandOutcome,
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Human-readable failure description with the end of the captured output.
    pub fn failure_detail(
        command: &str,
        exit_code: Option<i32>,
        timed_out: bool,
        stdout: &CapturedOutput,
        stderr: &CapturedOutput,
    ) -> String {
        let status = if timed_out {
            "timed out".to_string()
        } else {
            match exit_code {
                Some(code) => format!("exited with status {}", code),
                None => "terminated by signal".to_string(),
            }
        };

        let output = if !stderr.is_empty() {
            stderr.tail(DETAIL_TAIL_LINES)
        } else {
            stdout.tail(DETAIL_TAIL_LINES)
        };

        if output.trim().is_empty() {
            format!("`{}` {}", command, status)
        } else {
            format!("`{}` {}:\n{}", command, status, output)
        }
    }
}
