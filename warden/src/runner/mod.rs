//! External command execution.
//!
//! Every phase reaches the host through a [`CommandRunner`]. The runner
//! captures both output streams, bounds how much of them is kept, enforces a
//! per-command timeout, and classifies the result purely from the exit status
//! and the caller's declared expectations.
//!
//! [`SystemRunner`] is the real implementation; tests substitute a recording
//! fake.

mod result;
mod system;

pub use result::{CapturedOutput, CommandOutcome, CommandResult};
pub use system::SystemRunner;

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use warden_shared::WardenResult;

/// Bytes of each output stream kept per command.
pub const OUTPUT_CEILING_BYTES: usize = 64 * 1024;

/// Grace period between SIGTERM and SIGKILL when a command is stopped.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Expected duration class of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// Metadata queries (`docker --version`, `id`): seconds.
    Metadata,
    /// Ordinary operations (user creation, service restarts).
    Standard,
    /// Package installs, image pulls and builds: tens of minutes.
    Long,
}

impl TimeoutClass {
    pub fn duration(self) -> Duration {
        match self {
            TimeoutClass::Metadata => Duration::from_secs(30),
            TimeoutClass::Standard => Duration::from_secs(5 * 60),
            TimeoutClass::Long => Duration::from_secs(45 * 60),
        }
    }
}

/// Executes external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one command to completion (or timeout).
    ///
    /// A non-zero exit, a timeout, or a program that cannot be spawned is
    /// reported through [`CommandResult::outcome`], never as `Err`. The only
    /// error is [`warden_shared::WardenError::Interrupted`], returned after the
    /// child's process group has been terminated.
    async fn run(&self, spec: &CommandSpec) -> WardenResult<CommandResult>;
}

/// A command to run: argv, timeout, expectations.
#[derive(Clone)]
pub struct CommandSpec {
    argv: Vec<String>,
    timeout: Duration,
    allow_failure: bool,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    sensitive: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
            timeout: TimeoutClass::Standard.duration(),
            allow_failure: false,
            env: Vec::new(),
            cwd: None,
            sensitive: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, class: TimeoutClass) -> Self {
        self.timeout = class.duration();
        self
    }

    pub fn timeout_after(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Non-zero exit is expected to be possible; classify it as recoverable.
    pub fn allow_failure(mut self) -> Self {
        self.allow_failure = true;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Arguments or environment carry secrets: only the program name is logged.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    pub fn allows_failure(&self) -> bool {
        self.allow_failure
    }

    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Command line safe for logs.
    pub fn display(&self) -> String {
        if self.sensitive {
            format!("{} [arguments redacted]", self.program())
        } else {
            self.argv.join(" ")
        }
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("CommandSpec")
            .field("command", &self.display())
            .field("timeout", &self.timeout)
            .field("allow_failure", &self.allow_failure)
            .field("env", &env_keys)
            .field("cwd", &self.cwd)
            .finish()
    }
}
