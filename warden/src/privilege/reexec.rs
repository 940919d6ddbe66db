//! Process-image replacement under another identity.

use super::accounts::Identity;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;
use warden_shared::constants::envs;
use warden_shared::{WardenError, WardenResult};

/// What the re-executed process runs with.
#[derive(Clone)]
pub struct Handoff {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Carried through `sudo --preserve-env`; may contain secrets.
    pub env: Vec<(String, String)>,
}

impl Handoff {
    /// Hand off to the currently running executable.
    pub fn current_exe(args: Vec<String>, env: Vec<(String, String)>) -> WardenResult<Self> {
        let program = std::env::current_exe().map_err(|e| {
            WardenError::Privilege(format!("cannot determine own executable: {}", e))
        })?;
        Ok(Self { program, args, env })
    }
}

impl std::fmt::Debug for Handoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Handoff")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &keys)
            .finish()
    }
}

/// `sudo --user <name> --set-home --preserve-env=<keys> -- <program> <args>`.
pub fn handoff_command(identity: &Identity, handoff: &Handoff) -> Command {
    let mut keys: Vec<&str> = handoff.env.iter().map(|(k, _)| k.as_str()).collect();
    keys.push(envs::WARDEN_REEXEC);

    let mut cmd = Command::new("sudo");
    cmd.arg("--non-interactive")
        .arg("--user")
        .arg(&identity.name)
        .arg("--set-home")
        .arg(format!("--preserve-env={}", keys.join(",")))
        .arg("--")
        .arg(&handoff.program)
        .args(&handoff.args);
    for (key, value) in &handoff.env {
        cmd.env(key, value);
    }
    cmd.env(envs::WARDEN_REEXEC, "1");
    cmd
}

/// Replace this process with `cmd`. Returns only on failure.
pub(crate) fn exec(mut cmd: Command) -> WardenError {
    let err = cmd.exec();
    WardenError::Privilege(format!("failed to re-execute: {}", err))
}
