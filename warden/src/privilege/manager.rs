use super::accounts::{AccountDatabase, Identity};
use super::reexec::{self, Handoff, handoff_command};
use crate::runner::{CommandRunner, CommandSpec, TimeoutClass};
use std::sync::Arc;
use warden_shared::constants::envs;
use warden_shared::{WardenError, WardenResult};

/// Service account to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentitySpec {
    pub name: String,
    /// Supplementary groups the phases need at creation time.
    pub groups: Vec<String>,
    pub shell: String,
}

impl ServiceIdentitySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
            shell: "/bin/bash".to_string(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }
}

/// Establishes the service identity and moves the process onto it.
pub struct PrivilegeManager {
    accounts: Arc<dyn AccountDatabase>,
    runner: Arc<dyn CommandRunner>,
    reexec_marker: bool,
}

impl PrivilegeManager {
    pub fn new(accounts: Arc<dyn AccountDatabase>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            accounts,
            runner,
            reexec_marker: std::env::var_os(envs::WARDEN_REEXEC).is_some(),
        }
    }

    /// Whether this process was started by a hand-off.
    pub fn with_reexec_marker(mut self, present: bool) -> Self {
        self.reexec_marker = present;
        self
    }

    /// Fail with a privilege error when running as the superuser.
    pub fn refuse_superuser(&self) -> WardenResult<Identity> {
        let current = self.accounts.current()?;
        if current.is_superuser() {
            return Err(WardenError::Privilege(
                "refusing to run as root; run warden as a regular user with sudo rights"
                    .to_string(),
            ));
        }
        Ok(current)
    }

    /// Make sure the service account exists and return it.
    ///
    /// A no-op returning the existing account's metadata when it is already
    /// present.
    pub async fn ensure_service_identity(
        &self,
        spec: &ServiceIdentitySpec,
    ) -> WardenResult<Identity> {
        self.refuse_superuser()?;

        if let Some(existing) = self.accounts.lookup(&spec.name)? {
            tracing::debug!(user = %existing.name, uid = existing.uid, "Service identity exists");
            return Ok(existing);
        }

        tracing::info!(user = %spec.name, groups = ?spec.groups, "Creating service identity");
        let mut cmd = CommandSpec::new("sudo")
            .args(["-n", "useradd", "--create-home", "--user-group"])
            .args(["--shell", spec.shell.as_str()])
            .timeout(TimeoutClass::Standard);
        if !spec.groups.is_empty() {
            cmd = cmd.args(["--groups".to_string(), spec.groups.join(",")]);
        }
        let cmd = cmd.arg(spec.name.as_str());

        let result = self.runner.run(&cmd).await?;
        if let Some(detail) = result.outcome.detail() {
            return Err(WardenError::Privilege(format!(
                "could not create user {}: {}\n\
                 (sudo must work without a password prompt; run `sudo -v` first)",
                spec.name, detail
            )));
        }

        self.accounts.lookup(&spec.name)?.ok_or_else(|| {
            WardenError::Privilege(format!(
                "user {} still missing after useradd succeeded",
                spec.name
            ))
        })
    }

    /// Continue as `identity`.
    ///
    /// Returns `Ok(())` when this process already runs as `identity`.
    /// Otherwise the process image is replaced and this call does not return
    /// unless the replacement fails.
    pub fn reexec_as(&self, identity: &Identity, handoff: &Handoff) -> WardenResult<()> {
        let current = self.refuse_superuser()?;
        if current.uid == identity.uid {
            tracing::debug!(user = %identity.name, "Already running as service identity");
            return Ok(());
        }
        if self.reexec_marker {
            return Err(WardenError::Privilege(format!(
                "re-executed process runs as {} instead of {}",
                current.name, identity.name
            )));
        }

        tracing::info!(
            from = %current.name,
            to = %identity.name,
            "Re-executing as service identity"
        );
        Err(reexec::exec(handoff_command(identity, handoff)))
    }
}
