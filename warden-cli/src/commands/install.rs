use crate::cli::GlobalFlags;
use clap::Args;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use warden::config::{ConfigField, FieldValue};
use warden::credentials::CredentialGenerator;
use warden::orchestrator::{CompletionPolicy, Orchestrator, OrchestratorOptions, ResumePolicy};
use warden::preflight::{self, Requirements, SystemProbe};
use warden::privilege::{Handoff, PrivilegeManager, ServiceIdentitySpec, SystemAccounts};
use warden::state::InstallLock;
use warden::util::LogHandle;
use warden::{ConfigResolver, SystemRunner, phases};
use warden_shared::constants::envs;
use warden_shared::{ValidationReport, Violation, WardenError};

#[derive(Args, Debug, Clone)]
pub struct InstallArgs {
    /// YAML configuration file
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Never prompt; missing required values are an error
    #[arg(long)]
    pub non_interactive: bool,

    /// Archive any recorded progress and start from the first phase
    #[arg(long, conflicts_with = "resume")]
    pub fresh: bool,

    /// Fail unless there is recorded progress to resume
    #[arg(long)]
    pub resume: bool,

    /// Delete the run state after a successful install
    #[arg(long)]
    pub delete_state: bool,

    /// Continue past hard pre-flight failures
    #[arg(long)]
    pub skip_checks: bool,

    #[arg(long, value_name = "ID")]
    pub install_id: Option<String>,

    #[arg(long, value_name = "NAME")]
    pub service_user: Option<String>,

    #[arg(long, value_name = "ADDR")]
    pub host_address: Option<String>,

    #[arg(long, value_name = "DOMAIN")]
    pub domain: Option<String>,

    #[arg(long, value_name = "EMAIL")]
    pub admin_email: Option<String>,

    #[arg(long, value_name = "ORG")]
    pub admin_org: Option<String>,

    /// production, staging or development
    #[arg(long, value_name = "ENV")]
    pub environment: Option<String>,

    /// Feature to leave out (repeatable): feeds, firewall
    #[arg(long, value_name = "FEATURE")]
    pub exclude: Vec<String>,

    #[arg(long, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,
}

impl InstallArgs {
    fn overrides(&self) -> Vec<(ConfigField, String)> {
        let mut out = Vec::new();
        let mut push = |field, value: &Option<String>| {
            if let Some(value) = value {
                out.push((field, value.clone()));
            }
        };
        push(ConfigField::InstallId, &self.install_id);
        push(ConfigField::ServiceUser, &self.service_user);
        push(ConfigField::HostAddress, &self.host_address);
        push(ConfigField::Domain, &self.domain);
        push(ConfigField::AdminEmail, &self.admin_email);
        push(ConfigField::AdminOrg, &self.admin_org);
        push(ConfigField::Environment, &self.environment);
        push(
            ConfigField::InstallDir,
            &self.install_dir.as_ref().map(|dir| dir.display().to_string()),
        );
        if !self.exclude.is_empty() {
            out.push((ConfigField::Exclude, self.exclude.join(",")));
        }
        if self.skip_checks {
            out.push((ConfigField::SkipChecks, "true".to_string()));
        }
        out
    }

    fn resolver(&self) -> Result<ConfigResolver, WardenError> {
        let mut resolver = ConfigResolver::new();
        if let Some(path) = &self.config {
            resolver = resolver.with_file(path);
        }

        let mut report = ValidationReport::new();
        for (field, raw) in self.overrides() {
            match FieldValue::parse(field, &raw) {
                Ok(value) => resolver = resolver.with_override(field, value),
                Err(message) => report.push(Violation::new(field.key(), message)),
            }
        }
        report.into_result()?;
        Ok(resolver.interactive(!self.non_interactive))
    }

    fn options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            resume: if self.fresh {
                ResumePolicy::Fresh
            } else if self.resume {
                ResumePolicy::Require
            } else {
                ResumePolicy::Auto
            },
            completion: if self.delete_state {
                CompletionPolicy::Delete
            } else {
                CompletionPolicy::MarkTerminal
            },
        }
    }

    /// Arguments for the re-executed process. Resolved values travel in the
    /// environment, so neither the config file nor the overrides are repeated.
    fn handoff_args(&self, global: &GlobalFlags) -> Vec<String> {
        let mut args = vec!["install".to_string(), "--non-interactive".to_string()];
        if self.fresh {
            args.push("--fresh".to_string());
        }
        if self.resume {
            args.push("--resume".to_string());
        }
        if self.delete_state {
            args.push("--delete-state".to_string());
        }
        if let Some(home) = &global.home {
            args.push("--home".to_string());
            args.push(home.display().to_string());
        }
        if global.debug {
            args.push("--debug".to_string());
        }
        args
    }
}

/// Route SIGINT into a cancellation token from now on.
///
/// Installed only once prompting is over, so Ctrl-C at a prompt keeps its
/// default effect and ends the process.
fn cancel_on_interrupt() -> Result<CancellationToken, WardenError> {
    let mut interrupts = signal(SignalKind::interrupt()).map_err(|e| {
        WardenError::Internal(format!("failed to install interrupt handler: {}", e))
    })?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if interrupts.recv().await.is_some() {
            tracing::warn!("Interrupt received, stopping the current command");
            on_interrupt.cancel();
        }
    });
    Ok(cancel)
}

/// Stop before the next host-visible step if the operator interrupted.
fn ensure_not_interrupted(cancel: &CancellationToken) -> Result<(), WardenError> {
    if cancel.is_cancelled() {
        return Err(WardenError::Interrupted);
    }
    Ok(())
}

pub async fn execute(args: InstallArgs, global: &GlobalFlags, log: &LogHandle) -> anyhow::Result<()> {
    let mut draft = args.resolver()?.collect()?;
    let cancel = cancel_on_interrupt()?;

    let runner = Arc::new(SystemRunner::new(cancel.clone()));
    let manager = PrivilegeManager::new(Arc::new(SystemAccounts), runner.clone());
    manager.refuse_superuser()?;

    let handed_off = std::env::var_os(envs::WARDEN_REEXEC).is_some();
    if !handed_off {
        let requirements = Requirements::for_environment(draft.environment(), &draft.install_dir());
        let report = preflight::check(&requirements, &SystemProbe);
        crate::commands::print_preflight(&report);
        report.enforce(draft.skip_checks())?;
    }

    ensure_not_interrupted(&cancel)?;
    let identity = manager
        .ensure_service_identity(&ServiceIdentitySpec::new(draft.service_user()))
        .await?;
    let handoff = Handoff::current_exe(args.handoff_args(global), draft.handoff_env())?;
    ensure_not_interrupted(&cancel)?;
    manager.reexec_as(&identity, &handoff)?;

    // From here on the process runs as the service identity.
    let layout = global.layout()?;
    layout.prepare()?;
    let _log_guard = log.attach_file(&layout.logs_dir())?;
    let _lock = InstallLock::acquire(layout.home_dir())?;

    let credentials = layout.credential_store();
    if let Some(record) = credentials.load()? {
        let applied = draft.apply_credential_record(&record)?;
        tracing::info!(applied, "Reusing stored credentials");
    }
    let config = draft.finalize(&mut CredentialGenerator::new())?;
    if !credentials.exists() {
        credentials.write_once(&config.credential_record())?;
        tracing::info!(path = %credentials.path().display(), "Stored generated credentials");
    }

    ensure_not_interrupted(&cancel)?;
    let orchestrator = Orchestrator::new(
        phases::catalog(),
        Arc::new(layout.state_store()),
        runner,
    )?
    .with_options(args.options());
    let report = orchestrator.run(&config).await?;
    crate::commands::print_run(&report);

    let report = report.into_result()?;
    eprintln!(
        "{} install '{}' is ready at {}",
        style("Done:").green().bold(),
        report.install_id,
        config.base_url()
    );
    eprintln!(
        "Credentials are stored in {} (readable by {} only).",
        credentials.path().display(),
        config.service_user()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        install: InstallArgs,
    }

    fn parse(args: &[&str]) -> InstallArgs {
        let mut argv = vec!["install"];
        argv.extend_from_slice(args);
        Harness::try_parse_from(argv).unwrap().install
    }

    #[test]
    fn test_policy_flags_map_to_options() {
        assert_eq!(parse(&[]).options(), OrchestratorOptions::default());
        assert_eq!(parse(&["--fresh"]).options().resume, ResumePolicy::Fresh);
        assert_eq!(parse(&["--resume"]).options().resume, ResumePolicy::Require);
        assert_eq!(
            parse(&["--delete-state"]).options().completion,
            CompletionPolicy::Delete
        );
    }

    #[test]
    fn test_handoff_args_drop_config_file_and_overrides() {
        let args = parse(&["--config", "/home/op/warden.yml", "--domain", "x.example.org", "--fresh"]);
        let global = GlobalFlags {
            home: None,
            debug: false,
        };
        assert_eq!(
            args.handoff_args(&global),
            vec!["install", "--non-interactive", "--fresh"]
        );
    }

    #[test]
    fn test_bad_override_is_a_configuration_error() {
        let args = parse(&["--environment", "qa", "--non-interactive"]);
        let err = args.resolver().and_then(|r| r.collect()).err().unwrap();
        assert!(matches!(err, WardenError::Configuration(ref report) if report.mentions("environment")));
    }

    #[tokio::test]
    async fn test_interrupt_before_handoff_stops_the_install() {
        let cancel = cancel_on_interrupt().unwrap();
        assert!(ensure_not_interrupted(&cancel).is_ok());

        cancel.cancel();
        let err = ensure_not_interrupted(&cancel).unwrap_err();
        assert!(matches!(err, WardenError::Interrupted));
        assert_eq!(err.exit_code(), 130);
    }
}
