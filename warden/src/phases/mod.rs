//! The platform's phase catalog.
//!
//! Phases are thin wrappers over external commands; everything about order,
//! skipping, persistence and resumption lives in the orchestrator.
//!
//! | id  | phase                       | notes                     |
//! |-----|-----------------------------|---------------------------|
//! | 1   | System packages             |                           |
//! | 2   | Container engine            |                           |
//! | 2.5 | Engine group membership     |                           |
//! | 3   | Repository checkout         |                           |
//! | 4   | Certificates                |                           |
//! | 5   | Configuration templating    |                           |
//! | 6   | Container build             |                           |
//! | 7   | Container startup           |                           |
//! | 7.5 | Default threat feeds        | feature `feeds`           |
//! | 8   | Firewall rules              | feature `firewall`        |
//! | 9   | Post-install verification   | repeatable                |

mod certificates;
mod checkout;
mod command;
mod containers;
mod engine;
mod packages;
mod templating;
mod verify;

pub use command::CommandPhase;

use crate::config::Configuration;
use crate::orchestrator::{PhaseDescriptor, PhaseId};
use crate::runner::CommandSpec;
use std::sync::Arc;

/// Features an operator may exclude.
pub const FEATURES: &[&str] = &["feeds", "firewall"];

/// Group that grants access to the container engine socket.
pub(crate) const ENGINE_GROUP: &str = "docker";

/// Compose service running the web application.
pub(crate) const CORE_SERVICE: &str = "misp-core";

/// The ordered phase list for a full install.
pub fn catalog() -> Vec<PhaseDescriptor> {
    vec![
        PhaseDescriptor::new(PhaseId::new(1), "System packages", Arc::new(packages::system_packages())),
        PhaseDescriptor::new(PhaseId::new(2), "Container engine", Arc::new(engine::ContainerEngine)),
        PhaseDescriptor::new(
            PhaseId::sub(2, 5),
            "Engine group membership",
            Arc::new(engine::group_membership()),
        ),
        PhaseDescriptor::new(PhaseId::new(3), "Repository checkout", Arc::new(checkout::Checkout)),
        PhaseDescriptor::new(PhaseId::new(4), "Certificates", Arc::new(certificates::Certificates)),
        PhaseDescriptor::new(
            PhaseId::new(5),
            "Configuration templating",
            Arc::new(templating::Templating),
        ),
        PhaseDescriptor::new(PhaseId::new(6), "Container build", Arc::new(containers::build())),
        PhaseDescriptor::new(PhaseId::new(7), "Container startup", Arc::new(containers::Startup::default())),
        PhaseDescriptor::new(PhaseId::sub(7, 5), "Default threat feeds", Arc::new(containers::feeds()))
            .skippable("feeds"),
        PhaseDescriptor::new(PhaseId::new(8), "Firewall rules", Arc::new(packages::firewall()))
            .skippable("firewall"),
        PhaseDescriptor::new(PhaseId::new(9), "Post-install verification", Arc::new(verify::Verify))
            .repeatable(),
    ]
}

/// `sudo -n <args>`; never prompts, fails fast when a password would be needed.
pub(crate) fn sudo<I, S>(args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new("sudo").arg("--non-interactive").args(args)
}

/// `docker compose` in the checkout, run under the engine group.
///
/// Group membership granted in phase 2.5 is not visible to this session, so
/// the command goes through `sg`.
pub(crate) fn compose<I, S>(config: &Configuration, args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut words = vec![
        "docker".to_string(),
        "compose".to_string(),
        "--project-directory".to_string(),
        config.install_dir().display().to_string(),
    ];
    words.extend(args.into_iter().map(Into::into));
    let line = words
        .iter()
        .map(|word| shell_quote(word))
        .collect::<Vec<_>>()
        .join(" ");
    CommandSpec::new("sg").args([ENGINE_GROUP, "-c"]).arg(line)
}

/// Secret values handed to compose through its process environment.
pub(crate) fn secret_env(config: &Configuration) -> Vec<(String, String)> {
    let mut env = vec![
        ("ADMIN_PASSWORD".to_string(), config.admin_password().expose().to_string()),
        ("MYSQL_PASSWORD".to_string(), config.database_password().expose().to_string()),
        ("GPG_PASSPHRASE".to_string(), config.signing_passphrase().expose().to_string()),
    ];
    if let Some(key) = config.encryption_key() {
        env.push(("ENCRYPTION_KEY".to_string(), key.expose().to_string()));
    }
    env
}

/// Single-quote `word` for `sh -c` unless it is plainly safe.
pub(crate) fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_ids_are_strictly_increasing() {
        let phases = catalog();
        assert!(phases.windows(2).all(|pair| pair[0].id() < pair[1].id()));
        assert_eq!(phases.len(), 11);
    }

    #[test]
    fn test_only_declared_features_are_skippable() {
        for phase in catalog() {
            if let Some(feature) = phase.feature() {
                assert!(FEATURES.contains(&feature), "{} not declared", feature);
                assert!(!phase.is_mandatory());
            }
        }
    }

    #[test]
    fn test_verification_is_the_only_repeatable_phase() {
        let repeatable: Vec<_> = catalog()
            .into_iter()
            .filter(|phase| phase.is_repeatable())
            .map(|phase| phase.id())
            .collect();
        assert_eq!(repeatable, vec![PhaseId::new(9)]);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/opt/warden"), "/opt/warden");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::{ConfigResolver, Configuration};
    use crate::credentials::CredentialGenerator;
    use crate::runner::{
        CapturedOutput, CommandOutcome, CommandResult, CommandRunner, CommandSpec,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use warden_shared::WardenResult;

    /// A configuration whose install directory is a fresh temp dir.
    pub(crate) fn sample_config() -> (TempDir, Configuration) {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigResolver::new()
            .with_env([
                ("WARDEN_HOST_ADDRESS", "10.0.0.5".to_string()),
                ("WARDEN_DOMAIN", "misp.example.org".to_string()),
                ("WARDEN_ADMIN_EMAIL", "soc@example.org".to_string()),
                ("WARDEN_ADMIN_ORG", "Example SOC".to_string()),
                ("WARDEN_INSTALL_DIR", dir.path().display().to_string()),
            ])
            .resolve(&mut CredentialGenerator::seeded(11))
            .unwrap();
        (dir, config)
    }

    /// Records commands; fails those whose argv contains a pattern.
    #[derive(Default)]
    pub(crate) struct ScriptRunner {
        failing: Vec<String>,
        stdout: Vec<(String, String)>,
        seen: Mutex<Vec<CommandSpec>>,
    }

    impl ScriptRunner {
        pub(crate) fn failing(pattern: &str) -> Self {
            Self {
                failing: vec![pattern.to_string()],
                ..Self::default()
            }
        }

        pub(crate) fn with_stdout(mut self, pattern: &str, text: &str) -> Self {
            self.stdout.push((pattern.to_string(), text.to_string()));
            self
        }

        pub(crate) fn specs(&self) -> Vec<CommandSpec> {
            self.seen.lock().clone()
        }

        pub(crate) fn lines(&self) -> Vec<String> {
            self.seen.lock().iter().map(|spec| spec.argv().join(" ")).collect()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptRunner {
        async fn run(&self, spec: &CommandSpec) -> WardenResult<CommandResult> {
            let line = spec.argv().join(" ");
            self.seen.lock().push(spec.clone());

            let fails = self.failing.iter().any(|pattern| line.contains(pattern.as_str()));
            let stdout = self
                .stdout
                .iter()
                .find(|(pattern, _)| line.contains(pattern.as_str()))
                .map(|(_, text)| CapturedOutput::from_text(text))
                .unwrap_or_default();
            let outcome = if fails {
                CommandOutcome::failure(spec.allows_failure(), format!("`{}` exited with status 1", line))
            } else {
                CommandOutcome::Success
            };
            Ok(CommandResult {
                command: spec.display(),
                exit_code: Some(if fails { 1 } else { 0 }),
                stdout,
                stderr: CapturedOutput::default(),
                duration: Duration::ZERO,
                timed_out: false,
                outcome,
            })
        }
    }
}
