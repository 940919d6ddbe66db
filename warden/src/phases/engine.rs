//! Container engine installation and socket access.

use super::{CommandPhase, ENGINE_GROUP, sudo};
use crate::orchestrator::{Phase, PhaseContext, PhaseError};
use crate::runner::{CommandSpec, TimeoutClass};
use async_trait::async_trait;

const INSTALL_SCRIPT_URL: &str = "https://get.docker.com";

/// Installs the engine unless `docker` already answers, then starts the daemon.
pub(super) struct ContainerEngine;

#[async_trait]
impl Phase for ContainerEngine {
    async fn execute(&self, ctx: &PhaseContext<'_>) -> Result<(), PhaseError> {
        let probe = ctx
            .run(
                CommandSpec::new("docker")
                    .arg("--version")
                    .timeout(TimeoutClass::Metadata)
                    .allow_failure(),
            )
            .await?;

        if probe.is_success() {
            ctx.note(format!("engine present: {}", probe.stdout.text().trim()));
        } else {
            let script = std::env::temp_dir().join("warden-get-docker.sh");
            let script = script.display().to_string();
            ctx.run(
                CommandSpec::new("curl")
                    .args(["-fsSL", "--retry", "3", "-o", script.as_str(), INSTALL_SCRIPT_URL])
                    .timeout(TimeoutClass::Standard),
            )
            .await?;
            ctx.run(sudo(["sh", script.as_str()]).timeout(TimeoutClass::Long))
                .await?;
        }

        ctx.run(sudo(["systemctl", "enable", "--now", "docker"])).await?;
        ctx.run(
            CommandSpec::new("docker")
                .args(["compose", "version"])
                .timeout(TimeoutClass::Metadata),
        )
        .await?;
        Ok(())
    }
}

/// Adds the service identity to the engine group.
pub(super) fn group_membership() -> CommandPhase {
    CommandPhase::new(|config| {
        vec![sudo([
            "usermod",
            "--append",
            "--groups",
            ENGINE_GROUP,
            config.service_user(),
        ])]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::testing::{ScriptRunner, sample_config};

    #[tokio::test]
    async fn test_present_engine_is_not_reinstalled() {
        let (_dir, config) = sample_config();
        let runner = ScriptRunner::default();
        let ctx = PhaseContext::new(&config, &runner);

        ContainerEngine.execute(&ctx).await.unwrap();

        let lines = runner.lines();
        assert!(lines.iter().all(|line| !line.contains("get.docker.com")));
        assert!(lines.iter().any(|line| line.contains("systemctl enable --now docker")));
    }

    #[tokio::test]
    async fn test_missing_engine_is_installed() {
        let (_dir, config) = sample_config();
        let runner = ScriptRunner::failing("docker --version");
        let ctx = PhaseContext::new(&config, &runner);

        ContainerEngine.execute(&ctx).await.unwrap();

        let lines = runner.lines();
        assert!(lines.iter().any(|line| line.contains("get.docker.com")));
        assert!(lines.iter().any(|line| line.starts_with("sudo --non-interactive sh ")));
    }

    #[test]
    fn test_group_membership_targets_service_user() {
        let (_dir, config) = sample_config();
        let plan = group_membership().plan(&config);
        assert_eq!(
            plan[0].display(),
            "sudo --non-interactive usermod --append --groups docker warden"
        );
    }
}
