use super::{compose, containers::health_probe};
use crate::orchestrator::{Phase, PhaseContext, PhaseError};
use crate::runner::TimeoutClass;
use async_trait::async_trait;

/// Confirms containers are running and the application answers.
pub(super) struct Verify;

#[async_trait]
impl Phase for Verify {
    async fn execute(&self, ctx: &PhaseContext<'_>) -> Result<(), PhaseError> {
        let config = ctx.config();
        let listing = ctx
            .run(
                compose(config, ["ps", "--status", "running", "--quiet"])
                    .timeout(TimeoutClass::Metadata),
            )
            .await?;
        let running = listing
            .stdout
            .text()
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count();
        if running == 0 {
            return Err(PhaseError::Failed("no containers are running".to_string()));
        }
        ctx.note(format!("{} container(s) running", running));

        let probe = ctx.run(health_probe()).await?;
        if !probe.is_success() {
            return Err(PhaseError::Failed(format!(
                "application is not answering at {}",
                config.base_url()
            )));
        }
        ctx.note(format!("ready at {}", config.base_url()));
        Ok(())
    }
}
