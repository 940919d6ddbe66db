use crate::config::Configuration;
use crate::orchestrator::{Phase, PhaseContext, PhaseError};
use crate::runner::CommandSpec;
use async_trait::async_trait;

type Plan = dyn Fn(&Configuration) -> Vec<CommandSpec> + Send + Sync;

/// A phase that runs a fixed sequence of commands derived from the configuration.
///
/// Stops at the first fatal command; commands flagged `allow_failure` are
/// tolerated.
pub struct CommandPhase {
    plan: Box<Plan>,
}

impl CommandPhase {
    pub fn new<F>(plan: F) -> Self
    where
        F: Fn(&Configuration) -> Vec<CommandSpec> + Send + Sync + 'static,
    {
        Self {
            plan: Box::new(plan),
        }
    }

    /// The commands this phase would run for `config`.
    pub fn plan(&self, config: &Configuration) -> Vec<CommandSpec> {
        (self.plan)(config)
    }
}

#[async_trait]
impl Phase for CommandPhase {
    async fn execute(&self, ctx: &PhaseContext<'_>) -> Result<(), PhaseError> {
        for spec in self.plan(ctx.config()) {
            ctx.run(spec).await?;
        }
        Ok(())
    }
}
