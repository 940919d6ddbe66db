//! Image build, container startup and feed loading.

use super::{CORE_SERVICE, CommandPhase, compose, secret_env};
use crate::orchestrator::{Phase, PhaseContext, PhaseError};
use crate::runner::{CommandSpec, TimeoutClass};
use async_trait::async_trait;
use std::time::Duration;

const CAKE: &str = "/var/www/MISP/app/Console/cake";

pub(super) fn build() -> CommandPhase {
    CommandPhase::new(|config| {
        vec![
            compose(config, ["pull", "--quiet"]).timeout(TimeoutClass::Long),
            compose(config, ["build", "--pull"]).timeout(TimeoutClass::Long),
        ]
    })
}

/// Starts the stack and waits for the web application to answer.
pub(super) struct Startup {
    attempts: u32,
    interval: Duration,
}

impl Default for Startup {
    fn default() -> Self {
        Self {
            attempts: 60,
            interval: Duration::from_secs(10),
        }
    }
}

impl Startup {
    #[cfg(test)]
    pub(super) fn with_polling(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }
}

#[async_trait]
impl Phase for Startup {
    async fn execute(&self, ctx: &PhaseContext<'_>) -> Result<(), PhaseError> {
        let config = ctx.config();
        ctx.run(
            compose(config, ["up", "--detach", "--remove-orphans"])
                .envs(secret_env(config))
                .sensitive()
                .timeout(TimeoutClass::Long),
        )
        .await?;

        for attempt in 1..=self.attempts {
            let probe = ctx.run(health_probe()).await?;
            if probe.is_success() {
                ctx.note(format!("application answered after {} attempt(s)", attempt));
                return Ok(());
            }
            tracing::debug!(attempt, "Application not ready yet");
            if attempt < self.attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(PhaseError::Failed(format!(
            "application did not answer on https://127.0.0.1/ after {} attempts",
            self.attempts
        )))
    }
}

pub(super) fn health_probe() -> CommandSpec {
    CommandSpec::new("curl")
        .args(["--insecure", "--silent", "--fail", "--output", "/dev/null"])
        .arg("https://127.0.0.1/users/login")
        .timeout(TimeoutClass::Metadata)
        .allow_failure()
}

/// Loads and caches the default threat-intelligence feeds.
pub(super) fn feeds() -> CommandPhase {
    CommandPhase::new(|config| {
        vec![
            compose(config, ["exec", "-T", CORE_SERVICE, CAKE, "Server", "loadDefaultFeeds"]),
            compose(config, ["exec", "-T", CORE_SERVICE, CAKE, "Server", "cacheFeed", "1", "all"])
                .timeout(TimeoutClass::Long),
        ]
    })
}
