use super::sudo;
use crate::orchestrator::{Phase, PhaseContext, PhaseError};
use crate::runner::{CommandSpec, TimeoutClass};
use async_trait::async_trait;

/// Clones the platform repository into the install directory, or moves an
/// existing checkout to the configured ref.
pub(super) struct Checkout;

#[async_trait]
impl Phase for Checkout {
    async fn execute(&self, ctx: &PhaseContext<'_>) -> Result<(), PhaseError> {
        let config = ctx.config();
        let dir = config.install_dir().display().to_string();

        if config.install_dir().join(".git").is_dir() {
            ctx.note("existing checkout, updating");
            ctx.run(
                CommandSpec::new("git")
                    .args(["-C", dir.as_str(), "fetch", "--depth", "1", "origin"])
                    .arg(config.repository_ref())
                    .timeout(TimeoutClass::Long),
            )
            .await?;
            ctx.run(CommandSpec::new("git").args(["-C", dir.as_str(), "checkout", "--force", "FETCH_HEAD"]))
                .await?;
            return Ok(());
        }

        let user = config.service_user();
        ctx.run(sudo(["install", "-d", "-m", "0750", "-o", user, "-g", user, dir.as_str()]))
            .await?;
        ctx.run(
            CommandSpec::new("git")
                .args(["clone", "--depth", "1", "--branch"])
                .args([config.repository_ref(), config.repository_url(), dir.as_str()])
                .timeout(TimeoutClass::Long),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::testing::{ScriptRunner, sample_config};

    #[tokio::test]
    async fn test_fresh_directory_is_cloned() {
        let (_dir, config) = sample_config();
        let runner = ScriptRunner::default();
        Checkout
            .execute(&PhaseContext::new(&config, &runner))
            .await
            .unwrap();

        let lines = runner.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("git clone --depth 1 --branch master"));
    }

    #[tokio::test]
    async fn test_existing_checkout_is_fetched() {
        let (dir, config) = sample_config();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        let runner = ScriptRunner::default();
        Checkout
            .execute(&PhaseContext::new(&config, &runner))
            .await
            .unwrap();

        let lines = runner.lines();
        assert!(lines[0].contains("fetch --depth 1 origin master"));
        assert!(lines[1].ends_with("checkout --force FETCH_HEAD"));
    }
}
