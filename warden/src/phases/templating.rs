//! Renders the compose `.env` file.
//!
//! The file holds non-secret values only. Secrets reach the containers
//! through the process environment of `docker compose` (see
//! [`super::secret_env`]), so nothing sensitive is written under the
//! install directory.

use crate::config::Configuration;
use crate::orchestrator::{Phase, PhaseContext, PhaseError};
use crate::util::write_atomic;
use async_trait::async_trait;

pub(super) const ENV_FILE: &str = ".env";

pub(super) struct Templating;

#[async_trait]
impl Phase for Templating {
    async fn execute(&self, ctx: &PhaseContext<'_>) -> Result<(), PhaseError> {
        let config = ctx.config();
        let path = config.install_dir().join(ENV_FILE);
        let rendered = render(config);

        write_atomic(&path, rendered.as_bytes(), 0o640)?;
        ctx.note(format!("wrote {}", path.display()));
        tracing::debug!(path = %path.display(), "Rendered compose environment");
        Ok(())
    }
}

pub(super) fn render(config: &Configuration) -> String {
    let entries = [
        ("BASE_URL", config.base_url()),
        ("HOST_ADDRESS", config.host_address().to_string()),
        ("ADMIN_EMAIL", config.admin_email().to_string()),
        ("ADMIN_ORG", config.admin_org().to_string()),
        ("DEPLOYMENT_ENVIRONMENT", config.environment().to_string()),
        ("INSTALL_ID", config.install_id().to_string()),
    ];

    let mut out = String::from("# Generated by warden; secrets are supplied at runtime.\n");
    for (key, value) in entries {
        out.push_str(key);
        out.push('=');
        out.push_str(&quote(&value));
        out.push('\n');
    }
    out
}

/// Double-quote values compose would otherwise split or interpolate.
fn quote(value: &str) -> String {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:@".contains(c))
    {
        value.to_string()
    } else {
        format!(
            "\"{}\"",
            value
                .replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('$', "$$")
        )
    }
}
