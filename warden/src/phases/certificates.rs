use crate::orchestrator::{Phase, PhaseContext, PhaseError};
use crate::runner::CommandSpec;
use async_trait::async_trait;

pub(super) const SSL_DIR: &str = "ssl";
const CERT_FILE: &str = "cert.pem";
const KEY_FILE: &str = "key.pem";
const VALIDITY_DAYS: &str = "825";

/// Self-signed TLS certificate for the configured domain.
///
/// An existing certificate is kept so operator-supplied ones survive a rerun.
pub(super) struct Certificates;

#[async_trait]
impl Phase for Certificates {
    async fn execute(&self, ctx: &PhaseContext<'_>) -> Result<(), PhaseError> {
        let config = ctx.config();
        let ssl_dir = config.install_dir().join(SSL_DIR);
        let cert = ssl_dir.join(CERT_FILE);
        let key = ssl_dir.join(KEY_FILE);

        if cert.is_file() && key.is_file() {
            ctx.note(format!("keeping existing certificate {}", cert.display()));
            return Ok(());
        }

        let key = key.display().to_string();
        ctx.run(CommandSpec::new("mkdir").arg("-p").arg(ssl_dir.display().to_string()))
            .await?;
        ctx.run(
            CommandSpec::new("openssl")
                .args(["req", "-x509", "-nodes", "-newkey", "rsa:4096", "-days", VALIDITY_DAYS])
                .arg("-subj")
                .arg(format!("/CN={}/O={}", config.domain(), config.admin_org()))
                .arg("-addext")
                .arg(format!("subjectAltName=DNS:{}", config.domain()))
                .args(["-keyout", key.as_str()])
                .arg("-out")
                .arg(cert.display().to_string()),
        )
        .await?;
        ctx.run(CommandSpec::new("chmod").args(["0600", key.as_str()]))
            .await?;
        Ok(())
    }
}
