//! Configuration resolution.
//!
//! Values are layered with increasing precedence: built-in defaults, the
//! YAML config file, `WARDEN_*` environment variables, command-line
//! overrides, then interactive prompts for whatever is still unset. Every
//! field is validated (presence, format, policy) and all violations are
//! reported together. The result is an immutable [`Configuration`].

mod field;
mod fingerprint;
mod prompt;
mod resolver;
mod sources;
mod validate;

pub use field::{ConfigField, FieldKind, FieldValue, Requirement, Source};
pub use prompt::{ConsolePrompter, Prompter};
pub use resolver::{ConfigDraft, ConfigResolver, Entry};
pub use sources::CONFIG_FILE_KEY;

use crate::credentials::{CredentialRecord, Secret};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use warden_shared::{ValidationReport, Violation, WardenError, WardenResult};

/// Deployment classifier; drives pre-flight thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Staging,
    Development,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Development => "development",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            "development" => Ok(Environment::Development),
            other => Err(format!(
                "'{}' is not one of production, staging, development",
                other
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check an install id that arrives outside the resolver, such as the
/// `--install-id` of `status` or `reset`. The id names a file in the state
/// directory, so it must never carry path components.
pub fn validate_install_id(install_id: &str) -> WardenResult<()> {
    let value = FieldValue::Text(install_id.to_string());
    validate::check(ConfigField::InstallId, &value).map_err(|rejection| {
        let mut report = ValidationReport::new();
        report.push(Violation::new(ConfigField::InstallId.key(), rejection.message()));
        WardenError::Configuration(report)
    })
}

/// Every value the phases need. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct Configuration {
    install_id: String,
    service_user: String,
    host_address: String,
    domain: String,
    admin_email: String,
    admin_org: String,
    admin_password: Secret,
    database_password: Secret,
    signing_passphrase: Secret,
    encryption_key: Option<Secret>,
    environment: Environment,
    exclude: BTreeSet<String>,
    install_dir: PathBuf,
    repository_url: String,
    repository_ref: String,
    skip_checks: bool,
    sources: BTreeMap<ConfigField, Source>,
    fingerprint: String,
}

impl Configuration {
    fn from_entries(entries: BTreeMap<ConfigField, Entry>) -> WardenResult<Self> {
        let values: BTreeMap<ConfigField, FieldValue> = entries
            .iter()
            .map(|(field, entry)| (*field, entry.value.clone()))
            .collect();
        let sources = entries
            .iter()
            .map(|(field, entry)| (*field, entry.source))
            .collect();

        let text = |field: ConfigField| -> WardenResult<String> {
            values
                .get(&field)
                .and_then(FieldValue::as_text)
                .map(str::to_string)
                .ok_or_else(|| missing(field))
        };
        let secret = |field: ConfigField| -> WardenResult<Secret> {
            values
                .get(&field)
                .and_then(FieldValue::as_secret)
                .cloned()
                .ok_or_else(|| missing(field))
        };

        let exclude = match values.get(&ConfigField::Exclude) {
            Some(FieldValue::List(items)) => items.iter().cloned().collect(),
            _ => BTreeSet::new(),
        };

        Ok(Self {
            install_id: text(ConfigField::InstallId)?,
            service_user: text(ConfigField::ServiceUser)?,
            host_address: text(ConfigField::HostAddress)?,
            domain: text(ConfigField::Domain)?,
            admin_email: text(ConfigField::AdminEmail)?,
            admin_org: text(ConfigField::AdminOrg)?,
            admin_password: secret(ConfigField::AdminPassword)?,
            database_password: secret(ConfigField::DatabasePassword)?,
            signing_passphrase: secret(ConfigField::SigningPassphrase)?,
            encryption_key: secret(ConfigField::EncryptionKey).ok(),
            environment: Environment::from_str(&text(ConfigField::Environment)?)
                .map_err(WardenError::InvalidState)?,
            exclude,
            install_dir: PathBuf::from(text(ConfigField::InstallDir)?),
            repository_url: text(ConfigField::RepositoryUrl)?,
            repository_ref: text(ConfigField::RepositoryRef)?,
            skip_checks: matches!(
                values.get(&ConfigField::SkipChecks),
                Some(FieldValue::Flag(true))
            ),
            sources,
            fingerprint: fingerprint::compute(&values),
        })
    }

    pub fn install_id(&self) -> &str {
        &self.install_id
    }

    pub fn service_user(&self) -> &str {
        &self.service_user
    }

    pub fn host_address(&self) -> &str {
        &self.host_address
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    pub fn admin_org(&self) -> &str {
        &self.admin_org
    }

    pub fn admin_password(&self) -> &Secret {
        &self.admin_password
    }

    pub fn database_password(&self) -> &Secret {
        &self.database_password
    }

    pub fn signing_passphrase(&self) -> &Secret {
        &self.signing_passphrase
    }

    pub fn encryption_key(&self) -> Option<&Secret> {
        self.encryption_key.as_ref()
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn exclusions(&self) -> &BTreeSet<String> {
        &self.exclude
    }

    pub fn is_excluded(&self, feature: &str) -> bool {
        self.exclude.contains(feature)
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn repository_url(&self) -> &str {
        &self.repository_url
    }

    pub fn repository_ref(&self) -> &str {
        &self.repository_ref
    }

    /// Downgrade hard pre-flight failures to warnings.
    pub fn skip_checks(&self) -> bool {
        self.skip_checks
    }

    /// URL the platform is served on.
    pub fn base_url(&self) -> String {
        format!("https://{}", self.domain)
    }

    pub fn source(&self, field: ConfigField) -> Option<Source> {
        self.sources.get(&field).copied()
    }

    /// Hex SHA-256 identifying this configuration for resume decisions.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Every secret value with its field.
    pub fn secrets(&self) -> Vec<(ConfigField, &Secret)> {
        let mut secrets = vec![
            (ConfigField::AdminPassword, &self.admin_password),
            (ConfigField::DatabasePassword, &self.database_password),
            (ConfigField::SigningPassphrase, &self.signing_passphrase),
        ];
        if let Some(key) = &self.encryption_key {
            secrets.push((ConfigField::EncryptionKey, key));
        }
        secrets
    }

    /// Credential record holding every secret and its policy.
    pub fn credential_record(&self) -> CredentialRecord {
        let mut record = CredentialRecord::new(self.install_id.clone());
        for (field, secret) in self.secrets() {
            record.insert(
                field.key(),
                secret.clone(),
                field.policy().map(|policy| policy.summary()),
            );
        }
        record
    }
}

fn missing(field: ConfigField) -> WardenError {
    WardenError::InvalidState(format!("validated configuration lacks {}", field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialGenerator;

    fn env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("WARDEN_HOST_ADDRESS", "10.0.0.5"),
            ("WARDEN_DOMAIN", "misp.example.org"),
            ("WARDEN_ADMIN_EMAIL", "soc@example.org"),
            ("WARDEN_ADMIN_ORG", "Example SOC"),
            ("WARDEN_ADMIN_PASSWORD", "Admin-Pass-123"),
            ("WARDEN_DATABASE_PASSWORD", "Db-Pass-4567!"),
            ("WARDEN_SIGNING_PASSPHRASE", "Signing-Passphrase-89"),
            ("WARDEN_ENVIRONMENT", "development"),
        ]
    }

    fn resolve(vars: Vec<(&'static str, &'static str)>) -> Configuration {
        ConfigResolver::new()
            .with_env(vars)
            .resolve(&mut CredentialGenerator::seeded(1))
            .unwrap()
    }

    #[test]
    fn test_every_field_change_alters_fingerprint() {
        let base = resolve(env());
        let changes = [
            ("WARDEN_DOMAIN", "other.example.org"),
            ("WARDEN_ADMIN_ORG", "Other SOC"),
            ("WARDEN_ADMIN_PASSWORD", "Admin-Pass-124"),
            ("WARDEN_ENVIRONMENT", "staging"),
            ("WARDEN_EXCLUDE", "feeds"),
            ("WARDEN_INSTALL_DIR", "/srv/warden"),
        ];
        for (key, value) in changes {
            let mut vars = env();
            vars.retain(|(k, _)| *k != key);
            vars.push((key, value));
            assert_ne!(
                resolve(vars).fingerprint(),
                base.fingerprint(),
                "changing {} kept the fingerprint",
                key
            );
        }
    }

    #[test]
    fn test_fingerprint_ignores_skip_checks() {
        let mut vars = env();
        vars.push(("WARDEN_SKIP_CHECKS", "true"));
        assert_eq!(resolve(vars).fingerprint(), resolve(env()).fingerprint());
    }

    #[test]
    fn test_credential_record_contains_every_secret() {
        let config = resolve(env());
        let record = config.credential_record();
        assert_eq!(record.install_id, "default");
        assert_eq!(record.secrets.len(), 3);
        assert!(record.policies["admin_password"].contains("min 12"));
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let config = resolve(env());
        let debug = format!("{:?}", config);
        assert!(!debug.contains("Admin-Pass-123"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(
            "Staging".parse::<Environment>().unwrap(),
            Environment::Staging
        );
        assert!("prod".parse::<Environment>().is_err());
    }

    #[test]
    fn test_install_id_rejects_path_components() {
        assert!(validate_install_id("default").is_ok());
        assert!(validate_install_id("lab-2").is_ok());

        for bad in ["../credentials", "a/b", "", "Upper", "-lead"] {
            let err = validate_install_id(bad).unwrap_err();
            assert!(
                matches!(err, WardenError::Configuration(ref report) if report.mentions("install_id")),
                "{bad:?} accepted"
            );
        }
    }
}
