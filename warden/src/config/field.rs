use crate::credentials::{Secret, SecretPolicy};
use std::fmt;
use warden_shared::constants::{defaults, envs};

/// How a field's value is written in files and environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Sequence in YAML, comma-separated in the environment.
    List,
    Flag,
    Password,
    Passphrase,
    /// Hex-encoded symmetric key.
    Key,
}

/// What happens when nobody supplies the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    /// Generated by the credential generator when absent.
    Generated,
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigField {
    InstallId,
    ServiceUser,
    HostAddress,
    Domain,
    AdminEmail,
    AdminOrg,
    AdminPassword,
    DatabasePassword,
    SigningPassphrase,
    EncryptionKey,
    Environment,
    Exclude,
    InstallDir,
    RepositoryUrl,
    RepositoryRef,
    SkipChecks,
}

impl ConfigField {
    pub const ALL: [ConfigField; 16] = [
        ConfigField::InstallId,
        ConfigField::ServiceUser,
        ConfigField::HostAddress,
        ConfigField::Domain,
        ConfigField::AdminEmail,
        ConfigField::AdminOrg,
        ConfigField::AdminPassword,
        ConfigField::DatabasePassword,
        ConfigField::SigningPassphrase,
        ConfigField::EncryptionKey,
        ConfigField::Environment,
        ConfigField::Exclude,
        ConfigField::InstallDir,
        ConfigField::RepositoryUrl,
        ConfigField::RepositoryRef,
        ConfigField::SkipChecks,
    ];

    /// Key in the config file.
    pub fn key(self) -> &'static str {
        match self {
            ConfigField::InstallId => "install_id",
            ConfigField::ServiceUser => "service_user",
            ConfigField::HostAddress => "host_address",
            ConfigField::Domain => "domain",
            ConfigField::AdminEmail => "admin_email",
            ConfigField::AdminOrg => "admin_org",
            ConfigField::AdminPassword => "admin_password",
            ConfigField::DatabasePassword => "database_password",
            ConfigField::SigningPassphrase => "signing_passphrase",
            ConfigField::EncryptionKey => "encryption_key",
            ConfigField::Environment => "environment",
            ConfigField::Exclude => "exclude",
            ConfigField::InstallDir => "install_dir",
            ConfigField::RepositoryUrl => "repository_url",
            ConfigField::RepositoryRef => "repository_ref",
            ConfigField::SkipChecks => "skip_checks",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }

    /// `WARDEN_<KEY>`.
    pub fn env_var(self) -> String {
        format!("{}{}", envs::FIELD_PREFIX, self.key().to_ascii_uppercase())
    }

    pub fn kind(self) -> FieldKind {
        match self {
            ConfigField::AdminPassword | ConfigField::DatabasePassword => FieldKind::Password,
            ConfigField::SigningPassphrase => FieldKind::Passphrase,
            ConfigField::EncryptionKey => FieldKind::Key,
            ConfigField::Exclude => FieldKind::List,
            ConfigField::SkipChecks => FieldKind::Flag,
            _ => FieldKind::Text,
        }
    }

    pub fn is_secret(self) -> bool {
        matches!(
            self.kind(),
            FieldKind::Password | FieldKind::Passphrase | FieldKind::Key
        )
    }

    pub fn requirement(self) -> Requirement {
        match self {
            ConfigField::AdminPassword
            | ConfigField::DatabasePassword
            | ConfigField::SigningPassphrase => Requirement::Generated,
            ConfigField::EncryptionKey | ConfigField::Exclude | ConfigField::SkipChecks => {
                Requirement::Optional
            }
            _ => Requirement::Required,
        }
    }

    /// Policy applied to secret fields.
    pub fn policy(self) -> Option<SecretPolicy> {
        match self.kind() {
            FieldKind::Password => Some(SecretPolicy::password()),
            FieldKind::Passphrase => Some(SecretPolicy::passphrase()),
            _ => None,
        }
    }

    pub fn default_value(self) -> Option<FieldValue> {
        let text = match self {
            ConfigField::InstallId => defaults::INSTALL_ID,
            ConfigField::ServiceUser => defaults::SERVICE_USER,
            ConfigField::Environment => defaults::ENVIRONMENT,
            ConfigField::InstallDir => defaults::INSTALL_DIR,
            ConfigField::RepositoryUrl => defaults::REPOSITORY_URL,
            ConfigField::RepositoryRef => defaults::REPOSITORY_REF,
            ConfigField::Exclude => return Some(FieldValue::List(Vec::new())),
            ConfigField::SkipChecks => return Some(FieldValue::Flag(false)),
            _ => return None,
        };
        Some(FieldValue::Text(text.to_string()))
    }

    /// Question shown when prompting; `None` for fields never prompted.
    pub fn prompt(self) -> Option<&'static str> {
        match self {
            ConfigField::HostAddress => Some("Host address (IP or host name)"),
            ConfigField::Domain => Some("Public domain name"),
            ConfigField::AdminEmail => Some("Administrator e-mail"),
            ConfigField::AdminOrg => Some("Administrator organisation"),
            ConfigField::AdminPassword => Some("Administrator password (blank to generate)"),
            ConfigField::DatabasePassword => Some("Database password (blank to generate)"),
            ConfigField::SigningPassphrase => Some("Signing-key passphrase (blank to generate)"),
            _ => None,
        }
    }

    /// Whether the field contributes to the configuration fingerprint.
    pub fn is_fingerprinted(self) -> bool {
        !matches!(self, ConfigField::SkipChecks)
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A field value after parsing, before semantic validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Flag(bool),
    Secret(Secret),
}

impl FieldValue {
    /// Parse the textual form used in environment variables and prompts.
    pub fn parse(field: ConfigField, raw: &str) -> Result<FieldValue, String> {
        match field.kind() {
            FieldKind::Text => Ok(FieldValue::Text(raw.trim().to_string())),
            FieldKind::List => Ok(FieldValue::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            FieldKind::Flag => parse_flag(raw)
                .map(FieldValue::Flag)
                .ok_or_else(|| format!("expected true or false, got '{}'", raw.trim())),
            FieldKind::Password | FieldKind::Passphrase | FieldKind::Key => {
                Ok(FieldValue::Secret(Secret::new(raw)))
            }
        }
    }

    /// Textual form, the inverse of [`FieldValue::parse`].
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::List(items) => items.join(","),
            FieldValue::Flag(flag) => flag.to_string(),
            FieldValue::Secret(secret) => secret.expose().to_string(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_secret(&self) -> Option<&Secret> {
        match self {
            FieldValue::Secret(secret) => Some(secret),
            _ => None,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Layer that supplied a value, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Source {
    Default,
    File,
    Environment,
    Prompt,
    CommandLine,
    CredentialRecord,
    Generated,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Default => "default",
            Source::File => "config file",
            Source::Environment => "environment",
            Source::Prompt => "prompt",
            Source::CommandLine => "command line",
            Source::CredentialRecord => "credential record",
            Source::Generated => "generated",
        };
        f.write_str(name)
    }
}
