//! Per-field format and policy checks.

use super::Environment;
use super::field::{ConfigField, FieldValue};
use regex::Regex;
use std::net::IpAddr;
use std::path::{Component, Path};
use std::str::FromStr;
use std::sync::LazyLock;

static INSTALL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{0,62}$").expect("valid regex"));

static USER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").expect("valid regex"));

static DNS_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("valid regex")
});

static EMAIL_LOCAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]{1,64}$").expect("valid regex")
});

static FEATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("valid regex"));

static HEX_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{64}$").expect("valid regex"));

/// Outcome of checking one present value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Wrong shape: malformed address, bad path, unknown enum value.
    Format(String),
    /// Well-formed but below policy, such as a weak password.
    Policy(String),
}

impl Rejection {
    pub fn message(&self) -> &str {
        match self {
            Rejection::Format(msg) | Rejection::Policy(msg) => msg,
        }
    }
}

/// Check a present value. Format is checked before policy.
pub fn check(field: ConfigField, value: &FieldValue) -> Result<(), Rejection> {
    match (field, value) {
        (ConfigField::InstallId, FieldValue::Text(v)) => {
            matches_or(&INSTALL_ID, v, "must be lowercase letters, digits and '-' (max 63)")
        }
        (ConfigField::ServiceUser, FieldValue::Text(v)) => check_user(v),
        (ConfigField::HostAddress, FieldValue::Text(v)) => check_host(v),
        (ConfigField::Domain, FieldValue::Text(v)) => check_domain(v),
        (ConfigField::AdminEmail, FieldValue::Text(v)) => check_email(v),
        (ConfigField::AdminOrg, FieldValue::Text(v)) => check_org(v),
        (ConfigField::Environment, FieldValue::Text(v)) => Environment::from_str(v)
            .map(|_| ())
            .map_err(Rejection::Format),
        (ConfigField::Exclude, FieldValue::List(items)) => check_features(items),
        (ConfigField::InstallDir, FieldValue::Text(v)) => check_install_dir(v),
        (ConfigField::RepositoryUrl, FieldValue::Text(v)) => check_repository_url(v),
        (ConfigField::RepositoryRef, FieldValue::Text(v)) => check_ref(v),
        (ConfigField::SkipChecks, FieldValue::Flag(_)) => Ok(()),
        (ConfigField::EncryptionKey, FieldValue::Secret(key)) => matches_or(
            &HEX_KEY,
            key.expose(),
            "must be 64 hexadecimal characters (32 bytes)",
        ),
        (field, FieldValue::Secret(secret)) if field.is_secret() => {
            let Some(policy) = field.policy() else {
                return Ok(());
            };
            let problems = policy.violations(secret.expose());
            if problems.is_empty() {
                Ok(())
            } else {
                Err(Rejection::Policy(problems.join("; ")))
            }
        }
        (field, _) => Err(Rejection::Format(format!(
            "unexpected value type for {}",
            field
        ))),
    }
}

fn matches_or(re: &Regex, value: &str, message: &str) -> Result<(), Rejection> {
    if re.is_match(value) {
        Ok(())
    } else {
        Err(Rejection::Format(message.to_string()))
    }
}

fn check_user(name: &str) -> Result<(), Rejection> {
    if name == "root" {
        return Err(Rejection::Policy(
            "must not be the superuser account".to_string(),
        ));
    }
    matches_or(
        &USER_NAME,
        name,
        "must be a POSIX user name (lowercase, max 32 chars)",
    )
}

fn is_dns_name(value: &str, min_labels: usize) -> bool {
    if value.is_empty() || value.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = value.split('.').collect();
    labels.len() >= min_labels && labels.iter().all(|label| DNS_LABEL.is_match(label))
}

fn check_host(value: &str) -> Result<(), Rejection> {
    if value.parse::<IpAddr>().is_ok() || is_dns_name(value, 1) {
        Ok(())
    } else {
        Err(Rejection::Format(
            "must be an IP address or host name".to_string(),
        ))
    }
}

fn check_domain(value: &str) -> Result<(), Rejection> {
    if is_dns_name(value, 2) {
        Ok(())
    } else {
        Err(Rejection::Format(format!(
            "'{}' is not a valid domain name",
            value
        )))
    }
}

fn check_email(value: &str) -> Result<(), Rejection> {
    let valid = value
        .rsplit_once('@')
        .is_some_and(|(local, domain)| EMAIL_LOCAL.is_match(local) && is_dns_name(domain, 2));
    if valid {
        Ok(())
    } else {
        Err(Rejection::Format(format!(
            "'{}' is not a valid e-mail address",
            value
        )))
    }
}

fn check_org(value: &str) -> Result<(), Rejection> {
    let length = value.chars().count();
    if value.trim().is_empty() || length > 64 {
        return Err(Rejection::Format("must be 1 to 64 characters".to_string()));
    }
    if value.chars().any(char::is_control) {
        return Err(Rejection::Format(
            "must not contain control characters".to_string(),
        ));
    }
    Ok(())
}

fn check_features(items: &[String]) -> Result<(), Rejection> {
    let bad: Vec<&str> = items
        .iter()
        .filter(|item| !FEATURE.is_match(item))
        .map(String::as_str)
        .collect();
    if bad.is_empty() {
        Ok(())
    } else {
        Err(Rejection::Format(format!(
            "invalid feature names: {}",
            bad.join(", ")
        )))
    }
}

fn check_install_dir(value: &str) -> Result<(), Rejection> {
    let path = Path::new(value);
    if !path.is_absolute() {
        return Err(Rejection::Format("must be an absolute path".to_string()));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Rejection::Format("must not contain '..'".to_string()));
    }
    if path == Path::new("/") {
        return Err(Rejection::Policy(
            "must not be the filesystem root".to_string(),
        ));
    }
    Ok(())
}

fn check_repository_url(value: &str) -> Result<(), Rejection> {
    let scheme_ok = ["https://", "ssh://", "git@"]
        .iter()
        .any(|prefix| value.starts_with(prefix) && value.len() > prefix.len());
    if scheme_ok && !value.chars().any(char::is_whitespace) {
        Ok(())
    } else {
        Err(Rejection::Format(
            "must be an https://, ssh:// or git@ repository URL".to_string(),
        ))
    }
}

fn check_ref(value: &str) -> Result<(), Rejection> {
    if value.is_empty()
        || value.starts_with('-')
        || value.contains("..")
        || value.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        Err(Rejection::Format("is not a valid git ref".to_string()))
    } else {
        Ok(())
    }
}
