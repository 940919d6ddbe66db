//! Configuration fingerprint.
//!
//! SHA-256 over canonical JSON: keys sorted, lists sorted and deduplicated,
//! case-insensitive values (environment, host names) lowercased, secrets
//! replaced by their own digest. Every fingerprinted field is present
//! in the document (absent optional values as `null`) so adding a value is
//! always a change.

use super::Environment;
use super::field::{ConfigField, FieldValue};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::str::FromStr;

pub fn compute(values: &BTreeMap<ConfigField, FieldValue>) -> String {
    let canonical: BTreeMap<&'static str, Value> = ConfigField::ALL
        .into_iter()
        .filter(|field| field.is_fingerprinted())
        .map(|field| {
            let value = values
                .get(&field)
                .map_or(Value::Null, |value| canonical_value(field, value));
            (field.key(), value)
        })
        .collect();

    // A BTreeMap of plain JSON values cannot fail to serialize.
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

fn canonical_value(field: ConfigField, value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(text) => Value::String(canonical_text(field, text)),
        FieldValue::List(items) => {
            let mut sorted = items.clone();
            sorted.sort();
            sorted.dedup();
            Value::Array(sorted.into_iter().map(Value::String).collect())
        }
        FieldValue::Flag(flag) => Value::Bool(*flag),
        FieldValue::Secret(secret) => Value::String(format!("sha256:{}", secret.digest())),
    }
}

/// Spellings that resolve to the same configuration hash the same.
fn canonical_text(field: ConfigField, text: &str) -> String {
    match field {
        ConfigField::Environment => Environment::from_str(text)
            .map(|env| env.as_str().to_string())
            .unwrap_or_else(|_| text.to_string()),
        ConfigField::Domain | ConfigField::HostAddress => text.trim().to_ascii_lowercase(),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Secret;

    fn base() -> BTreeMap<ConfigField, FieldValue> {
        let mut values = BTreeMap::new();
        values.insert(ConfigField::Domain, FieldValue::Text("misp.example.org".into()));
        values.insert(
            ConfigField::AdminPassword,
            FieldValue::Secret(Secret::new("Xy7!abcdefghij")),
        );
        values.insert(
            ConfigField::Exclude,
            FieldValue::List(vec!["feeds".into(), "firewall".into()]),
        );
        values
    }

    #[test]
    fn test_fingerprint_is_stable_and_hex() {
        let fp = compute(&base());
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, compute(&base()));
    }

    #[test]
    fn test_exclusion_order_does_not_matter() {
        let mut reordered = base();
        reordered.insert(
            ConfigField::Exclude,
            FieldValue::List(vec!["firewall".into(), "feeds".into(), "feeds".into()]),
        );
        assert_eq!(compute(&base()), compute(&reordered));
    }

    #[test]
    fn test_secret_change_changes_fingerprint() {
        let mut changed = base();
        changed.insert(
            ConfigField::AdminPassword,
            FieldValue::Secret(Secret::new("Xy7!abcdefghik")),
        );
        assert_ne!(compute(&base()), compute(&changed));
    }

    #[test]
    fn test_skip_checks_is_ignored() {
        let mut flagged = base();
        flagged.insert(ConfigField::SkipChecks, FieldValue::Flag(true));
        assert_eq!(compute(&base()), compute(&flagged));
    }

    #[test]
    fn test_equivalent_spellings_share_a_fingerprint() {
        let mut lower = base();
        lower.insert(ConfigField::Environment, FieldValue::Text("development".into()));
        let mut mixed = base();
        mixed.insert(ConfigField::Environment, FieldValue::Text("Development".into()));
        mixed.insert(ConfigField::Domain, FieldValue::Text("MISP.Example.org".into()));

        assert_eq!(compute(&lower), compute(&mixed));

        let mut staging = base();
        staging.insert(ConfigField::Environment, FieldValue::Text("staging".into()));
        assert_ne!(compute(&lower), compute(&staging));
    }
}
